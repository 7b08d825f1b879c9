mod actor;
mod assignment;
mod machine;
mod order;

pub use actor::Actor;
pub use assignment::Assignment;
pub use machine::{
    CreateMachineRequest, Machine, MachineListQuery, MachineStatus, MachineType,
    MaintenanceRequest, UpdateMachineRequest,
};
pub use order::{
    AssignRequest, Bag, CheckpointRequest, CreateOrderRequest, FinalCheckRequest,
    FoldStartRequest, MachineActionRequest, Order, OrderListQuery, OrderStatus, OrderType,
    ReceiveRequest, ReleaseOutcome, StatusChange, VerifyUnloadRequest,
};
