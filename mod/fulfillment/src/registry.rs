//! Machine registry: CRUD over the physical washers and dryers.
//!
//! The registry owns `available` ↔ `maintenance`; the engine's assignment
//! ledger is the only writer of `in_use`. Nothing here touches
//! `current_order` except to refuse operations while it is set.

use std::sync::Arc;

use washflow_core::{Clock, ListResult, ServiceError, new_id};

use crate::audit::{AuditEvent, AuditRecorder};
use crate::model::{
    Actor, CreateMachineRequest, Machine, MachineListQuery, MachineStatus, UpdateMachineRequest,
};
use crate::store::FulfillmentStore;

pub struct MachineRegistry {
    store: Arc<dyn FulfillmentStore>,
    audit: Arc<dyn AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl MachineRegistry {
    pub fn new(
        store: Arc<dyn FulfillmentStore>,
        audit: Arc<dyn AuditRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, audit, clock }
    }

    fn record(&self, actor: &Actor, action: &str, machine_id: &str, details: String) {
        self.audit.record(AuditEvent {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            action: action.to_string(),
            entity_type: "machine".to_string(),
            entity_id: machine_id.to_string(),
            details,
            metadata: serde_json::Value::Null,
        });
    }

    /// Register a machine. The scan code must be unique across the fleet.
    pub fn create(&self, req: CreateMachineRequest) -> Result<Machine, ServiceError> {
        let name = req.name.trim();
        let scan_code = req.scan_code.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("machine name is required".into()));
        }
        if scan_code.is_empty() {
            return Err(ServiceError::Validation("scan code is required".into()));
        }
        let now = self.clock.now_rfc3339();
        let machine = Machine {
            id: new_id(),
            name: name.to_string(),
            machine_type: req.machine_type,
            scan_code: scan_code.to_string(),
            status: MachineStatus::Available,
            current_order: None,
            last_used_at: None,
            created_at: now.clone(),
            updated_at: now,
            version: 0,
        };
        self.store.insert_machine(&machine)?;
        self.record(
            &req.actor,
            "machine.create",
            &machine.id,
            format!("{} registered ({})", machine.name, machine.scan_code),
        );
        Ok(machine)
    }

    pub fn get(&self, id: &str) -> Result<Machine, ServiceError> {
        self.store.find_machine(id)
    }

    pub fn list(&self, query: &MachineListQuery) -> Result<ListResult<Machine>, ServiceError> {
        self.store.list_machines(query)
    }

    pub fn update(&self, id: &str, req: UpdateMachineRequest) -> Result<Machine, ServiceError> {
        let mut machine = self.store.find_machine(id)?;
        if let Some(name) = req.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::Validation("machine name is required".into()));
            }
            machine.name = name;
        }
        machine.updated_at = self.clock.now_rfc3339();
        machine.version = self.store.save_machine(&machine, machine.version)?;
        self.record(&req.actor, "machine.update", id, format!("{} updated", machine.name));
        Ok(machine)
    }

    /// Remove a machine from the fleet. Refused while occupied.
    pub fn delete(&self, id: &str, actor: &Actor) -> Result<(), ServiceError> {
        let machine = self.store.find_machine(id)?;
        if machine.status == MachineStatus::InUse {
            return Err(ServiceError::Conflict(format!(
                "machine {} is in use and cannot be deleted",
                machine.name
            )));
        }
        self.store.delete_machine(id)?;
        self.record(actor, "machine.delete", id, format!("{} removed", machine.name));
        Ok(())
    }

    /// Toggle the out-of-service flag.
    pub fn set_maintenance(
        &self,
        id: &str,
        on: bool,
        actor: &Actor,
    ) -> Result<Machine, ServiceError> {
        let mut machine = self.store.find_machine(id)?;
        if on {
            if machine.status == MachineStatus::InUse {
                return Err(ServiceError::Conflict(format!(
                    "machine {} is in use; release it before maintenance",
                    machine.name
                )));
            }
            machine.status = MachineStatus::Maintenance;
        } else {
            if machine.status != MachineStatus::Maintenance {
                return Ok(machine);
            }
            machine.status = MachineStatus::Available;
        }
        machine.updated_at = self.clock.now_rfc3339();
        machine.version = self.store.save_machine(&machine, machine.version)?;
        self.record(
            actor,
            "machine.maintenance",
            id,
            if on {
                format!("{} taken out of service", machine.name)
            } else {
                format!("{} returned to service", machine.name)
            },
        );
        Ok(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryRecorder;
    use crate::model::MachineType;
    use crate::store::MemStore;
    use washflow_core::FixedClock;

    fn registry() -> (MachineRegistry, Arc<MemStore>, Arc<MemoryRecorder>) {
        let store = Arc::new(MemStore::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let registry = MachineRegistry::new(
            Arc::clone(&store) as Arc<dyn FulfillmentStore>,
            Arc::clone(&recorder) as Arc<dyn AuditRecorder>,
            Arc::new(FixedClock::at("2026-02-01T09:00:00Z")),
        );
        (registry, store, recorder)
    }

    fn admin() -> Actor {
        Actor::new("admin", "Shift Lead")
    }

    fn create_req(name: &str, code: &str) -> CreateMachineRequest {
        CreateMachineRequest {
            name: name.into(),
            machine_type: MachineType::Washer,
            scan_code: code.into(),
            actor: admin(),
        }
    }

    #[test]
    fn create_and_fetch() {
        let (registry, _, recorder) = registry();
        let machine = registry.create(create_req("Washer 1", "W-01")).unwrap();
        assert_eq!(machine.status, MachineStatus::Available);
        assert_eq!(registry.get(&machine.id).unwrap().scan_code, "W-01");
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn duplicate_scan_code_rejected() {
        let (registry, _, _) = registry();
        registry.create(create_req("Washer 1", "W-01")).unwrap();
        let err = registry.create(create_req("Washer 2", "W-01")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn blank_fields_rejected() {
        let (registry, _, _) = registry();
        assert!(registry.create(create_req("  ", "W-01")).is_err());
        assert!(registry.create(create_req("Washer 1", "")).is_err());
    }

    #[test]
    fn rename() {
        let (registry, _, _) = registry();
        let machine = registry.create(create_req("Washer 1", "W-01")).unwrap();
        let updated = registry
            .update(
                &machine.id,
                UpdateMachineRequest {
                    name: Some("Big Washer".into()),
                    actor: admin(),
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Big Washer");
        assert_eq!(updated.version, 1);
    }

    #[test]
    fn maintenance_toggle() {
        let (registry, _, _) = registry();
        let machine = registry.create(create_req("Washer 1", "W-01")).unwrap();

        let machine = registry.set_maintenance(&machine.id, true, &admin()).unwrap();
        assert_eq!(machine.status, MachineStatus::Maintenance);

        let machine = registry.set_maintenance(&machine.id, false, &admin()).unwrap();
        assert_eq!(machine.status, MachineStatus::Available);

        // Turning maintenance off on an available machine is a no-op.
        let again = registry.set_maintenance(&machine.id, false, &admin()).unwrap();
        assert_eq!(again.status, MachineStatus::Available);
    }

    #[test]
    fn in_use_machine_is_protected() {
        let (registry, store, _) = registry();
        let machine = registry.create(create_req("Washer 1", "W-01")).unwrap();
        let mut stored = store.find_machine(&machine.id).unwrap();
        stored.status = MachineStatus::InUse;
        stored.current_order = Some("o1".into());
        store.save_machine(&stored, stored.version).unwrap();

        let err = registry.set_maintenance(&machine.id, true, &admin()).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let err = registry.delete(&machine.id, &admin()).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn delete_idle_machine() {
        let (registry, _, _) = registry();
        let machine = registry.create(create_req("Washer 1", "W-01")).unwrap();
        registry.delete(&machine.id, &admin()).unwrap();
        assert!(registry.get(&machine.id).is_err());
    }
}
