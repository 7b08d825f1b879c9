use std::collections::HashMap;
use std::sync::Mutex;

use washflow_core::{ListResult, ServiceError};

use crate::model::{Machine, MachineListQuery, Order, OrderListQuery};
use crate::store::FulfillmentStore;

/// In-memory store. The default for tests and single-process demos.
///
/// Version checks run under one mutex, which gives the same
/// compare-and-set semantics the SQLite conditional updates provide.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<String, Order>,
    machines: HashMap<String, Machine>,
    seq: i64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FulfillmentStore for MemStore {
    fn insert_order(&self, order: &Order) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.orders.contains_key(&order.id) {
            return Err(ServiceError::Conflict(format!("order {} already exists", order.id)));
        }
        inner.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    fn find_order(&self, id: &str) -> Result<Order, ServiceError> {
        self.inner
            .lock()
            .expect("store lock")
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))
    }

    fn save_order(&self, order: &Order, expected_version: u64) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().expect("store lock");
        let stored = inner
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order.id)))?;
        if stored.version != expected_version {
            return Err(ServiceError::PersistenceConflict(format!(
                "order {} version {} != expected {}",
                order.id, stored.version, expected_version
            )));
        }
        let new_version = expected_version + 1;
        let mut updated = order.clone();
        updated.version = new_version;
        *stored = updated;
        Ok(new_version)
    }

    fn list_orders(&self, query: &OrderListQuery) -> Result<ListResult<Order>, ServiceError> {
        let inner = self.inner.lock().expect("store lock");
        let mut items: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| query.include_deleted || !o.deleted)
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .filter(|o| {
                query
                    .customer_id
                    .as_deref()
                    .is_none_or(|c| o.customer_id == c)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len();
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(50);
        let items = items.into_iter().skip(offset).take(limit).collect();
        Ok(ListResult { items, total })
    }

    fn next_order_seq(&self) -> Result<i64, ServiceError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.seq += 1;
        Ok(inner.seq)
    }

    fn insert_machine(&self, machine: &Machine) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.machines.contains_key(&machine.id) {
            return Err(ServiceError::Conflict(format!(
                "machine {} already exists",
                machine.id
            )));
        }
        if inner
            .machines
            .values()
            .any(|m| m.scan_code == machine.scan_code)
        {
            return Err(ServiceError::Conflict(format!(
                "scan code {} already in use",
                machine.scan_code
            )));
        }
        inner.machines.insert(machine.id.clone(), machine.clone());
        Ok(())
    }

    fn find_machine(&self, id: &str) -> Result<Machine, ServiceError> {
        self.inner
            .lock()
            .expect("store lock")
            .machines
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("machine {id}")))
    }

    fn find_machine_by_scan_code(&self, scan_code: &str) -> Result<Machine, ServiceError> {
        self.inner
            .lock()
            .expect("store lock")
            .machines
            .values()
            .find(|m| m.scan_code == scan_code)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("machine with code {scan_code}")))
    }

    fn save_machine(&self, machine: &Machine, expected_version: u64) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().expect("store lock");
        let stored = inner
            .machines
            .get_mut(&machine.id)
            .ok_or_else(|| ServiceError::NotFound(format!("machine {}", machine.id)))?;
        if stored.version != expected_version {
            return Err(ServiceError::PersistenceConflict(format!(
                "machine {} version {} != expected {}",
                machine.id, stored.version, expected_version
            )));
        }
        let new_version = expected_version + 1;
        let mut updated = machine.clone();
        updated.version = new_version;
        *stored = updated;
        Ok(new_version)
    }

    fn list_machines(&self, query: &MachineListQuery) -> Result<ListResult<Machine>, ServiceError> {
        let inner = self.inner.lock().expect("store lock");
        let mut items: Vec<Machine> = inner
            .machines
            .values()
            .filter(|m| query.machine_type.is_none_or(|t| m.machine_type == t))
            .filter(|m| query.status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        let total = items.len();
        Ok(ListResult { items, total })
    }

    fn delete_machine(&self, id: &str) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .machines
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("machine {id}")))
    }
}
