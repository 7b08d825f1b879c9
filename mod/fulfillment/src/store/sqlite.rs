use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use washflow_core::{ListResult, ServiceError};

use crate::model::{Machine, MachineListQuery, Order, OrderListQuery};
use crate::store::FulfillmentStore;

/// SQL schema. Documents live in a JSON `data` column; the indexed columns
/// exist for filtering and for the conditional version writes.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS orders (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    seq         INTEGER NOT NULL,
    status      TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    deleted     INTEGER NOT NULL DEFAULT 0,
    version     INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id);
CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);

CREATE TABLE IF NOT EXISTS machines (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    scan_code   TEXT NOT NULL UNIQUE,
    type        TEXT NOT NULL,
    status      TEXT NOT NULL,
    version     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_machines_status ON machines(status);
";

/// Persistent store backed by rusqlite (bundled SQLite).
///
/// `save_order`/`save_machine` are single conditional UPDATEs
/// (`WHERE id = ? AND version = ?`) — the affected-row count is the
/// compare-and-set that closes the race window between two concurrent
/// operations on the same document.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, ServiceError> {
        let conn = Connection::open(path)
            .map_err(|e| ServiceError::Storage(format!("open sqlite: {e}")))?;
        // WAL for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| ServiceError::Storage(format!("sqlite pragma: {e}")))?;
        Self::init(conn)
    }

    /// In-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ServiceError::Storage(format!("open sqlite: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, ServiceError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("schema init: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ServiceError> {
        self.conn
            .lock()
            .map_err(|e| ServiceError::Storage(e.to_string()))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

fn order_from_json(json: &str) -> Result<Order, ServiceError> {
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad order json: {e}")))
}

fn machine_from_json(json: &str) -> Result<Machine, ServiceError> {
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad machine json: {e}")))
}

impl FulfillmentStore for SqliteStore {
    fn insert_order(&self, order: &Order) -> Result<(), ServiceError> {
        let conn = self.lock()?;
        let data = to_json(order)?;
        conn.execute(
            "INSERT INTO orders (id, data, seq, status, customer_id, deleted, version, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                order.id,
                data,
                order.seq,
                order.status.as_str(),
                order.customer_id,
                order.deleted as i64,
                order.version as i64,
                order.created_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ServiceError::Conflict(format!("order {} already exists", order.id))
            }
            other => ServiceError::Storage(other.to_string()),
        })?;
        Ok(())
    }

    fn find_order(&self, id: &str) -> Result<Order, ServiceError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row("SELECT data FROM orders WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        match json {
            Some(json) => order_from_json(&json),
            None => Err(ServiceError::NotFound(format!("order {id}"))),
        }
    }

    fn save_order(&self, order: &Order, expected_version: u64) -> Result<u64, ServiceError> {
        let new_version = expected_version + 1;
        let mut updated = order.clone();
        updated.version = new_version;
        let data = to_json(&updated)?;

        let conn = self.lock()?;
        let affected = conn
            .execute(
                "UPDATE orders SET data = ?1, status = ?2, deleted = ?3, version = ?4 \
                 WHERE id = ?5 AND version = ?6",
                params![
                    data,
                    updated.status.as_str(),
                    updated.deleted as i64,
                    new_version as i64,
                    updated.id,
                    expected_version as i64,
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        if affected == 0 {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM orders WHERE id = ?1", params![updated.id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|e| ServiceError::Storage(e.to_string()))?;
            return match exists {
                Some(_) => Err(ServiceError::PersistenceConflict(format!(
                    "order {} was modified concurrently",
                    updated.id
                ))),
                None => Err(ServiceError::NotFound(format!("order {}", updated.id))),
            };
        }
        Ok(new_version)
    }

    fn list_orders(&self, query: &OrderListQuery) -> Result<ListResult<Order>, ServiceError> {
        let limit = query.limit.unwrap_or(50);
        let offset = query.offset.unwrap_or(0);

        let mut where_clauses: Vec<String> = Vec::new();
        let mut sql_params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if !query.include_deleted {
            where_clauses.push("deleted = 0".into());
        }
        if let Some(status) = query.status {
            where_clauses.push(format!("status = ?{idx}"));
            sql_params.push(Value::Text(status.as_str().to_string()));
            idx += 1;
        }
        if let Some(ref customer) = query.customer_id {
            where_clauses.push(format!("customer_id = ?{idx}"));
            sql_params.push(Value::Text(customer.clone()));
            idx += 1;
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let conn = self.lock()?;

        let count_sql = format!("SELECT COUNT(*) FROM orders {where_sql}");
        let total: i64 = conn
            .query_row(&count_sql, params_from_iter(sql_params.iter()), |row| row.get(0))
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let select_sql = format!(
            "SELECT data FROM orders {where_sql} ORDER BY created_at DESC LIMIT ?{idx} OFFSET ?{}",
            idx + 1
        );
        sql_params.push(Value::Integer(limit as i64));
        sql_params.push(Value::Integer(offset as i64));

        let mut stmt = conn
            .prepare(&select_sql)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(sql_params.iter()), |row| row.get::<_, String>(0))
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            let json = row.map_err(|e| ServiceError::Storage(e.to_string()))?;
            items.push(order_from_json(&json)?);
        }

        Ok(ListResult {
            items,
            total: total as usize,
        })
    }

    fn next_order_seq(&self) -> Result<i64, ServiceError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM orders", [], |row| {
            row.get(0)
        })
        .map_err(|e| ServiceError::Storage(e.to_string()))
    }

    fn insert_machine(&self, machine: &Machine) -> Result<(), ServiceError> {
        let conn = self.lock()?;
        let data = to_json(machine)?;
        conn.execute(
            "INSERT INTO machines (id, data, scan_code, type, status, version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                machine.id,
                data,
                machine.scan_code,
                machine.machine_type.as_str(),
                machine.status.as_str(),
                machine.version as i64,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ServiceError::Conflict(format!(
                    "machine {} or scan code {} already exists",
                    machine.id, machine.scan_code
                ))
            }
            other => ServiceError::Storage(other.to_string()),
        })?;
        Ok(())
    }

    fn find_machine(&self, id: &str) -> Result<Machine, ServiceError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row("SELECT data FROM machines WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        match json {
            Some(json) => machine_from_json(&json),
            None => Err(ServiceError::NotFound(format!("machine {id}"))),
        }
    }

    fn find_machine_by_scan_code(&self, scan_code: &str) -> Result<Machine, ServiceError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT data FROM machines WHERE scan_code = ?1",
                params![scan_code],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        match json {
            Some(json) => machine_from_json(&json),
            None => Err(ServiceError::NotFound(format!("machine with code {scan_code}"))),
        }
    }

    fn save_machine(&self, machine: &Machine, expected_version: u64) -> Result<u64, ServiceError> {
        let new_version = expected_version + 1;
        let mut updated = machine.clone();
        updated.version = new_version;
        let data = to_json(&updated)?;

        let conn = self.lock()?;
        let affected = conn
            .execute(
                "UPDATE machines SET data = ?1, status = ?2, version = ?3 \
                 WHERE id = ?4 AND version = ?5",
                params![
                    data,
                    updated.status.as_str(),
                    new_version as i64,
                    updated.id,
                    expected_version as i64,
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        if affected == 0 {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM machines WHERE id = ?1",
                    params![updated.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| ServiceError::Storage(e.to_string()))?;
            return match exists {
                Some(_) => Err(ServiceError::PersistenceConflict(format!(
                    "machine {} was modified concurrently",
                    updated.id
                ))),
                None => Err(ServiceError::NotFound(format!("machine {}", updated.id))),
            };
        }
        Ok(new_version)
    }

    fn list_machines(&self, query: &MachineListQuery) -> Result<ListResult<Machine>, ServiceError> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut sql_params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(t) = query.machine_type {
            where_clauses.push(format!("type = ?{idx}"));
            sql_params.push(Value::Text(t.as_str().to_string()));
            idx += 1;
        }
        if let Some(s) = query.status {
            where_clauses.push(format!("status = ?{idx}"));
            sql_params.push(Value::Text(s.as_str().to_string()));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let conn = self.lock()?;
        let sql = format!("SELECT data FROM machines {where_sql} ORDER BY scan_code ASC");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(sql_params.iter()), |row| row.get::<_, String>(0))
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            let json = row.map_err(|e| ServiceError::Storage(e.to_string()))?;
            items.push(machine_from_json(&json)?);
        }
        let total = items.len();
        Ok(ListResult { items, total })
    }

    fn delete_machine(&self, id: &str) -> Result<(), ServiceError> {
        let conn = self.lock()?;
        let affected = conn
            .execute("DELETE FROM machines WHERE id = ?1", params![id])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("machine {id}")));
        }
        Ok(())
    }
}
