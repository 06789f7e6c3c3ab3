use crate::error::{AppError, AppResult};
use crate::store::schema::TABLE_NAMES;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub rows: BTreeMap<String, i64>,
    pub vector_available: bool,
}

pub fn collect(conn: &Connection, vector_available: bool) -> AppResult<HealthReport> {
    let mut rows = BTreeMap::new();
    for table in TABLE_NAMES {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        rows.insert((*table).to_string(), count);
    }
    Ok(HealthReport {
        rows,
        vector_available,
    })
}
