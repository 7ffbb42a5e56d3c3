use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{AuditFilter, AuditRecord, AuditStore, AuditStoreError, AuditType};
use crate::lottery::LotteryId;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lottery_audits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_uuid TEXT NOT NULL,
    project_id INTEGER NOT NULL,
    lottery_id INTEGER NOT NULL,
    type TEXT NOT NULL,
    audit TEXT NOT NULL,
    created_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_lottery_audits_lottery ON lottery_audits(lottery_id, deleted_at);
CREATE INDEX IF NOT EXISTS idx_lottery_audits_execution ON lottery_audits(execution_uuid);
CREATE INDEX IF NOT EXISTS idx_lottery_audits_type ON lottery_audits(type);
"#;

const COLUMNS: &str =
    "id, execution_uuid, project_id, lottery_id, type, audit, created_at, deleted_at";

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

type RawRow = (
    i64,
    String,
    i64,
    i64,
    String,
    String,
    String,
    Option<String>,
);

impl SqliteAuditStore {
    /// Open (or create) the audit database at `path`
    pub fn new(path: &Path) -> Result<Self, AuditStoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditStoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuditStoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditStoreError> {
        self.conn
            .lock()
            .map_err(|_| AuditStoreError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(lottery_id) = filter.lottery_id {
            conditions.push("lottery_id = ?");
            params.push(Box::new(lottery_id));
        }

        if let Some(uuid) = filter.execution_uuid {
            conditions.push("execution_uuid = ?");
            params.push(Box::new(uuid.to_string()));
        }

        if let Some(audit_type) = filter.audit_type {
            conditions.push("type = ?");
            params.push(Box::new(audit_type.as_str()));
        }

        if !filter.include_superseded {
            conditions.push("deleted_at IS NULL");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn decode(raw: RawRow) -> Result<AuditRecord, AuditStoreError> {
        let (id, uuid, project_id, lottery_id, audit_type, audit, created_at, deleted_at) = raw;

        let execution_uuid = Uuid::parse_str(&uuid)
            .map_err(|e| AuditStoreError::Database(format!("Invalid execution uuid: {}", e)))?;
        let audit_type = audit_type
            .parse::<AuditType>()
            .map_err(AuditStoreError::Database)?;
        let audit = serde_json::from_str(&audit)
            .map_err(|e| AuditStoreError::Serialization(e.to_string()))?;

        Ok(AuditRecord {
            id,
            execution_uuid,
            project_id,
            lottery_id,
            audit_type,
            audit,
            created_at: parse_timestamp(&created_at)?,
            deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn insert_with(conn: &Connection, record: &AuditRecord) -> Result<i64, AuditStoreError> {
        let audit_json = serde_json::to_string(&record.audit)
            .map_err(|e| AuditStoreError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO lottery_audits (execution_uuid, project_id, lottery_id, type, audit, created_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.execution_uuid.to_string(),
                record.project_id,
                record.lottery_id,
                record.audit_type.as_str(),
                audit_json,
                record.created_at.to_rfc3339(),
                record.deleted_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(db_err)?;

        Ok(conn.last_insert_rowid())
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditStoreError> {
        let conn = self.conn()?;
        Self::insert_with(&conn, record)
    }

    fn init(&self, record: &AuditRecord) -> Result<i64, AuditStoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "UPDATE lottery_audits SET deleted_at = ? WHERE lottery_id = ? AND deleted_at IS NULL",
            params![Utc::now().to_rfc3339(), record.lottery_id],
        )
        .map_err(db_err)?;
        let id = Self::insert_with(&tx, record)?;

        tx.commit().map_err(db_err)?;
        Ok(id)
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM lottery_audits {} ORDER BY id ASC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::read_row)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::decode(row.map_err(db_err)?)?);
        }

        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditStoreError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM lottery_audits {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn latest_live(&self, lottery_id: LotteryId) -> Result<Option<AuditRecord>, AuditStoreError> {
        let conn = self.conn()?;

        let sql = format!(
            "SELECT {} FROM lottery_audits WHERE lottery_id = ? AND deleted_at IS NULL ORDER BY id DESC LIMIT 1",
            COLUMNS
        );
        let raw = conn
            .query_row(&sql, params![lottery_id], Self::read_row)
            .optional()
            .map_err(db_err)?;

        raw.map(Self::decode).transpose()
    }
}

fn db_err(e: rusqlite::Error) -> AuditStoreError {
    AuditStoreError::Database(e.to_string())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AuditStoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(Into::into)
        .map_err(|e| AuditStoreError::Database(format!("Invalid timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteAuditStore {
        SqliteAuditStore::in_memory().unwrap()
    }

    fn record(uuid: Uuid, lottery_id: LotteryId, audit_type: AuditType) -> AuditRecord {
        AuditRecord::new(uuid, 1, lottery_id, audit_type, json!({"step": audit_type.as_str()}))
    }

    #[test]
    fn test_insert_and_query() {
        let store = create_test_store();
        let uuid = Uuid::new_v4();

        let id = store.insert(&record(uuid, 5, AuditType::Custom)).unwrap();
        assert!(id > 0);

        let records = store.query(&AuditFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].execution_uuid, uuid);
        assert_eq!(records[0].audit_type, AuditType::Custom);
        assert_eq!(records[0].audit["step"], "CUSTOM");
        assert!(!records[0].is_superseded());
    }

    #[test]
    fn test_init_supersedes_previous_records_of_same_lottery() {
        let store = create_test_store();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.init(&record(first, 5, AuditType::Init)).unwrap();
        store.insert(&record(first, 5, AuditType::Failure)).unwrap();
        store.init(&record(Uuid::new_v4(), 6, AuditType::Init)).unwrap();
        store.init(&record(second, 5, AuditType::Init)).unwrap();

        let live = store
            .query(&AuditFilter::new().with_lottery_id(5))
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].execution_uuid, second);

        let all = store
            .query(&AuditFilter::new().with_lottery_id(5).including_superseded())
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].is_superseded());
        assert!(all[1].is_superseded());
        assert!(!all[2].is_superseded());

        // Other lotteries are untouched.
        assert_eq!(store.count(&AuditFilter::new().with_lottery_id(6)).unwrap(), 1);
    }

    #[test]
    fn test_filter_by_type_and_uuid() {
        let store = create_test_store();
        let uuid = Uuid::new_v4();

        store.init(&record(uuid, 1, AuditType::Init)).unwrap();
        store.insert(&record(uuid, 1, AuditType::Custom)).unwrap();
        store.insert(&record(uuid, 1, AuditType::Custom)).unwrap();
        store.insert(&record(Uuid::new_v4(), 1, AuditType::Custom)).unwrap();

        let customs = store
            .count(&AuditFilter::new().with_audit_type(AuditType::Custom))
            .unwrap();
        assert_eq!(customs, 3);

        let run = store
            .count(&AuditFilter::new().with_execution_uuid(uuid))
            .unwrap();
        assert_eq!(run, 3);
    }

    #[test]
    fn test_pagination() {
        let store = create_test_store();
        let uuid = Uuid::new_v4();
        for _ in 0..5 {
            store.insert(&record(uuid, 1, AuditType::Custom)).unwrap();
        }

        let page = store
            .query(&AuditFilter::new().with_limit(2).with_offset(3))
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(store.count(&AuditFilter::new()).unwrap(), 5);
    }

    #[test]
    fn test_latest_live_ignores_superseded_records() {
        let store = create_test_store();
        assert!(store.latest_live(9).unwrap().is_none());

        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        store.init(&record(old, 9, AuditType::Init)).unwrap();
        store.init(&record(new, 9, AuditType::Init)).unwrap();
        store.insert(&record(new, 9, AuditType::GroupExecution)).unwrap();

        let latest = store.latest_live(9).unwrap().unwrap();
        assert_eq!(latest.execution_uuid, new);
        assert_eq!(latest.audit_type, AuditType::GroupExecution);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.db");
        let uuid = Uuid::new_v4();

        {
            let store = SqliteAuditStore::new(&path).unwrap();
            store.init(&record(uuid, 3, AuditType::Init)).unwrap();
        }

        let store = SqliteAuditStore::new(&path).unwrap();
        let latest = store.latest_live(3).unwrap().unwrap();
        assert_eq!(latest.execution_uuid, uuid);
    }
}
