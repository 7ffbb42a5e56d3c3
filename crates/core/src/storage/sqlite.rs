//! SQLite-backed lottery store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Lottery, LotteryStore, StorageError, UnitTypeCount};
use crate::lottery::{FamilyId, LotteryId, LotterySpec, ProjectId, UnitId, UnitTypeId};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lotteries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    is_published INTEGER NOT NULL DEFAULT 0,
    start_date TEXT,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS unit_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_type_id INTEGER NOT NULL REFERENCES unit_types(id),
    family_id INTEGER
);

CREATE TABLE IF NOT EXISTS families (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    unit_type_id INTEGER NOT NULL REFERENCES unit_types(id)
);

CREATE TABLE IF NOT EXISTS preferences (
    family_id INTEGER NOT NULL REFERENCES families(id),
    unit_id INTEGER NOT NULL REFERENCES units(id),
    rank INTEGER NOT NULL,
    PRIMARY KEY (family_id, unit_id)
);

CREATE INDEX IF NOT EXISTS idx_lotteries_project ON lotteries(project_id);
CREATE INDEX IF NOT EXISTS idx_unit_types_project ON unit_types(project_id);
CREATE INDEX IF NOT EXISTS idx_units_type ON units(unit_type_id);
CREATE INDEX IF NOT EXISTS idx_families_project ON families(project_id);
CREATE INDEX IF NOT EXISTS idx_preferences_family ON preferences(family_id, rank);
"#;

/// SQLite-backed lottery store.
pub struct SqliteLotteryStore {
    conn: Mutex<Connection>,
}

impl SqliteLotteryStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    pub fn create_lottery(
        &self,
        project_id: ProjectId,
        start_date: Option<DateTime<Utc>>,
        is_published: bool,
    ) -> Result<LotteryId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO lotteries (project_id, is_published, start_date) VALUES (?, ?, ?)",
            params![project_id, is_published, start_date.map(timestamp)],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_unit_type(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> Result<UnitTypeId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO unit_types (project_id, name) VALUES (?, ?)",
            params![project_id, name],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_unit(&self, unit_type_id: UnitTypeId) -> Result<UnitId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO units (unit_type_id) VALUES (?)",
            params![unit_type_id],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_family(
        &self,
        project_id: ProjectId,
        unit_type_id: UnitTypeId,
    ) -> Result<FamilyId, StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO families (project_id, unit_type_id) VALUES (?, ?)",
            params![project_id, unit_type_id],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Replace a family's ranked preferences, most preferred first.
    pub fn set_preferences(&self, family_id: FamilyId, units: &[UnitId]) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM preferences WHERE family_id = ?",
            params![family_id],
        )
        .map_err(db_err)?;
        for (index, unit_id) in units.iter().enumerate() {
            tx.execute(
                "INSERT INTO preferences (family_id, unit_id, rank) VALUES (?, ?, ?)",
                params![family_id, unit_id, index as i64 + 1],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    /// Assign a unit directly, bypassing a lottery run.
    pub fn assign_unit(&self, unit_id: UnitId, family_id: FamilyId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE units SET family_id = ? WHERE id = ?",
            params![family_id, unit_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn ids(conn: &Connection, sql: &str, id: i64) -> Result<Vec<i64>, StorageError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, i64>(0))
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

impl LotteryStore for SqliteLotteryStore {
    fn lottery(&self, lottery_id: LotteryId) -> Result<Option<Lottery>, StorageError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, project_id, is_published, start_date, deleted_at FROM lotteries WHERE id = ?",
                params![lottery_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        raw.map(|(id, project_id, is_published, start_date, deleted_at)| {
            Ok(Lottery {
                id,
                project_id,
                is_published,
                start_date: start_date.as_deref().map(parse_timestamp).transpose()?,
                deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
            })
        })
        .transpose()
    }

    fn reserve_for_execution(
        &self,
        lottery_id: LotteryId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE lotteries SET is_published = 0
                 WHERE id = ?
                   AND is_published = 1
                   AND deleted_at IS NULL
                   AND start_date IS NOT NULL
                   AND start_date <= ?",
                params![lottery_id, timestamp(now)],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    fn republish(&self, lottery_id: LotteryId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE lotteries SET is_published = 1 WHERE id = ?",
                params![lottery_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StorageError::LotteryNotFound(lottery_id));
        }
        Ok(())
    }

    fn family_count(&self, project_id: ProjectId) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM families WHERE project_id = ?",
                params![project_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn has_assigned_units(&self, project_id: ProjectId) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM units u JOIN unit_types t ON t.id = u.unit_type_id
                WHERE t.project_id = ? AND u.family_id IS NOT NULL
            )",
            params![project_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn unit_type_counts(&self, project_id: ProjectId) -> Result<Vec<UnitTypeCount>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT t.id, t.name,
                        (SELECT COUNT(*) FROM units u WHERE u.unit_type_id = t.id),
                        (SELECT COUNT(*) FROM families f WHERE f.unit_type_id = t.id)
                 FROM unit_types t
                 WHERE t.project_id = ?
                 ORDER BY t.id",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(UnitTypeCount {
                    unit_type_id: row.get(0)?,
                    unit_type_name: row.get(1)?,
                    units_count: row.get::<_, i64>(2)? as usize,
                    families_count: row.get::<_, i64>(3)? as usize,
                })
            })
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn project_groups(
        &self,
        project_id: ProjectId,
    ) -> Result<BTreeMap<UnitTypeId, LotterySpec>, StorageError> {
        let conn = self.conn()?;
        let unit_types = Self::ids(
            &conn,
            "SELECT id FROM unit_types WHERE project_id = ? ORDER BY id",
            project_id,
        )?;

        let mut groups = BTreeMap::new();
        for unit_type_id in unit_types {
            let units = Self::ids(
                &conn,
                "SELECT id FROM units WHERE unit_type_id = ? ORDER BY id",
                unit_type_id,
            )?;
            let families = Self::ids(
                &conn,
                "SELECT id FROM families WHERE unit_type_id = ? ORDER BY id",
                unit_type_id,
            )?;
            if units.is_empty() && families.is_empty() {
                continue;
            }

            let type_units: BTreeSet<UnitId> = units.iter().copied().collect();
            let mut preferences = BTreeMap::new();
            for family_id in families {
                let mut ranked: Vec<UnitId> = Self::ids(
                    &conn,
                    "SELECT unit_id FROM preferences WHERE family_id = ? ORDER BY rank, unit_id",
                    family_id,
                )?
                .into_iter()
                .filter(|unit| type_units.contains(unit))
                .collect();

                let listed: BTreeSet<UnitId> = ranked.iter().copied().collect();
                ranked.extend(units.iter().copied().filter(|unit| !listed.contains(unit)));
                preferences.insert(family_id, ranked);
            }

            groups.insert(unit_type_id, LotterySpec::new(preferences, units));
        }

        Ok(groups)
    }

    fn apply_picks(
        &self,
        lottery_id: LotteryId,
        picks: &BTreeMap<FamilyId, UnitId>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let changed = tx
            .execute(
                "UPDATE lotteries SET deleted_at = ?
                 WHERE id = ? AND is_published = 0 AND deleted_at IS NULL",
                params![timestamp(Utc::now()), lottery_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM lotteries WHERE id = ?",
                    params![lottery_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            return Err(match exists {
                Some(_) => StorageError::NotReserved(lottery_id),
                None => StorageError::LotteryNotFound(lottery_id),
            });
        }

        for (family_id, unit_id) in picks {
            let changed = tx
                .execute(
                    "UPDATE units SET family_id = ? WHERE id = ? AND family_id IS NULL",
                    params![family_id, unit_id],
                )
                .map_err(db_err)?;
            if changed != 1 {
                // Dropping the transaction rolls back the partial assignment.
                return Err(StorageError::UnitUnavailable { unit_id: *unit_id });
            }
        }

        tx.commit().map_err(db_err)
    }

    fn invalidate(&self, lottery_id: LotteryId) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        let project_id: Option<ProjectId> = tx
            .query_row(
                "SELECT project_id FROM lotteries WHERE id = ?",
                params![lottery_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let project_id = project_id.ok_or(StorageError::LotteryNotFound(lottery_id))?;

        tx.execute(
            "UPDATE lotteries SET deleted_at = NULL, is_published = 1 WHERE id = ?",
            params![lottery_id],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE units SET family_id = NULL
             WHERE unit_type_id IN (SELECT id FROM unit_types WHERE project_id = ?)",
            params![project_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }

    fn assignments(&self, project_id: ProjectId) -> Result<BTreeMap<UnitId, FamilyId>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT u.id, u.family_id FROM units u JOIN unit_types t ON t.id = u.unit_type_id
                 WHERE t.project_id = ? AND u.family_id IS NOT NULL
                 ORDER BY u.id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;
        rows.collect::<Result<BTreeMap<_, _>, _>>().map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Fixed-width UTC timestamps so that SQL string comparison matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(Into::into)
        .map_err(|e| StorageError::Database(format!("Invalid timestamp: {}", e)))
}
