// ==========================================
// 结构分析结果导入系统 - 导入运行审计仓储
// ==========================================
// 表: import_runs
// 用途: 每次导入运行一行（文件清单、处理数、记录数、文件级错误）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRunEntity {
    pub id: String,
    pub project_id: i64,
    pub result_set_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<String>,
    pub files_processed: usize,
    pub record_count: usize,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

pub struct ImportRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, run: &ImportRunEntity) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_runs (
                id, project_id, result_set_id, started_at, finished_at,
                files_json, files_processed, record_count, errors_json, cancelled
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                run.id,
                run.project_id,
                run.result_set_id,
                run.started_at,
                run.finished_at,
                serde_json::to_string(&run.files)?,
                run.files_processed as i64,
                run.record_count as i64,
                serde_json::to_string(&run.errors)?,
                run.cancelled,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<ImportRunEntity>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_RUNS),
                params![run_id],
                map_raw,
            )
            .optional()?;
        raw.map(RawRun::into_entity).transpose()
    }

    /// 某结果集最近的导入运行（新 → 旧）
    pub fn list_recent(&self, result_set_id: i64, limit: usize) -> RepositoryResult<Vec<ImportRunEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE result_set_id = ?1 ORDER BY started_at DESC LIMIT ?2",
            SELECT_RUNS
        ))?;
        let raw = stmt
            .query_map(params![result_set_id, limit as i64], map_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRun::into_entity).collect()
    }
}

const SELECT_RUNS: &str = r#"
    SELECT id, project_id, result_set_id, started_at, finished_at,
           files_json, files_processed, record_count, errors_json, cancelled
    FROM import_runs
"#;

struct RawRun {
    id: String,
    project_id: i64,
    result_set_id: i64,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    files_json: String,
    files_processed: i64,
    record_count: i64,
    errors_json: String,
    cancelled: bool,
}

fn map_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        id: row.get(0)?,
        project_id: row.get(1)?,
        result_set_id: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        files_json: row.get(5)?,
        files_processed: row.get(6)?,
        record_count: row.get(7)?,
        errors_json: row.get(8)?,
        cancelled: row.get(9)?,
    })
}

impl RawRun {
    fn into_entity(self) -> RepositoryResult<ImportRunEntity> {
        Ok(ImportRunEntity {
            id: self.id,
            project_id: self.project_id,
            result_set_id: self.result_set_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            files: serde_json::from_str(&self.files_json)?,
            files_processed: self.files_processed.max(0) as usize,
            record_count: self.record_count.max(0) as usize,
            errors: serde_json::from_str(&self.errors_json)?,
            cancelled: self.cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    #[test]
    fn test_insert_and_find() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO projects (name) VALUES ('P'); INSERT INTO result_sets (project_id, name) VALUES (1, 'DES');",
        )
        .unwrap();
        let repo = ImportRunRepository::from_connection(Arc::new(Mutex::new(conn)));

        let now = Utc::now();
        let run = ImportRunEntity {
            id: "run-1".to_string(),
            project_id: 1,
            result_set_id: 1,
            started_at: now,
            finished_at: now,
            files: vec!["A.xlsx".to_string(), "B.xlsx".to_string()],
            files_processed: 2,
            record_count: 12,
            errors: vec!["B.xlsx: 工作表 Story Drifts 缺少列: Drift".to_string()],
            cancelled: false,
        };
        repo.insert(&run).unwrap();

        let found = repo.find_by_id("run-1").unwrap().unwrap();
        assert_eq!(found.files, run.files);
        assert_eq!(found.errors, run.errors);
        assert_eq!(found.record_count, 12);
        assert!(repo.find_by_id("missing").unwrap().is_none());
        assert_eq!(repo.list_recent(1, 10).unwrap().len(), 1);
    }
}
