// ==========================================
// 结构分析结果导入系统 - 层间位移角绝对极值仓储
// ==========================================
// 表: story_drift_abs_maxmin
// 规则: 按 (项目, 结果集) 整体替换（先删后插, 同一事务）, 读者看不到部分结果
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::records::AbsMaxMinRecord;
use crate::domain::types::ExtremeSign;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct AbsMaxMinRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AbsMaxMinRepository {
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

    /// 整体替换某结果集的绝对极值记录, 返回写入行数
    pub fn replace_tx(
        conn: &Connection,
        project_id: i64,
        result_set_id: i64,
        records: &[AbsMaxMinRecord],
    ) -> RepositoryResult<usize> {
        conn.execute(
            "DELETE FROM story_drift_abs_maxmin WHERE project_id = ?1 AND result_set_id = ?2",
            params![project_id, result_set_id],
        )?;

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO story_drift_abs_maxmin (
                project_id, result_set_id, story_id, load_case_id, direction,
                absolute_max_drift, sign, original_max, original_min
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )?;
        for record in records {
            stmt.execute(params![
                project_id,
                result_set_id,
                record.story_id,
                record.load_case_id,
                record.direction,
                record.absolute_max,
                record.sign.as_str(),
                record.original_max,
                record.original_min,
            ])?;
        }
        Ok(records.len())
    }

    pub fn list(&self, result_set_id: i64) -> RepositoryResult<Vec<AbsMaxMinRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT story_id, load_case_id, direction, absolute_max_drift, sign, original_max, original_min
            FROM story_drift_abs_maxmin
            WHERE result_set_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map(params![result_set_id], |row| {
                Ok(AbsMaxMinRecord {
                    story_id: row.get(0)?,
                    load_case_id: row.get(1)?,
                    direction: row.get(2)?,
                    absolute_max: row.get(3)?,
                    sign: ExtremeSign::parse(&row.get::<_, String>(4)?),
                    original_max: row.get(5)?,
                    original_min: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn record(story_id: i64, max: f64, min: f64) -> AbsMaxMinRecord {
        AbsMaxMinRecord {
            story_id,
            load_case_id: 1,
            direction: "X".to_string(),
            absolute_max: max.abs().max(min.abs()),
            sign: ExtremeSign::Positive,
            original_max: max,
            original_min: min,
        }
    }

    #[test]
    fn test_replace_leaves_no_orphans() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO projects (name) VALUES ('P');
            INSERT INTO result_sets (project_id, name) VALUES (1, 'DES');
            INSERT INTO stories (project_id, name, sort_order) VALUES (1, 'L1', 0);
            INSERT INTO stories (project_id, name, sort_order) VALUES (1, 'L2', 1);
            INSERT INTO load_cases (project_id, name) VALUES (1, 'TH01');
            "#,
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = AbsMaxMinRepository::from_connection(conn.clone());

        {
            let c = conn.lock().unwrap();
            AbsMaxMinRepository::replace_tx(&c, 1, 1, &[record(1, 0.1, -0.2), record(2, 0.3, -0.1)])
                .unwrap();
        }
        assert_eq!(repo.list(1).unwrap().len(), 2);

        {
            let c = conn.lock().unwrap();
            AbsMaxMinRepository::replace_tx(&c, 1, 1, &[record(2, 0.4, -0.1)]).unwrap();
        }
        let rows = repo.list(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].story_id, 2);
        assert_eq!(rows[0].original_max, 0.4);
    }
}
