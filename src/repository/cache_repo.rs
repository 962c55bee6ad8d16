// ==========================================
// 结构分析结果导入系统 - 宽表缓存仓储
// ==========================================
// 表: global_results_cache / element_results_cache
// 规则:
// - (项目, 结果集, 结果类型, 楼层[, 构件]) 至多一行
// - 已存在则原地替换载荷, 否则插入
// - 载荷为有序 JSON 对象（键排序, 同一输入序列化结果逐字节一致）
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::records::{ElementCacheEntry, GlobalCacheEntry, ResultsMatrix};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// 缓存行键: (楼层, 构件)
pub type CacheRowKey = (i64, Option<i64>);

pub struct CacheRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CacheRepository {
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

    // ==========================================
    // 写入（事务内）
    // ==========================================

    pub fn upsert_global_tx(
        conn: &Connection,
        project_id: i64,
        result_set_id: i64,
        result_type: &str,
        story_id: i64,
        story_sort_order: i64,
        matrix: &ResultsMatrix,
    ) -> RepositoryResult<()> {
        let payload = serde_json::to_string(matrix)?;
        conn.execute(
            r#"
            INSERT INTO global_results_cache (
                project_id, result_set_id, result_type, story_id, story_sort_order, results_matrix
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (project_id, result_set_id, result_type, story_id) DO UPDATE SET
                story_sort_order = excluded.story_sort_order,
                results_matrix = excluded.results_matrix,
                updated_at = datetime('now')
            "#,
            params![project_id, result_set_id, result_type, story_id, story_sort_order, payload],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_element_tx(
        conn: &Connection,
        project_id: i64,
        result_set_id: i64,
        result_type: &str,
        element_id: i64,
        story_id: i64,
        story_sort_order: i64,
        matrix: &ResultsMatrix,
    ) -> RepositoryResult<()> {
        let payload = serde_json::to_string(matrix)?;
        conn.execute(
            r#"
            INSERT INTO element_results_cache (
                project_id, result_set_id, result_type, element_id, story_id,
                story_sort_order, results_matrix
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (project_id, result_set_id, result_type, element_id, story_id) DO UPDATE SET
                story_sort_order = excluded.story_sort_order,
                results_matrix = excluded.results_matrix,
                updated_at = datetime('now')
            "#,
            params![
                project_id,
                result_set_id,
                result_type,
                element_id,
                story_id,
                story_sort_order,
                payload
            ],
        )?;
        Ok(())
    }

    /// 删除某结果类型中不在 keep 集合内的缓存行（事实已不存在的行）
    pub fn delete_stale_tx(
        conn: &Connection,
        result_set_id: i64,
        result_type: &str,
        element_scoped: bool,
        keep: &HashSet<CacheRowKey>,
    ) -> RepositoryResult<usize> {
        let (select, delete) = if element_scoped {
            (
                "SELECT id, story_id, element_id FROM element_results_cache WHERE result_set_id = ?1 AND result_type = ?2",
                "DELETE FROM element_results_cache WHERE id = ?1",
            )
        } else {
            (
                "SELECT id, story_id, NULL FROM global_results_cache WHERE result_set_id = ?1 AND result_type = ?2",
                "DELETE FROM global_results_cache WHERE id = ?1",
            )
        };

        let existing = {
            let mut stmt = conn.prepare(select)?;
            let rows = stmt
                .query_map(params![result_set_id, result_type], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        (row.get::<_, i64>(1)?, row.get::<_, Option<i64>>(2)?),
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut removed = 0;
        for (id, key) in existing {
            if !keep.contains(&key) {
                removed += conn.execute(delete, params![id])?;
            }
        }
        Ok(removed)
    }

    // ==========================================
    // 读取
    // ==========================================

    pub fn list_global(
        &self,
        result_set_id: i64,
        result_type: &str,
    ) -> RepositoryResult<Vec<GlobalCacheEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, result_set_id, result_type, story_id, story_sort_order, results_matrix
            FROM global_results_cache
            WHERE result_set_id = ?1 AND result_type = ?2
            ORDER BY story_sort_order, story_id
            "#,
        )?;
        let raw = stmt
            .query_map(params![result_set_id, result_type], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, result_set_id, result_type, story_id, story_sort_order, payload)| {
                Ok(GlobalCacheEntry {
                    id,
                    result_set_id,
                    result_type,
                    story_id,
                    story_sort_order,
                    results_matrix: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    pub fn list_element(
        &self,
        result_set_id: i64,
        result_type: &str,
    ) -> RepositoryResult<Vec<ElementCacheEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, result_set_id, result_type, element_id, story_id, story_sort_order, results_matrix
            FROM element_results_cache
            WHERE result_set_id = ?1 AND result_type = ?2
            ORDER BY element_id, story_sort_order, story_id
            "#,
        )?;
        let raw = stmt
            .query_map(params![result_set_id, result_type], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(id, result_set_id, result_type, element_id, story_id, story_sort_order, payload)| {
                    Ok(ElementCacheEntry {
                        id,
                        result_set_id,
                        result_type,
                        element_id,
                        story_id,
                        story_sort_order,
                        results_matrix: serde_json::from_str(&payload)?,
                    })
                },
            )
            .collect()
    }

    /// 原始载荷文本（用于逐字节比较）
    pub fn raw_global_payloads(
        &self,
        result_set_id: i64,
        result_type: &str,
    ) -> RepositoryResult<Vec<(i64, String)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT story_id, results_matrix FROM global_results_cache
            WHERE result_set_id = ?1 AND result_type = ?2
            ORDER BY story_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![result_set_id, result_type], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
