// ==========================================
// 结构分析结果导入系统 - 事实记录仓储
// ==========================================
// 表: story_drifts / story_results / element_results / column_axials
// 规则:
// - 每条记录保存 source_file
// - 重新导入同一 (结果集, 类别, 工况) 时先删除旧记录再写入
// - 读取顺序为写入顺序（缓存行取"首条记录"的楼层顺序）
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::category::{FactTable, ResultCategory};
use crate::domain::records::{CacheSourceRow, FactRecord, StoryDriftRow};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// 写入一条事实记录所需的已解析主键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactKeys {
    pub project_id: i64,
    pub result_set_id: i64,
    pub story_id: i64,
    pub element_id: Option<i64>,
    pub load_case_id: i64,
}

/// 原始包络（绝对极值计算输入）
#[derive(Debug, Clone, PartialEq)]
pub struct DriftEnvelopeRow {
    pub story_id: i64,
    pub load_case_id: i64,
    pub direction: String,
    pub drift: f64,
    pub max_drift: Option<f64>,
    pub min_drift: Option<f64>,
}

pub struct FactRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FactRepository {
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

    /// 删除某 (结果集, 类别, 工况) 的已有事实记录
    ///
    /// 工况按名称匹配, 不存在时无操作
    pub fn delete_for_load_case_tx(
        conn: &Connection,
        project_id: i64,
        result_set_id: i64,
        category: ResultCategory,
        load_case: &str,
    ) -> RepositoryResult<usize> {
        let lc_filter = "load_case_id IN (SELECT id FROM load_cases WHERE project_id = ?2 AND name = ?3)";
        let deleted = match category.descriptor().fact_table {
            FactTable::StoryDrifts => conn.execute(
                &format!("DELETE FROM story_drifts WHERE result_set_id = ?1 AND {}", lc_filter),
                params![result_set_id, project_id, load_case],
            )?,
            FactTable::ColumnAxials => conn.execute(
                &format!("DELETE FROM column_axials WHERE result_set_id = ?1 AND {}", lc_filter),
                params![result_set_id, project_id, load_case],
            )?,
            FactTable::StoryResults => conn.execute(
                &format!(
                    "DELETE FROM story_results WHERE result_set_id = ?1 AND {} AND category = ?4",
                    lc_filter
                ),
                params![result_set_id, project_id, load_case, category.as_str()],
            )?,
            FactTable::ElementResults => conn.execute(
                &format!(
                    "DELETE FROM element_results WHERE result_set_id = ?1 AND {} AND category = ?4",
                    lc_filter
                ),
                params![result_set_id, project_id, load_case, category.as_str()],
            )?,
        };
        Ok(deleted)
    }

    /// 写入一条事实记录（按类别落到对应表）
    pub fn insert_fact_tx(
        conn: &Connection,
        keys: &FactKeys,
        fact: &FactRecord,
        source_file: &str,
    ) -> RepositoryResult<()> {
        let table = fact.category.descriptor().fact_table;
        let element_id = || {
            keys.element_id.ok_or_else(|| RepositoryError::FieldValueError {
                field: "element_id".to_string(),
                message: format!("{} 记录缺少构件", fact.category),
            })
        };

        match table {
            FactTable::StoryDrifts => {
                conn.execute(
                    r#"
                    INSERT INTO story_drifts (
                        project_id, result_set_id, story_id, load_case_id,
                        direction, drift, max_drift, min_drift, story_sort_order, source_file
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                    params![
                        keys.project_id,
                        keys.result_set_id,
                        keys.story_id,
                        keys.load_case_id,
                        fact.direction,
                        fact.value,
                        fact.max_value,
                        fact.min_value,
                        fact.story_sort_order,
                        source_file,
                    ],
                )?;
            }
            FactTable::StoryResults => {
                conn.execute(
                    r#"
                    INSERT INTO story_results (
                        project_id, result_set_id, category, result_type, story_id, load_case_id,
                        direction, value, max_value, min_value, story_sort_order, source_file
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                    params![
                        keys.project_id,
                        keys.result_set_id,
                        fact.category.as_str(),
                        fact.result_type,
                        keys.story_id,
                        keys.load_case_id,
                        fact.direction,
                        fact.value,
                        fact.max_value,
                        fact.min_value,
                        fact.story_sort_order,
                        source_file,
                    ],
                )?;
            }
            FactTable::ElementResults => {
                conn.execute(
                    r#"
                    INSERT INTO element_results (
                        project_id, result_set_id, category, result_type, element_id, story_id,
                        load_case_id, direction, value, max_value, min_value, story_sort_order,
                        source_file
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                    params![
                        keys.project_id,
                        keys.result_set_id,
                        fact.category.as_str(),
                        fact.result_type,
                        element_id()?,
                        keys.story_id,
                        keys.load_case_id,
                        fact.direction,
                        fact.value,
                        fact.max_value,
                        fact.min_value,
                        fact.story_sort_order,
                        source_file,
                    ],
                )?;
            }
            FactTable::ColumnAxials => {
                conn.execute(
                    r#"
                    INSERT INTO column_axials (
                        project_id, result_set_id, element_id, story_id, load_case_id,
                        min_axial, story_sort_order, source_file
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        keys.project_id,
                        keys.result_set_id,
                        element_id()?,
                        keys.story_id,
                        keys.load_case_id,
                        fact.value,
                        fact.story_sort_order,
                        source_file,
                    ],
                )?;
            }
        }
        Ok(())
    }

    // ==========================================
    // 读取
    // ==========================================

    /// 缓存合成输入: 某类别在结果集内的全部事实记录（写入顺序）
    pub fn list_cache_source_rows_tx(
        conn: &Connection,
        result_set_id: i64,
        category: ResultCategory,
    ) -> RepositoryResult<Vec<CacheSourceRow>> {
        let (sql, with_category) = match category.descriptor().fact_table {
            FactTable::StoryDrifts => (
                r#"
                SELECT 'Drifts', f.story_id, NULL, lc.name, f.direction, f.drift, f.story_sort_order
                FROM story_drifts f JOIN load_cases lc ON lc.id = f.load_case_id
                WHERE f.result_set_id = ?1
                ORDER BY f.id
                "#,
                false,
            ),
            FactTable::StoryResults => (
                r#"
                SELECT f.result_type, f.story_id, NULL, lc.name, f.direction, f.value, f.story_sort_order
                FROM story_results f JOIN load_cases lc ON lc.id = f.load_case_id
                WHERE f.result_set_id = ?1 AND f.category = ?2
                ORDER BY f.id
                "#,
                true,
            ),
            FactTable::ElementResults => (
                r#"
                SELECT f.result_type, f.story_id, f.element_id, lc.name, f.direction, f.value, f.story_sort_order
                FROM element_results f JOIN load_cases lc ON lc.id = f.load_case_id
                WHERE f.result_set_id = ?1 AND f.category = ?2
                ORDER BY f.id
                "#,
                true,
            ),
            FactTable::ColumnAxials => (
                r#"
                SELECT 'ColumnAxials', f.story_id, f.element_id, lc.name, 'P', f.min_axial, f.story_sort_order
                FROM column_axials f JOIN load_cases lc ON lc.id = f.load_case_id
                WHERE f.result_set_id = ?1
                ORDER BY f.id
                "#,
                false,
            ),
        };

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(CacheSourceRow {
                result_type: row.get(0)?,
                story_id: row.get(1)?,
                element_id: row.get(2)?,
                load_case: row.get(3)?,
                direction: row.get(4)?,
                value: row.get(5)?,
                story_sort_order: row.get(6)?,
            })
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = if with_category {
            stmt.query_map(params![result_set_id, category.as_str()], map_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![result_set_id], map_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// 绝对极值计算输入
    pub fn list_drift_envelopes_tx(
        conn: &Connection,
        result_set_id: i64,
    ) -> RepositoryResult<Vec<DriftEnvelopeRow>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT story_id, load_case_id, direction, drift, max_drift, min_drift
            FROM story_drifts
            WHERE result_set_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map(params![result_set_id], |row| {
                Ok(DriftEnvelopeRow {
                    story_id: row.get(0)?,
                    load_case_id: row.get(1)?,
                    direction: row.get(2)?,
                    drift: row.get(3)?,
                    max_drift: row.get(4)?,
                    min_drift: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_story_drifts(&self, result_set_id: i64) -> RepositoryResult<Vec<StoryDriftRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT f.id, f.story_id, s.name, f.load_case_id, lc.name, f.direction,
                   f.drift, f.max_drift, f.min_drift, f.story_sort_order, f.source_file
            FROM story_drifts f
            JOIN stories s ON s.id = f.story_id
            JOIN load_cases lc ON lc.id = f.load_case_id
            WHERE f.result_set_id = ?1
            ORDER BY f.id
            "#,
        )?;
        let rows = stmt
            .query_map(params![result_set_id], |row| {
                Ok(StoryDriftRow {
                    id: row.get(0)?,
                    story_id: row.get(1)?,
                    story: row.get(2)?,
                    load_case_id: row.get(3)?,
                    load_case: row.get(4)?,
                    direction: row.get(5)?,
                    drift: row.get(6)?,
                    max_drift: row.get(7)?,
                    min_drift: row.get(8)?,
                    story_sort_order: row.get(9)?,
                    source_file: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 按来源文件统计某类别的事实记录数
    pub fn count_by_source_file(
        &self,
        result_set_id: i64,
        category: ResultCategory,
        source_file: &str,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = match category.descriptor().fact_table {
            FactTable::StoryDrifts => conn.query_row(
                "SELECT COUNT(*) FROM story_drifts WHERE result_set_id = ?1 AND source_file = ?2",
                params![result_set_id, source_file],
                |row| row.get(0),
            )?,
            FactTable::ColumnAxials => conn.query_row(
                "SELECT COUNT(*) FROM column_axials WHERE result_set_id = ?1 AND source_file = ?2",
                params![result_set_id, source_file],
                |row| row.get(0),
            )?,
            FactTable::StoryResults => conn.query_row(
                "SELECT COUNT(*) FROM story_results WHERE result_set_id = ?1 AND source_file = ?2 AND category = ?3",
                params![result_set_id, source_file, category.as_str()],
                |row| row.get(0),
            )?,
            FactTable::ElementResults => conn.query_row(
                "SELECT COUNT(*) FROM element_results WHERE result_set_id = ?1 AND source_file = ?2 AND category = ?3",
                params![result_set_id, source_file, category.as_str()],
                |row| row.get(0),
            )?,
        };
        Ok(count as usize)
    }

    /// 某类别在结果集内的事实记录总数
    pub fn count_for_category(
        &self,
        result_set_id: i64,
        category: ResultCategory,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(Self::list_cache_source_rows_tx(&conn, result_set_id, category)?.len())
    }
}
