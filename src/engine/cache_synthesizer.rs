// ==========================================
// 结构分析结果导入系统 - 宽表缓存合成
// ==========================================
// 时机: 每次导入运行结束后执行一次（不逐文件执行）
// 规则:
// - 行键: 楼层（全局类别）或 (构件, 楼层)（构件类别）
// - 载荷键: 全局类别 `<工况>_<方向>`, 构件类别裸工况名
// - 行的 story_sort_order 取该行首条事实记录, 各类别互不影响
// - 转角类别按 cache_scale 换算为百分比
// - 已存在行原地替换, 事实已消失的行删除; 每个类别一个事务
// 幂等: 同一事实数据重复合成, 载荷逐字节一致
// ==========================================

use crate::domain::category::ResultCategory;
use crate::domain::records::{CacheSourceRow, ResultsMatrix};
use crate::repository::cache_repo::{CacheRepository, CacheRowKey};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::fact_repo::FactRepository;
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// 合成后的一行缓存
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedRow {
    pub result_type: String,
    pub story_id: i64,
    pub element_id: Option<i64>,
    pub story_sort_order: i64,
    pub matrix: ResultsMatrix,
}

impl SynthesizedRow {
    pub fn key(&self) -> CacheRowKey {
        (self.story_id, self.element_id)
    }
}

/// 由事实行构建缓存行（纯函数, 保持首次出现顺序）
pub fn build_rows(category: ResultCategory, facts: &[CacheSourceRow]) -> Vec<SynthesizedRow> {
    let scale = category.descriptor().cache_scale;
    let mut rows: Vec<SynthesizedRow> = Vec::new();
    let mut index: HashMap<(&str, i64, Option<i64>), usize> = HashMap::new();

    for fact in facts {
        let slot = *index
            .entry((fact.result_type.as_str(), fact.story_id, fact.element_id))
            .or_insert_with(|| {
                rows.push(SynthesizedRow {
                    result_type: fact.result_type.clone(),
                    story_id: fact.story_id,
                    element_id: fact.element_id,
                    story_sort_order: fact.story_sort_order,
                    matrix: ResultsMatrix::new(),
                });
                rows.len() - 1
            });
        rows[slot].matrix.insert(
            category.cache_key(&fact.load_case, &fact.direction),
            fact.value * scale,
        );
    }

    rows
}

/// 单次合成的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisReport {
    /// 类别 → 写入行数
    pub rows: BTreeMap<ResultCategory, usize>,
    /// 删除的过期行数
    pub removed: usize,
}

// ==========================================
// CacheSynthesizer
// ==========================================
pub struct CacheSynthesizer {
    conn: Arc<Mutex<Connection>>,
}

impl CacheSynthesizer {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 重建结果集内指定类别的宽表缓存
    #[instrument(skip(self, categories), fields(categories = categories.len()))]
    pub fn rebuild(
        &self,
        project_id: i64,
        result_set_id: i64,
        categories: &[ResultCategory],
    ) -> RepositoryResult<SynthesisReport> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let mut report = SynthesisReport::default();
        for &category in categories {
            let tx = conn.unchecked_transaction()?;
            let (written, removed) =
                Self::rebuild_category_tx(&tx, project_id, result_set_id, category)?;
            tx.commit()?;

            debug!(category = %category, rows = written, removed = removed, "类别缓存已重建");
            report.rows.insert(category, written);
            report.removed += removed;
        }

        info!(
            rows = report.rows.values().sum::<usize>(),
            removed = report.removed,
            "宽表缓存重建完成"
        );
        Ok(report)
    }

    fn rebuild_category_tx(
        conn: &Connection,
        project_id: i64,
        result_set_id: i64,
        category: ResultCategory,
    ) -> RepositoryResult<(usize, usize)> {
        let facts = FactRepository::list_cache_source_rows_tx(conn, result_set_id, category)?;
        let rows = build_rows(category, &facts);
        let element_scoped = !category.is_global();

        let mut keep: HashMap<&str, HashSet<CacheRowKey>> = HashMap::new();
        for row in &rows {
            match row.element_id {
                Some(element_id) if element_scoped => CacheRepository::upsert_element_tx(
                    conn,
                    project_id,
                    result_set_id,
                    &row.result_type,
                    element_id,
                    row.story_id,
                    row.story_sort_order,
                    &row.matrix,
                )?,
                _ => CacheRepository::upsert_global_tx(
                    conn,
                    project_id,
                    result_set_id,
                    &row.result_type,
                    row.story_id,
                    row.story_sort_order,
                    &row.matrix,
                )?,
            }
            keep.entry(row.result_type.as_str())
                .or_default()
                .insert(row.key());
        }

        let empty = HashSet::new();
        let mut removed = 0;
        for result_type in category.cache_result_types() {
            let kept = keep.get(result_type).unwrap_or(&empty);
            removed += CacheRepository::delete_stale_tx(
                conn,
                result_set_id,
                result_type,
                element_scoped,
                kept,
            )?;
        }

        Ok((rows.len(), removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(result_type: &str, story_id: i64, element_id: Option<i64>, lc: &str, dir: &str, value: f64, order: i64) -> CacheSourceRow {
        CacheSourceRow {
            result_type: result_type.to_string(),
            story_id,
            element_id,
            load_case: lc.to_string(),
            direction: dir.to_string(),
            value,
            story_sort_order: order,
        }
    }

    #[test]
    fn test_build_rows_global_keys() {
        let facts = vec![
            fact("Drifts", 1, None, "TH01", "X", 0.1, 0),
            fact("Drifts", 1, None, "TH01", "Y", 0.2, 0),
            fact("Drifts", 2, None, "TH01", "X", 0.3, 1),
            fact("Drifts", 1, None, "TH02", "X", 0.4, 5),
        ];

        let rows = build_rows(ResultCategory::StoryDrifts, &facts);

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].matrix.keys().cloned().collect::<Vec<_>>(),
            vec!["TH01_X", "TH01_Y", "TH02_X"]
        );
        // 行顺序取首条记录
        assert_eq!(rows[0].story_sort_order, 0);
        assert_eq!(rows[1].story_id, 2);
    }

    #[test]
    fn test_build_rows_element_bare_keys_and_scale() {
        let facts = vec![
            fact("ColumnRotations_R2", 1, Some(7), "TH01", "R2", 0.02, 0),
            fact("ColumnRotations_R3", 1, Some(7), "TH01", "R3", -0.01, 0),
        ];

        let rows = build_rows(ResultCategory::ColumnRotations, &facts);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].result_type, "ColumnRotations_R2");
        assert!((rows[0].matrix["TH01"] - 2.0).abs() < 1e-9);
        assert!((rows[1].matrix["TH01"] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_rows_deterministic() {
        let facts = vec![
            fact("Forces", 1, None, "TH02", "VX", 10.0, 0),
            fact("Forces", 1, None, "TH01", "VX", 20.0, 0),
        ];
        let a = build_rows(ResultCategory::StoryForces, &facts);
        let b = build_rows(ResultCategory::StoryForces, &facts);
        assert_eq!(
            serde_json::to_string(&a[0].matrix).unwrap(),
            serde_json::to_string(&b[0].matrix).unwrap()
        );
    }
}
