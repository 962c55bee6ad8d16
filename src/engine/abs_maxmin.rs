// ==========================================
// 结构分析结果导入系统 - 层间位移角绝对极值
// ==========================================
// 规则:
// - max/min 缺失时以原始值代替
// - |max| >= |min| 取 max, 否则取 min; 符号由所取原值决定（>= 0 为 positive）
// - 结果集内整体替换
// ==========================================

use crate::domain::records::AbsMaxMinRecord;
use crate::domain::types::ExtremeSign;
use crate::repository::abs_maxmin_repo::AbsMaxMinRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::fact_repo::{DriftEnvelopeRow, FactRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// 绝对极值与其符号
pub fn absolute_extreme(max: f64, min: f64) -> (f64, ExtremeSign) {
    let source = if max.abs() >= min.abs() { max } else { min };
    (source.abs(), ExtremeSign::of(source))
}

/// 由一条位移角事实记录推导绝对极值记录
pub fn derive_record(row: &DriftEnvelopeRow) -> AbsMaxMinRecord {
    let original_max = row.max_drift.unwrap_or(row.drift);
    let original_min = row.min_drift.unwrap_or(row.drift);
    let (absolute_max, sign) = absolute_extreme(original_max, original_min);
    AbsMaxMinRecord {
        story_id: row.story_id,
        load_case_id: row.load_case_id,
        direction: row.direction.clone(),
        absolute_max,
        sign,
        original_max,
        original_min,
    }
}

pub struct AbsMaxMinCalculator {
    conn: Arc<Mutex<Connection>>,
}

impl AbsMaxMinCalculator {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 重新计算结果集的绝对极值, 返回写入行数
    #[instrument(skip(self))]
    pub fn recompute(&self, project_id: i64, result_set_id: i64) -> RepositoryResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.unchecked_transaction()?;

        let records: Vec<AbsMaxMinRecord> =
            FactRepository::list_drift_envelopes_tx(&tx, result_set_id)?
                .iter()
                .map(derive_record)
                .collect();
        let written = AbsMaxMinRepository::replace_tx(&tx, project_id, result_set_id, &records)?;

        tx.commit()?;
        info!(rows = written, "绝对极值已重算");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(drift: f64, max: Option<f64>, min: Option<f64>) -> DriftEnvelopeRow {
        DriftEnvelopeRow {
            story_id: 1,
            load_case_id: 1,
            direction: "X".to_string(),
            drift,
            max_drift: max,
            min_drift: min,
        }
    }

    #[test]
    fn test_negative_side_wins() {
        let record = derive_record(&row(-0.006, Some(0.004), Some(-0.006)));
        assert_eq!(record.absolute_max, 0.006);
        assert_eq!(record.sign, ExtremeSign::Negative);
        assert_eq!(record.original_max, 0.004);
        assert_eq!(record.original_min, -0.006);
    }

    #[test]
    fn test_tie_prefers_max() {
        let (value, sign) = absolute_extreme(0.005, -0.005);
        assert_eq!(value, 0.005);
        assert_eq!(sign, ExtremeSign::Positive);
    }

    #[test]
    fn test_missing_envelope_defaults_to_raw() {
        let record = derive_record(&row(-0.002, None, None));
        assert_eq!(record.original_max, -0.002);
        assert_eq!(record.original_min, -0.002);
        assert_eq!(record.absolute_max, 0.002);
        assert_eq!(record.sign, ExtremeSign::Negative);
    }
}
