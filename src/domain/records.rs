// ==========================================
// 结构分析结果导入系统 - 持久化实体与记录
// ==========================================
// 职责: 参考数据（项目/结果集/楼层/工况/构件）、事实记录、宽表缓存、绝对极值
// 生命周期: 参考数据只增不删（项目级联删除除外）; 事实与缓存按导入批次重建
// ==========================================

use crate::domain::category::ResultCategory;
use crate::domain::types::{AnalysisType, ElementType, ExtremeSign};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// 参考数据
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

/// 结果集: 一次命名的分析运行（如 DES / MCE）, (project, name) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub analysis_type: AnalysisType,
}

/// 楼层: sort_order 仅在首次创建时写入, 之后的导入不会覆盖
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCase {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: i64,
    pub project_id: i64,
    pub element_type: ElementType,
    pub name: String,
    pub unique_name: String,
}

// ==========================================
// 事实记录（变换输出, 尚未解析实体 ID）
// ==========================================

/// 构件引用: 身份 = (element_type, unique_name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementKey {
    pub element_type: ElementType,
    pub name: String,
    pub unique_name: String,
}

/// 归一化事实记录
///
/// - `value`: 代表值（包络类别为绝对值较大的一侧, 轴力为最小值）
/// - `max_value` / `min_value`: 保留原始包络, 供绝对极值计算
/// - `story_sort_order`: 该记录来源工作表内的楼层顺序（与楼层规范顺序相互独立）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub category: ResultCategory,
    pub story: String,
    pub element: Option<ElementKey>,
    pub load_case: String,
    pub direction: String,
    pub result_type: String,
    pub value: f64,
    pub max_value: Option<f64>,
    pub min_value: Option<f64>,
    pub story_sort_order: i64,
}

// ==========================================
// 已落库事实（读侧视图）
// ==========================================

/// 层间位移角事实行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDriftRow {
    pub id: i64,
    pub story_id: i64,
    pub story: String,
    pub load_case_id: i64,
    pub load_case: String,
    pub direction: String,
    pub drift: f64,
    pub max_drift: Option<f64>,
    pub min_drift: Option<f64>,
    pub story_sort_order: i64,
    pub source_file: String,
}

/// 缓存合成所需的事实投影（按写入顺序读取）
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSourceRow {
    pub result_type: String,
    pub story_id: i64,
    pub element_id: Option<i64>,
    pub load_case: String,
    pub direction: String,
    pub value: f64,
    pub story_sort_order: i64,
}

// ==========================================
// 宽表缓存
// ==========================================

/// 载荷: 工况键 → 数值（BTreeMap 保证序列化稳定）
pub type ResultsMatrix = BTreeMap<String, f64>;

/// 全局（楼层级）宽表缓存行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalCacheEntry {
    pub id: i64,
    pub result_set_id: i64,
    pub result_type: String,
    pub story_id: i64,
    pub story_sort_order: i64,
    pub results_matrix: ResultsMatrix,
}

/// 构件级宽表缓存行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCacheEntry {
    pub id: i64,
    pub result_set_id: i64,
    pub result_type: String,
    pub element_id: i64,
    pub story_id: i64,
    pub story_sort_order: i64,
    pub results_matrix: ResultsMatrix,
}

// ==========================================
// 绝对极值记录
// ==========================================

/// 层间位移角绝对极值: 每个 (楼层, 工况, 方向) 一行, 按结果集整体替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsMaxMinRecord {
    pub story_id: i64,
    pub load_case_id: i64,
    pub direction: String,
    pub absolute_max: f64,
    pub sign: ExtremeSign,
    pub original_max: f64,
    pub original_min: f64,
}
