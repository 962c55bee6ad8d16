// ==========================================
// 结构分析结果导入系统 - 领域模型层
// ==========================================
// 职责: 结果类别（封闭集合）、参考数据、事实/缓存记录、导入运行数据
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod category;
pub mod import_run;
pub mod records;
pub mod types;

// 重导出核心类型
pub use category::{
    categories_for_sheet, sheets_for, CategoryDescriptor, EntityKind, ExtremumRule, FactTable,
    ResultCategory, ValueColumn,
};
pub use import_run::{
    FilePrescan, ImportOutcome, PrescanResult, ProgressCallback, ProgressEvent, SoftError,
};
pub use records::{
    AbsMaxMinRecord, CacheSourceRow, Element, ElementCacheEntry, ElementKey, FactRecord,
    GlobalCacheEntry, LoadCase, Project, ResultSet, ResultsMatrix, Story, StoryDriftRow,
};
pub use types::{AnalysisType, ElementType, ExtremeSign};
