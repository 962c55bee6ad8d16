// ==========================================
// 结构分析结果导入系统 - 引擎层
// ==========================================
// 职责: 导入运行编排、宽表缓存合成、绝对极值推导
// 红线: Engine 不拼 SQL（数据访问经 repository）
// ==========================================

pub mod abs_maxmin;
pub mod cache_synthesizer;
pub mod orchestrator;

// 重导出核心引擎
pub use abs_maxmin::{absolute_extreme, derive_record, AbsMaxMinCalculator};
pub use cache_synthesizer::{build_rows, CacheSynthesizer, SynthesisReport, SynthesizedRow};
pub use orchestrator::{CancelFlag, ImportPipeline, ImportRequest, ImportRunHandle, PipelineError};
