// ==========================================
// 结构分析结果导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 多工作簿工况对账导入 + 宽表缓存合成
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 类别、记录与运行数据
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 运行编排与缓存合成
pub mod engine;

// 导入层 - 工作簿读取、预扫描、对账、选择性导入
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    AnalysisType, ElementType, ExtremeSign, FactRecord, ImportOutcome, PrescanResult,
    ProgressCallback, ProgressEvent, ResultCategory,
};

pub use engine::{
    AbsMaxMinCalculator, CacheSynthesizer, CancelFlag, ImportPipeline, ImportRequest,
    ImportRunHandle, PipelineError,
};

pub use importer::{
    ConflictHandler, ConflictMap, ImportError, ImportLedger, ImportSelection, PrescanService,
    SelectiveImporter, UniversalWorkbookOpener,
};

pub use config::{ConfigManager, ImportConfigReader, ImportSettings};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "结构分析结果导入系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
