// ==========================================
// 结构分析结果导入系统 - 配置层
// ==========================================
// 职责: 导入管线配置读取
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, default_db_path, ConfigManager, ImportSettings};
pub use import_config_trait::ImportConfigReader;
