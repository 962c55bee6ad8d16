// ==========================================
// 结构分析结果导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::AnalysisType;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管线所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 预扫描最大并发数
    ///
    /// # 默认值
    /// - 6
    async fn get_prescan_max_workers(&self) -> Result<usize, Box<dyn Error>>;

    /// 默认结果集名称
    ///
    /// # 默认值
    /// - "DES"
    async fn get_default_result_set(&self) -> Result<String, Box<dyn Error>>;

    /// 默认分析类型
    ///
    /// # 默认值
    /// - TH（时程分析）
    async fn get_default_analysis_type(&self) -> Result<AnalysisType, Box<dyn Error>>;
}
