// ==========================================
// 结构分析结果导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope, 当前只使用 scope_id='global')
// 容错: 值无法解析时回退默认值并记录 warn
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::AnalysisType;
use crate::importer::prescan::DEFAULT_PRESCAN_WORKERS;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 覆盖默认数据库路径的环境变量
pub const DB_PATH_ENV: &str = "RESULT_INGEST_DB_PATH";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_prescan_max_workers(&self) -> Result<usize, Box<dyn Error>> {
        let default = DEFAULT_PRESCAN_WORKERS.to_string();
        let value = self.get_config_or_default(config_keys::PRESCAN_MAX_WORKERS, &default)?;
        match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => {
                tracing::warn!(
                    config_key = config_keys::PRESCAN_MAX_WORKERS,
                    raw_value = %value,
                    "预扫描并发数配置无效，使用默认值"
                );
                Ok(DEFAULT_PRESCAN_WORKERS)
            }
        }
    }

    async fn get_default_result_set(&self) -> Result<String, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_RESULT_SET, "DES")?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok("DES".to_string());
        }
        Ok(trimmed.to_string())
    }

    async fn get_default_analysis_type(&self) -> Result<AnalysisType, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_ANALYSIS_TYPE, "TH")?;
        Ok(AnalysisType::parse(&value))
    }
}

// ==========================================
// ImportSettings - 导入运行参数快照
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub prescan_max_workers: usize,
    pub default_result_set: String,
    pub default_analysis_type: AnalysisType,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            prescan_max_workers: DEFAULT_PRESCAN_WORKERS,
            default_result_set: "DES".to_string(),
            default_analysis_type: AnalysisType::TimeHistory,
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载
    pub async fn load(reader: &dyn ImportConfigReader) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            prescan_max_workers: reader.get_prescan_max_workers().await?,
            default_result_set: reader.get_default_result_set().await?,
            default_analysis_type: reader.get_default_analysis_type().await?,
        })
    }
}

/// 默认数据库路径
///
/// 优先级: 环境变量 RESULT_INGEST_DB_PATH > 用户数据目录 > 当前目录
pub fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    match dirs::data_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("result-ingest");
            // 目录创建失败时由后续打开数据库报错
            std::fs::create_dir_all(&dir).ok();
            dir.join("results.db")
        }
        None => PathBuf::from("./results.db"),
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const PRESCAN_MAX_WORKERS: &str = "import/prescan_max_workers";
    pub const DEFAULT_RESULT_SET: &str = "import/default_result_set";
    pub const DEFAULT_ANALYSIS_TYPE: &str = "import/default_analysis_type";
}
