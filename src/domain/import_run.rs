// ==========================================
// 结构分析结果导入系统 - 导入批次数据契约
// ==========================================
// 职责: 预扫描结果、软错误、进度回调、导入结果汇总
// 用途: 导入层产出, 调用方据此做工况选择与缓存失效
// ==========================================

use crate::domain::category::ResultCategory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ==========================================
// 进度回调
// ==========================================

/// 进度回调: (消息, 当前, 总数)
///
/// 预扫描阶段会从多个工作线程并发调用, 实现方必须线程安全
pub type ProgressCallback = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

/// 进度事件（后台导入通过 channel 推送）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    pub current: usize,
    pub total: usize,
}

// ==========================================
// SoftError - 软错误（记录并跳过, 不中断）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftError {
    pub file: String,
    pub sheet: Option<String>,
    pub message: String,
}

impl fmt::Display for SoftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "{} [{}]: {}", self.file, sheet, self.message),
            None => write!(f, "{}: {}", self.file, self.message),
        }
    }
}

// ==========================================
// 预扫描结果
// ==========================================

/// 单文件预扫描: 工作表 → 去重工况（首次出现顺序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePrescan {
    pub file_name: String,
    pub path: PathBuf,
    pub sheets: BTreeMap<String, Vec<String>>,
    pub foundation_joints: Vec<String>,
    pub errors: Vec<SoftError>,
}

impl FilePrescan {
    pub fn empty(file_name: String, path: PathBuf) -> Self {
        Self {
            file_name,
            path,
            sheets: BTreeMap::new(),
            foundation_joints: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn load_cases(&self, sheet: &str) -> &[String] {
        self.sheets.get(sheet).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// 多文件预扫描汇总（files 保持调用方传入顺序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescanResult {
    pub files: Vec<FilePrescan>,
    /// 基础节点: 跨文件去重, 保持首次出现顺序
    pub foundation_joints: Vec<String>,
}

impl PrescanResult {
    /// 所有文件、所有工作表中出现过的工况
    pub fn all_load_cases(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|f| f.sheets.values())
            .flat_map(|cases| cases.iter().cloned())
            .collect()
    }

    pub fn errors(&self) -> Vec<SoftError> {
        self.files.iter().flat_map(|f| f.errors.clone()).collect()
    }

    pub fn file(&self, file_name: &str) -> Option<&FilePrescan> {
        self.files.iter().find(|f| f.file_name == file_name)
    }
}

// ==========================================
// 导入结果汇总
// ==========================================

/// 单次导入运行结果（部分失败时也返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub run_id: String,
    pub result_set_id: i64,
    pub files_processed: usize,
    /// 类别 → 写入的事实记录数
    pub counts: BTreeMap<ResultCategory, usize>,
    /// 文件级错误, 格式 `<file>: <message>`
    pub errors: Vec<String>,
    /// 软错误（缺表、坏行、未决冲突等）
    pub warnings: Vec<String>,
    /// 至少在一个文件中未处理的类别（旧记录保留）
    pub skipped: BTreeSet<ResultCategory>,
    pub cancelled: bool,
    pub elapsed_ms: u128,
}

impl ImportOutcome {
    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }
}
