// ==========================================
// 结构分析结果导入系统 - 预扫描服务
// ==========================================
// 职责: 并发扫描多个工作簿, 得到 每文件 {工作表 → 去重工况} 与基础节点清单
// 并发: 有界工作池（spawn_blocking + buffer_unordered）, 文件间无共享可变状态
// 容错: 缺表不是错误; 单表读取失败记为 (文件, 工作表) 软错误, 不影响其他表/文件
// ==========================================

use crate::domain::category::{
    sheets_for, ResultCategory, EXPORT_SKIP_ROWS, FOUNDATION_JOINT_COLUMN, FOUNDATION_SHEET,
    OUTPUT_CASE_COLUMN,
};
use crate::domain::import_run::{FilePrescan, PrescanResult, ProgressCallback, SoftError};
use crate::importer::file_parser::workbook_name;
use crate::importer::workbook::{distinct_values, WorkbookOpener};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 默认最大并发扫描数
pub const DEFAULT_PRESCAN_WORKERS: usize = 6;

// ==========================================
// PrescanService - 预扫描服务
// ==========================================
pub struct PrescanService {
    opener: Arc<dyn WorkbookOpener>,
    max_workers: usize,
}

impl PrescanService {
    pub fn new(opener: Arc<dyn WorkbookOpener>, max_workers: usize) -> Self {
        Self {
            opener,
            max_workers: max_workers.max(1),
        }
    }

    /// 实际并发数 = min(max_workers, 文件数)
    pub fn worker_count(&self, file_count: usize) -> usize {
        self.max_workers.min(file_count).max(1)
    }

    /// 并发扫描文件
    ///
    /// # 参数
    /// - files: 工作簿路径（结果按此顺序返回）
    /// - categories: 允许的类别（None = 全部）
    /// - progress: 进度回调（可能被多个工作线程并发调用）
    #[instrument(skip(self, files, categories, progress), fields(files = files.len()))]
    pub async fn scan(
        &self,
        files: &[PathBuf],
        categories: Option<&[ResultCategory]>,
        progress: Option<ProgressCallback>,
    ) -> PrescanResult {
        let categories = categories.unwrap_or(&ResultCategory::ALL).to_vec();
        let total = files.len();
        let workers = self.worker_count(total);
        let done = Arc::new(AtomicUsize::new(0));

        info!(total = total, workers = workers, "开始预扫描");

        let tasks = files.iter().cloned().enumerate().map(|(idx, path)| {
            let opener = Arc::clone(&self.opener);
            let categories = categories.clone();
            let progress = progress.clone();
            let done = Arc::clone(&done);
            async move {
                let name = workbook_name(&path);
                let task_path = path.clone();
                let scanned = tokio::task::spawn_blocking(move || {
                    scan_file(opener.as_ref(), &task_path, &categories)
                })
                .await;

                let file = match scanned {
                    Ok(file) => file,
                    Err(e) => {
                        // 工作线程 panic/取消: 记为该文件的软错误
                        warn!(file = %name, error = %e, "预扫描任务异常");
                        let mut file = FilePrescan::empty(name.clone(), path);
                        file.errors.push(SoftError {
                            file: name.clone(),
                            sheet: None,
                            message: format!("预扫描任务异常: {}", e),
                        });
                        file
                    }
                };

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = &progress {
                    cb(&format!("已扫描 {}", name), current, total);
                }
                (idx, file)
            }
        });

        let mut scanned: Vec<(usize, FilePrescan)> = stream::iter(tasks)
            .buffer_unordered(workers)
            .collect()
            .await;
        scanned.sort_by_key(|(idx, _)| *idx);

        let files: Vec<FilePrescan> = scanned.into_iter().map(|(_, f)| f).collect();
        let foundation_joints = merge_foundation_joints(&files);

        info!(
            files = files.len(),
            foundation_joints = foundation_joints.len(),
            soft_errors = files.iter().map(|f| f.errors.len()).sum::<usize>(),
            "预扫描完成"
        );

        PrescanResult {
            files,
            foundation_joints,
        }
    }
}

/// 基础节点跨文件去重（按文件顺序, 首次出现优先）
fn merge_foundation_joints(files: &[FilePrescan]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut joints = Vec::new();
    for file in files {
        for joint in &file.foundation_joints {
            if seen.insert(joint.clone()) {
                joints.push(joint.clone());
            }
        }
    }
    joints
}

/// 扫描单个工作簿（同步, 在阻塞线程池中执行）
pub fn scan_file(
    opener: &dyn WorkbookOpener,
    path: &Path,
    categories: &[ResultCategory],
) -> FilePrescan {
    let name = workbook_name(path);
    let mut result = FilePrescan::empty(name.clone(), path.to_path_buf());

    let mut workbook = match opener.open(path) {
        Ok(w) => w,
        Err(e) => {
            warn!(file = %name, error = %e, "工作簿打开失败");
            result.errors.push(SoftError {
                file: name,
                sheet: None,
                message: e.to_string(),
            });
            return result;
        }
    };

    for sheet in sheets_for(categories) {
        if !workbook.has_sheet(sheet) {
            debug!(file = %name, sheet = sheet, "工作表不存在, 跳过");
            continue;
        }

        match workbook.read(sheet, &[OUTPUT_CASE_COLUMN], EXPORT_SKIP_ROWS) {
            Ok(table) => {
                let mut distinct = distinct_values(&table, &[OUTPUT_CASE_COLUMN]);
                let cases = distinct.remove(OUTPUT_CASE_COLUMN).unwrap_or_default();
                debug!(file = %name, sheet = sheet, load_cases = cases.len(), "工作表扫描完成");
                result.sheets.insert(sheet.to_string(), cases);
            }
            Err(e) => {
                warn!(file = %name, sheet = sheet, error = %e, "工作表扫描失败");
                result.errors.push(SoftError {
                    file: name.clone(),
                    sheet: Some(sheet.to_string()),
                    message: e.to_string(),
                });
            }
        }
    }

    // 基础节点清单
    if workbook.has_sheet(FOUNDATION_SHEET) {
        match workbook.read(FOUNDATION_SHEET, &[FOUNDATION_JOINT_COLUMN], EXPORT_SKIP_ROWS) {
            Ok(table) => {
                let mut distinct = distinct_values(&table, &[FOUNDATION_JOINT_COLUMN]);
                result.foundation_joints =
                    distinct.remove(FOUNDATION_JOINT_COLUMN).unwrap_or_default();
            }
            Err(e) => {
                warn!(file = %name, error = %e, "基础节点清单读取失败");
                result.errors.push(SoftError {
                    file: name.clone(),
                    sheet: Some(FOUNDATION_SHEET.to_string()),
                    message: e.to_string(),
                });
            }
        }
    }

    result
}
