// ==========================================
// 结构分析结果导入系统 - 导入管线编排
// ==========================================
// 流程: 预扫描（并发）→ 冲突检测 → 调用方裁决 → 逐文件选择性导入（顺序）
//       → 宽表缓存合成（每次运行一次）→ 绝对极值重算 → 审计记录
// 并发: 仅预扫描阶段并发; 其余阶段在单个后台工作线程上顺序执行
// 取消: 文件之间检查, 已提交的文件仍会进入缓存合成
// ==========================================

use crate::config::ImportSettings;
use crate::domain::category::ResultCategory;
use crate::domain::import_run::{ImportOutcome, PrescanResult, ProgressCallback, ProgressEvent};
use crate::domain::types::AnalysisType;
use crate::engine::abs_maxmin::AbsMaxMinCalculator;
use crate::engine::cache_synthesizer::CacheSynthesizer;
use crate::importer::conflict_handler::{ConflictHandler, ConflictMap};
use crate::importer::error::ImportError;
use crate::importer::file_parser::{discover_workbooks, workbook_name, UniversalWorkbookOpener};
use crate::importer::prescan::PrescanService;
use crate::importer::selection::{ImportLedger, ImportSelection};
use crate::importer::selective_importer::{FileImportContext, SelectiveImporter};
use crate::importer::workbook::WorkbookOpener;
use crate::repository::error::RepositoryError;
use crate::repository::import_run_repo::{ImportRunEntity, ImportRunRepository};
use crate::repository::reference_repo::ReferenceRepository;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

// ==========================================
// PipelineError - 运行级致命错误
// ==========================================
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("未找到可导入的工作簿")]
    NoFiles,

    #[error("预扫描未发现任何工况")]
    NoLoadCases,

    #[error("缓存重建失败 (result_set_id={result_set_id}): {message}")]
    CacheRebuild { result_set_id: i64, message: String },

    #[error("存储错误: {0}")]
    Store(#[from] RepositoryError),

    #[error("导入错误: {0}")]
    Import(#[from] ImportError),

    #[error("后台任务异常: {0}")]
    Worker(String),
}

// ==========================================
// ImportRequest - 一次导入运行的输入
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub project: String,
    pub result_set: String,
    pub analysis_type: AnalysisType,
    pub categories: Vec<ResultCategory>,
    /// 预扫描结果; files 顺序即导入顺序
    pub prescan: PrescanResult,
    pub selection: ImportSelection,
}

// ==========================================
// CancelFlag - 协作式取消
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 后台运行句柄
pub struct ImportRunHandle {
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
    pub cancel: CancelFlag,
    pub join: JoinHandle<Result<ImportOutcome, PipelineError>>,
}

impl ImportRunHandle {
    /// 消费进度事件直到运行结束
    pub async fn finish<F>(mut self, mut on_progress: F) -> Result<ImportOutcome, PipelineError>
    where
        F: FnMut(ProgressEvent),
    {
        while let Some(event) = self.progress.recv().await {
            on_progress(event);
        }
        self.join
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?
    }
}

// ==========================================
// ImportPipeline
// ==========================================
pub struct ImportPipeline {
    conn: Arc<Mutex<Connection>>,
    settings: ImportSettings,
    opener: Arc<dyn WorkbookOpener>,
}

impl ImportPipeline {
    /// # 参数
    /// - conn: 存储句柄（一次运行内独占）
    /// - settings: 导入配置快照
    pub fn new(conn: Arc<Mutex<Connection>>, settings: ImportSettings) -> Self {
        Self {
            conn,
            settings,
            opener: Arc::new(UniversalWorkbookOpener),
        }
    }

    /// 替换工作簿打开器
    pub fn with_opener(mut self, opener: Arc<dyn WorkbookOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// 预扫描（并发, 最多 prescan_max_workers 个文件同时扫描）
    pub async fn prescan(
        &self,
        files: &[PathBuf],
        categories: Option<&[ResultCategory]>,
        progress: Option<ProgressCallback>,
    ) -> PrescanResult {
        PrescanService::new(self.opener.clone(), self.settings.prescan_max_workers)
            .scan(files, categories, progress)
            .await
    }

    pub fn detect_conflicts(&self, prescan: &PrescanResult, selected: &BTreeSet<String>) -> ConflictMap {
        ConflictHandler::detect_conflicts(&prescan.files, selected)
    }

    /// 执行一次导入运行（同步, 应在后台工作线程调用）
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 运行摘要（即使部分文件失败）
    /// - Err(PipelineError): 无文件 / 无工况 / 缓存重建失败 / 存储不可用
    #[instrument(skip_all, fields(project = %request.project, result_set = %request.result_set))]
    pub fn run(
        &self,
        request: &ImportRequest,
        progress: Option<ProgressCallback>,
        cancel: &CancelFlag,
    ) -> Result<ImportOutcome, PipelineError> {
        let started_at = Utc::now();
        let timer = Instant::now();

        if request.prescan.files.is_empty() {
            return Err(PipelineError::NoFiles);
        }
        if request.prescan.all_load_cases().is_empty() {
            return Err(PipelineError::NoLoadCases);
        }

        let reference = ReferenceRepository::from_connection(self.conn.clone());
        let project = reference.get_or_create_project(&request.project)?;
        let result_set =
            reference.get_or_create_result_set(project.id, &request.result_set, request.analysis_type)?;

        let report = |message: &str, current: usize, total: usize| {
            if let Some(cb) = &progress {
                cb(message, current, total);
            }
        };

        let mut outcome = ImportOutcome {
            run_id: Uuid::new_v4().to_string(),
            result_set_id: result_set.id,
            files_processed: 0,
            counts: Default::default(),
            errors: Vec::new(),
            warnings: request.prescan.errors().iter().map(|e| e.to_string()).collect(),
            skipped: Default::default(),
            cancelled: false,
            elapsed_ms: 0,
        };

        let joints: HashSet<String> = request.prescan.foundation_joints.iter().cloned().collect();
        let ctx = FileImportContext {
            project_id: project.id,
            result_set_id: result_set.id,
            categories: &request.categories,
            selection: &request.selection,
            foundation_joints: &joints,
        };
        let importer = SelectiveImporter::new(self.conn.clone(), self.opener.clone());

        // 文件数 + 缓存合成 + 绝对极值
        let total = request.prescan.files.len() + 2;
        let mut ledger = ImportLedger::new();

        for (idx, file) in request.prescan.files.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(remaining = request.prescan.files.len() - idx, "导入已取消");
                outcome.cancelled = true;
                break;
            }
            report(&format!("导入 {}", file.file_name), idx, total);

            let (next, file_report) = importer.import_file(file, &ctx, ledger);
            ledger = next;
            outcome.files_processed += 1;

            for (category, count) in file_report.counts {
                *outcome.counts.entry(category).or_insert(0) += count;
            }
            outcome.warnings.extend(file_report.warnings);
            outcome.skipped.extend(file_report.skipped);
            if let Some(error) = file_report.error {
                outcome.errors.push(error);
            }
        }

        let files_done = request.prescan.files.len();
        report("重建宽表缓存", files_done, total);
        CacheSynthesizer::new(self.conn.clone())
            .rebuild(project.id, result_set.id, &request.categories)
            .map_err(|e| PipelineError::CacheRebuild {
                result_set_id: result_set.id,
                message: e.to_string(),
            })?;

        if request.categories.contains(&ResultCategory::StoryDrifts) {
            report("计算位移角绝对极值", files_done + 1, total);
            AbsMaxMinCalculator::new(self.conn.clone())
                .recompute(project.id, result_set.id)
                .map_err(|e| PipelineError::CacheRebuild {
                    result_set_id: result_set.id,
                    message: e.to_string(),
                })?;
        }

        outcome.elapsed_ms = timer.elapsed().as_millis();
        self.record_run(request, project.id, &outcome, started_at);
        report("导入完成", total, total);

        info!(
            run_id = %outcome.run_id,
            files = outcome.files_processed,
            records = outcome.total_records(),
            errors = outcome.errors.len(),
            warnings = outcome.warnings.len(),
            cancelled = outcome.cancelled,
            elapsed_ms = outcome.elapsed_ms as u64,
            "导入运行结束"
        );
        Ok(outcome)
    }

    /// 写审计记录; 失败只记日志, 不影响运行结果
    fn record_run(
        &self,
        request: &ImportRequest,
        project_id: i64,
        outcome: &ImportOutcome,
        started_at: chrono::DateTime<Utc>,
    ) {
        let entity = ImportRunEntity {
            id: outcome.run_id.clone(),
            project_id,
            result_set_id: outcome.result_set_id,
            started_at,
            finished_at: Utc::now(),
            files: request
                .prescan
                .files
                .iter()
                .map(|f| f.file_name.clone())
                .collect(),
            files_processed: outcome.files_processed,
            record_count: outcome.total_records(),
            errors: outcome.errors.clone(),
            cancelled: outcome.cancelled,
        };
        if let Err(e) = ImportRunRepository::from_connection(self.conn.clone()).insert(&entity) {
            warn!(error = %e, run_id = %outcome.run_id, "导入审计记录写入失败");
        }
    }

    /// 在后台阻塞线程上执行导入, 进度经通道回传
    ///
    /// 必须在 tokio 运行时内调用
    pub fn spawn_run(self: &Arc<Self>, request: ImportRequest) -> ImportRunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();

        let progress: ProgressCallback = Arc::new(move |message: &str, current: usize, total: usize| {
            // 接收端关闭后进度丢弃即可
            let _ = tx.send(ProgressEvent {
                message: message.to_string(),
                current,
                total,
            });
        });

        let pipeline = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let join = tokio::task::spawn_blocking(move || {
            pipeline.run(&request, Some(progress), &worker_cancel)
        });

        ImportRunHandle {
            progress: rx,
            cancel,
            join,
        }
    }

    /// 导入整个目录: 发现 → 预扫描 → 全选全部工况（冲突由排序靠前的文件胜出）→ 后台运行
    pub async fn import_folder<F>(
        self: &Arc<Self>,
        folder: &Path,
        project: &str,
        result_set: &str,
        on_progress: F,
    ) -> Result<ImportOutcome, PipelineError>
    where
        F: FnMut(ProgressEvent),
    {
        let files = discover_workbooks(folder)?;
        if files.is_empty() {
            return Err(PipelineError::NoFiles);
        }
        info!(
            folder = %folder.display(),
            files = ?files.iter().map(|p| workbook_name(p)).collect::<Vec<_>>(),
            "发现源工作簿"
        );

        let prescan = self.prescan(&files, None, None).await;
        let selection = ImportSelection::all(&prescan);
        let conflicts = self.detect_conflicts(&prescan, &selection.selected_load_cases);
        if !conflicts.is_empty() {
            info!(
                conflicts = ConflictHandler::conflict_count(&conflicts),
                "存在跨文件冲突, 由靠前文件导入"
            );
        }

        let request = ImportRequest {
            project: project.to_string(),
            result_set: result_set.to_string(),
            analysis_type: self.settings.default_analysis_type,
            categories: ResultCategory::ALL.to_vec(),
            prescan,
            selection,
        };
        self.spawn_run(request).finish(on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_run_rejects_empty_request() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        let pipeline = ImportPipeline::new(Arc::new(Mutex::new(conn)), ImportSettings::default());
        let request = ImportRequest {
            project: "P".to_string(),
            result_set: "DES".to_string(),
            analysis_type: AnalysisType::TimeHistory,
            categories: ResultCategory::ALL.to_vec(),
            prescan: PrescanResult {
                files: Vec::new(),
                foundation_joints: Vec::new(),
            },
            selection: ImportSelection::default(),
        };

        let err = pipeline.run(&request, None, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, PipelineError::NoFiles));
    }
}
