// ==========================================
// 结构分析结果导入系统 - 选择性导入器
// ==========================================
// 职责: 单文件导入
// 流程:
// 1. 计划: 每个工作表允许导入的工况（选择 ∩ 可用 − 已导入 − 被裁走）
// 2. 读取 + 变换: 同一工作表只读一次, 供共享该表的全部类别使用;
//    共享表缺少某类别独有的列时, 仅该类别跳过
// 3. 落库: 单文件一个事务（先删同工况旧记录, 再写入; 跳过的类别不删）
// 4. 成功提交后更新已导入累加器; 失败回滚并记为文件级错误
// ==========================================

use crate::domain::category::{categories_for_sheet, sheets_for, ResultCategory, EXPORT_SKIP_ROWS};
use crate::domain::import_run::FilePrescan;
use crate::domain::records::{ElementKey, FactRecord};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::selection::{ImportLedger, ImportSelection};
use crate::importer::transform::{transform, TransformContext};
use crate::importer::workbook::WorkbookOpener;
use crate::repository::fact_repo::{FactKeys, FactRepository};
use crate::repository::reference_repo::ReferenceRepository;
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// (工作表, 允许导入的工况), 按 `ResultCategory::ALL` 顺序排列
///
/// 首个写入某楼层的工作表决定其排序, 因此顺序必须稳定
pub type ImportPlan = Vec<(&'static str, BTreeSet<String>)>;

/// 单文件导入的运行上下文
pub struct FileImportContext<'a> {
    pub project_id: i64,
    pub result_set_id: i64,
    pub categories: &'a [ResultCategory],
    pub selection: &'a ImportSelection,
    pub foundation_joints: &'a HashSet<String>,
}

/// 单文件导入结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileImportReport {
    pub file_name: String,
    pub counts: BTreeMap<ResultCategory, usize>,
    /// 实际导入的 (工作表 → 工况)
    pub imported: BTreeMap<String, BTreeSet<String>>,
    pub warnings: Vec<String>,
    /// 未处理的类别（缺少基础节点清单或独有列）; 其旧记录保留
    pub skipped: Vec<ResultCategory>,
    /// 文件级错误: `<file>: <message>`
    pub error: Option<String>,
}

impl FileImportReport {
    pub fn records(&self) -> usize {
        self.counts.values().sum()
    }
}

/// 计算某文件每个工作表允许导入的工况
pub fn plan_file(
    file: &FilePrescan,
    categories: &[ResultCategory],
    selection: &ImportSelection,
    ledger: &ImportLedger,
) -> ImportPlan {
    let ordered: Vec<ResultCategory> = ResultCategory::ALL
        .iter()
        .copied()
        .filter(|c| categories.contains(c))
        .collect();

    let mut plan = ImportPlan::new();
    for sheet in sheets_for(&ordered) {
        let available = file.load_cases(sheet);
        if available.is_empty() {
            continue;
        }

        let away = selection.resolved_away(sheet, &file.file_name, available);
        if !away.is_empty() {
            debug!(file = %file.file_name, sheet = sheet, cases = ?away, "工况已裁决给其他文件或跳过");
        }

        let allowed = selection.allowed_load_cases(sheet, &file.file_name, available, ledger);
        if !allowed.is_empty() {
            plan.push((sheet, allowed));
        }
    }
    plan
}

/// 一个类别的变换结果（待落库）
struct CategoryBatch<'p> {
    category: ResultCategory,
    load_cases: &'p BTreeSet<String>,
    facts: Vec<FactRecord>,
}

/// 单文件内的主键缓存
#[derive(Default)]
struct IdCache {
    stories: HashMap<String, i64>,
    load_cases: HashMap<String, i64>,
    elements: HashMap<ElementKey, i64>,
}

impl IdCache {
    fn story(&mut self, conn: &Connection, project_id: i64, name: &str, sort_order: i64) -> ImportResult<i64> {
        if let Some(&id) = self.stories.get(name) {
            return Ok(id);
        }
        let id = ReferenceRepository::get_or_create_story_tx(conn, project_id, name, sort_order)?;
        self.stories.insert(name.to_string(), id);
        Ok(id)
    }

    fn load_case(&mut self, conn: &Connection, project_id: i64, name: &str) -> ImportResult<i64> {
        if let Some(&id) = self.load_cases.get(name) {
            return Ok(id);
        }
        let id = ReferenceRepository::get_or_create_load_case_tx(conn, project_id, name)?;
        self.load_cases.insert(name.to_string(), id);
        Ok(id)
    }

    fn element(&mut self, conn: &Connection, project_id: i64, key: &ElementKey) -> ImportResult<i64> {
        if let Some(&id) = self.elements.get(key) {
            return Ok(id);
        }
        let id = ReferenceRepository::get_or_create_element_tx(conn, project_id, key)?;
        self.elements.insert(key.clone(), id);
        Ok(id)
    }
}

// ==========================================
// SelectiveImporter
// ==========================================
pub struct SelectiveImporter {
    conn: Arc<Mutex<Connection>>,
    opener: Arc<dyn WorkbookOpener>,
}

impl SelectiveImporter {
    pub fn new(conn: Arc<Mutex<Connection>>, opener: Arc<dyn WorkbookOpener>) -> Self {
        Self { conn, opener }
    }

    /// 导入单个文件
    ///
    /// # 参数
    /// - file: 预扫描结果（含路径与各工作表工况）
    /// - ctx: 运行上下文
    /// - ledger: 前序文件已导入的 (工作表, 工况)
    ///
    /// # 返回
    /// - 更新后的累加器（失败时原样返回）
    /// - 本文件导入报告
    #[instrument(skip_all, fields(file = %file.file_name))]
    pub fn import_file(
        &self,
        file: &FilePrescan,
        ctx: &FileImportContext,
        ledger: ImportLedger,
    ) -> (ImportLedger, FileImportReport) {
        let mut report = FileImportReport {
            file_name: file.file_name.clone(),
            ..Default::default()
        };

        let plan = plan_file(file, ctx.categories, ctx.selection, &ledger);
        if plan.is_empty() {
            info!("无可导入工况, 跳过文件");
            return (ledger, report);
        }

        let mut skipped = Vec::new();
        let result = self
            .extract(file, ctx, &plan, &mut report.warnings, &mut skipped)
            .and_then(|batches| self.persist(ctx, &file.file_name, batches));

        match result {
            Ok(counts) => {
                report.counts = counts;
                report.skipped = skipped;
                report.imported = plan
                    .iter()
                    .map(|(sheet, cases)| (sheet.to_string(), cases.clone()))
                    .collect();
                let ledger = plan.into_iter().fold(ledger, |acc, (sheet, cases)| {
                    acc.with_imported(sheet, cases)
                });
                info!(records = report.records(), "文件导入完成");
                (ledger, report)
            }
            Err(e) => {
                warn!(error = %e, "文件导入失败, 已回滚");
                report.error = Some(format!("{}: {}", file.file_name, e));
                (ledger, report)
            }
        }
    }

    /// 读取并变换计划内的工作表
    ///
    /// 共享工作表先按全部类别的列并集读取一次; 并集缺列时逐类别重读,
    /// 缺列的类别记为跳过, 其余类别照常导入. 整表无一类别可读时仍为文件级错误
    fn extract<'p>(
        &self,
        file: &FilePrescan,
        ctx: &FileImportContext,
        plan: &'p ImportPlan,
        warnings: &mut Vec<String>,
        skipped: &mut Vec<ResultCategory>,
    ) -> ImportResult<Vec<CategoryBatch<'p>>> {
        let mut workbook = self.opener.open(&file.path)?;
        let mut batches = Vec::new();

        for (sheet, allowed) in plan {
            let categories = categories_for_sheet(ctx.categories, sheet);

            let mut columns: Vec<&str> = Vec::new();
            for category in &categories {
                for column in category.descriptor().required_columns() {
                    if !columns.contains(&column) {
                        columns.push(column);
                    }
                }
            }

            let shared = match workbook.read(sheet, &columns, EXPORT_SKIP_ROWS) {
                Ok(table) => Some(table),
                Err(ImportError::ColumnMissing { column, .. }) if categories.len() > 1 => {
                    debug!(sheet = *sheet, column = %column, "共享工作表缺列, 逐类别读取");
                    None
                }
                Err(e) => return Err(e),
            };

            let tctx = TransformContext {
                allowed,
                foundation_joints: ctx.foundation_joints,
            };
            let mut missing: Option<ImportError> = None;
            let mut read_any = false;

            for category in categories {
                let own;
                let table = match &shared {
                    Some(table) => table,
                    None => {
                        let columns = category.descriptor().required_columns();
                        match workbook.read(sheet, &columns, EXPORT_SKIP_ROWS) {
                            Ok(table) => {
                                own = table;
                                &own
                            }
                            Err(e @ ImportError::ColumnMissing { .. }) => {
                                warn!(sheet = *sheet, category = %category, error = %e, "类别缺列, 跳过");
                                warnings.push(format!("{}: {}, 跳过 {}", file.file_name, e, category));
                                skipped.push(category);
                                missing.get_or_insert(e);
                                continue;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                };
                read_any = true;

                let output = transform(category, table, &tctx)?;
                debug!(
                    sheet = *sheet,
                    category = %category,
                    facts = output.facts.len(),
                    warnings = output.warnings.len(),
                    skipped = output.skipped,
                    "类别变换完成"
                );
                warnings.extend(
                    output
                        .warnings
                        .into_iter()
                        .map(|w| format!("{}: {}", file.file_name, w)),
                );
                if output.skipped {
                    skipped.push(category);
                    continue;
                }
                batches.push(CategoryBatch {
                    category,
                    load_cases: allowed,
                    facts: output.facts,
                });
            }

            if !read_any {
                if let Some(e) = missing {
                    return Err(e);
                }
            }
        }

        Ok(batches)
    }

    /// 单事务落库
    fn persist(
        &self,
        ctx: &FileImportContext,
        file_name: &str,
        batches: Vec<CategoryBatch<'_>>,
    ) -> ImportResult<BTreeMap<ResultCategory, usize>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::LockError(e.to_string()))?;
        let tx = conn.unchecked_transaction()?;

        let mut ids = IdCache::default();
        let mut counts = BTreeMap::new();

        for batch in batches {
            for load_case in batch.load_cases {
                FactRepository::delete_for_load_case_tx(
                    &tx,
                    ctx.project_id,
                    ctx.result_set_id,
                    batch.category,
                    load_case,
                )?;
            }

            for fact in &batch.facts {
                let keys = FactKeys {
                    project_id: ctx.project_id,
                    result_set_id: ctx.result_set_id,
                    story_id: ids.story(&tx, ctx.project_id, &fact.story, fact.story_sort_order)?,
                    element_id: match &fact.element {
                        Some(key) => Some(ids.element(&tx, ctx.project_id, key)?),
                        None => None,
                    },
                    load_case_id: ids.load_case(&tx, ctx.project_id, &fact.load_case)?,
                };
                FactRepository::insert_fact_tx(&tx, &keys, fact, file_name)?;
            }

            if !batch.facts.is_empty() {
                *counts.entry(batch.category).or_insert(0) += batch.facts.len();
            }
        }

        tx.commit()?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn prescan(name: &str, sheets: &[(&str, &[&str])]) -> FilePrescan {
        let mut file = FilePrescan::empty(name.to_string(), PathBuf::from(name));
        for (sheet, cases) in sheets {
            file.sheets
                .insert(sheet.to_string(), cases.iter().map(|c| c.to_string()).collect());
        }
        file
    }

    #[test]
    fn test_plan_respects_resolution_and_ledger() {
        let file_b = prescan(
            "B",
            &[
                ("Story Drifts", &["TH01", "TH02"]),
                ("Story Forces", &["TH01"]),
            ],
        );
        let selection = ImportSelection::new(["TH01", "TH02"]).resolve("Story Drifts", "TH01", "A");
        let ledger = ImportLedger::new().with_imported("Story Drifts", vec!["TH02".to_string()]);

        let plan = plan_file(&file_b, &ResultCategory::ALL, &selection, &ledger);

        // Story Drifts: TH01 裁给 A, TH02 已导入 → 整表跳过
        assert!(!plan.iter().any(|(sheet, _)| *sheet == "Story Drifts"));
        let (_, forces) = plan
            .iter()
            .find(|(sheet, _)| *sheet == "Story Forces")
            .unwrap();
        assert!(forces.contains("TH01"));
    }

    #[test]
    fn test_plan_limited_to_categories() {
        let file = prescan(
            "A",
            &[
                ("Story Drifts", &["TH01"]),
                ("Pier Forces", &["TH01"]),
            ],
        );
        let selection = ImportSelection::new(["TH01"]);

        let plan = plan_file(
            &file,
            &[ResultCategory::WallShears],
            &selection,
            &ImportLedger::new(),
        );

        assert_eq!(plan.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec!["Pier Forces"]);
    }

    #[test]
    fn test_plan_follows_category_order() {
        let file = prescan(
            "A",
            &[
                ("Diaphragm Accelerations", &["TH01"]),
                ("Element Forces - Columns", &["TH01"]),
                ("Story Drifts", &["TH01"]),
            ],
        );
        let selection = ImportSelection::new(["TH01"]);

        // 调用方传入的类别顺序不影响处理顺序
        let plan = plan_file(
            &file,
            &[
                ResultCategory::ColumnAxials,
                ResultCategory::StoryAccelerations,
                ResultCategory::StoryDrifts,
            ],
            &selection,
            &ImportLedger::new(),
        );

        assert_eq!(
            plan.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            vec!["Story Drifts", "Diaphragm Accelerations", "Element Forces - Columns"]
        );
    }
}
