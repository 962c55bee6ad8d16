// ==========================================
// 结构分析结果导入系统 - 导入层
// ==========================================
// 职责: 源工作簿 → 归一化事实记录
// 支持: Excel (.xlsx/.xlsm/.xls), CSV 工作簿目录
// 流程: 预扫描 → 冲突检测 → 选择与裁决 → 逐文件选择性导入
// ==========================================

// 模块声明
pub mod conflict_handler;
pub mod error;
pub mod file_parser;
pub mod prescan;
pub mod selection;
pub mod selective_importer;
pub mod transform;
pub mod workbook;

// 重导出核心类型
pub use conflict_handler::{ConflictHandler, ConflictMap};
pub use error::{ImportError, ImportResult};
pub use file_parser::{discover_workbooks, workbook_name, CsvWorkbook, ExcelWorkbook, UniversalWorkbookOpener};
pub use prescan::{scan_file, PrescanService, DEFAULT_PRESCAN_WORKERS};
pub use selection::{ImportLedger, ImportSelection, Resolution};
pub use selective_importer::{plan_file, FileImportContext, FileImportReport, ImportPlan, SelectiveImporter};
pub use transform::{pick_magnitude, transform, TransformContext, TransformOutput};
pub use workbook::{distinct_values, SheetTable, WorkbookOpener, WorkbookReader};
