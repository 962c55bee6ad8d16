// ==========================================
// 结构分析结果导入系统 - 工作簿后端实现
// ==========================================
// 支持: Excel (.xlsx/.xlsm/.xls) / CSV 工作簿目录（每个 <工作表名>.csv 为一张表）
// 职责: 只负责单元格读取, 不做任何类别语义
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook::{SheetTable, WorkbookOpener, WorkbookReader};
use calamine::{open_workbook_auto, Reader, Sheets};
use csv::ReaderBuilder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

const EXCEL_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

/// 工作簿显示名（文件名或目录名）
pub fn workbook_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_excel_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXCEL_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

// ==========================================
// Excel 工作簿（calamine）
// ==========================================
pub struct ExcelWorkbook {
    workbook: Sheets<BufReader<File>>,
}

impl ExcelWorkbook {
    pub fn open(path: &Path) -> ImportResult<Self> {
        // 检查文件存在
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        if !is_excel_path(path) {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string();
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let workbook = open_workbook_auto(path)?;
        Ok(Self { workbook })
    }
}

impl WorkbookReader for ExcelWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    fn read(
        &mut self,
        sheet: &str,
        columns: &[&str],
        skip_rows: &[usize],
    ) -> ImportResult<SheetTable> {
        if !self.has_sheet(sheet) {
            return Err(ImportError::SheetNotFound(sheet.to_string()));
        }

        let range = self
            .workbook
            .worksheet_range(sheet)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        // 已用区域可能不从第 0 行开始, 补齐前导空行使行号保持绝对
        let row_offset = range.start().map(|(r, _)| r as usize).unwrap_or(0);
        let mut raw_rows: Vec<Vec<String>> = vec![Vec::new(); row_offset];
        for row in range.rows() {
            raw_rows.push(row.iter().map(|cell| cell.to_string()).collect());
        }

        debug!(sheet = sheet, rows = raw_rows.len(), "Excel 工作表读取完成");
        SheetTable::from_raw_rows(sheet, raw_rows, columns, skip_rows)
    }
}

// ==========================================
// CSV 工作簿目录
// ==========================================
pub struct CsvWorkbook {
    dir: PathBuf,
    sheets: Vec<String>,
}

impl CsvWorkbook {
    pub fn open(dir: &Path) -> ImportResult<Self> {
        if !dir.exists() {
            return Err(ImportError::FileNotFound(dir.display().to_string()));
        }
        if !dir.is_dir() {
            return Err(ImportError::UnsupportedFormat(dir.display().to_string()));
        }

        let mut sheets = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_csv_path(&path) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    sheets.push(stem.to_string());
                }
            }
        }
        sheets.sort();

        Ok(Self {
            dir: dir.to_path_buf(),
            sheets,
        })
    }
}

impl WorkbookReader for CsvWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.clone()
    }

    fn read(
        &mut self,
        sheet: &str,
        columns: &[&str],
        skip_rows: &[usize],
    ) -> ImportResult<SheetTable> {
        if !self.has_sheet(sheet) {
            return Err(ImportError::SheetNotFound(sheet.to_string()));
        }

        let path = self.dir.join(format!("{}.csv", sheet));
        let file = File::open(&path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 标题行/单位行长度与表头不一致
            .from_reader(file);

        let mut raw_rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            raw_rows.push(record.iter().map(|v| v.to_string()).collect());
        }

        debug!(sheet = sheet, rows = raw_rows.len(), "CSV 工作表读取完成");
        SheetTable::from_raw_rows(sheet, raw_rows, columns, skip_rows)
    }
}

// ==========================================
// 通用工作簿打开器（根据扩展名/目录自动选择）
// ==========================================
pub struct UniversalWorkbookOpener;

impl WorkbookOpener for UniversalWorkbookOpener {
    fn open(&self, path: &Path) -> ImportResult<Box<dyn WorkbookReader>> {
        if path.is_dir() {
            return Ok(Box::new(CsvWorkbook::open(path)?));
        }
        if is_excel_path(path) {
            return Ok(Box::new(ExcelWorkbook::open(path)?));
        }
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        Err(ImportError::UnsupportedFormat(ext))
    }
}

/// 发现目录下的源工作簿
///
/// - Excel 文件: .xlsx/.xlsm/.xls（跳过 Office 锁文件 `~$*`）
/// - CSV 工作簿: 至少包含一个 .csv 的子目录
///
/// 结果按名称排序, 作为后续逐文件导入的稳定顺序
pub fn discover_workbooks(folder: &Path) -> ImportResult<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(ImportError::FileNotFound(folder.display().to_string()));
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let name = workbook_name(&path);
        if name.starts_with("~$") {
            continue;
        }

        if path.is_file() && is_excel_path(&path) {
            found.push(path);
        } else if path.is_dir() {
            let has_csv = fs::read_dir(&path)?
                .filter_map(|e| e.ok())
                .any(|e| e.path().is_file() && is_csv_path(&e.path()));
            if has_csv {
                found.push(path);
            }
        }
    }

    found.sort_by_key(|p| workbook_name(p));
    Ok(found)
}
