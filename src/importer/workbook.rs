// ==========================================
// 结构分析结果导入系统 - 工作簿读取接口
// ==========================================
// 职责: 定义工作簿读取接口与行式表结构（不包含具体文件格式）
// 实现者: ExcelWorkbook（calamine）/ CsvWorkbook（csv 目录）
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use std::collections::{HashMap, HashSet};
use std::path::Path;

// ==========================================
// WorkbookReader Trait
// ==========================================
// 用途: 打开后的单个工作簿, 按名称暴露工作表
pub trait WorkbookReader: Send {
    /// 工作簿内全部工作表名称
    fn sheet_names(&self) -> Vec<String>;

    /// 工作表是否存在（精确匹配）
    fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    /// 读取工作表为行式表
    ///
    /// # 参数
    /// - sheet: 工作表名称
    /// - columns: 需要的列（为空时保留全部列）
    /// - skip_rows: 需跳过的绝对行号; 剩余的第一行为表头
    ///
    /// # 返回
    /// - Err(SheetNotFound): 工作表不存在
    /// - Err(ColumnMissing): 表头缺少所需列
    fn read(&mut self, sheet: &str, columns: &[&str], skip_rows: &[usize])
        -> ImportResult<SheetTable>;
}

// ==========================================
// WorkbookOpener Trait
// ==========================================
// 用途: 按路径打开工作簿, 导入管道通过它注入不同后端
pub trait WorkbookOpener: Send + Sync {
    fn open(&self, path: &Path) -> ImportResult<Box<dyn WorkbookReader>>;
}

// ==========================================
// SheetTable - 行式表
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 每个数据行在源工作表中的行号（从 1 开始, 用于报错定位）
    pub row_numbers: Vec<usize>,
}

impl SheetTable {
    /// 从原始单元格行构建表
    ///
    /// 完全空白的数据行会被跳过; 单元格统一 trim
    pub fn from_raw_rows(
        sheet: &str,
        raw_rows: Vec<Vec<String>>,
        columns: &[&str],
        skip_rows: &[usize],
    ) -> ImportResult<Self> {
        let skip: HashSet<usize> = skip_rows.iter().copied().collect();
        let mut remaining = raw_rows
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !skip.contains(idx));

        let (_, header_row) = remaining
            .next()
            .ok_or_else(|| ImportError::HeaderMissing(sheet.to_string()))?;
        let headers: Vec<String> = header_row.iter().map(|h| h.trim().to_string()).collect();

        // 确定要投影的列
        let selected: Vec<(String, usize)> = if columns.is_empty() {
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h.clone(), i))
                .collect()
        } else {
            let mut selected = Vec::with_capacity(columns.len());
            for column in columns {
                let idx = headers.iter().position(|h| h == column).ok_or_else(|| {
                    ImportError::ColumnMissing {
                        sheet: sheet.to_string(),
                        column: column.to_string(),
                    }
                })?;
                selected.push((column.to_string(), idx));
            }
            selected
        };

        let mut rows = Vec::new();
        let mut row_numbers = Vec::new();
        for (idx, raw) in remaining {
            let row: Vec<String> = selected
                .iter()
                .map(|(_, i)| raw.get(*i).map(|v| v.trim().to_string()).unwrap_or_default())
                .collect();

            // 跳过完全空白的行
            if row.iter().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(row);
            row_numbers.push(idx + 1);
        }

        Ok(Self {
            sheet: sheet.to_string(),
            columns: selected.into_iter().map(|(name, _)| name).collect(),
            rows,
            row_numbers,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 获取列下标, 缺失即为错误
    pub fn require_column(&self, name: &str) -> ImportResult<usize> {
        self.column_index(name).ok_or_else(|| ImportError::ColumnMissing {
            sheet: self.sheet.clone(),
            column: name.to_string(),
        })
    }

    pub fn row_number(&self, row_idx: usize) -> usize {
        self.row_numbers.get(row_idx).copied().unwrap_or(row_idx + 1)
    }
}

/// 指定列的去重取值（首次出现顺序, 忽略空单元格）
///
/// 表中不存在的列返回空列表
pub fn distinct_values(table: &SheetTable, columns: &[&str]) -> HashMap<String, Vec<String>> {
    let mut result = HashMap::new();

    for column in columns {
        let mut values = Vec::new();
        if let Some(idx) = table.column_index(column) {
            let mut seen = HashSet::new();
            for row in &table.rows {
                let value = &row[idx];
                if !value.is_empty() && seen.insert(value.clone()) {
                    values.push(value.clone());
                }
            }
        }
        result.insert(column.to_string(), values);
    }

    result
}
