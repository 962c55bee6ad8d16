// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化、CSV 工作簿夹具生成
// 夹具版式与导出文件一致: 第 0 行标题, 第 1 行表头, 第 2 行单位, 其后数据
// ==========================================

#![allow(dead_code)]

use csv::WriterBuilder;
use result_ingest::db::open_and_init;
use rusqlite::Connection;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    open_and_init(&db_path)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（已建表）
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_and_init(db_path).unwrap()))
}

// ==========================================
// CSV 工作簿夹具
// ==========================================

pub const DRIFT_HEADER: &[&str] = &[
    "Story",
    "Output Case",
    "Case Type",
    "Step Type",
    "Direction",
    "Drift",
    "Label",
];

pub const ACCEL_HEADER: &[&str] = &["Story", "Output Case", "Case Type", "Step Type", "UX", "UY"];

pub const FORCES_HEADER: &[&str] = &[
    "Story",
    "Output Case",
    "Case Type",
    "Step Type",
    "Location",
    "VX",
    "VY",
];

pub const PIER_HEADER: &[&str] = &[
    "Story",
    "Pier",
    "Output Case",
    "Case Type",
    "Step Type",
    "Location",
    "P",
    "V2",
    "V3",
];

pub const COLUMN_FORCES_HEADER: &[&str] = &[
    "Story",
    "Column",
    "Unique Name",
    "Output Case",
    "Case Type",
    "Step Type",
    "Station",
    "P",
    "V2",
    "V3",
];

pub const JOINT_HEADER: &[&str] = &[
    "Story",
    "Label",
    "Unique Name",
    "Output Case",
    "Case Type",
    "Step Type",
    "Ux",
    "Uy",
    "Uz",
];

/// CSV 工作簿目录构建器
pub struct WorkbookFixture {
    dir: PathBuf,
}

impl WorkbookFixture {
    pub fn new(root: &Path, name: &str) -> Self {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    /// 写入一张导出版式的工作表
    pub fn sheet(self, sheet: &str, header: &[&str], rows: &[Vec<String>]) -> Self {
        let path = self.dir.join(format!("{}.csv", sheet));
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .unwrap();

        writer
            .write_record([format!("TABLE:  {}", sheet)])
            .unwrap();
        writer.write_record(header).unwrap();
        writer
            .write_record(header.iter().map(|_| ""))
            .unwrap();
        for row in rows {
            writer.write_record(row).unwrap();
        }
        writer.flush().unwrap();
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.clone()
    }
}

fn cells(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Story Drifts 行: 每 (工况, 楼层, 方向) 一对 Max/Min
///
/// max = base * (楼层序 + 1), min = -max / 2
pub fn drift_rows(stories: &[&str], cases: &[&str], base: f64) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for case in cases {
        for (i, story) in stories.iter().enumerate() {
            for dir in ["X", "Y"] {
                let max = base * (i as f64 + 1.0);
                let min = -max / 2.0;
                rows.push(cells(&[story, case, "LinModHist", "Max", dir, &max.to_string(), "1"]));
                rows.push(cells(&[story, case, "LinModHist", "Min", dir, &min.to_string(), "1"]));
            }
        }
    }
    rows
}

/// 单行 drift 包络（指定 max/min）
pub fn drift_pair(story: &str, case: &str, dir: &str, max: f64, min: f64) -> Vec<Vec<String>> {
    vec![
        cells(&[story, case, "LinModHist", "Max", dir, &max.to_string(), "1"]),
        cells(&[story, case, "LinModHist", "Min", dir, &min.to_string(), "1"]),
    ]
}

/// Diaphragm Accelerations 行
pub fn accel_rows(stories: &[&str], cases: &[&str]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for case in cases {
        for story in stories {
            rows.push(cells(&[story, case, "LinModHist", "Max", "0.3", "0.2"]));
            rows.push(cells(&[story, case, "LinModHist", "Min", "-0.4", "-0.1"]));
        }
    }
    rows
}

/// Story Forces 行（Top / Bottom 各一对）
pub fn forces_rows(stories: &[&str], cases: &[&str]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for case in cases {
        for story in stories {
            rows.push(cells(&[story, case, "LinModHist", "Max", "Top", "900", "800"]));
            rows.push(cells(&[story, case, "LinModHist", "Max", "Bottom", "1200", "1100"]));
            rows.push(cells(&[story, case, "LinModHist", "Min", "Bottom", "-1500", "-1000"]));
        }
    }
    rows
}

/// Pier Forces 行
pub fn pier_rows(piers: &[&str], stories: &[&str], cases: &[&str]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for case in cases {
        for pier in piers {
            for story in stories {
                rows.push(cells(&[story, pier, case, "LinModHist", "Max", "Bottom", "-10", "500", "40"]));
                rows.push(cells(&[story, pier, case, "LinModHist", "Min", "Bottom", "-30", "-650", "-20"]));
            }
        }
    }
    rows
}

/// Element Forces - Columns 行
pub fn column_rows(columns: &[(&str, &str)], stories: &[&str], cases: &[&str]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for case in cases {
        for (label, unique) in columns {
            for story in stories {
                rows.push(cells(&[story, label, unique, case, "LinModHist", "Max", "0", "-100", "12", "3"]));
                rows.push(cells(&[story, label, unique, case, "LinModHist", "Min", "0", "-250", "-15", "-2"]));
            }
        }
    }
    rows
}

/// Joint Displacements 行
pub fn joint_rows(joints: &[(&str, &str)], story: &str, cases: &[&str]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for case in cases {
        for (label, unique) in joints {
            rows.push(cells(&[story, label, unique, case, "LinModHist", "Max", "0", "0", "0.001"]));
            rows.push(cells(&[story, label, unique, case, "LinModHist", "Min", "0", "0", "-0.004"]));
        }
    }
    rows
}

/// Fou 工作表行（基础节点清单）
pub fn foundation_rows(joints: &[&str]) -> Vec<Vec<String>> {
    joints.iter().map(|j| cells(&[j])).collect()
}
