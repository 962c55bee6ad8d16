// ==========================================
// 结构分析结果导入系统 - 冲突检测
// ==========================================
// 职责: 找出同一 (工作表, 工况) 出现在多个文件中的情形
// 规则: 不同工作表之间同名工况不算冲突（各工作表是独立导入流）
// 纯函数: 不访问数据库, 不修改输入
// ==========================================

use crate::domain::import_run::FilePrescan;
use std::collections::{BTreeMap, BTreeSet};

/// 冲突表: 工况 → 工作表 → 文件名列表（按文件传入顺序）
pub type ConflictMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

pub struct ConflictHandler;

impl ConflictHandler {
    /// 检测选中工况中的跨文件冲突
    ///
    /// # 参数
    /// - files: 每文件的 工作表 → 工况 映射
    /// - selected: 选中的工况集合
    ///
    /// # 返回
    /// - 仅包含 (a) 在选中集合内, (b) 同一工作表在多个文件中出现 的工况
    pub fn detect_conflicts(files: &[FilePrescan], selected: &BTreeSet<String>) -> ConflictMap {
        // 工作表 → 工况 → 文件名
        let mut occurrences: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();

        for file in files {
            for (sheet, cases) in &file.sheets {
                let by_case = occurrences.entry(sheet.as_str()).or_default();
                for case in cases {
                    if !selected.contains(case) {
                        continue;
                    }
                    let holders = by_case.entry(case.as_str()).or_default();
                    if !holders.contains(&file.file_name.as_str()) {
                        holders.push(file.file_name.as_str());
                    }
                }
            }
        }

        let mut conflicts = ConflictMap::new();
        for (sheet, by_case) in occurrences {
            for (case, holders) in by_case {
                if holders.len() > 1 {
                    conflicts
                        .entry(case.to_string())
                        .or_default()
                        .insert(
                            sheet.to_string(),
                            holders.into_iter().map(|h| h.to_string()).collect(),
                        );
                }
            }
        }

        conflicts
    }

    /// 冲突条目总数（按 (工况, 工作表) 计）
    pub fn conflict_count(conflicts: &ConflictMap) -> usize {
        conflicts.values().map(|by_sheet| by_sheet.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(name: &str, sheets: &[(&str, &[&str])]) -> FilePrescan {
        let mut f = FilePrescan::empty(name.to_string(), PathBuf::from(name));
        for (sheet, cases) in sheets {
            f.sheets.insert(
                sheet.to_string(),
                cases.iter().map(|c| c.to_string()).collect(),
            );
        }
        f
    }

    fn selected(cases: &[&str]) -> BTreeSet<String> {
        cases.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_detect_conflicts_same_sheet_only() {
        let files = vec![
            file("A", &[("Story Drifts", &["TH01"])]),
            file("B", &[("Story Drifts", &["TH01"])]),
            file("C", &[("Story Forces", &["TH01"])]),
        ];

        let conflicts = ConflictHandler::detect_conflicts(&files, &selected(&["TH01"]));

        assert_eq!(conflicts.len(), 1);
        let by_sheet = &conflicts["TH01"];
        assert_eq!(by_sheet.len(), 1);
        assert_eq!(by_sheet["Story Drifts"], vec!["A", "B"]);
        assert!(!by_sheet.contains_key("Story Forces"));
    }

    #[test]
    fn test_detect_conflicts_ignores_unselected() {
        let files = vec![
            file("A", &[("Story Drifts", &["TH01", "TH02"])]),
            file("B", &[("Story Drifts", &["TH01", "TH02"])]),
        ];

        let conflicts = ConflictHandler::detect_conflicts(&files, &selected(&["TH02"]));

        assert_eq!(conflicts.keys().collect::<Vec<_>>(), vec!["TH02"]);
    }

    #[test]
    fn test_detect_conflicts_none() {
        let files = vec![
            file("A", &[("Story Drifts", &["TH01"])]),
            file("B", &[("Story Drifts", &["TH02"])]),
        ];

        let conflicts = ConflictHandler::detect_conflicts(&files, &selected(&["TH01", "TH02"]));
        assert!(conflicts.is_empty());
        assert_eq!(ConflictHandler::conflict_count(&conflicts), 0);
    }

    #[test]
    fn test_detect_conflicts_order_independent() {
        let a = file("A", &[("Story Drifts", &["TH01"]), ("Pier Forces", &["TH01"])]);
        let b = file("B", &[("Story Drifts", &["TH01"]), ("Pier Forces", &["TH01"])]);
        let sel = selected(&["TH01"]);

        let forward = ConflictHandler::detect_conflicts(&[a.clone(), b.clone()], &sel);
        let backward = ConflictHandler::detect_conflicts(&[b, a], &sel);

        // 冲突集合相同, 仅文件枚举顺序不同
        assert_eq!(ConflictHandler::conflict_count(&forward), 2);
        for (case, by_sheet) in &forward {
            for (sheet, holders) in by_sheet {
                let mut other = backward[case][sheet].clone();
                other.sort();
                let mut mine = holders.clone();
                mine.sort();
                assert_eq!(mine, other);
            }
        }
    }
}
