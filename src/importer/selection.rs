// ==========================================
// 结构分析结果导入系统 - 工况选择与冲突裁决
// ==========================================
// 职责: 数据契约（非 UI）: 选中哪些工况 + 每个冲突由哪个文件胜出
// 约定: resolution[sheet][case] = Some(file) → 仅该文件导入
//       resolution[sheet][case] = None       → 该工作表跳过此工况
//       无条目                               → 无冲突, 出现即导入
// ==========================================

use crate::domain::import_run::PrescanResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 工作表 → 工况 → 胜出文件（None = 跳过）
pub type Resolution = BTreeMap<String, BTreeMap<String, Option<String>>>;

// ==========================================
// ImportSelection - 选择与裁决
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSelection {
    pub selected_load_cases: BTreeSet<String>,
    pub resolution: Resolution,
}

impl ImportSelection {
    pub fn new<I, S>(cases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected_load_cases: cases.into_iter().map(Into::into).collect(),
            resolution: Resolution::new(),
        }
    }

    /// 选中预扫描发现的全部工况, 不做裁决
    pub fn all(prescan: &PrescanResult) -> Self {
        Self {
            selected_load_cases: prescan.all_load_cases(),
            resolution: Resolution::new(),
        }
    }

    /// 指定冲突胜出文件
    pub fn resolve(mut self, sheet: &str, load_case: &str, file_name: &str) -> Self {
        self.resolution
            .entry(sheet.to_string())
            .or_default()
            .insert(load_case.to_string(), Some(file_name.to_string()));
        self
    }

    /// 该工作表完全跳过此工况
    pub fn skip(mut self, sheet: &str, load_case: &str) -> Self {
        self.resolution
            .entry(sheet.to_string())
            .or_default()
            .insert(load_case.to_string(), None);
        self
    }

    pub fn is_selected(&self, load_case: &str) -> bool {
        self.selected_load_cases.contains(load_case)
    }

    /// 裁决条目: None = 无条目; Some(None) = 跳过; Some(Some(f)) = f 胜出
    pub fn resolution_for(&self, sheet: &str, load_case: &str) -> Option<Option<&str>> {
        self.resolution
            .get(sheet)
            .and_then(|by_case| by_case.get(load_case))
            .map(|winner| winner.as_deref())
    }

    /// 计算某文件某工作表允许导入的工况
    ///
    /// allowed = selected ∩ available − 已导入 − 被裁走, 且裁决条目（若有）须指向本文件
    pub fn allowed_load_cases(
        &self,
        sheet: &str,
        file_name: &str,
        available: &[String],
        ledger: &ImportLedger,
    ) -> BTreeSet<String> {
        available
            .iter()
            .filter(|case| self.is_selected(case))
            .filter(|case| !ledger.contains(sheet, case))
            .filter(|case| match self.resolution_for(sheet, case) {
                None => true,
                Some(None) => false,
                Some(Some(winner)) => winner == file_name,
            })
            .cloned()
            .collect()
    }

    /// 被裁决为跳过或指向其他文件的工况（用于日志）
    pub fn resolved_away(&self, sheet: &str, file_name: &str, available: &[String]) -> Vec<String> {
        available
            .iter()
            .filter(|case| self.is_selected(case))
            .filter(|case| match self.resolution_for(sheet, case) {
                Some(None) => true,
                Some(Some(winner)) => winner != file_name,
                None => false,
            })
            .cloned()
            .collect()
    }
}

// ==========================================
// ImportLedger - 已导入累加器
// ==========================================
// 用途: 逐文件传入并返回, 防止后续文件重复导入同一 (工作表, 工况)
// 说明: 顺序相关性在调用链上显式可见
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportLedger {
    imported: BTreeMap<String, BTreeSet<String>>,
}

impl ImportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, sheet: &str, load_case: &str) -> bool {
        self.imported
            .get(sheet)
            .map(|cases| cases.contains(load_case))
            .unwrap_or(false)
    }

    /// 记录某工作表已导入的工况, 返回新的累加器
    pub fn with_imported<I>(mut self, sheet: &str, cases: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.imported
            .entry(sheet.to_string())
            .or_default()
            .extend(cases);
        self
    }

    pub fn imported(&self, sheet: &str) -> Option<&BTreeSet<String>> {
        self.imported.get(sheet)
    }

    pub fn sheets(&self) -> impl Iterator<Item = &String> {
        self.imported.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_allowed_without_resolution() {
        let selection = ImportSelection::new(["TH01", "TH02"]);
        let ledger = ImportLedger::new();

        let allowed = selection.allowed_load_cases(
            "Story Drifts",
            "A",
            &cases(&["TH01", "TH02", "TH03"]),
            &ledger,
        );

        let expected: BTreeSet<String> = ["TH01", "TH02"].iter().map(|c| c.to_string()).collect();
        assert_eq!(allowed, expected);
    }

    #[test]
    fn test_allowed_respects_winner() {
        let selection = ImportSelection::new(["TH01", "TH02"]).resolve("Story Drifts", "TH01", "A");
        let ledger = ImportLedger::new();
        let available = cases(&["TH01", "TH02"]);

        let for_a = selection.allowed_load_cases("Story Drifts", "A", &available, &ledger);
        let for_b = selection.allowed_load_cases("Story Drifts", "B", &available, &ledger);

        assert!(for_a.contains("TH01"));
        assert!(!for_b.contains("TH01"));
        assert!(for_b.contains("TH02"));
    }

    #[test]
    fn test_allowed_skip_entry() {
        let selection = ImportSelection::new(["TH01"]).skip("Story Drifts", "TH01");
        let allowed = selection.allowed_load_cases(
            "Story Drifts",
            "A",
            &cases(&["TH01"]),
            &ImportLedger::new(),
        );
        assert!(allowed.is_empty());

        // 其他工作表不受影响
        let other = selection.allowed_load_cases(
            "Story Forces",
            "A",
            &cases(&["TH01"]),
            &ImportLedger::new(),
        );
        assert!(other.contains("TH01"));
    }

    #[test]
    fn test_allowed_excludes_already_imported() {
        let selection = ImportSelection::new(["TH01", "TH02"]);
        let ledger = ImportLedger::new().with_imported("Story Drifts", cases(&["TH01"]));

        let allowed =
            selection.allowed_load_cases("Story Drifts", "B", &cases(&["TH01", "TH02"]), &ledger);

        assert_eq!(allowed.len(), 1);
        assert!(allowed.contains("TH02"));
        assert!(ledger.contains("Story Drifts", "TH01"));
        assert!(!ledger.contains("Story Forces", "TH01"));
    }

    #[test]
    fn test_resolved_away() {
        let selection = ImportSelection::new(["TH01", "TH02", "TH03"])
            .resolve("Story Drifts", "TH01", "A")
            .skip("Story Drifts", "TH02");

        let away = selection.resolved_away("Story Drifts", "B", &cases(&["TH01", "TH02", "TH03"]));
        assert_eq!(away, cases(&["TH01", "TH02"]));
    }
}
