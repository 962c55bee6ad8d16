// ==========================================
// 预扫描与冲突检测集成测试
// ==========================================
// 测试范围:
// 1. CSV 工作簿目录并发预扫描: 顺序、去重、软错误
// 2. 基础节点清单跨文件合并
// 3. 冲突完整性: 仅选中工况、仅同一工作表
// ==========================================

mod test_helpers;

use result_ingest::domain::{ProgressCallback, ResultCategory};
use result_ingest::importer::{
    discover_workbooks, ConflictHandler, PrescanService, UniversalWorkbookOpener,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use test_helpers::*;

fn service(workers: usize) -> PrescanService {
    PrescanService::new(Arc::new(UniversalWorkbookOpener), workers)
}

fn selected(cases: &[&str]) -> BTreeSet<String> {
    cases.iter().map(|c| c.to_string()).collect()
}

#[tokio::test]
async fn test_prescan_keeps_file_order_and_distinct_cases() {
    let root = TempDir::new().unwrap();
    for (name, cases) in [
        ("Model_3", vec!["TH05"]),
        ("Model_1", vec!["TH01", "TH02"]),
        ("Model_2", vec!["TH02", "TH03", "TH04"]),
    ] {
        WorkbookFixture::new(root.path(), name).sheet(
            "Story Drifts",
            DRIFT_HEADER,
            &drift_rows(&["L1", "L2"], &cases, 0.001),
        );
    }

    let files = discover_workbooks(root.path()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let progress: ProgressCallback = Arc::new(move |_: &str, _: usize, _: usize| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let result = service(2).scan(&files, None, Some(progress)).await;

    let names: Vec<&str> = result.files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["Model_1", "Model_2", "Model_3"]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 每表工况去重且保持首次出现顺序
    assert_eq!(
        result.files[1].load_cases("Story Drifts"),
        &["TH02".to_string(), "TH03".to_string(), "TH04".to_string()]
    );
    assert_eq!(result.all_load_cases().len(), 5);
}

#[tokio::test]
async fn test_prescan_sheet_failure_is_soft() {
    let root = TempDir::new().unwrap();
    WorkbookFixture::new(root.path(), "Model_1")
        .sheet(
            "Story Drifts",
            DRIFT_HEADER,
            &drift_rows(&["L1"], &["TH01"], 0.001),
        )
        // 缺少 Output Case 列
        .sheet(
            "Story Forces",
            &["Story", "Location", "VX"],
            &[vec!["L1".to_string(), "Bottom".to_string(), "10".to_string()]],
        );

    let files = discover_workbooks(root.path()).unwrap();
    let result = service(4).scan(&files, None, None).await;

    let file = &result.files[0];
    assert_eq!(file.load_cases("Story Drifts"), &["TH01".to_string()]);
    assert!(!file.sheets.contains_key("Story Forces"));
    assert_eq!(file.errors.len(), 1);
    assert_eq!(file.errors[0].sheet.as_deref(), Some("Story Forces"));
    assert!(result.errors()[0].to_string().starts_with("Model_1 [Story Forces]"));
}

#[tokio::test]
async fn test_prescan_category_filter_limits_sheets() {
    let root = TempDir::new().unwrap();
    WorkbookFixture::new(root.path(), "Model_1")
        .sheet(
            "Story Drifts",
            DRIFT_HEADER,
            &drift_rows(&["L1"], &["TH01"], 0.001),
        )
        .sheet(
            "Diaphragm Accelerations",
            ACCEL_HEADER,
            &accel_rows(&["L1"], &["TH09"]),
        );

    let files = discover_workbooks(root.path()).unwrap();
    let only_drifts = [ResultCategory::StoryDrifts];
    let result = service(1).scan(&files, Some(&only_drifts), None).await;

    assert_eq!(result.files[0].sheets.len(), 1);
    assert!(!result.all_load_cases().contains("TH09"));
}

#[tokio::test]
async fn test_foundation_joints_merged_across_files() {
    let root = TempDir::new().unwrap();
    WorkbookFixture::new(root.path(), "Model_1")
        .sheet(
            "Story Drifts",
            DRIFT_HEADER,
            &drift_rows(&["L1"], &["TH01"], 0.001),
        )
        .sheet("Fou", &["Unique Name"], &foundation_rows(&["J3", "J1"]));
    WorkbookFixture::new(root.path(), "Model_2")
        .sheet("Fou", &["Unique Name"], &foundation_rows(&["J1", "J2"]));

    let files = discover_workbooks(root.path()).unwrap();
    let result = service(2).scan(&files, None, None).await;

    assert_eq!(
        result.foundation_joints,
        vec!["J3".to_string(), "J1".to_string(), "J2".to_string()]
    );
}

#[tokio::test]
async fn test_conflicts_only_for_selected_cases_within_sheet() {
    let root = TempDir::new().unwrap();
    WorkbookFixture::new(root.path(), "A").sheet(
        "Story Drifts",
        DRIFT_HEADER,
        &drift_rows(&["L1"], &["TH01", "TH02"], 0.001),
    );
    WorkbookFixture::new(root.path(), "B")
        .sheet(
            "Story Drifts",
            DRIFT_HEADER,
            &drift_rows(&["L1"], &["TH01", "TH02"], 0.001),
        )
        .sheet(
            "Diaphragm Accelerations",
            ACCEL_HEADER,
            &accel_rows(&["L1"], &["TH03"]),
        );
    WorkbookFixture::new(root.path(), "C")
        .sheet(
            "Diaphragm Accelerations",
            ACCEL_HEADER,
            &accel_rows(&["L1"], &["TH03"]),
        )
        // 同名工况出现在不同工作表, 不构成冲突
        .sheet(
            "Story Forces",
            FORCES_HEADER,
            &forces_rows(&["L1"], &["TH01"]),
        );

    let files = discover_workbooks(root.path()).unwrap();
    let prescan = service(3).scan(&files, None, None).await;

    let conflicts = ConflictHandler::detect_conflicts(&prescan.files, &selected(&["TH01", "TH03"]));

    assert_eq!(conflicts.len(), 2);
    assert_eq!(conflicts["TH01"].len(), 1);
    assert_eq!(
        conflicts["TH01"]["Story Drifts"],
        vec!["A".to_string(), "B".to_string()]
    );
    assert_eq!(
        conflicts["TH03"]["Diaphragm Accelerations"],
        vec!["B".to_string(), "C".to_string()]
    );
    // TH02 未选中
    assert!(!conflicts.contains_key("TH02"));
    assert_eq!(ConflictHandler::conflict_count(&conflicts), 2);
}
