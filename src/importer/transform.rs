// ==========================================
// 结构分析结果导入系统 - 类别变换
// ==========================================
// 职责: 已过滤工况的工作表行 → 归一化事实记录
// 规则:
// - 包络类别: 按 (实体, 工况, 方向) 收集 Max/Min, 代表值取绝对值较大者（相等取 Max）
// - 仅最小值类别（柱轴力）: 按 (实体, 工况) 取最小值, 不计算代表值
// - 转角类别在事实层保存弧度, 百分比换算属于缓存层
// - 每条记录携带来源工作表内的楼层顺序
// 容错: 单行数值无法解析 → 软错误并跳过该行该列
// ==========================================

use crate::domain::category::{
    CategoryDescriptor, EntityKind, ExtremumRule, ResultCategory, LOCATION_COLUMN,
    OUTPUT_CASE_COLUMN, STEP_TYPE_COLUMN, STORY_COLUMN,
};
use crate::domain::records::{ElementKey, FactRecord};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::workbook::SheetTable;
use std::collections::{BTreeSet, HashMap, HashSet};

// ==========================================
// 变换上下文与输出
// ==========================================

pub struct TransformContext<'a> {
    /// 本文件本工作表允许导入的工况
    pub allowed: &'a BTreeSet<String>,
    /// 预扫描得到的基础节点（仅 foundation_only 类别使用）
    pub foundation_joints: &'a HashSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransformOutput {
    pub facts: Vec<FactRecord>,
    pub warnings: Vec<String>,
    /// 类别整体未处理（如缺少基础节点清单）; 调用方不得清理该类别的旧记录
    pub skipped: bool,
}

/// 按类别的极值规则分派变换
pub fn transform(
    category: ResultCategory,
    table: &SheetTable,
    ctx: &TransformContext,
) -> ImportResult<TransformOutput> {
    match category.descriptor().rule {
        ExtremumRule::Envelope => envelope_transform(category, table, ctx),
        ExtremumRule::MinimumOnly => minimum_transform(category, table, ctx),
    }
}

/// 代表值: 绝对值较大的一侧（相等取 max）; 只有一侧时取该侧
pub fn pick_magnitude(max: Option<f64>, min: Option<f64>) -> Option<f64> {
    match (max, min) {
        (Some(max), Some(min)) => {
            if max.abs() >= min.abs() {
                Some(max)
            } else {
                Some(min)
            }
        }
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// 工作表内楼层首次出现顺序（基于整表, 与工况过滤无关）
pub fn story_order(table: &SheetTable, story_idx: usize) -> HashMap<String, i64> {
    let mut order = HashMap::new();
    for row in &table.rows {
        let story = &row[story_idx];
        if story.is_empty() {
            continue;
        }
        let next = order.len() as i64;
        order.entry(story.clone()).or_insert(next);
    }
    order
}

// ==========================================
// 列解析
// ==========================================

struct ResolvedColumns {
    story: usize,
    load_case: usize,
    step_type: Option<usize>,
    location: Option<usize>,
    direction: Option<usize>,
    name: Option<usize>,
    unique: Option<usize>,
    values: Vec<usize>,
}

fn resolve_columns(desc: &CategoryDescriptor, table: &SheetTable) -> ImportResult<ResolvedColumns> {
    let (name, unique) = match desc.entity {
        EntityKind::Story => (None, None),
        EntityKind::Element {
            name_column,
            unique_column,
            ..
        } => (
            Some(table.require_column(name_column)?),
            Some(table.require_column(unique_column)?),
        ),
    };

    let step_type = match desc.rule {
        ExtremumRule::Envelope => Some(table.require_column(STEP_TYPE_COLUMN)?),
        ExtremumRule::MinimumOnly => None,
    };

    let location = match desc.location_filter {
        Some(_) => Some(table.require_column(LOCATION_COLUMN)?),
        None => None,
    };

    let direction = match desc.direction_column {
        Some(column) => Some(table.require_column(column)?),
        None => None,
    };

    let values = desc
        .values
        .iter()
        .map(|v| table.require_column(v.column))
        .collect::<ImportResult<Vec<_>>>()?;

    Ok(ResolvedColumns {
        story: table.require_column(STORY_COLUMN)?,
        load_case: table.require_column(OUTPUT_CASE_COLUMN)?,
        step_type,
        location,
        direction,
        name,
        unique,
        values,
    })
}

// ==========================================
// 行过滤
// ==========================================

/// 行级过滤: 工况允许 + 位置过滤 + 基础节点过滤
fn row_accepted(
    desc: &CategoryDescriptor,
    cols: &ResolvedColumns,
    row: &[String],
    ctx: &TransformContext,
) -> bool {
    if row[cols.story].is_empty() || !ctx.allowed.contains(&row[cols.load_case]) {
        return false;
    }
    if let (Some(wanted), Some(idx)) = (desc.location_filter, cols.location) {
        if !row[idx].eq_ignore_ascii_case(wanted) {
            return false;
        }
    }
    if desc.foundation_only {
        let joint = cols.unique.map(|idx| row[idx].as_str()).unwrap_or("");
        if !ctx.foundation_joints.contains(joint) {
            return false;
        }
    }
    true
}

fn element_of(desc: &CategoryDescriptor, cols: &ResolvedColumns, row: &[String]) -> Option<ElementKey> {
    match desc.entity {
        EntityKind::Story => None,
        EntityKind::Element { element_type, .. } => {
            let name = cols.name.map(|i| row[i].clone()).unwrap_or_default();
            let unique = cols.unique.map(|i| row[i].clone()).unwrap_or_default();
            Some(ElementKey {
                element_type,
                name: name.clone(),
                unique_name: if unique.is_empty() { name } else { unique },
            })
        }
    }
}

/// 数值解析: 空单元格 → None（静默跳过）; 非数值 → NumberParseError（调用方降级为警告）
fn parse_value(table: &SheetTable, row_idx: usize, column: &str, raw: &str) -> Option<ImportResult<f64>> {
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(Ok(v)),
        _ => Some(Err(ImportError::NumberParseError {
            sheet: table.sheet.clone(),
            row: table.row_number(row_idx),
            column: column.to_string(),
            value: raw.to_string(),
        })),
    }
}

// ==========================================
// 包络变换
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Max,
    Min,
    Other,
}

fn step_kind(raw: &str) -> StepKind {
    let normalized = raw.trim().to_lowercase();
    if normalized.starts_with("max") {
        StepKind::Max
    } else if normalized.starts_with("min") {
        StepKind::Min
    } else {
        StepKind::Other
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Envelope {
    max: Option<f64>,
    min: Option<f64>,
}

impl Envelope {
    fn push(&mut self, step: StepKind, value: f64) {
        let raise = |current: Option<f64>| Some(current.map_or(value, |c| c.max(value)));
        let lower = |current: Option<f64>| Some(current.map_or(value, |c| c.min(value)));
        match step {
            StepKind::Max => self.max = raise(self.max),
            StepKind::Min => self.min = lower(self.min),
            StepKind::Other => {
                self.max = raise(self.max);
                self.min = lower(self.min);
            }
        }
    }
}

/// 分组键: (楼层, 构件唯一名, 工况, 数值列序号)
type GroupKey = (String, Option<String>, String, usize);

struct Group {
    story: String,
    element: Option<ElementKey>,
    load_case: String,
    value_idx: usize,
    envelope: Envelope,
}

fn envelope_transform(
    category: ResultCategory,
    table: &SheetTable,
    ctx: &TransformContext,
) -> ImportResult<TransformOutput> {
    let desc = category.descriptor();
    let cols = resolve_columns(desc, table)?;
    let order = story_order(table, cols.story);
    let mut output = TransformOutput::default();

    if desc.foundation_only && ctx.foundation_joints.is_empty() {
        output
            .warnings
            .push(format!("{}: 无基础节点清单, 跳过 {}", table.sheet, category));
        output.skipped = true;
        return Ok(output);
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for (row_idx, row) in table.rows.iter().enumerate() {
        if !row_accepted(desc, &cols, row, ctx) {
            continue;
        }
        let step = cols
            .step_type
            .map(|i| step_kind(&row[i]))
            .unwrap_or(StepKind::Other);
        let element = element_of(desc, &cols, row);

        for (value_idx, value_column) in desc.values.iter().enumerate() {
            if let Some(dir_idx) = cols.direction {
                if !row[dir_idx].eq_ignore_ascii_case(value_column.direction) {
                    continue;
                }
            }

            let raw = &row[cols.values[value_idx]];
            let value = match parse_value(table, row_idx, value_column.column, raw) {
                None => continue,
                Some(Err(e)) => {
                    output.warnings.push(e.to_string());
                    continue;
                }
                Some(Ok(v)) => v,
            };

            let key: GroupKey = (
                row[cols.story].clone(),
                element.as_ref().map(|e| e.unique_name.clone()),
                row[cols.load_case].clone(),
                value_idx,
            );
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Group {
                    story: row[cols.story].clone(),
                    element: element.clone(),
                    load_case: row[cols.load_case].clone(),
                    value_idx,
                    envelope: Envelope::default(),
                });
                groups.len() - 1
            });
            groups[slot].envelope.push(step, value);
        }
    }

    for group in groups {
        let value_column = &desc.values[group.value_idx];
        let Some(value) = pick_magnitude(group.envelope.max, group.envelope.min) else {
            continue;
        };
        output.facts.push(FactRecord {
            category,
            story_sort_order: order.get(&group.story).copied().unwrap_or(0),
            story: group.story,
            element: group.element,
            load_case: group.load_case,
            direction: value_column.direction.to_string(),
            result_type: value_column.result_type.to_string(),
            value,
            max_value: group.envelope.max,
            min_value: group.envelope.min,
        });
    }

    Ok(output)
}

// ==========================================
// 仅最小值变换（柱轴力）
// ==========================================

fn minimum_transform(
    category: ResultCategory,
    table: &SheetTable,
    ctx: &TransformContext,
) -> ImportResult<TransformOutput> {
    let desc = category.descriptor();
    let cols = resolve_columns(desc, table)?;
    let order = story_order(table, cols.story);
    let value_column = &desc.values[0];
    let value_idx = cols.values[0];
    let mut output = TransformOutput::default();

    let mut groups: Vec<(String, Option<ElementKey>, String, f64)> = Vec::new();
    let mut index: HashMap<(String, Option<String>, String), usize> = HashMap::new();

    for (row_idx, row) in table.rows.iter().enumerate() {
        if !row_accepted(desc, &cols, row, ctx) {
            continue;
        }
        let value = match parse_value(table, row_idx, value_column.column, &row[value_idx]) {
            None => continue,
            Some(Err(e)) => {
                output.warnings.push(e.to_string());
                continue;
            }
            Some(Ok(v)) => v,
        };

        let element = element_of(desc, &cols, row);
        let key = (
            row[cols.story].clone(),
            element.as_ref().map(|e| e.unique_name.clone()),
            row[cols.load_case].clone(),
        );
        match index.get(&key) {
            Some(&slot) => {
                let current = &mut groups[slot].3;
                *current = current.min(value);
            }
            None => {
                index.insert(key, groups.len());
                groups.push((
                    row[cols.story].clone(),
                    element,
                    row[cols.load_case].clone(),
                    value,
                ));
            }
        }
    }

    for (story, element, load_case, min) in groups {
        output.facts.push(FactRecord {
            category,
            story_sort_order: order.get(&story).copied().unwrap_or(0),
            story,
            element,
            load_case,
            direction: value_column.direction.to_string(),
            result_type: value_column.result_type.to_string(),
            value: min,
            max_value: None,
            min_value: Some(min),
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ElementType;
    use crate::importer::error::ImportError;

    fn table(sheet: &str, header: &[&str], rows: &[&[&str]]) -> SheetTable {
        let mut raw = vec![header.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
        for row in rows {
            raw.push(row.iter().map(|c| c.to_string()).collect());
        }
        SheetTable::from_raw_rows(sheet, raw, &[], &[]).unwrap()
    }

    fn allowed(cases: &[&str]) -> BTreeSet<String> {
        cases.iter().map(|c| c.to_string()).collect()
    }

    fn drift_table() -> SheetTable {
        table(
            "Story Drifts",
            &["Story", "Output Case", "Step Type", "Direction", "Drift"],
            &[
                &["L2", "TH01", "Max", "X", "0.004"],
                &["L2", "TH01", "Min", "X", "-0.006"],
                &["L2", "TH01", "Max", "Y", "0.002"],
                &["L2", "TH01", "Min", "Y", "-0.001"],
                &["L1", "TH01", "Max", "X", "0.003"],
                &["L1", "TH01", "Min", "X", "-0.002"],
                &["L1", "TH02", "Max", "X", "0.009"],
            ],
        )
    }

    #[test]
    fn test_pick_magnitude() {
        assert_eq!(pick_magnitude(Some(0.004), Some(-0.006)), Some(-0.006));
        assert_eq!(pick_magnitude(Some(0.006), Some(-0.006)), Some(0.006));
        assert_eq!(pick_magnitude(None, Some(-1.0)), Some(-1.0));
        assert_eq!(pick_magnitude(None, None), None);
    }

    #[test]
    fn test_story_drift_envelope() {
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let out = transform(ResultCategory::StoryDrifts, &drift_table(), &ctx).unwrap();

        assert!(out.warnings.is_empty());
        assert_eq!(out.facts.len(), 3);

        let l2x = &out.facts[0];
        assert_eq!(l2x.story, "L2");
        assert_eq!(l2x.direction, "X");
        assert_eq!(l2x.value, -0.006);
        assert_eq!(l2x.max_value, Some(0.004));
        assert_eq!(l2x.min_value, Some(-0.006));
        assert_eq!(l2x.story_sort_order, 0);
        assert_eq!(l2x.result_type, "Drifts");

        let l1x = out.facts.iter().find(|f| f.story == "L1").unwrap();
        assert_eq!(l1x.value, 0.003);
        assert_eq!(l1x.story_sort_order, 1);

        // TH02 未被允许
        assert!(out.facts.iter().all(|f| f.load_case == "TH01"));
    }

    #[test]
    fn test_invalid_number_is_soft() {
        let t = table(
            "Story Drifts",
            &["Story", "Output Case", "Step Type", "Direction", "Drift"],
            &[
                &["L1", "TH01", "Max", "X", "abc"],
                &["L1", "TH01", "Min", "X", "-0.002"],
            ],
        );
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let out = transform(ResultCategory::StoryDrifts, &t, &ctx).unwrap();

        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("第 2 行"));
        assert!(out.warnings[0].contains("'abc'"));
        assert_eq!(out.facts.len(), 1);
        assert_eq!(out.facts[0].value, -0.002);
        assert_eq!(out.facts[0].max_value, None);
    }

    #[test]
    fn test_missing_column_is_error() {
        let t = table("Story Drifts", &["Story", "Output Case"], &[&["L1", "TH01"]]);
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let err = transform(ResultCategory::StoryDrifts, &t, &ctx).unwrap_err();
        assert!(matches!(err, ImportError::ColumnMissing { .. }));
    }

    #[test]
    fn test_column_forces_shared_sheet() {
        let t = table(
            "Element Forces - Columns",
            &["Story", "Column", "Unique Name", "Output Case", "Step Type", "Location", "P", "V2", "V3"],
            &[
                &["L1", "C1", "101", "TH01", "Max", "0", "-100", "12", "3"],
                &["L1", "C1", "101", "TH01", "Min", "0", "-250", "-15", "-2"],
                &["L1", "C1", "101", "TH01", "Max", "3.5", "-90", "10", "4"],
            ],
        );
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let shears = transform(ResultCategory::ColumnShears, &t, &ctx).unwrap();
        assert_eq!(shears.facts.len(), 2);
        let v2 = shears.facts.iter().find(|f| f.direction == "V2").unwrap();
        assert_eq!(v2.value, -15.0);
        assert_eq!(v2.result_type, "ColumnShears_V2");
        assert_eq!(
            v2.element,
            Some(ElementKey {
                element_type: ElementType::Column,
                name: "C1".to_string(),
                unique_name: "101".to_string(),
            })
        );
        let v3 = shears.facts.iter().find(|f| f.direction == "V3").unwrap();
        assert_eq!(v3.value, 4.0);

        let axials = transform(ResultCategory::ColumnAxials, &t, &ctx).unwrap();
        assert_eq!(axials.facts.len(), 1);
        assert_eq!(axials.facts[0].value, -250.0);
        assert_eq!(axials.facts[0].min_value, Some(-250.0));
        assert_eq!(axials.facts[0].max_value, None);
    }

    #[test]
    fn test_location_filter_keeps_bottom() {
        let t = table(
            "Pier Forces",
            &["Story", "Pier", "Output Case", "Location", "Step Type", "V2", "V3"],
            &[
                &["L1", "P1", "TH01", "Top", "Max", "900", "1"],
                &["L1", "P1", "TH01", "Bottom", "Max", "500", "2"],
                &["L1", "P1", "TH01", "Bottom", "Min", "-400", "-1"],
            ],
        );
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let out = transform(ResultCategory::WallShears, &t, &ctx).unwrap();
        let v2 = out.facts.iter().find(|f| f.direction == "V2").unwrap();
        assert_eq!(v2.value, 500.0);
        assert_eq!(v2.element.as_ref().unwrap().unique_name, "P1");
    }

    #[test]
    fn test_rotations_stay_in_radians() {
        let t = table(
            "Hinge States",
            &["Story", "Frame/Wall", "Unique Name", "Output Case", "Step Type", "R3 Plastic"],
            &[
                &["L1", "B1", "201", "TH01", "Max", "0.0125"],
                &["L1", "B1", "201", "TH01", "Min", "-0.004"],
            ],
        );
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let out = transform(ResultCategory::BeamRotations, &t, &ctx).unwrap();
        assert_eq!(out.facts.len(), 1);
        assert_eq!(out.facts[0].value, 0.0125);
        assert_eq!(out.facts[0].result_type, "BeamRotations_R3Plastic");
    }

    #[test]
    fn test_vertical_displacements_foundation_only() {
        let t = table(
            "Joint Displacements",
            &["Story", "Label", "Unique Name", "Output Case", "Step Type", "Uz"],
            &[
                &["Base", "1", "J1", "TH01", "Min", "-0.01"],
                &["Base", "2", "J2", "TH01", "Min", "-0.02"],
            ],
        );
        let cases = allowed(&["TH01"]);

        let joints: HashSet<String> = ["J2".to_string()].into_iter().collect();
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };
        let out = transform(ResultCategory::VerticalDisplacements, &t, &ctx).unwrap();
        assert_eq!(out.facts.len(), 1);
        assert!(!out.skipped);
        assert_eq!(out.facts[0].element.as_ref().unwrap().unique_name, "J2");

        let none = HashSet::new();
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &none,
        };
        let out = transform(ResultCategory::VerticalDisplacements, &t, &ctx).unwrap();
        assert!(out.facts.is_empty());
        assert!(out.skipped);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_other_step_type_feeds_both_sides() {
        let t = table(
            "Diaphragm Accelerations",
            &["Story", "Output Case", "Step Type", "UX", "UY"],
            &[&["L1", "TH01", "", "0.3", "-0.5"]],
        );
        let joints = HashSet::new();
        let cases = allowed(&["TH01"]);
        let ctx = TransformContext {
            allowed: &cases,
            foundation_joints: &joints,
        };

        let out = transform(ResultCategory::StoryAccelerations, &t, &ctx).unwrap();
        let uy = out.facts.iter().find(|f| f.direction == "UY").unwrap();
        assert_eq!(uy.max_value, Some(-0.5));
        assert_eq!(uy.min_value, Some(-0.5));
        assert_eq!(uy.value, -0.5);
    }
}
