// ==========================================
// 结构分析结果导入系统 - 结果类别
// ==========================================
// 职责: 封闭的结果类别枚举 + 每个类别的版式描述
// 描述内容: 工作表名、必需列、实体类型、数值列→方向、极值规则、缓存键格式
// 红线: 类别分派只走枚举, 不做结果类型字符串比较
// ==========================================

use crate::domain::types::ElementType;
use serde::{Deserialize, Serialize};
use std::fmt;

// ===== 源表通用列名 =====
pub const STORY_COLUMN: &str = "Story";
pub const OUTPUT_CASE_COLUMN: &str = "Output Case";
pub const STEP_TYPE_COLUMN: &str = "Step Type";
pub const LOCATION_COLUMN: &str = "Location";

/// 导出表版式: 第 0 行为表标题, 第 1 行为表头, 第 2 行为单位
pub const EXPORT_SKIP_ROWS: &[usize] = &[0, 2];

/// 基础节点清单所在工作表
pub const FOUNDATION_SHEET: &str = "Fou";
pub const FOUNDATION_JOINT_COLUMN: &str = "Unique Name";

// ==========================================
// EntityKind - 缓存行实体
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// 楼层级（全局）结果: 一行一个楼层
    Story,
    /// 构件级结果: 一行一个 (构件, 楼层)
    Element {
        element_type: ElementType,
        name_column: &'static str,
        unique_column: &'static str,
    },
}

// ==========================================
// ExtremumRule - 极值规则
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumRule {
    /// 包络: 按 Step Type 收集 Max/Min, 代表值取绝对值较大者
    Envelope,
    /// 仅保留最小值（最大压力）, 不计算代表值
    MinimumOnly,
}

// ==========================================
// FactTable - 事实表归属
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactTable {
    StoryDrifts,
    StoryResults,
    ElementResults,
    ColumnAxials,
}

/// 数值列 → 方向 → 缓存结果类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueColumn {
    pub column: &'static str,
    pub direction: &'static str,
    pub result_type: &'static str,
}

// ==========================================
// CategoryDescriptor - 类别版式描述
// ==========================================
#[derive(Debug)]
pub struct CategoryDescriptor {
    pub sheet: &'static str,
    pub entity: EntityKind,
    /// 方向由某列给出时（如 Story Drifts 的 Direction 列）, 行按 ValueColumn.direction 过滤
    pub direction_column: Option<&'static str>,
    pub values: &'static [ValueColumn],
    pub rule: ExtremumRule,
    pub location_filter: Option<&'static str>,
    /// 仅导入预扫描得到的基础节点
    pub foundation_only: bool,
    /// 缓存显示换算系数（转角: 弧度 → 百分比）
    pub cache_scale: f64,
    pub fact_table: FactTable,
}

impl CategoryDescriptor {
    /// 读取该类别所需的全部列（去重, 保持顺序）
    pub fn required_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = vec![STORY_COLUMN, OUTPUT_CASE_COLUMN];

        if let EntityKind::Element {
            name_column,
            unique_column,
            ..
        } = self.entity
        {
            columns.push(name_column);
            columns.push(unique_column);
        }
        if self.rule == ExtremumRule::Envelope {
            columns.push(STEP_TYPE_COLUMN);
        }
        if self.location_filter.is_some() {
            columns.push(LOCATION_COLUMN);
        }
        if let Some(direction_column) = self.direction_column {
            columns.push(direction_column);
        }
        for value in self.values {
            columns.push(value.column);
        }

        let mut seen = std::collections::HashSet::new();
        columns.retain(|c| seen.insert(*c));
        columns
    }
}

// ==========================================
// 各类别描述（静态数据）
// ==========================================

static STORY_DRIFTS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Story Drifts",
    entity: EntityKind::Story,
    direction_column: Some("Direction"),
    values: &[
        ValueColumn { column: "Drift", direction: "X", result_type: "Drifts" },
        ValueColumn { column: "Drift", direction: "Y", result_type: "Drifts" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::StoryDrifts,
};

static STORY_ACCELERATIONS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Diaphragm Accelerations",
    entity: EntityKind::Story,
    direction_column: None,
    values: &[
        ValueColumn { column: "UX", direction: "UX", result_type: "Accelerations" },
        ValueColumn { column: "UY", direction: "UY", result_type: "Accelerations" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::StoryResults,
};

static STORY_FORCES: CategoryDescriptor = CategoryDescriptor {
    sheet: "Story Forces",
    entity: EntityKind::Story,
    direction_column: None,
    values: &[
        ValueColumn { column: "VX", direction: "VX", result_type: "Forces" },
        ValueColumn { column: "VY", direction: "VY", result_type: "Forces" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: Some("Bottom"),
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::StoryResults,
};

static STORY_DISPLACEMENTS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Diaphragm Center Of Mass Displacements",
    entity: EntityKind::Story,
    direction_column: None,
    values: &[
        ValueColumn { column: "UX", direction: "UX", result_type: "Displacements" },
        ValueColumn { column: "UY", direction: "UY", result_type: "Displacements" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::StoryResults,
};

static WALL_SHEARS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Pier Forces",
    entity: EntityKind::Element {
        element_type: ElementType::Wall,
        name_column: "Pier",
        unique_column: "Pier",
    },
    direction_column: None,
    values: &[
        ValueColumn { column: "V2", direction: "V2", result_type: "WallShears_V2" },
        ValueColumn { column: "V3", direction: "V3", result_type: "WallShears_V3" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: Some("Bottom"),
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::ElementResults,
};

static QUAD_ROTATIONS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Quad Strain Gauge - Rotations",
    entity: EntityKind::Element {
        element_type: ElementType::Quad,
        name_column: "Name",
        unique_column: "Name",
    },
    direction_column: None,
    values: &[ValueColumn { column: "Rotation", direction: "R", result_type: "QuadRotations" }],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 100.0,
    fact_table: FactTable::ElementResults,
};

static COLUMN_SHEARS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Element Forces - Columns",
    entity: EntityKind::Element {
        element_type: ElementType::Column,
        name_column: "Column",
        unique_column: "Unique Name",
    },
    direction_column: None,
    values: &[
        ValueColumn { column: "V2", direction: "V2", result_type: "ColumnShears_V2" },
        ValueColumn { column: "V3", direction: "V3", result_type: "ColumnShears_V3" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::ElementResults,
};

static COLUMN_AXIALS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Element Forces - Columns",
    entity: EntityKind::Element {
        element_type: ElementType::Column,
        name_column: "Column",
        unique_column: "Unique Name",
    },
    direction_column: None,
    values: &[ValueColumn { column: "P", direction: "P", result_type: "ColumnAxials" }],
    rule: ExtremumRule::MinimumOnly,
    location_filter: None,
    foundation_only: false,
    cache_scale: 1.0,
    fact_table: FactTable::ColumnAxials,
};

static COLUMN_ROTATIONS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Fiber Hinge States",
    entity: EntityKind::Element {
        element_type: ElementType::Column,
        name_column: "Frame/Wall",
        unique_column: "Unique Name",
    },
    direction_column: None,
    values: &[
        ValueColumn { column: "R2", direction: "R2", result_type: "ColumnRotations_R2" },
        ValueColumn { column: "R3", direction: "R3", result_type: "ColumnRotations_R3" },
    ],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 100.0,
    fact_table: FactTable::ElementResults,
};

static BEAM_ROTATIONS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Hinge States",
    entity: EntityKind::Element {
        element_type: ElementType::Beam,
        name_column: "Frame/Wall",
        unique_column: "Unique Name",
    },
    direction_column: None,
    values: &[ValueColumn {
        column: "R3 Plastic",
        direction: "R3Plastic",
        result_type: "BeamRotations_R3Plastic",
    }],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: false,
    cache_scale: 100.0,
    fact_table: FactTable::ElementResults,
};

static VERTICAL_DISPLACEMENTS: CategoryDescriptor = CategoryDescriptor {
    sheet: "Joint Displacements",
    entity: EntityKind::Element {
        element_type: ElementType::Joint,
        name_column: "Label",
        unique_column: "Unique Name",
    },
    direction_column: None,
    values: &[ValueColumn { column: "Uz", direction: "Uz", result_type: "VerticalDisplacements" }],
    rule: ExtremumRule::Envelope,
    location_filter: None,
    foundation_only: true,
    cache_scale: 1.0,
    fact_table: FactTable::ElementResults,
};

// ==========================================
// ResultCategory - 结果类别（封闭集合）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResultCategory {
    StoryDrifts,
    StoryAccelerations,
    StoryForces,
    StoryDisplacements,
    WallShears,
    QuadRotations,
    ColumnShears,
    ColumnAxials,
    ColumnRotations,
    BeamRotations,
    VerticalDisplacements,
}

impl ResultCategory {
    /// 全部类别（同时也是单文件内的处理顺序）
    pub const ALL: [ResultCategory; 11] = [
        ResultCategory::StoryDrifts,
        ResultCategory::StoryAccelerations,
        ResultCategory::StoryForces,
        ResultCategory::StoryDisplacements,
        ResultCategory::WallShears,
        ResultCategory::QuadRotations,
        ResultCategory::ColumnShears,
        ResultCategory::ColumnAxials,
        ResultCategory::ColumnRotations,
        ResultCategory::BeamRotations,
        ResultCategory::VerticalDisplacements,
    ];

    pub fn descriptor(&self) -> &'static CategoryDescriptor {
        match self {
            ResultCategory::StoryDrifts => &STORY_DRIFTS,
            ResultCategory::StoryAccelerations => &STORY_ACCELERATIONS,
            ResultCategory::StoryForces => &STORY_FORCES,
            ResultCategory::StoryDisplacements => &STORY_DISPLACEMENTS,
            ResultCategory::WallShears => &WALL_SHEARS,
            ResultCategory::QuadRotations => &QUAD_ROTATIONS,
            ResultCategory::ColumnShears => &COLUMN_SHEARS,
            ResultCategory::ColumnAxials => &COLUMN_AXIALS,
            ResultCategory::ColumnRotations => &COLUMN_ROTATIONS,
            ResultCategory::BeamRotations => &BEAM_ROTATIONS,
            ResultCategory::VerticalDisplacements => &VERTICAL_DISPLACEMENTS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCategory::StoryDrifts => "StoryDrifts",
            ResultCategory::StoryAccelerations => "StoryAccelerations",
            ResultCategory::StoryForces => "StoryForces",
            ResultCategory::StoryDisplacements => "StoryDisplacements",
            ResultCategory::WallShears => "WallShears",
            ResultCategory::QuadRotations => "QuadRotations",
            ResultCategory::ColumnShears => "ColumnShears",
            ResultCategory::ColumnAxials => "ColumnAxials",
            ResultCategory::ColumnRotations => "ColumnRotations",
            ResultCategory::BeamRotations => "BeamRotations",
            ResultCategory::VerticalDisplacements => "VerticalDisplacements",
        }
    }

    /// 从存储/命令行字符串解析（大小写不敏感）
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
    }

    pub fn sheet(&self) -> &'static str {
        self.descriptor().sheet
    }

    /// 楼层级（全局）类别
    pub fn is_global(&self) -> bool {
        self.descriptor().entity == EntityKind::Story
    }

    /// 该类别写入的缓存结果类型（去重, 保持顺序）
    pub fn cache_result_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = Vec::new();
        for value in self.descriptor().values {
            if !types.contains(&value.result_type) {
                types.push(value.result_type);
            }
        }
        types
    }

    /// 缓存载荷键: 全局类别为 `<工况>_<方向>`, 构件类别为裸工况名
    pub fn cache_key(&self, load_case: &str, direction: &str) -> String {
        if self.is_global() {
            format!("{}_{}", load_case, direction)
        } else {
            load_case.to_string()
        }
    }
}

impl fmt::Display for ResultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 给定类别集合涉及的工作表（去重, 按类别顺序）
pub fn sheets_for(categories: &[ResultCategory]) -> Vec<&'static str> {
    let mut sheets: Vec<&'static str> = Vec::new();
    for category in categories {
        let sheet = category.sheet();
        if !sheets.contains(&sheet) {
            sheets.push(sheet);
        }
    }
    sheets
}

/// 读取同一工作表的类别（如 Element Forces - Columns → 柱剪力 + 柱轴力）
pub fn categories_for_sheet(categories: &[ResultCategory], sheet: &str) -> Vec<ResultCategory> {
    categories
        .iter()
        .copied()
        .filter(|c| c.sheet() == sheet)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_sheet_for_column_forces() {
        let cats = categories_for_sheet(&ResultCategory::ALL, "Element Forces - Columns");
        assert_eq!(
            cats,
            vec![ResultCategory::ColumnShears, ResultCategory::ColumnAxials]
        );
    }

    #[test]
    fn test_sheets_for_dedups() {
        let sheets = sheets_for(&ResultCategory::ALL);
        assert_eq!(sheets.len(), 10);
        assert_eq!(sheets[0], "Story Drifts");
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(ResultCategory::StoryDrifts.cache_key("TH01", "X"), "TH01_X");
        assert_eq!(ResultCategory::WallShears.cache_key("TH01", "V2"), "TH01");
    }

    #[test]
    fn test_required_columns_story_drifts() {
        let cols = ResultCategory::StoryDrifts.descriptor().required_columns();
        assert_eq!(
            cols,
            vec!["Story", "Output Case", "Step Type", "Direction", "Drift"]
        );
    }

    #[test]
    fn test_required_columns_pier_dedup_name_columns() {
        let cols = ResultCategory::WallShears.descriptor().required_columns();
        assert_eq!(cols.iter().filter(|c| **c == "Pier").count(), 1);
        assert!(cols.contains(&"Location"));
    }

    #[test]
    fn test_column_axials_skip_step_type() {
        let cols = ResultCategory::ColumnAxials.descriptor().required_columns();
        assert!(!cols.contains(&"Step Type"));
        assert!(cols.contains(&"P"));
    }

    #[test]
    fn test_cache_result_types() {
        assert_eq!(ResultCategory::StoryDrifts.cache_result_types(), vec!["Drifts"]);
        assert_eq!(
            ResultCategory::ColumnRotations.cache_result_types(),
            vec!["ColumnRotations_R2", "ColumnRotations_R3"]
        );
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(
            ResultCategory::parse("beamrotations"),
            Some(ResultCategory::BeamRotations)
        );
        assert_eq!(ResultCategory::parse("Nope"), None);
    }
}
