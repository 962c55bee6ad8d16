// ==========================================
// 结构分析结果导入系统 - 领域类型定义
// ==========================================
// 职责: 分析类型、构件类型等封闭枚举
// 序列化格式: 与数据库存储字符串一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 分析类型 (Analysis Type)
// ==========================================
// 挂在 ResultSet 上, 区分时程分析与推覆分析
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisType {
    TimeHistory, // 时程分析
    Pushover,    // 推覆分析
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::TimeHistory => "TH",
            AnalysisType::Pushover => "PUSHOVER",
        }
    }

    /// 从存储字符串解析（未知值按时程处理）
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PUSHOVER" | "PO" => AnalysisType::Pushover,
            _ => AnalysisType::TimeHistory,
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 构件类型 (Element Type)
// ==========================================
// 构件身份 = (project, element_type, unique_name)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    Wall,   // 墙肢 (Pier)
    Column, // 柱
    Beam,   // 梁
    Quad,   // 壳单元
    Joint,  // 节点（基础节点）
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Wall => "WALL",
            ElementType::Column => "COLUMN",
            ElementType::Beam => "BEAM",
            ElementType::Quad => "QUAD",
            ElementType::Joint => "JOINT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "WALL" => Some(ElementType::Wall),
            "COLUMN" => Some(ElementType::Column),
            "BEAM" => Some(ElementType::Beam),
            "QUAD" => Some(ElementType::Quad),
            "JOINT" => Some(ElementType::Joint),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 极值符号 (Extreme Sign)
// ==========================================
// 绝对极值取自的原始值 >= 0 为 positive, 否则 negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremeSign {
    Positive,
    Negative,
}

impl ExtremeSign {
    pub fn of(value: f64) -> Self {
        if value >= 0.0 {
            ExtremeSign::Positive
        } else {
            ExtremeSign::Negative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtremeSign::Positive => "positive",
            ExtremeSign::Negative => "negative",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("negative") {
            ExtremeSign::Negative
        } else {
            ExtremeSign::Positive
        }
    }
}

impl fmt::Display for ExtremeSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_type_roundtrip_strings() {
        assert_eq!(AnalysisType::parse("th"), AnalysisType::TimeHistory);
        assert_eq!(AnalysisType::parse("Pushover"), AnalysisType::Pushover);
        assert_eq!(AnalysisType::parse("unknown"), AnalysisType::TimeHistory);
        assert_eq!(AnalysisType::Pushover.as_str(), "PUSHOVER");
    }

    #[test]
    fn test_element_type_parse() {
        assert_eq!(ElementType::parse("column"), Some(ElementType::Column));
        assert_eq!(ElementType::parse("truss"), None);
    }

    #[test]
    fn test_extreme_sign_zero_is_positive() {
        assert_eq!(ExtremeSign::of(0.0), ExtremeSign::Positive);
        assert_eq!(ExtremeSign::of(-0.001), ExtremeSign::Negative);
    }
}
