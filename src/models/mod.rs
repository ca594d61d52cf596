//! 领域模型
//! 生成内容、闪卡、测验题目、班级与统计数据

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 生成内容的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Test,
    Flashcard,
    #[serde(rename = "cribsheet")]
    CribSheet,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Test, ContentKind::Flashcard, ContentKind::CribSheet];

    /// 数据库与传输中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Test => "test",
            ContentKind::Flashcard => "flashcard",
            ContentKind::CribSheet => "cribsheet",
        }
    }

    /// 生成服务的接口路径
    pub fn endpoint(&self) -> &'static str {
        match self {
            ContentKind::Test => "generate-study-material",
            ContentKind::Flashcard => "generate-flash-cards",
            ContentKind::CribSheet => "generate-crib-sheet",
        }
    }

    /// 生成服务响应中携带文本的字段名
    pub fn response_field(&self) -> &'static str {
        match self {
            ContentKind::Test => "studyMaterial",
            ContentKind::Flashcard => "flashCards",
            ContentKind::CribSheet => "cribSheet",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContentKind::Test => "practice test",
            ContentKind::Flashcard => "flash cards",
            ContentKind::CribSheet => "crib sheet",
        }
    }

    /// 面向用户的失败提示
    pub fn failure_message(&self) -> String {
        format!("Failed to generate {}", self.display_name())
    }

    pub fn save_failure_message(&self) -> String {
        format!("Failed to save {}", self.display_name())
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(ContentKind::Test),
            "flashcard" => Ok(ContentKind::Flashcard),
            "cribsheet" => Ok(ContentKind::CribSheet),
            other => Err(format!("unknown content kind: {}", other)),
        }
    }
}

/// 一次生成调用的原始输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedItem {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<i64>,
    pub file_name: String,
    pub content: String,
}

impl GeneratedItem {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// 闪卡
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

/// 选择题选项标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(OptionLabel::A),
            'B' => Some(OptionLabel::B),
            'C' => Some(OptionLabel::C),
            'D' => Some(OptionLabel::D),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            OptionLabel::A => 'A',
            OptionLabel::B => 'B',
            OptionLabel::C => 'C',
            OptionLabel::D => 'D',
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for OptionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                OptionLabel::from_char(c).ok_or_else(|| format!("invalid option label: {}", s))
            }
            _ => Err(format!("invalid option label: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub label: OptionLabel,
    pub text: String,
}

/// 测验题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<QuizOption>,
    pub correct_answer: OptionLabel,
}

impl QuizQuestion {
    pub fn has_option(&self, label: OptionLabel) -> bool {
        self.options.iter().any(|o| o.label == label)
    }
}

/// 使用统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub flashcards_clicked: u32,
    pub cumulative_score: u32,
}

/// 默认的班级颜色
pub const CLASS_COLORS: [&str; 8] = [
    "#ef4444", // red
    "#f97316", // orange
    "#84cc16", // lime
    "#22c55e", // green
    "#06b6d4", // cyan
    "#3b82f6", // blue
    "#a855f7", // purple
    "#ec4899", // pink
];

/// 校验 `#rrggbb` 颜色
pub fn is_valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// 班级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: i64,
    pub user_id: Option<String>,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// 班级文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_names() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert_eq!(ContentKind::CribSheet.response_field(), "cribSheet");
        assert_eq!(
            serde_json::to_string(&ContentKind::CribSheet).unwrap(),
            "\"cribsheet\""
        );
        assert!("essay".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_option_label_parse() {
        assert_eq!("B".parse::<OptionLabel>().unwrap(), OptionLabel::B);
        assert!("E".parse::<OptionLabel>().is_err());
        assert!("AB".parse::<OptionLabel>().is_err());
        assert!("b".parse::<OptionLabel>().is_err());
    }

    #[test]
    fn test_generated_item_wire_format() {
        let item = GeneratedItem::new("notes.pdf", "Q: a\nA: b");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["fileName"], "notes.pdf");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_color_validation() {
        assert!(CLASS_COLORS.iter().all(|c| is_valid_color(c)));
        assert!(!is_valid_color("red"));
        assert!(!is_valid_color("#12345g"));
    }
}
