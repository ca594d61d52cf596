//! 生成内容解析引擎
//! 把模型输出按 `---` 切分为块，逐行分类后提取闪卡与测验题目；
//! 速查表使用 pulldown-cmark 渲染为 HTML

use crate::models::{Flashcard, GeneratedItem, OptionLabel, QuizOption, QuizQuestion};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::sync::OnceLock;

/// 块分隔符
pub const BLOCK_DELIMITER: &str = "---";

/// 行分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockLine<'a> {
    /// `1. 题干`
    NumberedQuestion(&'a str),
    /// `A) 选项`
    Option(OptionLabel, &'a str),
    /// `Correct answer: B`
    CorrectAnswer(OptionLabel),
    /// `Q: 问题`
    CardQuestion(&'a str),
    /// `A: 答案`
    CardAnswer(&'a str),
    Other,
}

struct LineGrammar {
    correct_answer: Regex,
    numbered_question: Regex,
    option: Regex,
    card_question: Regex,
    card_answer: Regex,
}

fn grammar() -> &'static LineGrammar {
    static GRAMMAR: OnceLock<LineGrammar> = OnceLock::new();
    GRAMMAR.get_or_init(|| LineGrammar {
        correct_answer: Regex::new(r"^[*\s]*(?i:correct answer)[*\s]*:[\s*]*([A-D])").expect("valid regex"),
        numbered_question: Regex::new(r"^\d+\.\s*(.+)$").expect("valid regex"),
        option: Regex::new(r"^([A-D])\)\s*(.+)$").expect("valid regex"),
        card_question: Regex::new(r"^Q:\s*(.+)$").expect("valid regex"),
        card_answer: Regex::new(r"^A:\s*(.+)$").expect("valid regex"),
    })
}

/// 对单行进行分类（行首尾空白先被去除）
/// 所有标记都锚定行首；题干与选项优先于答案行
pub fn classify_line(line: &str) -> BlockLine<'_> {
    let line = line.trim();
    let g = grammar();

    if let Some(text) = g.numbered_question.captures(line).and_then(|c| c.get(1)) {
        return BlockLine::NumberedQuestion(text.as_str().trim());
    }
    if let Some(cap) = g.option.captures(line) {
        if let (Some(label), Some(text)) = (
            cap[1].chars().next().and_then(OptionLabel::from_char),
            cap.get(2),
        ) {
            return BlockLine::Option(label, text.as_str().trim());
        }
    }
    if let Some(cap) = g.correct_answer.captures(line) {
        if let Some(label) = cap[1].chars().next().and_then(OptionLabel::from_char) {
            return BlockLine::CorrectAnswer(label);
        }
    }
    if let Some(text) = g.card_question.captures(line).and_then(|c| c.get(1)) {
        return BlockLine::CardQuestion(text.as_str().trim());
    }
    if let Some(text) = g.card_answer.captures(line).and_then(|c| c.get(1)) {
        return BlockLine::CardAnswer(text.as_str().trim());
    }

    BlockLine::Other
}

/// 切分内容块，去除空白块
pub fn split_blocks(content: &str) -> impl Iterator<Item = &str> {
    content
        .split(BLOCK_DELIMITER)
        .map(str::trim)
        .filter(|block| !block.is_empty())
}

/// 解析单个闪卡块，问题或答案缺失时返回 None
pub fn parse_flashcard_block(block: &str) -> Option<Flashcard> {
    let mut question = None;
    let mut answer = None;

    for line in block.lines() {
        match classify_line(line) {
            BlockLine::CardQuestion(text) if question.is_none() => question = Some(text),
            BlockLine::CardAnswer(text) if answer.is_none() => answer = Some(text),
            _ => {}
        }
    }

    Some(Flashcard {
        question: question?.to_string(),
        answer: answer?.to_string(),
    })
}

/// 解析单个测验块，题干或正确答案缺失时整块丢弃。
/// 选项缺失或不完整的块仍然保留。
pub fn parse_question_block(block: &str) -> Option<QuizQuestion> {
    let mut question = None;
    let mut correct_answer = None;
    let mut options: Vec<QuizOption> = Vec::new();

    for line in block.lines() {
        match classify_line(line) {
            BlockLine::NumberedQuestion(text) if question.is_none() => question = Some(text),
            BlockLine::CorrectAnswer(label) if correct_answer.is_none() => {
                correct_answer = Some(label)
            }
            BlockLine::Option(label, text) => {
                if !options.iter().any(|o| o.label == label) {
                    options.push(QuizOption {
                        label,
                        text: text.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    Some(QuizQuestion {
        question: question?.to_string(),
        options,
        correct_answer: correct_answer?,
    })
}

/// 解析一段内容中的全部闪卡
pub fn parse_flashcard_content(content: &str) -> Vec<Flashcard> {
    split_blocks(content).filter_map(parse_flashcard_block).collect()
}

/// 解析一段内容中的全部测验题目
pub fn parse_question_content(content: &str) -> Vec<QuizQuestion> {
    split_blocks(content).filter_map(parse_question_block).collect()
}

/// 将多个生成内容中的闪卡合并为一个列表
pub fn parse_flashcards(items: &[GeneratedItem]) -> Vec<Flashcard> {
    items
        .iter()
        .flat_map(|item| parse_flashcard_content(&item.content))
        .collect()
}

/// 将多个生成内容中的题目合并为一个列表
pub fn parse_questions(items: &[GeneratedItem]) -> Vec<QuizQuestion> {
    items
        .iter()
        .flat_map(|item| parse_question_content(&item.content))
        .collect()
}

/// 渲染速查表 Markdown 为 HTML
pub fn render_markdown(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(content, options);
    let mut html_output = String::with_capacity(content.len() * 3 / 2);
    html::push_html(&mut html_output, parser);

    html_output
}
