//! 选择题测验会话
//! 每道题在一轮中最多计分一次；最后一题后进入完成提示，可关闭为总结页或重新测验

use crate::error::SessionError;
use crate::models::{OptionLabel, QuizOption, QuizQuestion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
    /// 没有可用题目
    Empty,
    InProgress,
    CompletionPrompt,
    Summary,
}

impl QuizPhase {
    fn name(&self) -> &'static str {
        match self {
            QuizPhase::Empty => "empty",
            QuizPhase::InProgress => "in progress",
            QuizPhase::CompletionPrompt => "showing the completion prompt",
            QuizPhase::Summary => "showing the summary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuizAction {
    Select { label: OptionLabel },
    Next,
    Prev,
    Dismiss,
    Retake,
}

/// 一轮测验的最终成绩
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    pub score: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionOutcome {
    pub correct: bool,
    /// 本次选择是否让分数增加
    pub scored: bool,
    pub correct_answer: OptionLabel,
}

/// 操作产生的事件，供上层持久化统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuizEvent {
    Selected(SelectionOutcome),
    Completed(QuizResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub index: usize,
    pub question: String,
    pub options: Vec<QuizOption>,
    pub selected: Option<OptionLabel>,
    /// 作答后才揭示
    pub correct_answer: Option<OptionLabel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub phase: QuizPhase,
    pub question: Option<QuestionView>,
    pub position: usize,
    pub total: usize,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    cursor: usize,
    score: u32,
    attempted: BTreeSet<usize>,
    selections: Vec<Option<OptionLabel>>,
    phase: QuizPhase,
}

impl QuizSession {
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        let mut session = Self {
            questions: Vec::new(),
            cursor: 0,
            score: 0,
            attempted: BTreeSet::new(),
            selections: Vec::new(),
            phase: QuizPhase::Empty,
        };
        session.load(questions);
        session
    }

    pub fn load(&mut self, questions: Vec<QuizQuestion>) {
        self.questions = questions;
        self.restart();
    }

    fn restart(&mut self) {
        self.cursor = 0;
        self.score = 0;
        self.attempted.clear();
        self.selections = vec![None; self.questions.len()];
        self.phase = if self.questions.is_empty() {
            QuizPhase::Empty
        } else {
            QuizPhase::InProgress
        };
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn current(&self) -> Option<&QuizQuestion> {
        match self.phase {
            QuizPhase::InProgress => self.questions.get(self.cursor),
            _ => None,
        }
    }

    /// 为当前题目选择一个选项
    pub fn select_option(&mut self, label: OptionLabel) -> Result<SelectionOutcome, SessionError> {
        self.require_in_progress("select")?;
        let question = &self.questions[self.cursor];
        if !question.has_option(label) {
            return Err(SessionError::UnknownOption(label.as_char()));
        }

        let correct = label == question.correct_answer;
        let correct_answer = question.correct_answer;
        self.selections[self.cursor] = Some(label);

        let scored = correct && self.attempted.insert(self.cursor);
        if scored {
            self.score += 1;
        }

        Ok(SelectionOutcome {
            correct,
            scored,
            correct_answer,
        })
    }

    pub fn prev(&mut self) -> Result<(), SessionError> {
        self.require_in_progress("prev")?;
        self.cursor = if self.cursor > 0 {
            self.cursor - 1
        } else {
            self.questions.len() - 1
        };
        Ok(())
    }

    /// 前进一题；在最后一题时进入完成提示并返回成绩
    pub fn next(&mut self) -> Result<Option<QuizResult>, SessionError> {
        self.require_in_progress("next")?;
        if self.cursor + 1 < self.questions.len() {
            self.cursor += 1;
            return Ok(None);
        }

        self.phase = QuizPhase::CompletionPrompt;
        Ok(Some(self.result()))
    }

    pub fn dismiss(&mut self) -> Result<(), SessionError> {
        if self.phase != QuizPhase::CompletionPrompt {
            return Err(self.invalid("dismiss"));
        }
        self.phase = QuizPhase::Summary;
        Ok(())
    }

    pub fn retake(&mut self) -> Result<(), SessionError> {
        match self.phase {
            QuizPhase::CompletionPrompt | QuizPhase::Summary => {
                self.restart();
                Ok(())
            }
            _ => Err(self.invalid("retake")),
        }
    }

    pub fn result(&self) -> QuizResult {
        QuizResult {
            score: self.score,
            total: self.questions.len() as u32,
        }
    }

    pub fn apply(&mut self, action: QuizAction) -> Result<Option<QuizEvent>, SessionError> {
        let event = match action {
            QuizAction::Select { label } => Some(QuizEvent::Selected(self.select_option(label)?)),
            QuizAction::Next => self.next()?.map(QuizEvent::Completed),
            QuizAction::Prev => {
                self.prev()?;
                None
            }
            QuizAction::Dismiss => {
                self.dismiss()?;
                None
            }
            QuizAction::Retake => {
                self.retake()?;
                None
            }
        };
        Ok(event)
    }

    pub fn snapshot(&self) -> QuizSnapshot {
        let question = self.current().map(|q| {
            let selected = self.selections[self.cursor];
            QuestionView {
                index: self.cursor,
                question: q.question.clone(),
                options: q.options.clone(),
                selected,
                correct_answer: selected.map(|_| q.correct_answer),
            }
        });

        QuizSnapshot {
            phase: self.phase,
            position: if question.is_some() { self.cursor + 1 } else { 0 },
            question,
            total: self.questions.len(),
            score: self.score,
        }
    }

    fn require_in_progress(&self, action: &'static str) -> Result<(), SessionError> {
        if self.phase == QuizPhase::InProgress {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.phase.name(),
        }
    }
}

impl Default for QuizSession {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
