//! 闪卡复习会话
//! 维护未掌握卡片池、当前游标和已掌握集合；池清空后进入完成状态，可重新开始

use crate::error::SessionError;
use crate::models::Flashcard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashcardPhase {
    /// 没有可用闪卡
    Empty,
    Active,
    Complete,
}

impl FlashcardPhase {
    fn name(&self) -> &'static str {
        match self {
            FlashcardPhase::Empty => "empty",
            FlashcardPhase::Active => "active",
            FlashcardPhase::Complete => "complete",
        }
    }
}

/// 前端可调用的会话操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashcardAction {
    Flip,
    Next,
    Prev,
    Star,
    Retake,
}

/// 掌握一张卡片后向上层发出的通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarOutcome {
    /// 卡片在原始列表中的下标
    pub mastered_index: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub index: usize,
    pub text: String,
    pub showing_answer: bool,
}

/// 会话快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSnapshot {
    pub phase: FlashcardPhase,
    pub card: Option<CardView>,
    /// 从 1 开始的位置
    pub position: usize,
    pub remaining: usize,
    pub total: usize,
    pub mastered: usize,
}

#[derive(Debug, Clone)]
pub struct FlashcardSession {
    cards: Vec<Flashcard>,
    pool: Vec<usize>,
    cursor: usize,
    mastered: BTreeSet<usize>,
    showing_answer: bool,
    phase: FlashcardPhase,
}

impl FlashcardSession {
    pub fn new(cards: Vec<Flashcard>) -> Self {
        let mut session = Self {
            cards: Vec::new(),
            pool: Vec::new(),
            cursor: 0,
            mastered: BTreeSet::new(),
            showing_answer: false,
            phase: FlashcardPhase::Empty,
        };
        session.load(cards);
        session
    }

    /// 载入新的闪卡集合并重置全部状态
    pub fn load(&mut self, cards: Vec<Flashcard>) {
        self.cards = cards;
        self.restart();
    }

    fn restart(&mut self) {
        self.pool = (0..self.cards.len()).collect();
        self.cursor = 0;
        self.mastered.clear();
        self.showing_answer = false;
        self.phase = if self.cards.is_empty() {
            FlashcardPhase::Empty
        } else {
            FlashcardPhase::Active
        };
    }

    pub fn phase(&self) -> FlashcardPhase {
        self.phase
    }

    pub fn remaining(&self) -> usize {
        self.pool.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 当前卡片（原始下标与内容）
    pub fn current(&self) -> Option<(usize, &Flashcard)> {
        let index = *self.pool.get(self.cursor)?;
        self.cards.get(index).map(|card| (index, card))
    }

    pub fn is_mastered(&self, index: usize) -> bool {
        self.mastered.contains(&index)
    }

    pub fn flip(&mut self) {
        if self.phase == FlashcardPhase::Active {
            self.showing_answer = !self.showing_answer;
        }
    }

    pub fn next(&mut self) {
        if self.pool.is_empty() {
            return;
        }
        self.cursor = (self.cursor + 1) % self.pool.len();
        self.showing_answer = false;
    }

    pub fn prev(&mut self) {
        if self.pool.is_empty() {
            return;
        }
        self.cursor = if self.cursor > 0 {
            self.cursor - 1
        } else {
            self.pool.len() - 1
        };
        self.showing_answer = false;
    }

    /// 标记当前卡片为已掌握并移出卡片池
    pub fn star(&mut self) -> Result<StarOutcome, SessionError> {
        if self.phase != FlashcardPhase::Active || self.pool.is_empty() {
            return Err(self.invalid("star"));
        }

        let mastered_index = self.pool.remove(self.cursor);
        self.mastered.insert(mastered_index);
        self.showing_answer = false;

        if self.cursor >= self.pool.len() {
            self.cursor = 0;
        }
        if self.pool.is_empty() {
            self.phase = FlashcardPhase::Complete;
        }

        Ok(StarOutcome {
            mastered_index,
            completed: self.phase == FlashcardPhase::Complete,
        })
    }

    pub fn retake(&mut self) -> Result<(), SessionError> {
        if self.phase != FlashcardPhase::Complete {
            return Err(self.invalid("retake"));
        }
        self.restart();
        Ok(())
    }

    /// 执行一个操作；只有 `Star` 会产生通知
    pub fn apply(&mut self, action: FlashcardAction) -> Result<Option<StarOutcome>, SessionError> {
        match action {
            FlashcardAction::Flip => self.flip(),
            FlashcardAction::Next => self.next(),
            FlashcardAction::Prev => self.prev(),
            FlashcardAction::Star => return self.star().map(Some),
            FlashcardAction::Retake => self.retake()?,
        }
        Ok(None)
    }

    pub fn snapshot(&self) -> FlashcardSnapshot {
        let card = self.current().map(|(index, card)| CardView {
            index,
            text: if self.showing_answer {
                card.answer.clone()
            } else {
                card.question.clone()
            },
            showing_answer: self.showing_answer,
        });

        FlashcardSnapshot {
            phase: self.phase,
            position: if card.is_some() { self.cursor + 1 } else { 0 },
            card,
            remaining: self.pool.len(),
            total: self.cards.len(),
            mastered: self.mastered.len(),
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.phase.name(),
        }
    }
}

impl Default for FlashcardSession {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
