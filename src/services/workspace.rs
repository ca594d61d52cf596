//! 学习视图
//! 每个打开的班级页面对应一个视图，持有生成内容列表与两个学习会话。
//! 生成请求带有视图纪元令牌，迟到的结果只在令牌仍然有效时才会写入。

use crate::error::ViewError;
use crate::models::{ContentKind, GeneratedItem};
use crate::services::flashcards::{FlashcardAction, FlashcardSession, FlashcardSnapshot, StarOutcome};
use crate::services::parser::{parse_flashcards, parse_questions};
use crate::services::quiz::{QuizAction, QuizEvent, QuizSession, QuizSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::task::AbortHandle;
use uuid::Uuid;

/// 生成请求凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    pub view_id: Uuid,
    pub epoch: Uuid,
    pub request_id: Uuid,
    pub kind: ContentKind,
    pub file_name: String,
}

/// 视图快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub view_id: Uuid,
    pub class_id: i64,
    pub tests: Vec<GeneratedItem>,
    pub flashcards: Vec<GeneratedItem>,
    pub crib_sheets: Vec<GeneratedItem>,
    pub pending: usize,
    pub flashcard_session: FlashcardSnapshot,
    pub quiz_session: QuizSnapshot,
}

pub struct StudyView {
    class_id: i64,
    stats_scope: String,
    epoch: Uuid,
    items: BTreeMap<ContentKind, Vec<GeneratedItem>>,
    flashcards: FlashcardSession,
    quiz: QuizSession,
    in_flight: HashMap<Uuid, Option<AbortHandle>>,
}

impl StudyView {
    pub fn new(class_id: i64, stats_scope: String, items: Vec<(ContentKind, GeneratedItem)>) -> Self {
        let mut view = Self {
            class_id,
            stats_scope,
            epoch: Uuid::new_v4(),
            items: BTreeMap::new(),
            flashcards: FlashcardSession::default(),
            quiz: QuizSession::default(),
            in_flight: HashMap::new(),
        };
        view.replace_items(items);
        view
    }

    pub fn class_id(&self) -> i64 {
        self.class_id
    }

    pub fn stats_scope(&self) -> &str {
        &self.stats_scope
    }

    pub fn items(&self, kind: ContentKind) -> &[GeneratedItem] {
        self.items.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn flashcards(&self) -> &FlashcardSession {
        &self.flashcards
    }

    pub fn quiz(&self) -> &QuizSession {
        &self.quiz
    }

    fn replace_items(&mut self, items: Vec<(ContentKind, GeneratedItem)>) {
        self.items.clear();
        for (kind, item) in items {
            self.items.entry(kind).or_default().push(item);
        }
        self.refresh(ContentKind::Flashcard);
        self.refresh(ContentKind::Test);
    }

    /// 列表变化后整体重新解析并重置对应会话
    fn refresh(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Flashcard => self.flashcards.load(parse_flashcards(self.items(kind))),
            ContentKind::Test => self.quiz.load(parse_questions(self.items(kind))),
            ContentKind::CribSheet => {}
        }
    }

    fn push_item(&mut self, kind: ContentKind, item: GeneratedItem) {
        self.items.entry(kind).or_default().push(item);
        self.refresh(kind);
    }

    fn remove_item(&mut self, item_id: i64) -> bool {
        let mut changed = None;
        for (kind, list) in self.items.iter_mut() {
            let before = list.len();
            list.retain(|item| item.id != Some(item_id));
            if list.len() != before {
                changed = Some(*kind);
                break;
            }
        }
        match changed {
            Some(kind) => {
                self.refresh(kind);
                true
            }
            None => false,
        }
    }

    fn abort_all(&mut self) {
        for (request_id, handle) in self.in_flight.drain() {
            if let Some(handle) = handle {
                log::debug!("aborting generation request {}", request_id);
                handle.abort();
            }
        }
    }

    pub fn snapshot(&self, view_id: Uuid) -> ViewSnapshot {
        ViewSnapshot {
            view_id,
            class_id: self.class_id,
            tests: self.items(ContentKind::Test).to_vec(),
            flashcards: self.items(ContentKind::Flashcard).to_vec(),
            crib_sheets: self.items(ContentKind::CribSheet).to_vec(),
            pending: self.in_flight.len(),
            flashcard_session: self.flashcards.snapshot(),
            quiz_session: self.quiz.snapshot(),
        }
    }
}

/// 已打开视图的注册表
#[derive(Default)]
pub struct ViewRegistry {
    views: Mutex<HashMap<Uuid, StudyView>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, StudyView>> {
        // 会话操作不会在持锁期间 panic，中毒时继续使用内部数据
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open(&self, class_id: i64, stats_scope: String, items: Vec<(ContentKind, GeneratedItem)>) -> Uuid {
        let view_id = Uuid::new_v4();
        self.lock()
            .insert(view_id, StudyView::new(class_id, stats_scope, items));
        log::info!("opened study view {} for class {}", view_id, class_id);
        view_id
    }

    /// 关闭视图并中止其所有进行中的生成任务
    pub fn close(&self, view_id: Uuid) -> Result<(), ViewError> {
        let mut view = self.lock().remove(&view_id).ok_or(ViewError::NotOpen(view_id))?;
        view.abort_all();
        log::info!("closed study view {}", view_id);
        Ok(())
    }

    /// 关闭某个班级的全部视图
    pub fn close_class(&self, class_id: i64) -> usize {
        let mut views = self.lock();
        let ids: Vec<Uuid> = views
            .iter()
            .filter(|(_, v)| v.class_id == class_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(mut view) = views.remove(id) {
                view.abort_all();
            }
        }
        ids.len()
    }

    pub fn is_open(&self, view_id: Uuid) -> bool {
        self.lock().contains_key(&view_id)
    }

    /// 在视图上执行一个同步操作
    pub fn with_view<R>(&self, view_id: Uuid, f: impl FnOnce(&mut StudyView) -> R) -> Result<R, ViewError> {
        let mut views = self.lock();
        let view = views.get_mut(&view_id).ok_or(ViewError::NotOpen(view_id))?;
        Ok(f(view))
    }

    pub fn snapshot(&self, view_id: Uuid) -> Result<ViewSnapshot, ViewError> {
        self.with_view(view_id, |view| view.snapshot(view_id))
    }

    /// 用持久化数据替换视图内容；旧纪元的进行中请求结果将被丢弃
    pub fn reload(&self, view_id: Uuid, items: Vec<(ContentKind, GeneratedItem)>) -> Result<(), ViewError> {
        self.with_view(view_id, |view| {
            view.epoch = Uuid::new_v4();
            view.replace_items(items);
        })
    }

    pub fn begin_generation(&self, view_id: Uuid, kind: ContentKind, file_name: &str) -> Result<GenerationTicket, ViewError> {
        self.with_view(view_id, |view| {
            let request_id = Uuid::new_v4();
            view.in_flight.insert(request_id, None);
            GenerationTicket {
                view_id,
                epoch: view.epoch,
                request_id,
                kind,
                file_name: file_name.to_string(),
            }
        })
    }

    /// 登记任务句柄；视图已关闭时立即中止任务
    pub fn track(&self, ticket: &GenerationTicket, handle: AbortHandle) {
        let mut views = self.lock();
        match views.get_mut(&ticket.view_id) {
            Some(view) if view.in_flight.contains_key(&ticket.request_id) => {
                view.in_flight.insert(ticket.request_id, Some(handle));
            }
            _ => handle.abort(),
        }
    }

    fn finish_locked(views: &mut HashMap<Uuid, StudyView>, ticket: &GenerationTicket) -> Option<()> {
        views.get_mut(&ticket.view_id)?.in_flight.remove(&ticket.request_id)?;
        Some(())
    }

    /// 请求失败时移除登记
    pub fn finish(&self, ticket: &GenerationTicket) {
        Self::finish_locked(&mut self.lock(), ticket);
    }

    /// 写入生成结果；视图已关闭或纪元已变化时丢弃并返回 false
    pub fn apply(&self, ticket: &GenerationTicket, item: GeneratedItem) -> bool {
        let mut views = self.lock();
        Self::finish_locked(&mut views, ticket);

        match views.get_mut(&ticket.view_id) {
            Some(view) if view.epoch == ticket.epoch => {
                view.push_item(ticket.kind, item);
                true
            }
            _ => {
                log::info!(
                    "discarding stale {} result for {} (request {})",
                    ticket.kind,
                    ticket.file_name,
                    ticket.request_id
                );
                false
            }
        }
    }

    /// 从所有打开的视图中移除已删除的生成内容
    pub fn remove_item(&self, item_id: i64) -> usize {
        self.lock()
            .values_mut()
            .map(|view| view.remove_item(item_id))
            .filter(|removed| *removed)
            .count()
    }

    pub fn flashcard_action(
        &self,
        view_id: Uuid,
        action: FlashcardAction,
    ) -> Result<(Option<StarOutcome>, FlashcardSnapshot, String), ViewError> {
        self.with_view(view_id, |view| -> Result<_, ViewError> {
            let outcome = view.flashcards.apply(action)?;
            Ok((outcome, view.flashcards.snapshot(), view.stats_scope.clone()))
        })?
    }

    pub fn quiz_action(
        &self,
        view_id: Uuid,
        action: QuizAction,
    ) -> Result<(Option<QuizEvent>, QuizSnapshot, String), ViewError> {
        self.with_view(view_id, |view| -> Result<_, ViewError> {
            let event = view.quiz.apply(action)?;
            Ok((event, view.quiz.snapshot(), view.stats_scope.clone()))
        })?
    }
}
