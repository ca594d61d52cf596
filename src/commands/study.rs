// 学习命令模块
// 学习视图的打开与关闭、闪卡与测验操作、使用统计

use super::classes::require_class;
use super::{stats_scope, AppState, CommandError};
use crate::models::{ContentKind, GeneratedItem, UserStatistics};
use crate::services::flashcards::{FlashcardAction, FlashcardSnapshot};
use crate::services::quiz::{QuizAction, QuizEvent, QuizSnapshot};
use crate::services::workspace::ViewSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 打开视图请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenViewRequest {
    pub class_id: i64,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardActionResponse {
    pub session: FlashcardSnapshot,
    /// 仅在统计发生变化时返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<UserStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<QuizEvent>,
    pub session: QuizSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<UserStatistics>,
}

fn load_items<G>(state: &AppState<G>, class_id: i64) -> Result<Vec<(ContentKind, GeneratedItem)>, CommandError> {
    Ok(state
        .db
        .list_generated(class_id, None)?
        .into_iter()
        .map(|stored| (stored.kind, stored.item))
        .collect())
}

// ==================== 视图 ====================

/// 打开班级页面：加载已保存的生成内容并建立两个学习会话
pub async fn open_view<G>(state: &AppState<G>, request: OpenViewRequest) -> Result<ViewSnapshot, CommandError> {
    let class = require_class(state, request.class_id)?;
    let items = load_items(state, class.id)?;
    let scope = stats_scope(request.user_id.as_deref(), class.id);

    let view_id = state.views.open(class.id, scope, items);
    Ok(state.views.snapshot(view_id)?)
}

pub async fn close_view<G>(state: &AppState<G>, view_id: Uuid) -> Result<(), CommandError> {
    Ok(state.views.close(view_id)?)
}

pub async fn get_view<G>(state: &AppState<G>, view_id: Uuid) -> Result<ViewSnapshot, CommandError> {
    Ok(state.views.snapshot(view_id)?)
}

/// 从数据库重新加载视图，进行中的生成结果将被丢弃
pub async fn reload_view<G>(state: &AppState<G>, view_id: Uuid) -> Result<ViewSnapshot, CommandError> {
    let class_id = state.views.with_view(view_id, |view| view.class_id())?;
    let items = load_items(state, class_id)?;
    state.views.reload(view_id, items)?;
    Ok(state.views.snapshot(view_id)?)
}

// ==================== 会话操作 ====================

/// 闪卡操作；标记掌握时累加 `flashcardsClicked`
pub async fn flashcard_action<G>(
    state: &AppState<G>,
    view_id: Uuid,
    action: FlashcardAction,
) -> Result<FlashcardActionResponse, CommandError> {
    let (outcome, session, scope) = state.views.flashcard_action(view_id, action)?;

    let statistics = match outcome {
        Some(star) => {
            let stats = state.db.record_flashcard_mastered(&scope)?;
            log::debug!("card {} mastered in scope {}", star.mastered_index, scope);
            Some(stats)
        }
        None => None,
    };

    Ok(FlashcardActionResponse { session, statistics })
}

/// 测验操作；一轮完成时把得分累加到 `cumulativeScore`
pub async fn quiz_action<G>(
    state: &AppState<G>,
    view_id: Uuid,
    action: QuizAction,
) -> Result<QuizActionResponse, CommandError> {
    let (event, session, scope) = state.views.quiz_action(view_id, action)?;

    let statistics = match event {
        Some(QuizEvent::Completed(result)) => {
            log::info!(
                "quiz completed in scope {}: {}/{}",
                scope,
                result.score,
                result.total
            );
            Some(state.db.add_quiz_score(&scope, result.score)?)
        }
        _ => None,
    };

    Ok(QuizActionResponse {
        event,
        session,
        statistics,
    })
}

pub async fn get_statistics<G>(state: &AppState<G>, scope: &str) -> Result<UserStatistics, CommandError> {
    Ok(state.db.get_statistics(scope)?)
}
