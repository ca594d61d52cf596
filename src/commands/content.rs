// 生成内容命令模块
// 发起生成、批量生成、查询与删除生成内容

use super::classes::require_class;
use super::{AppState, CommandError};
use crate::models::{ContentKind, GeneratedItem};
use crate::services::database::StoredContent;
use crate::services::generation::GenerationService;
use crate::services::orchestrator::GenerationJob;
use crate::services::parser::render_markdown;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 生成请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub kind: ContentKind,
    pub file_name: String,
}

/// 批量生成请求：同一类型，多个文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGenerateRequest {
    pub kind: ContentKind,
    pub file_names: Vec<String>,
}

/// 生成结果；`applied` 为 false 表示视图已关闭或已重新加载
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub item: GeneratedItem,
    pub applied: bool,
}

/// 批量生成中单个文件的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GenerationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 生成内容传输对象
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContentDto {
    pub id: Option<i64>,
    pub class_id: i64,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub file_name: String,
    pub content: String,
}

impl From<StoredContent> for GeneratedContentDto {
    fn from(stored: StoredContent) -> Self {
        Self {
            id: stored.item.id,
            class_id: stored.class_id,
            kind: stored.kind,
            file_name: stored.item.file_name,
            content: stored.item.content,
        }
    }
}

/// 对视图所属班级中的一个文件发起生成
///
/// 生成在独立任务中执行，关闭视图会中止该任务。结果先持久化，
/// 再由任务本身在视图仍然有效时写入视图并重新解析对应会话，
/// 调用方只等待结果。
pub async fn generate_content<G: GenerationService>(
    state: &AppState<G>,
    view_id: Uuid,
    request: GenerateRequest,
) -> Result<GenerationOutcome, CommandError> {
    let GenerateRequest { kind, file_name } = request;
    let class_id = state.views.with_view(view_id, |view| view.class_id())?;

    if !state.storage.exists(class_id, &file_name).await? {
        return Err(CommandError::NotFound(format!("File {} not found", file_name)));
    }
    let document = state.storage.read(class_id, &file_name).await?;

    let ticket = state.views.begin_generation(view_id, kind, &file_name)?;
    let orchestrator = state.orchestrator.clone();
    let job = GenerationJob {
        kind,
        file_name: file_name.clone(),
        document,
        class_id: Some(class_id),
    };

    // 写入视图在任务内完成，调用方中途断开也不会留下悬挂的请求
    let views = state.views.clone();
    let task_ticket = ticket.clone();
    let task = tokio::spawn(async move {
        match orchestrator.generate(job).await {
            Ok(item) => {
                let applied = views.apply(&task_ticket, item.clone());
                Ok(GenerationOutcome { item, applied })
            }
            Err(e) => {
                views.finish(&task_ticket);
                Err(e)
            }
        }
    });
    state.views.track(&ticket, task.abort_handle());

    match task.await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(CommandError::from_generation(kind, e)),
        Err(e) if e.is_cancelled() => {
            state.views.finish(&ticket);
            log::info!("generation of {} for {} was cancelled", kind, file_name);
            Err(CommandError::Cancelled(format!(
                "Generation of {} for {} was cancelled",
                kind.display_name(),
                file_name
            )))
        }
        Err(e) => {
            state.views.finish(&ticket);
            Err(CommandError::Internal(anyhow::anyhow!(
                "generation task failed: {}",
                e
            )))
        }
    }
}

/// 对多个文件并发生成，每个文件独立成功或失败
pub async fn generate_batch<G: GenerationService>(
    state: &AppState<G>,
    view_id: Uuid,
    request: BatchGenerateRequest,
) -> Result<Vec<BatchEntry>, CommandError> {
    if !state.views.is_open(view_id) {
        return Err(CommandError::NotFound(format!("Study view {} is not open", view_id)));
    }
    if request.file_names.is_empty() {
        return Err(CommandError::BadRequest("No files selected".to_string()));
    }

    let kind = request.kind;
    let results = join_all(request.file_names.iter().map(|file_name| {
        generate_content(
            state,
            view_id,
            GenerateRequest {
                kind,
                file_name: file_name.clone(),
            },
        )
    }))
    .await;

    Ok(request
        .file_names
        .into_iter()
        .zip(results)
        .map(|(file_name, result)| match result {
            Ok(outcome) => BatchEntry {
                file_name,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => BatchEntry {
                file_name,
                outcome: None,
                error: Some(e.to_string()),
            },
        })
        .collect())
}

pub async fn list_content<G>(
    state: &AppState<G>,
    class_id: i64,
    kind: Option<ContentKind>,
) -> Result<Vec<GeneratedContentDto>, CommandError> {
    require_class(state, class_id)?;
    Ok(state
        .db
        .list_generated(class_id, kind)?
        .into_iter()
        .map(GeneratedContentDto::from)
        .collect())
}

/// 删除生成内容，同时从已打开的视图中移除
pub async fn delete_content<G>(state: &AppState<G>, content_id: i64) -> Result<(), CommandError> {
    if !state.db.delete_generated(content_id)? {
        return Err(CommandError::NotFound(format!("Content {} not found", content_id)));
    }
    let views = state.views.remove_item(content_id);
    log::info!("deleted content {} ({} views updated)", content_id, views);
    Ok(())
}

/// 将生成内容（通常是速查表）渲染为 HTML
pub async fn render_content_html<G>(state: &AppState<G>, content_id: i64) -> Result<String, CommandError> {
    let stored = state
        .db
        .get_generated(content_id)?
        .ok_or_else(|| CommandError::NotFound(format!("Content {} not found", content_id)))?;
    Ok(render_markdown(&stored.item.content))
}
