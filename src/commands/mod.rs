// 命令模块
// 提供供 HTTP 路由调用的命令接口

pub mod classes;
pub mod content;
pub mod study;

use crate::error::{GenerationError, SessionError, ViewError};
use crate::models::ContentKind;
use crate::services::database::DatabaseService;
use crate::services::generation::{ChatCompletionGenerator, GenerationService, RemoteGenerator};
use crate::services::orchestrator::GenerationOrchestrator;
use crate::services::storage::FileStorage;
use crate::services::workspace::ViewRegistry;
use std::sync::Arc;
use thiserror::Error;

pub use classes::{
    create_class,
    delete_class,
    delete_file,
    download_file,
    list_classes,
    list_files,
    update_class_color,
    upload_file,
    CreateClassRequest,
    UpdateClassRequest,
};

pub use content::{
    delete_content,
    generate_batch,
    generate_content,
    list_content,
    render_content_html,
    BatchEntry,
    BatchGenerateRequest,
    GenerateRequest,
    GeneratedContentDto,
    GenerationOutcome,
};

pub use study::{
    close_view,
    flashcard_action,
    get_statistics,
    get_view,
    open_view,
    quiz_action,
    reload_view,
    FlashcardActionResponse,
    OpenViewRequest,
    QuizActionResponse,
};

/// 应用状态
pub struct AppState<G = RemoteGenerator> {
    pub db: Arc<DatabaseService>,
    pub storage: Arc<FileStorage>,
    pub orchestrator: Arc<GenerationOrchestrator<G>>,
    pub views: Arc<ViewRegistry>,
    /// 生成接口的服务端实现
    pub chat: Arc<ChatCompletionGenerator>,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            storage: self.storage.clone(),
            orchestrator: self.orchestrator.clone(),
            views: self.views.clone(),
            chat: self.chat.clone(),
        }
    }
}

impl<G: GenerationService> AppState<G> {
    pub fn new(
        db: Arc<DatabaseService>,
        storage: FileStorage,
        orchestrator: GenerationOrchestrator<G>,
        chat: ChatCompletionGenerator,
    ) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            orchestrator: Arc::new(orchestrator),
            views: Arc::new(ViewRegistry::new()),
            chat: Arc::new(chat),
        }
    }
}

/// 命令错误
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Generation(String),

    #[error("{0}")]
    Cancelled(String),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl CommandError {
    /// 生成失败时展示给用户的错误；文档本身的问题按请求错误处理，
    /// 保存失败属于服务端错误
    pub fn from_generation(kind: ContentKind, error: GenerationError) -> Self {
        match error {
            GenerationError::EmptyDocument | GenerationError::DocumentTooLarge { .. } => {
                CommandError::BadRequest(error.to_string())
            }
            GenerationError::Persist(_) => {
                CommandError::Internal(anyhow::anyhow!(kind.save_failure_message()))
            }
            _ => CommandError::Generation(kind.failure_message()),
        }
    }
}

impl From<ViewError> for CommandError {
    fn from(error: ViewError) -> Self {
        match error {
            ViewError::NotOpen(_) => CommandError::NotFound(error.to_string()),
            ViewError::Session(SessionError::UnknownOption(_)) => {
                CommandError::BadRequest(error.to_string())
            }
            ViewError::Session(SessionError::InvalidTransition { .. }) => {
                CommandError::Conflict(error.to_string())
            }
        }
    }
}

/// 统计作用域：有用户时按用户，否则按班级
pub fn stats_scope(user_id: Option<&str>, class_id: i64) -> String {
    match user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(user_id) => user_id.to_string(),
        None => format!("class-{}", class_id),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::generation::ChatConfig;
    use crate::services::orchestrator::tests::MockGenerator;
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// 内存数据库 + 临时目录存储 + 模拟生成服务
    pub(crate) fn test_state(dir: &TempDir, generator: MockGenerator) -> AppState<MockGenerator> {
        let db = Arc::new(DatabaseService::open_in_memory().unwrap());
        let storage = FileStorage::new(dir.path(), "http://localhost:8080");
        let orchestrator = GenerationOrchestrator::new(generator, db.clone());
        let chat = ChatCompletionGenerator::new(ChatConfig::default(), Duration::from_secs(5)).unwrap();
        AppState::new(db, storage, orchestrator, chat)
    }

    #[test]
    fn test_stats_scope() {
        assert_eq!(stats_scope(Some("user-1"), 3), "user-1");
        assert_eq!(stats_scope(Some("  "), 3), "class-3");
        assert_eq!(stats_scope(None, 3), "class-3");
    }

    #[test]
    fn test_generation_errors_map_to_user_message() {
        let err = CommandError::from_generation(
            ContentKind::Test,
            GenerationError::ServiceStatus { status: 503 },
        );
        assert!(matches!(&err, CommandError::Generation(_)));
        assert_eq!(err.to_string(), "Failed to generate practice test");

        let err = CommandError::from_generation(ContentKind::Flashcard, GenerationError::EmptyDocument);
        assert!(matches!(err, CommandError::BadRequest(_)));
    }

    #[test]
    fn test_save_failure_has_own_message() {
        let err = CommandError::from_generation(
            ContentKind::CribSheet,
            GenerationError::Persist("FOREIGN KEY constraint failed".to_string()),
        );
        assert!(matches!(&err, CommandError::Internal(_)));
        assert_eq!(err.to_string(), "Failed to save crib sheet");
        assert_ne!(err.to_string(), ContentKind::CribSheet.failure_message());
    }

    #[test]
    fn test_view_errors_map_to_status_kind() {
        let id = Uuid::new_v4();
        assert!(matches!(CommandError::from(ViewError::NotOpen(id)), CommandError::NotFound(_)));
        assert!(matches!(
            CommandError::from(ViewError::Session(SessionError::UnknownOption('D'))),
            CommandError::BadRequest(_)
        ));
        assert!(matches!(
            CommandError::from(ViewError::Session(SessionError::InvalidTransition {
                action: "next",
                state: "empty",
            })),
            CommandError::Conflict(_)
        ));
    }
}
