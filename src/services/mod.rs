// 服务模块
// 提供核心业务逻辑服务

pub mod database;
pub mod flashcards;
pub mod generation;
pub mod orchestrator;
pub mod parser;
pub mod quiz;
pub mod storage;
pub mod workspace;

pub use database::{DatabaseService, StoredContent};

pub use flashcards::{
    CardView,
    FlashcardAction,
    FlashcardPhase,
    FlashcardSession,
    FlashcardSnapshot,
    StarOutcome,
};

pub use generation::{
    encode_document,
    ChatCompletionGenerator,
    ChatConfig,
    GenerationService,
    RemoteGenerator,
};

pub use orchestrator::{GenerationJob, GenerationOrchestrator};

pub use quiz::{
    QuestionView,
    QuizAction,
    QuizEvent,
    QuizPhase,
    QuizResult,
    QuizSession,
    QuizSnapshot,
    SelectionOutcome,
};

pub use storage::FileStorage;

pub use workspace::{GenerationTicket, ViewRegistry, ViewSnapshot};
