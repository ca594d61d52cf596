use anyhow::{Context, Result};
use std::sync::Arc;
use study_aid::commands::AppState;
use study_aid::config::AppConfig;
use study_aid::server;
use study_aid::services::{
    ChatCompletionGenerator, DatabaseService, FileStorage, GenerationOrchestrator, RemoteGenerator,
};
use study_aid::utils;

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    utils::setup_logging(config.log_level)?;
    log::info!("starting study-aid {}", env!("CARGO_PKG_VERSION"));

    // 初始化数据库
    let db_path = config.database_path();
    let db = Arc::new(
        DatabaseService::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?,
    );
    log::info!("database ready at {}", db_path.display());

    let storage = FileStorage::new(config.storage_dir(), config.public_url.clone());
    log::info!("storing class files under {}", storage.root().display());

    let generator = RemoteGenerator::new(config.generation_base_url(), config.request_timeout)?;
    let orchestrator =
        GenerationOrchestrator::new(generator, db.clone()).with_max_encoded_bytes(config.max_encoded_bytes);

    if config.chat.api_key.is_none() {
        log::warn!("OPENAI_API_KEY is not set, generation endpoints will fail");
    }
    let chat = ChatCompletionGenerator::new(config.chat.clone(), config.request_timeout)?;

    let state = AppState::new(db, storage, orchestrator, chat);
    server::serve(state, config.bind).await
}
