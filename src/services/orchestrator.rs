//! 生成编排
//! 对单个文档发起一次生成调用，成功后（可选）先持久化再返回生成内容

use crate::error::GenerationError;
use crate::models::{ContentKind, GeneratedItem};
use crate::services::database::DatabaseService;
use crate::services::generation::{encode_document, GenerationService};
use futures::future::join_all;
use std::sync::Arc;

/// 默认的编码后文档大小上限（5 MiB）
pub const DEFAULT_MAX_ENCODED_BYTES: usize = 5 * 1024 * 1024;

/// 一次生成任务
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub kind: ContentKind,
    pub file_name: String,
    pub document: Vec<u8>,
    /// 给定班级时先保存再返回
    pub class_id: Option<i64>,
}

pub struct GenerationOrchestrator<G> {
    generator: G,
    db: Arc<DatabaseService>,
    max_encoded_bytes: usize,
}

impl<G: GenerationService> GenerationOrchestrator<G> {
    pub fn new(generator: G, db: Arc<DatabaseService>) -> Self {
        Self {
            generator,
            db,
            max_encoded_bytes: DEFAULT_MAX_ENCODED_BYTES,
        }
    }

    pub fn with_max_encoded_bytes(mut self, limit: usize) -> Self {
        self.max_encoded_bytes = limit;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn max_encoded_bytes(&self) -> usize {
        self.max_encoded_bytes
    }

    /// 执行一次生成；不重试
    pub async fn generate(&self, job: GenerationJob) -> Result<GeneratedItem, GenerationError> {
        let GenerationJob {
            kind,
            file_name,
            document,
            class_id,
        } = job;

        if document.is_empty() {
            log::warn!("rejected {} for {}: document is empty", kind, file_name);
            return Err(GenerationError::EmptyDocument);
        }
        let encoded = encode_document(&document);
        if encoded.len() > self.max_encoded_bytes {
            log::warn!(
                "rejected {} for {}: encoded document is {} bytes, limit is {}",
                kind,
                file_name,
                encoded.len(),
                self.max_encoded_bytes
            );
            return Err(GenerationError::DocumentTooLarge {
                size: encoded.len(),
                limit: self.max_encoded_bytes,
            });
        }

        let content = match self.generator.generate(kind, encoded).await {
            Ok(content) => content,
            Err(e) => {
                log::error!("failed to generate {} for {}: {}", kind, file_name, e);
                return Err(e);
            }
        };

        let mut item = GeneratedItem::new(file_name, content);
        if let Some(class_id) = class_id {
            let id = self
                .db
                .insert_generated(class_id, kind, &item)
                .map_err(|e| {
                    log::error!("failed to save {} for class {}: {:#}", kind, class_id, e);
                    GenerationError::Persist(e.to_string())
                })?;
            item.id = Some(id);
        }

        log::info!(
            "generated {} for {} ({} characters)",
            kind,
            item.file_name,
            item.content.len()
        );
        Ok(item)
    }

    /// 并发执行多个相互独立的任务，结果与输入一一对应
    pub async fn generate_many(
        &self,
        jobs: Vec<GenerationJob>,
    ) -> Vec<Result<GeneratedItem, GenerationError>> {
        join_all(jobs.into_iter().map(|job| self.generate(job))).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 测试用生成服务：按类型返回固定文本并记录调用
    #[derive(Default)]
    pub(crate) struct MockGenerator {
        pub calls: AtomicUsize,
        pub fail: bool,
        pub delay: Option<Duration>,
        pub seen: Mutex<Vec<(ContentKind, String)>>,
    }

    impl MockGenerator {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }
    }

    pub(crate) const MOCK_QUIZ: &str =
        "1. What is 2+2?\nA) 3\nB) 4\nC) 5\nD) 6\nCorrect answer: B";
    pub(crate) const MOCK_CARDS: &str = "Q: Capital of France?\nA: Paris\n---\nQ: Capital of Japan?\nA: Tokyo";

    impl GenerationService for MockGenerator {
        async fn generate(
            &self,
            kind: ContentKind,
            encoded_document: String,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((kind, encoded_document));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(GenerationError::ServiceStatus { status: 500 });
            }
            Ok(match kind {
                ContentKind::Test => MOCK_QUIZ.to_string(),
                ContentKind::Flashcard => MOCK_CARDS.to_string(),
                ContentKind::CribSheet => "# Summary\n- point".to_string(),
            })
        }
    }

    fn job(kind: ContentKind, class_id: Option<i64>) -> GenerationJob {
        GenerationJob {
            kind,
            file_name: "notes.txt".to_string(),
            document: b"lecture notes".to_vec(),
            class_id,
        }
    }

    fn db() -> Arc<DatabaseService> {
        Arc::new(DatabaseService::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_generate_without_persist() {
        let orchestrator = GenerationOrchestrator::new(MockGenerator::default(), db());
        let item = orchestrator.generate(job(ContentKind::Flashcard, None)).await.unwrap();

        assert_eq!(item.id, None);
        assert_eq!(item.file_name, "notes.txt");
        assert_eq!(item.content, MOCK_CARDS);

        let seen = orchestrator.generator().seen.lock().unwrap();
        assert_eq!(seen[0].0, ContentKind::Flashcard);
        assert_eq!(seen[0].1, encode_document(b"lecture notes"));
    }

    #[tokio::test]
    async fn test_generate_persists_before_returning() {
        let db = db();
        let class = db.create_class(None, "BIO", "#22c55e").unwrap();
        let orchestrator = GenerationOrchestrator::new(MockGenerator::default(), db.clone());

        let item = orchestrator.generate(job(ContentKind::Test, Some(class.id))).await.unwrap();
        let stored = db.list_generated(class.id, Some(ContentKind::Test)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(item.id, stored[0].item.id);
    }

    #[tokio::test]
    async fn test_failure_produces_no_item() {
        let db = db();
        let class = db.create_class(None, "BIO", "#22c55e").unwrap();
        let orchestrator = GenerationOrchestrator::new(MockGenerator::failing(), db.clone());

        let result = orchestrator.generate(job(ContentKind::Test, Some(class.id))).await;
        assert!(matches!(result, Err(GenerationError::ServiceStatus { status: 500 })));
        assert_eq!(orchestrator.generator().calls.load(Ordering::SeqCst), 1);
        assert!(db.list_generated(class.id, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_document_rejected_before_call() {
        let orchestrator =
            GenerationOrchestrator::new(MockGenerator::default(), db()).with_max_encoded_bytes(8);
        let result = orchestrator.generate(job(ContentKind::CribSheet, None)).await;

        assert!(matches!(
            result,
            Err(GenerationError::DocumentTooLarge { limit: 8, .. })
        ));
        assert_eq!(orchestrator.generator().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let orchestrator = GenerationOrchestrator::new(MockGenerator::default(), db());
        let mut empty = job(ContentKind::Test, None);
        empty.document.clear();
        assert!(matches!(
            orchestrator.generate(empty).await,
            Err(GenerationError::EmptyDocument)
        ));
    }

    #[tokio::test]
    async fn test_save_failure_reported_as_persist() {
        let orchestrator = GenerationOrchestrator::new(MockGenerator::default(), db());
        let result = orchestrator.generate(job(ContentKind::Test, Some(404))).await;

        assert!(matches!(result, Err(GenerationError::Persist(_))));
        assert_eq!(orchestrator.generator().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_many_keeps_positions() {
        let db = db();
        let class = db.create_class(None, "BIO", "#22c55e").unwrap();
        let orchestrator = GenerationOrchestrator::new(MockGenerator::default(), db.clone());

        let mut bad = job(ContentKind::Flashcard, Some(class.id));
        bad.document.clear();
        let results = orchestrator
            .generate_many(vec![
                job(ContentKind::Test, Some(class.id)),
                bad,
                job(ContentKind::CribSheet, Some(class.id)),
            ])
            .await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().content, "# Summary\n- point");
        assert_eq!(db.list_generated(class.id, None).unwrap().len(), 2);
    }
}
