//! HTTP 服务
//!
//! 把命令层映射为 axum 路由，并提供三个生成接口
//! （`/api/generate-study-material`、`/api/generate-flash-cards`、`/api/generate-crib-sheet`），
//! 由聊天补全后端在服务端完成生成。

use crate::commands::{
    self, AppState, BatchGenerateRequest, CommandError, CreateClassRequest, GenerateRequest,
    OpenViewRequest, UpdateClassRequest,
};
use crate::models::ContentKind;
use crate::services::flashcards::FlashcardAction;
use crate::services::generation::{GenerationRequestBody, GenerationService};
use crate::services::quiz::QuizAction;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use uuid::Uuid;

/// JSON 包装在编码文档之外的额外空间
const BODY_LIMIT_SLACK: usize = 64 * 1024;

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = match &self {
            CommandError::NotFound(_) => StatusCode::NOT_FOUND,
            CommandError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CommandError::Conflict(_) | CommandError::Cancelled(_) => StatusCode::CONFLICT,
            CommandError::Generation(_) => StatusCode::BAD_GATEWAY,
            CommandError::Internal(e) => {
                log::error!("internal error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentQuery {
    #[serde(rename = "type")]
    kind: Option<ContentKind>,
}

#[derive(Debug, Deserialize)]
struct FlashcardActionRequest {
    action: FlashcardAction,
}

/// 构建路由
pub fn router<G: GenerationService>(state: AppState<G>) -> Router {
    let body_limit = state.orchestrator.max_encoded_bytes() + BODY_LIMIT_SLACK;

    let mut router = Router::new()
        .route("/classes", get(list_classes::<G>).post(create_class::<G>))
        .route(
            "/classes/{id}",
            patch(update_class::<G>).delete(delete_class::<G>),
        )
        .route("/classes/{id}/files", get(list_files::<G>))
        .route(
            "/classes/{id}/files/{name}",
            put(upload_file::<G>).delete(delete_file::<G>),
        )
        .route("/files/{id}/{name}", get(download_file::<G>))
        .route("/classes/{id}/content", get(list_content::<G>))
        .route("/content/{id}", delete(delete_content::<G>))
        .route("/content/{id}/html", get(content_html::<G>))
        .route("/views", post(open_view::<G>))
        .route("/views/{id}", get(get_view::<G>).delete(close_view::<G>))
        .route("/views/{id}/reload", post(reload_view::<G>))
        .route("/views/{id}/generate", post(generate::<G>))
        .route("/views/{id}/generate-batch", post(generate_batch::<G>))
        .route("/views/{id}/flashcards", post(flashcard_action::<G>))
        .route("/views/{id}/quiz", post(quiz_action::<G>))
        .route("/statistics/{scope}", get(statistics::<G>));

    for kind in ContentKind::ALL {
        router = router.route(
            &format!("/api/{}", kind.endpoint()),
            post(move |State(state): State<AppState<G>>, body: Bytes| async move {
                generation_boundary(&state, kind, &body).await
            }),
        );
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// 启动服务，直到收到 Ctrl-C
pub async fn serve<G: GenerationService>(state: AppState<G>, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    log::info!("study-aid listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for shutdown signal: {}", e);
            }
            log::info!("study-aid shutting down");
        })
        .await
        .context("server error")
}

// ==================== 生成接口 ====================

/// 生成接口：`{fileContent}` → `{studyMaterial|flashCards|cribSheet}`
async fn generation_boundary<G>(state: &AppState<G>, kind: ContentKind, body: &[u8]) -> Response {
    let file_content = serde_json::from_slice::<GenerationRequestBody>(body)
        .ok()
        .map(|b| b.file_content)
        .filter(|c| !c.trim().is_empty());

    let Some(file_content) = file_content else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No file content provided" })),
        )
            .into_response();
    };

    match state.chat.generate(kind, file_content).await {
        Ok(content) => {
            let mut body = serde_json::Map::new();
            body.insert(kind.response_field().to_string(), Value::String(content));
            (StatusCode::OK, Json(Value::Object(body))).into_response()
        }
        Err(e) => {
            log::error!("generation endpoint failed for {}: {}", kind, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": kind.failure_message() })),
            )
                .into_response()
        }
    }
}

// ==================== 班级 ====================

async fn list_classes<G: GenerationService>(
    State(state): State<AppState<G>>,
    Query(query): Query<ClassQuery>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::list_classes(&state, query.user_id).await?))
}

async fn create_class<G: GenerationService>(
    State(state): State<AppState<G>>,
    Json(request): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, CommandError> {
    let class = commands::create_class(&state, request).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn update_class<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateClassRequest>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::update_class_color(&state, id, request).await?))
}

async fn delete_class<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, CommandError> {
    commands::delete_class(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== 文件 ====================

async fn list_files<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::list_files(&state, id).await?))
}

async fn upload_file<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path((id, name)): Path<(i64, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, CommandError> {
    let file = commands::upload_file(&state, id, &name, &body).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

async fn delete_file<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path((id, name)): Path<(i64, String)>,
) -> Result<StatusCode, CommandError> {
    commands::delete_file(&state, id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn download_file<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path((id, name)): Path<(i64, String)>,
) -> Result<impl IntoResponse, CommandError> {
    let bytes = commands::download_file(&state, id, &name).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&name))], bytes))
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

// ==================== 生成内容 ====================

async fn list_content<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<i64>,
    Query(query): Query<ContentQuery>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::list_content(&state, id, query.kind).await?))
}

async fn delete_content<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, CommandError> {
    commands::delete_content(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn content_html<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<i64>,
) -> Result<Html<String>, CommandError> {
    Ok(Html(commands::render_content_html(&state, id).await?))
}

// ==================== 学习视图 ====================

async fn open_view<G: GenerationService>(
    State(state): State<AppState<G>>,
    Json(request): Json<OpenViewRequest>,
) -> Result<impl IntoResponse, CommandError> {
    let view = commands::open_view(&state, request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_view<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::get_view(&state, id).await?))
}

async fn close_view<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CommandError> {
    commands::close_view(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_view<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::reload_view(&state, id).await?))
}

async fn generate<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
    Json(request): Json<GenerateRequest>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::generate_content(&state, id, request).await?))
}

async fn generate_batch<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
    Json(request): Json<BatchGenerateRequest>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::generate_batch(&state, id, request).await?))
}

async fn flashcard_action<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
    Json(request): Json<FlashcardActionRequest>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::flashcard_action(&state, id, request.action).await?))
}

async fn quiz_action<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(id): Path<Uuid>,
    Json(action): Json<QuizAction>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::quiz_action(&state, id, action).await?))
}

async fn statistics<G: GenerationService>(
    State(state): State<AppState<G>>,
    Path(scope): Path<String>,
) -> Result<impl IntoResponse, CommandError> {
    Ok(Json(commands::get_statistics(&state, &scope).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::test_state;
    use crate::services::orchestrator::tests::MockGenerator;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn app(dir: &TempDir) -> Router {
        router(test_state(dir, MockGenerator::default()))
    }

    #[tokio::test]
    async fn test_class_routes() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let (status, class) = send(&app, Method::POST, "/classes", Some(json!({ "name": "BIO" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(class["color"], "#ef4444");

        let id = class["id"].as_i64().unwrap();
        let (status, updated) = send(
            &app,
            Method::PATCH,
            &format!("/classes/{}", id),
            Some(json!({ "color": "#a855f7" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["color"], "#a855f7");

        let (_, classes) = send(&app, Method::GET, "/classes", None).await;
        assert_eq!(classes.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::DELETE, &format!("/classes/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, Method::DELETE, &format!("/classes/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_generation_boundary_errors() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let (status, _) = send(&app, Method::GET, "/api/generate-flash-cards", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, body) = send(&app, Method::POST, "/api/generate-flash-cards", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file content provided");

        // 未配置 API key 时生成失败
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/generate-study-material",
            Some(json!({ "fileContent": "bm90ZXM=" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to generate practice test");
    }

    #[tokio::test]
    async fn test_study_flow() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let (_, class) = send(&app, Method::POST, "/classes", Some(json!({ "name": "MATH" }))).await;
        let class_id = class["id"].as_i64().unwrap();

        let upload = Request::builder()
            .method(Method::PUT)
            .uri(format!("/classes/{}/files/week%201.txt", class_id))
            .body(Body::from("two plus two"))
            .unwrap();
        let response = app.clone().oneshot(upload).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let download = Request::builder()
            .uri(format!("/files/{}/week%201.txt", class_id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(download).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let (status, view) = send(&app, Method::POST, "/views", Some(json!({ "classId": class_id }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let view_id = view["viewId"].as_str().unwrap().to_string();
        assert_eq!(view["quizSession"]["phase"], "empty");

        let (status, outcome) = send(
            &app,
            Method::POST,
            &format!("/views/{}/generate", view_id),
            Some(json!({ "kind": "test", "fileName": "week 1.txt" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["applied"], true);

        let quiz = format!("/views/{}/quiz", view_id);
        let (_, selected) = send(&app, Method::POST, &quiz, Some(json!({ "type": "select", "label": "B" }))).await;
        assert_eq!(selected["event"]["correct"], true);

        let (_, done) = send(&app, Method::POST, &quiz, Some(json!({ "type": "next" }))).await;
        assert_eq!(done["event"]["type"], "completed");
        assert_eq!(done["statistics"]["cumulativeScore"], 1);

        let (status, _) = send(&app, Method::POST, &quiz, Some(json!({ "type": "next" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, stats) = send(&app, Method::GET, &format!("/statistics/class-{}", class_id), None).await;
        assert_eq!(stats, json!({ "flashcardsClicked": 0, "cumulativeScore": 1 }));

        let (_, content) = send(&app, Method::GET, &format!("/classes/{}/content?type=test", class_id), None).await;
        assert_eq!(content[0]["type"], "test");
    }

    #[tokio::test]
    async fn test_unknown_view_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let uri = format!("/views/{}/flashcards", Uuid::new_v4());
        let (status, body) = send(&app, Method::POST, &uri, Some(json!({ "action": "flip" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().starts_with("Study view"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("Lecture.PDF"), "application/pdf");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
