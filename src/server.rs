//! HTTP API server.
//!
//! Exposes the ingestion, query, and document-management pipeline as a
//! JSON API. All components (index, embedder, generator) are constructed
//! once at startup and handed to the handlers through shared state — no
//! module-level singletons.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents/upload` | Upload and index a document (multipart) |
//! | `POST` | `/query` | Ask a question over the indexed documents |
//! | `GET`  | `/documents` | List all documents |
//! | `GET`  | `/documents/{id}` | Document details |
//! | `DELETE` | `/documents/{id}` | Delete a document and its chunks |
//! | `PATCH` | `/documents/{id}` | Update tags/description |
//! | `GET`  | `/documents/{id}/content` | Reconstructed document text |
//! | `GET`  | `/documents/{id}/summary` | AI-generated summary |
//! | `POST` | `/documents/search` | Filtered/semantic document search |
//! | `GET`  | `/documents/stats/advanced` | Detailed index statistics |
//! | `GET`  | `/stats` | Index totals |
//! | `DELETE` | `/documents/reset` | Wipe the collection |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query too short" } }
//! ```
//!
//! Validation and format errors map to 400/413, unknown ids to 404,
//! provider failures to 503 with a user-facing hint, everything else
//! to 500.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::db;
use crate::embedding::{CachedEmbedder, EmbeddingProvider};
use crate::extract::ExtractError;
use crate::ingest::{ingest_bytes, IngestOutcome};
use crate::llm::{provider_error_hint, AnswerGenerator};
use crate::migrate;
use crate::models::DocumentInfo;
use crate::query::{answer_question, QueryOutcome};
use crate::store::{MetadataUpdate, VectorStore};
use crate::validate::ValidationError;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<VectorStore>,
    embedder: Arc<CachedEmbedder>,
    generator: Arc<AnswerGenerator>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Connects the index (creating the schema if missing), builds the
/// embedding and completion providers from config, and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(&config.storage.db_path).await?;
    migrate::create_schema(&pool).await?;
    let store = Arc::new(VectorStore::new(pool));

    let cache = EmbeddingCache::new(&config.storage.cache_dir)?;
    let provider = EmbeddingProvider::from_config(&config.embedding)?;
    let embedder = Arc::new(CachedEmbedder::new(
        provider,
        cache,
        config.embedding.batch_size,
    ));
    let generator = Arc::new(AnswerGenerator::from_config(&config.llm)?);

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        embedder,
        generator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Multipart bodies may carry up to the configured max file size.
    let body_limit = (config.limits.max_file_bytes as usize) + 64 * 1024;

    let app = Router::new()
        .route("/documents/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/documents", get(handle_list_documents))
        .route("/documents/search", post(handle_search_documents))
        .route("/documents/stats/advanced", get(handle_advanced_stats))
        .route("/documents/reset", delete(handle_reset))
        .route(
            "/documents/{id}",
            get(handle_get_document)
                .delete(handle_delete_document)
                .patch(handle_update_document),
        )
        .route("/documents/{id}/content", get(handle_get_content))
        .route("/documents/{id}/summary", get(handle_summary))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    tracing::info!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

fn provider_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "provider_error".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline failure to the most specific HTTP response: typed
/// validation and format errors first, then recognizable provider
/// failures, then a generic 500.
fn classify_error(err: anyhow::Error) -> AppError {
    if let Some(validation) = err.downcast_ref::<ValidationError>() {
        let status = match validation {
            ValidationError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        return AppError {
            status,
            code: "validation_error".to_string(),
            message: validation.to_string(),
        };
    }

    if let Some(extract) = err.downcast_ref::<ExtractError>() {
        let code = match extract {
            ExtractError::UnsupportedFormat(_) => "unsupported_format",
            ExtractError::Unreadable(_) => "unreadable_file",
            ExtractError::EmptyContent(_) => "empty_document",
        };
        return AppError {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            message: extract.to_string(),
        };
    }

    let message = err.to_string();
    if let Some(hint) = provider_error_hint(&message) {
        tracing::error!("provider failure: {}", message);
        return provider_unavailable(hint);
    }
    if message.contains("API error") {
        tracing::error!("provider failure: {}", message);
        return provider_unavailable("The AI service returned an error. Try again later.");
    }

    tracing::error!("internal error: {:#}", err);
    internal("An unexpected error occurred.")
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /documents/upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read file field: {}", e)))?;
                file_bytes = Some(bytes.to_vec());
            }
            "tags" => {
                let raw = field.text().await.unwrap_or_default();
                tags = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "description" => {
                let raw = field.text().await.unwrap_or_default();
                if !raw.trim().is_empty() {
                    description = Some(raw.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| bad_request("no file provided"))?;
    let filename = filename.ok_or_else(|| bad_request("file field has no filename"))?;

    let outcome = ingest_bytes(
        &state.config,
        &state.store,
        &state.embedder,
        &bytes,
        &filename,
        tags,
        description,
    )
    .await
    .map_err(classify_error)?;

    Ok(Json(outcome))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    3
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, AppError> {
    let outcome = answer_question(
        &state.config,
        &state.store,
        &state.embedder,
        &state.generator,
        &request.question,
        request.max_results,
    )
    .await
    .map_err(classify_error)?;

    match outcome {
        Some(outcome) => Ok(Json(outcome)),
        None => Err(not_found("no relevant documents found")),
    }
}

// ============ Document management ============

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentInfo>,
    total_count: usize,
}

async fn handle_list_documents(State(state): State<AppState>) -> Json<DocumentListResponse> {
    let documents = state.store.all_documents().await;
    let total_count = documents.len();
    Json(DocumentListResponse {
        documents,
        total_count,
    })
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentInfo>, AppError> {
    state
        .store
        .document_by_id(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("document not found"))
}

#[derive(Serialize)]
struct DocumentDeleteResponse {
    document_id: String,
    status: String,
    message: String,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDeleteResponse>, AppError> {
    if state.store.document_by_id(&id).await.is_none() {
        return Err(not_found("document not found"));
    }
    if !state.store.delete_document(&id).await {
        return Err(internal("document could not be deleted"));
    }
    Ok(Json(DocumentDeleteResponse {
        document_id: id,
        status: "success".to_string(),
        message: "document deleted".to_string(),
    }))
}

#[derive(Deserialize)]
struct DocumentUpdateRequest {
    tags: Option<Vec<String>>,
    description: Option<String>,
}

#[derive(Serialize)]
struct DocumentUpdateResponse {
    document_id: String,
    status: String,
    updated_fields: Vec<String>,
}

async fn handle_update_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DocumentUpdateRequest>,
) -> Result<Json<DocumentUpdateResponse>, AppError> {
    let updates = MetadataUpdate {
        tags: request.tags,
        description: request.description,
    };
    if updates.is_empty() {
        return Err(bad_request(ValidationError::NoUpdateFields.to_string()));
    }

    let mut updated_fields = Vec::new();
    if updates.tags.is_some() {
        updated_fields.push("tags".to_string());
    }
    if updates.description.is_some() {
        updated_fields.push("description".to_string());
    }

    match state.store.update_metadata(&id, &updates).await {
        Ok(true) => Ok(Json(DocumentUpdateResponse {
            document_id: id,
            status: "success".to_string(),
            updated_fields,
        })),
        Ok(false) => Err(not_found("document not found")),
        Err(e) => Err(classify_error(e)),
    }
}

#[derive(Serialize)]
struct ContentResponse {
    content: String,
}

async fn handle_get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContentResponse>, AppError> {
    state
        .store
        .document_content(&id)
        .await
        .map(|content| Json(ContentResponse { content }))
        .ok_or_else(|| not_found("content not found"))
}

// ============ GET /documents/{id}/summary ============

/// Content cap so summaries stay within the model context.
const SUMMARY_MAX_CHARS: usize = 10_000;

#[derive(Serialize)]
struct DocumentSummaryResponse {
    document_id: String,
    summary: String,
    model_used: String,
}

async fn handle_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentSummaryResponse>, AppError> {
    let content = state
        .store
        .document_content(&id)
        .await
        .ok_or_else(|| not_found("document not found"))?;

    let content = if content.chars().count() > SUMMARY_MAX_CHARS {
        let head: String = content.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{}... (content truncated)", head)
    } else {
        content
    };

    let answer = state
        .generator
        .summarize(&content)
        .await
        .map_err(classify_error)?;

    Ok(Json(DocumentSummaryResponse {
        document_id: id,
        summary: answer.text,
        model_used: state.generator.model_name().to_string(),
    }))
}

// ============ POST /documents/search ============

#[derive(Deserialize)]
struct DocumentSearchRequest {
    query: Option<String>,
    file_type: Option<String>,
    tags: Option<Vec<String>>,
}

async fn handle_search_documents(
    State(state): State<AppState>,
    Json(request): Json<DocumentSearchRequest>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let documents = match query {
        Some(query) => {
            let mut filters = Vec::new();
            if let Some(ref file_type) = request.file_type {
                filters.push(("file_type".to_string(), file_type.clone()));
            }

            let query_vec = state
                .embedder
                .embed_query(query)
                .await
                .map_err(classify_error)?;
            let hits = state
                .store
                .search_documents(Some(query_vec.as_slice()), &filters, 10)
                .await
                .map_err(classify_error)?;

            // Unique documents in score order, re-read for full metadata.
            let mut seen = Vec::new();
            let mut documents = Vec::new();
            for hit in &hits {
                let doc_id = &hit.chunk.document_id;
                if seen.contains(doc_id) {
                    continue;
                }
                seen.push(doc_id.clone());
                if let Some(doc) = state.store.document_by_id(doc_id).await {
                    documents.push(doc);
                }
            }
            documents
        }
        None => {
            let mut documents = state.store.all_documents().await;
            if let Some(ref file_type) = request.file_type {
                documents.retain(|d| &d.file_type == file_type);
            }
            if let Some(ref tags) = request.tags {
                documents.retain(|d| tags.iter().any(|t| d.tags.contains(t)));
            }
            documents
        }
    };

    let total_count = documents.len();
    Ok(Json(DocumentListResponse {
        documents,
        total_count,
    }))
}

// ============ Statistics ============

#[derive(Serialize)]
struct StatsResponse {
    total_documents: usize,
    total_chunks: i64,
    collection_name: String,
    model: String,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let total_chunks = state
        .store
        .chunk_count()
        .await
        .map_err(|_| internal("error accessing the vector index"))?;
    let total_documents = state.store.all_documents().await.len();

    Ok(Json(StatsResponse {
        total_documents,
        total_chunks,
        collection_name: state.config.storage.collection_name.clone(),
        model: state.generator.model_name().to_string(),
    }))
}

#[derive(Serialize)]
struct TagCount {
    tag: String,
    count: usize,
}

#[derive(Serialize)]
struct LargestDocument {
    filename: String,
    size_mb: f64,
}

#[derive(Serialize)]
struct AdvancedStatsResponse {
    total_documents: usize,
    total_chunks: i64,
    avg_chunks_per_doc: f64,
    file_type_distribution: HashMap<String, usize>,
    top_tags: Vec<TagCount>,
    largest_documents: Vec<LargestDocument>,
}

async fn handle_advanced_stats(State(state): State<AppState>) -> Json<AdvancedStatsResponse> {
    let documents = state.store.all_documents().await;
    let total_documents = documents.len();
    let total_chunks: i64 = documents.iter().map(|d| d.chunk_count).sum();
    let avg_chunks_per_doc = if total_documents > 0 {
        (total_chunks as f64 / total_documents as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let mut file_type_distribution: HashMap<String, usize> = HashMap::new();
    let mut tag_counts: HashMap<String, usize> = HashMap::new();
    for doc in &documents {
        *file_type_distribution
            .entry(doc.file_type.clone())
            .or_insert(0) += 1;
        for tag in &doc.tags {
            *tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    let mut top_tags: Vec<TagCount> = tag_counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    top_tags.sort_by(|a, b| b.count.cmp(&a.count).then(a.tag.cmp(&b.tag)));
    top_tags.truncate(10);

    let mut by_size = documents.clone();
    by_size.sort_by(|a, b| b.file_size_bytes.cmp(&a.file_size_bytes));
    let largest_documents = by_size
        .iter()
        .take(5)
        .map(|d| LargestDocument {
            filename: d.filename.clone(),
            size_mb: (d.file_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        })
        .collect();

    Json(AdvancedStatsResponse {
        total_documents,
        total_chunks,
        avg_chunks_per_doc,
        file_type_distribution,
        top_tags,
        largest_documents,
    })
}

// ============ DELETE /documents/reset ============

#[derive(Serialize)]
struct ResetResponse {
    message: String,
}

async fn handle_reset(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    state
        .store
        .delete_collection()
        .await
        .map_err(|e| internal(format!("reset failed: {}", e)))?;
    Ok(Json(ResetResponse {
        message: "index reset".to_string(),
    }))
}
