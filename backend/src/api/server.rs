//! HTTP Server for the ipdrload API.
//!
//! Analysis is synchronous; processing is accepted after preflight and runs
//! as a background job whose progress is published on the log stream.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                                  |
//! |--------|-------------------|----------------------------------------------|
//! | GET    | `/health`         | Health check                                 |
//! | GET    | `/api/schema`     | Canonical schema definition                  |
//! | POST   | `/api/analyze`    | Upload a file, get a suggested mapping       |
//! | POST   | `/api/process`    | Confirm a mapping and start loading          |
//! | GET    | `/api/logs`       | SSE stream for real-time logs                |

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::AsyncWriteExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use super::logs::{JobLog, LOG_BROADCASTER};
use super::types::{
    analyze, error_response, preflight_rejection, AnalyzeResponse, ProcessRequest, ProcessResponse,
    TemplateMatch,
};
use crate::cache::MappingRegistry;
use crate::config::Config;
use crate::error::{PipelineError, PreflightError, ServerError};
use crate::mapping::MappingSuggester;
use crate::models::ColumnMapping;
use crate::parser::read_info;
use crate::schema;
use crate::sink::open_sink;
use crate::transform::{
    preflight, process_file, resolve_upload, sweep_uploads, StatisticsSnapshot, UploadedFile,
};

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

type ApiError = (StatusCode, Json<Value>);

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub suggester: MappingSuggester,
    pub registry: Arc<Mutex<MappingRegistry>>,
    /// Upload ids with a process job in flight
    claims: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            suggester: config.suggester(),
            registry: Arc::new(Mutex::new(MappingRegistry::with_dir(&config.template_dir))),
            claims: Arc::default(),
            config: Arc::new(config),
        }
    }

    /// Take exclusive ownership of an upload for one process request.
    fn claim(&self, file_id: &str) -> Option<UploadClaim> {
        let mut claims = self.claims.lock().ok()?;
        claims.insert(file_id.to_string()).then(|| UploadClaim {
            claims: Arc::clone(&self.claims),
            file_id: file_id.to_string(),
        })
    }
}

/// Marks an upload as taken; released on drop.
struct UploadClaim {
    claims: Arc<Mutex<HashSet<String>>>,
    file_id: String,
}

impl Drop for UploadClaim {
    fn drop(&mut self) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.remove(&self.file_id);
        }
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/schema", get(schema_definition))
        .route("/api/analyze", post(analyze_upload))
        .route("/api/process", post(process_upload))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), ServerError> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    match sweep_uploads(&config.upload_dir, Duration::from_secs(config.upload_ttl_secs)) {
        Ok(0) => {}
        Ok(n) => info!(removed = n, "removed stale uploads"),
        Err(e) => warn!(error = %e, "upload sweep failed"),
    }
    let port = config.port;
    let state = AppState::new(config);

    info!(
        collaborator = state.suggester.has_collaborator(),
        upload_dir = %state.config.upload_dir.display(),
        "starting server"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("ipdrload server running on http://localhost:{}", port);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ipdrload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "schema": "GET /api/schema",
            "analyze": "POST /api/analyze",
            "process": "POST /api/process",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn schema_definition() -> Json<schema::SchemaDefinition> {
    Json(schema::definition())
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(&message)))
}

fn internal(message: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&message)))
}

/// Stream the multipart `file` field into the upload directory
async fn store_upload(dir: &std::path::Path, multipart: &mut Multipart) -> Result<(String, UploadedFile), ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_id = Uuid::new_v4().to_string();
        let path = dir.join(format!("{}.csv", file_id));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| internal(format!("Cannot store upload: {}", e)))?;
        // Removed again if anything below fails
        let upload = UploadedFile::new(path);

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| bad_request(format!("Read error: {}", e)))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| internal(format!("Cannot store upload: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| internal(format!("Cannot store upload: {}", e)))?;

        return Ok((file_id, upload));
    }

    Err(bad_request("No file provided".to_string()))
}

/// Upload a file and return a suggested mapping
async fn analyze_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    tokio::fs::create_dir_all(&state.config.upload_dir)
        .await
        .map_err(|e| internal(format!("Cannot create upload dir: {}", e)))?;
    let (file_id, upload) = store_upload(&state.config.upload_dir, &mut multipart).await?;

    let path = upload.path().to_path_buf();
    let info = tokio::task::spawn_blocking(move || read_info(&path))
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| bad_request(e.to_string()))?;
    // The upload now waits for a process request
    upload.keep();

    let log = JobLog::new(file_id.clone());
    log.info(format!("Analyzing upload: {} columns", info.headers.len()));

    let template = {
        let registry = state
            .registry
            .lock()
            .map_err(|_| internal("Template registry unavailable".to_string()))?;
        TemplateMatch::best(&registry, &info.headers)
    };
    if let Some(t) = &template {
        log.info(format!("Compatible template found: {} ({:.0}% of columns)", t.name, t.score * 100.0));
    }

    let response = analyze(Some(file_id), info, &state.suggester, template).await;

    log.success(format!(
        "Suggested mapping ({}): {} fields mapped",
        response.mapping_source,
        response.suggested_mapping.mapped_count()
    ));
    for warning in &response.validation.warnings {
        log.warning(warning.clone());
    }

    Ok(Json(response))
}

/// Confirm a mapping; processing continues in the background
async fn process_upload(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<(StatusCode, Json<ProcessResponse>), ApiError> {
    let reject = |e: PreflightError| {
        let (status, body) = preflight_rejection(&e);
        (status, Json(body))
    };

    let path = resolve_upload(&state.config.upload_dir, &request.file_id).map_err(reject)?;
    let claim = state.claim(&request.file_id).ok_or_else(|| {
        let message = format!("Upload {} is already being processed", request.file_id);
        (StatusCode::CONFLICT, Json(error_response(&message)))
    })?;

    let mapping = request.mapping.clone();
    let checked = path.clone();
    let report = tokio::task::spawn_blocking(move || preflight(&checked, &mapping))
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(reject)?;

    let job_id = Uuid::new_v4().to_string();
    let warnings = report.validation.warnings.clone();
    let upload = UploadedFile::new(path);
    let job = run_job(state, job_id.clone(), upload, request.mapping, request.template_id);
    tokio::spawn(async move {
        job.await;
        drop(claim);
    });

    Ok((StatusCode::ACCEPTED, Json(ProcessResponse::accepted(job_id, warnings))))
}

/// Background transform-and-load for one upload
async fn run_job(
    state: AppState,
    job_id: String,
    upload: UploadedFile,
    mapping: ColumnMapping,
    template_id: Option<String>,
) {
    let log = JobLog::new(job_id);
    let config = &state.config;

    let outcome = match open_sink(config.load_command.as_deref(), &config.output, true).await {
        Ok(mut sink) => {
            process_file(upload.path(), mapping, &mut sink, config.pipeline_options(), &log).await
        }
        Err(source) => {
            log.error(format!("Cannot open sink: {}", source));
            Err(PipelineError::Sink {
                source,
                statistics: StatisticsSnapshot::default(),
            })
        }
    };

    if let Err(e) = upload.remove() {
        log.warning(format!("Failed to remove upload: {}", e));
    }

    if let Some(id) = template_id {
        let success = matches!(&outcome, Ok(stats) if stats.records_processed > 0);
        if let Ok(mut registry) = state.registry.lock() {
            if let Err(e) = registry.update_stats(&id, success) {
                log.warning(format!("Template stats not updated: {}", e));
            }
        }
    }

    match outcome {
        Ok(_) => log.success("Job finished"),
        Err(_) => log.error("Job aborted"),
    }
}
