use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    client::{ReportsApi, UploadFile, TRAFFIC_DENSITY_FIELD, UPLOAD_FIELD},
    panels::{upload::UPLOAD_FAILED, Marker, Page, SubmitOutcome},
    render::html::{render_dashboard, render_notice, MARKERS_ROUTE, UPLOAD_ROUTE},
    shell::DashboardShell,
};

/// Videos from a phone easily exceed axum's 2 MB default.
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

pub struct AppState<C: ReportsApi> {
    shell: Arc<tokio::sync::Mutex<DashboardShell<C>>>,
}

impl<C: ReportsApi> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            shell: self.shell.clone(),
        }
    }
}

impl<C: ReportsApi> AppState<C> {
    pub fn new(shell: DashboardShell<C>) -> Self {
        Self {
            shell: Arc::new(tokio::sync::Mutex::new(shell)),
        }
    }
}

pub fn create_router<C: ReportsApi>(state: AppState<C>) -> Router {
    Router::new()
        .route("/", get(index::<C>))
        .route(MARKERS_ROUTE, get(markers::<C>))
        .route(UPLOAD_ROUTE, post(upload::<C>))
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

/// GET / - every page load remounts the dashboard.
async fn index<C: ReportsApi>(State(state): State<AppState<C>>) -> Html<String> {
    let mut shell = state.shell.lock().await;
    shell.reload();
    let timeout = shell.config().request_timeout;
    if !shell.settled(timeout).await {
        tracing::warn!("reports did not arrive within {:?}; rendering what we have", timeout);
    }
    Html(render_dashboard(&shell.view()))
}

/// GET /map/markers
async fn markers<C: ReportsApi>(State(state): State<AppState<C>>) -> Json<Vec<Marker>> {
    let shell = state.shell.lock().await;
    Json(shell.map().markers())
}

/// Alerts and reloads raised while handling one form post.
#[derive(Default)]
struct BrowserPage {
    alerts: Mutex<Vec<String>>,
    reload: AtomicBool,
}

impl Page for BrowserPage {
    fn alert(&self, message: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(message.to_string());
        }
    }

    fn reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }
}

impl BrowserPage {
    fn into_response(self) -> Response {
        let reload = self.reload.load(Ordering::SeqCst);
        let alerts = self.alerts.into_inner().unwrap_or_default();
        Html(render_notice(&alerts, reload)).into_response()
    }
}

struct UploadForm {
    file: Option<UploadFile>,
    traffic_density: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, String> {
    let mut form = UploadForm {
        file: None,
        traffic_density: None,
    };
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(UPLOAD_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                let file = UploadFile::new(file_name, content_type, bytes.to_vec())
                    .map_err(|e| e.to_string())?;
                form.file = Some(file);
            }
            Some(TRAFFIC_DENSITY_FIELD) => {
                let value = field.text().await.map_err(|e| e.to_string())?;
                form.traffic_density = Some(value);
            }
            _ => {}
        }
    }
    Ok(form)
}

/// POST /upload
async fn upload<C: ReportsApi>(
    State(state): State<AppState<C>>,
    multipart: Multipart,
) -> Response {
    let page = BrowserPage::default();
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!("rejected upload form: {}", e);
            page.alert(&format!("{} ({})", UPLOAD_FAILED, e));
            return page.into_response();
        }
    };

    let mut shell = state.shell.lock().await;
    match form.file {
        Some(file) => {
            if let Err(e) = shell.select_upload(file, form.traffic_density) {
                page.alert(&format!("{} ({})", UPLOAD_FAILED, e));
                return page.into_response();
            }
        }
        // The shell is shared between browsers: a file kept after someone's
        // failed upload must not go out with this request.
        None => shell.clear_upload(),
    }

    match shell.submit_upload(&page).await {
        // Nothing to send: leave the browser where it is.
        SubmitOutcome::NothingSelected => StatusCode::NO_CONTENT.into_response(),
        SubmitOutcome::Submitted | SubmitOutcome::Failed => page.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    time: String,
}

async fn health() -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        time: chrono::Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(response))
}

fn build_version() -> &'static str {
    option_env!("PAVERS_BUILD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

fn git_sha() -> &'static str {
    option_env!("PAVERS_GIT_SHA").unwrap_or("")
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: String,
    version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    git_sha: String,
}

async fn version() -> (StatusCode, Json<VersionResponse>) {
    let response = VersionResponse {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: build_version().to_string(),
        git_sha: git_sha().to_string(),
    };
    (StatusCode::OK, Json(response))
}
