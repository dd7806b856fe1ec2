use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use pavers_dashboard::{
    server::{create_router, AppState},
    Config, DashboardShell, ReportsClient,
};
use serde_json::{json, Value};

#[derive(Default)]
struct Backend {
    fail_uploads: AtomicBool,
    fetches: AtomicUsize,
    uploads: AtomicUsize,
}

type Shared = Arc<Backend>;

async fn list_reports(State(backend): State<Shared>) -> Json<Value> {
    backend.fetches.fetch_add(1, Ordering::SeqCst);
    Json(json!([{
        "id": 1,
        "type": "pothole",
        "severity": "high",
        "priority": "P1",
        "latitude": 12.97214,
        "longitude": 77.59331,
        "timestamp": "2024-01-01T00:00:00Z"
    }]))
}

async fn accept_report(State(backend): State<Shared>, mut multipart: Multipart) -> StatusCode {
    while let Ok(Some(field)) = multipart.next_field().await {
        let _ = field.bytes().await;
    }
    backend.uploads.fetch_add(1, Ordering::SeqCst);
    if backend.fail_uploads.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Starts a fake reports backend and a dashboard pointed at it.
async fn start() -> (Shared, String) {
    let backend: Shared = Arc::default();
    let api = Router::new()
        .route("/reports", get(list_reports))
        .route("/report", post(accept_report))
        .with_state(backend.clone());
    let api_url = serve(api).await;

    let config = Config {
        api_url,
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let client = Arc::new(ReportsClient::new(&config).unwrap());
    let shell = DashboardShell::mount(client, config);
    assert!(shell.settled(Duration::from_secs(5)).await);
    let dashboard = serve(create_router(AppState::new(shell))).await;
    (backend, dashboard)
}

fn upload_form(file_name: &str, mime: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(vec![0xff, 0xd8, 0xff])
        .file_name(file_name.to_string())
        .mime_str(mime)
        .unwrap();
    reqwest::multipart::Form::new()
        .part("image", part)
        .text("traffic_density", "high")
}

#[tokio::test]
async fn test_dashboard_page_lists_backend_report() {
    let (_backend, dashboard) = start().await;

    let page = reqwest::get(format!("{}/", dashboard))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(page.contains("Smart Pavers Dashboard"));
    assert!(page.contains("<td class=\"p-2\">pothole</td>"));
    assert!(page.contains("<td class=\"p-2\">12.9721, 77.5933</td>"));
    assert!(page.contains("<td class=\"p-2 font-bold text-red-500\">P1</td>"));
    assert!(page.contains("data-markers=\"1\""));
}

#[tokio::test]
async fn test_markers_endpoint_serves_one_marker_per_report() {
    let (_backend, dashboard) = start().await;

    let markers: Vec<Value> = reqwest::get(format!("{}/map/markers", dashboard))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0]["id"], 1);
    assert_eq!(markers[0]["latitude"], 12.97214);
    assert_eq!(markers[0]["popup"]["title"], "pothole");
    assert_eq!(markers[0]["popup"]["severity"], "high");
}

#[tokio::test]
async fn test_successful_upload_alerts_and_reloads() {
    let (backend, dashboard) = start().await;
    let fetches_before = backend.fetches.load(Ordering::SeqCst);

    let response = reqwest::Client::new()
        .post(format!("{}/upload", dashboard))
        .multipart(upload_form("road.jpg", "image/jpeg"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let notice = response.text().await.unwrap();

    assert!(notice.contains("File uploaded and processed successfully!"));
    assert!(notice.contains("window.location.replace('/')"));
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

    // The remount fetched again for both data panels.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.fetches.load(Ordering::SeqCst) >= fetches_before + 2);
}

#[tokio::test]
async fn test_failed_upload_alerts_without_reload() {
    let (backend, dashboard) = start().await;
    backend.fail_uploads.store(true, Ordering::SeqCst);

    let notice = reqwest::Client::new()
        .post(format!("{}/upload", dashboard))
        .multipart(upload_form("road.mp4", "video/mp4"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(notice.contains("Upload failed. Try again."));
    assert!(notice.contains("window.history.back()"));
    assert!(!notice.contains("location.replace"));
}

#[tokio::test]
async fn test_form_without_file_is_a_no_op() {
    let (backend, dashboard) = start().await;

    let form = reqwest::multipart::Form::new().text("traffic_density", "low");
    let response = reqwest::Client::new()
        .post(format!("{}/upload", dashboard))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_form_without_file_never_resends_a_failed_upload() {
    let (backend, dashboard) = start().await;
    backend.fail_uploads.store(true, Ordering::SeqCst);
    let http = reqwest::Client::new();

    let notice = http
        .post(format!("{}/upload", dashboard))
        .multipart(upload_form("a.jpg", "image/jpeg"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(notice.contains("Upload failed. Try again."));
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

    let response = http
        .post(format!("{}/upload", dashboard))
        .multipart(reqwest::multipart::Form::new().text("traffic_density", "low"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_file_part_is_treated_as_no_file() {
    let (backend, dashboard) = start().await;

    // What a browser sends when the file input was left empty.
    let part = reqwest::multipart::Part::bytes(Vec::new())
        .file_name("")
        .mime_str("application/octet-stream")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .part("image", part)
        .text("traffic_density", "");
    let response = reqwest::Client::new()
        .post(format!("{}/upload", dashboard))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_media_upload_is_rejected_before_the_backend() {
    let (backend, dashboard) = start().await;

    let response = reqwest::Client::new()
        .post(format!("{}/upload", dashboard))
        .multipart(upload_form("notes.txt", "text/plain"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let notice = response.text().await.unwrap();

    assert!(notice.contains("Upload failed. Try again."));
    assert!(notice.contains("text/plain"));
    assert!(notice.contains("window.history.back()"));
    assert!(!notice.contains("location.replace"));
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health_and_version() {
    let (_backend, dashboard) = start().await;

    let health: Value = reqwest::get(format!("{}/health", dashboard))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "pavers-dashboard");

    let version: Value = reqwest::get(format!("{}/version", dashboard))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["service"], "pavers-dashboard");
    assert!(version["version"].is_string());
}
