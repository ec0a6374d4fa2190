//! Shared test fixtures
//!
//! `MockGoogle` is a local axum server standing in for every upstream the
//! service talks to: the compute metadata server, Secret Manager, the OAuth
//! token endpoint, Drive and the Messages API. Each test gets its own
//! instance on an ephemeral port.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use sudoku_common::{ParsedPuzzleResult, ScreenshotMetadata};
use sudoku_webhook::credentials::CredentialManager;
use sudoku_webhook::db::{ResultStore, StoreError};
use sudoku_webhook::drive::DriveClient;
use sudoku_webhook::inference::AnthropicClient;
use sudoku_webhook::pipeline::Pipeline;
use sudoku_webhook::secrets::{names, MemorySecretProvider, SecretProvider};
use sudoku_webhook::{build_router, AppState};

pub const WEBHOOK_KEY: &str = "test-webhook-key";
pub const CLAUDE_KEY: &str = "test-claude-key";
pub const DRIVE_TOKEN: &str = "drive-access-token";
pub const REFRESHED_TOKEN: &str = "refreshed-access-token";
pub const SERVICE_ACCOUNT_TOKEN: &str = "service-account-token";
pub const PROJECT_ID: &str = "test-project";
pub const CAPTURE_TIME: &str = "2024:01:15 10:30:00";

/// Completion for a Hard puzzle solved in 12:37
pub const HARD_REPLY: &str =
    "\n    \"difficulty_level\": \"Hard\",\n    \"time_to_solve\": \"12:37\"\n}";

type Shared = Arc<Mutex<MockState>>;

/// Upstream behaviour plus everything the service sent
pub struct MockState {
    pub screenshot: Vec<u8>,
    pub capture_time: Option<String>,
    pub drive_status: StatusCode,
    pub model_status: StatusCode,
    pub model_content: Value,
    pub token_status: StatusCode,
    pub token_reply: Value,
    pub metadata_available: bool,
    /// Secret Manager contents, every version oldest first
    pub secrets: HashMap<String, Vec<String>>,

    pub requests: Vec<String>,
    pub drive_bearers: Vec<String>,
    pub token_forms: Vec<HashMap<String, String>>,
    pub model_requests: Vec<RecordedModelRequest>,
}

#[derive(Debug, Clone)]
pub struct RecordedModelRequest {
    pub api_key: Option<String>,
    pub version: Option<String>,
    pub body: Value,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            screenshot: png_screenshot(),
            capture_time: Some(CAPTURE_TIME.to_string()),
            drive_status: StatusCode::OK,
            model_status: StatusCode::OK,
            model_content: json!([{ "type": "text", "text": HARD_REPLY }]),
            token_status: StatusCode::OK,
            token_reply: json!({
                "access_token": REFRESHED_TOKEN,
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/drive.readonly",
                "token_type": "Bearer"
            }),
            metadata_available: true,
            secrets: HashMap::new(),
            requests: Vec::new(),
            drive_bearers: Vec::new(),
            token_forms: Vec::new(),
            model_requests: Vec::new(),
        }
    }
}

pub struct MockGoogle {
    pub base_url: String,
    state: Shared,
}

impl MockGoogle {
    pub async fn start(state: MockState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/token",
                get(metadata_token),
            )
            .route("/computeMetadata/v1/project/project-id", get(metadata_project))
            .route(
                "/v1/projects/:project/secrets/:name/versions/:version",
                get(access_secret),
            )
            .route("/v1/projects/:project/secrets/:name", post(add_secret_version))
            .route("/token", post(token))
            .route("/drive/v3/files/:file_id", get(drive_file))
            .route("/v1/messages", post(messages))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn model_requests(&self) -> Vec<RecordedModelRequest> {
        self.state().model_requests.clone()
    }

    pub fn token_uri(&self) -> String {
        format!("{}/token", self.base_url)
    }
}

fn record(state: &Shared, line: String) {
    state.lock().unwrap().requests.push(line);
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn metadata_token(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record(&state, "GET metadata token".to_string());
    if headers.get("metadata-flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({
        "access_token": SERVICE_ACCOUNT_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer"
    }))
    .into_response()
}

async fn metadata_project(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record(&state, "GET metadata project-id".to_string());
    let available = state.lock().unwrap().metadata_available;
    if !available || headers.get("metadata-flavor").is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    PROJECT_ID.into_response()
}

async fn access_secret(
    State(state): State<Shared>,
    Path((project, name, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    record(&state, format!("GET secret {}", name));
    if bearer(&headers).as_deref() != Some(SERVICE_ACCOUNT_TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if project != PROJECT_ID || version != "latest:access" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let latest = state
        .lock()
        .unwrap()
        .secrets
        .get(&name)
        .and_then(|versions| versions.last().cloned());
    match latest {
        Some(value) => Json(json!({
            "name": format!("projects/{}/secrets/{}/versions/1", project, name),
            "payload": {
                "data": base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
            }
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "status": "NOT_FOUND" } })),
        )
            .into_response(),
    }
}

async fn add_secret_version(
    State(state): State<Shared>,
    Path((project, target)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(name) = target.strip_suffix(":addVersion") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    record(&state, format!("POST secret {}", name));
    if bearer(&headers).as_deref() != Some(SERVICE_ACCOUNT_TOKEN) || project != PROJECT_ID {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let data = body["payload"]["data"].as_str().unwrap_or_default();
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(data) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let value = String::from_utf8(bytes).unwrap();

    let mut guard = state.lock().unwrap();
    let versions = guard.secrets.entry(name.to_string()).or_default();
    versions.push(value);
    let version = versions.len();
    Json(json!({
        "name": format!("projects/{}/secrets/{}/versions/{}", project, name, version)
    }))
    .into_response()
}

async fn token(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    let mut guard = state.lock().unwrap();
    guard.requests.push("POST token".to_string());
    guard.token_forms.push(form);
    (guard.token_status, Json(guard.token_reply.clone())).into_response()
}

async fn drive_file(
    State(state): State<Shared>,
    Path(file_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut guard = state.lock().unwrap();
    let mode = if query.get("alt").map(String::as_str) == Some("media") {
        "media"
    } else {
        "metadata"
    };
    guard.requests.push(format!("GET drive {} {}", mode, file_id));
    if let Some(token) = bearer(&headers) {
        guard.drive_bearers.push(token);
    }

    if guard.drive_status != StatusCode::OK {
        return (
            guard.drive_status,
            Json(json!({ "error": { "code": guard.drive_status.as_u16(), "message": "File not found" } })),
        )
            .into_response();
    }

    if mode == "media" {
        return Response::builder()
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from(guard.screenshot.clone()))
            .unwrap();
    }

    let mut image_meta = json!({ "width": 16, "height": 16 });
    if let Some(time) = &guard.capture_time {
        image_meta["time"] = json!(time);
    }
    Json(json!({
        "kind": "drive#file",
        "id": file_id,
        "name": "Screenshot.png",
        "mimeType": "image/png",
        "imageMediaMetadata": image_meta
    }))
    .into_response()
}

async fn messages(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut guard = state.lock().unwrap();
    guard.requests.push("POST messages".to_string());
    guard.model_requests.push(RecordedModelRequest {
        api_key: header_value("x-api-key"),
        version: header_value("anthropic-version"),
        body,
    });

    if guard.model_status != StatusCode::OK {
        return (
            guard.model_status,
            Json(json!({ "type": "error", "error": { "type": "api_error", "message": "Overloaded" } })),
        )
            .into_response();
    }

    Json(json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-5-haiku-latest",
        "content": guard.model_content.clone(),
        "stop_reason": "end_turn"
    }))
    .into_response()
}

/// Small RGBA PNG, like a phone screenshot with an alpha channel
pub fn png_screenshot() -> Vec<u8> {
    let img = image::RgbaImage::from_fn(16, 16, |x, y| {
        image::Rgba([(x * 16) as u8, (y * 16) as u8, 128, 200])
    });
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

/// Drive credential JSON as stored in the secret store
pub fn drive_credential(token_uri: &str, token: Option<&str>, expires_in_minutes: i64) -> String {
    json!({
        "token": token,
        "refresh_token": "test-refresh-token",
        "token_uri": token_uri,
        "client_id": "test-client-id.apps.googleusercontent.com",
        "client_secret": "test-client-secret",
        "scopes": ["https://www.googleapis.com/auth/drive.readonly"],
        "universe_domain": "googleapis.com",
        "account": "",
        "expiry": (Utc::now() + Duration::minutes(expires_in_minutes)).to_rfc3339()
    })
    .to_string()
}

/// Records inserts instead of writing to Postgres
#[derive(Default)]
pub struct FakeResultStore {
    records: Mutex<Vec<(ParsedPuzzleResult, ScreenshotMetadata)>>,
}

impl FakeResultStore {
    pub fn records(&self) -> Vec<(ParsedPuzzleResult, ScreenshotMetadata)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultStore for FakeResultStore {
    async fn insert(
        &self,
        result: &ParsedPuzzleResult,
        metadata: &ScreenshotMetadata,
    ) -> Result<i64, StoreError> {
        let mut records = self.records.lock().unwrap();
        records.push((*result, *metadata));
        Ok(records.len() as i64)
    }
}

/// Fails every insert the way an unreachable database does
#[derive(Default)]
pub struct FailingResultStore {
    attempts: Mutex<usize>,
}

impl FailingResultStore {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl ResultStore for FailingResultStore {
    async fn insert(
        &self,
        _result: &ParsedPuzzleResult,
        _metadata: &ScreenshotMetadata,
    ) -> Result<i64, StoreError> {
        *self.attempts.lock().unwrap() += 1;
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

/// Router wired to a fresh `MockGoogle`, in-memory secrets and a fake store
pub struct TestApp {
    pub router: Router,
    pub mock: MockGoogle,
    pub secrets: Arc<MemorySecretProvider>,
    pub store: Arc<FakeResultStore>,
}

pub async fn test_app(mock_state: MockState) -> TestApp {
    let mock = MockGoogle::start(mock_state).await;
    let credential = drive_credential(&mock.token_uri(), Some(DRIVE_TOKEN), 60);
    test_app_with_credential(mock, &credential)
}

/// Like `test_app`, but inserts go to `result_store`; `TestApp::store` stays empty.
pub async fn test_app_with_store(
    mock_state: MockState,
    result_store: Arc<dyn ResultStore>,
) -> TestApp {
    let mock = MockGoogle::start(mock_state).await;
    let credential = drive_credential(&mock.token_uri(), Some(DRIVE_TOKEN), 60);
    build_app(mock, &credential, Some(result_store))
}

pub fn test_app_with_credential(mock: MockGoogle, credential: &str) -> TestApp {
    build_app(mock, credential, None)
}

fn build_app(
    mock: MockGoogle,
    credential: &str,
    result_store: Option<Arc<dyn ResultStore>>,
) -> TestApp {
    let secrets = Arc::new(
        MemorySecretProvider::new()
            .with_secret(names::WEBHOOK_API_KEY, WEBHOOK_KEY)
            .with_secret(names::CLAUDE_API_KEY, CLAUDE_KEY)
            .with_secret(names::GOOGLE_DRIVE_TOKEN, credential),
    );
    let provider: Arc<dyn SecretProvider> = secrets.clone();
    let store = Arc::new(FakeResultStore::default());

    let http = reqwest::Client::new();
    let credentials = Arc::new(CredentialManager::new(provider.clone(), http.clone()));
    let drive = DriveClient::new(http.clone(), credentials, &mock.base_url).unwrap();
    let extractor = AnthropicClient::new(
        http,
        provider.clone(),
        &mock.base_url,
        "claude-3-5-haiku-latest",
        100,
    );
    let result_store = result_store.unwrap_or_else(|| store.clone() as Arc<dyn ResultStore>);
    let pipeline = Pipeline::new(Arc::new(drive), Arc::new(extractor), result_store, 85);

    let router = build_router(AppState::new(provider, Arc::new(pipeline)));

    TestApp {
        router,
        mock,
        secrets,
        store,
    }
}
