use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post, put},
};
use handlebars::Handlebars;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::bootstrap::{SeedPhase, seed_store};
use crate::config::Config;
use crate::downloader;
use crate::editor::{ERROR_MESSAGE, ERROR_TITLE, Editor, LOADING_TEXT};
use crate::error::{ExportError, StoreError};
use crate::grid::CommitOutcome;
use crate::record::Field;
use crate::saving;
use crate::store::RowKey;
use crate::validation::FieldErrors;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

pub struct AppState {
    editor: Mutex<Editor>,
    templates: Handlebars<'static>,
    row_height: u32,
}

impl AppState {
    pub fn new(editor: Editor, row_height: u32) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string("editor", include_str!("./templates/editor.hbs"))?;
        Ok(AppState {
            editor: Mutex::new(editor),
            templates,
            row_height,
        })
    }

    pub fn editor(&self) -> MutexGuard<'_, Editor> {
        self.editor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Deserialize)]
struct TitleUpdate {
    name: String,
}

#[derive(Deserialize)]
struct SearchUpdate {
    query: String,
}

#[derive(Deserialize)]
struct CellUpdate {
    field: String,
    value: String,
}

#[derive(Deserialize)]
struct WindowQuery {
    offset: Option<u64>,
    height: Option<u32>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Serialize)]
struct CellResponse {
    status: String,
    errors: FieldErrors,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CommitResponse {
    Committed { key: RowKey },
    Rejected { errors: FieldErrors },
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(StatusResponse {
            status: "error".to_string(),
            message: Some(message.into()),
        }),
    )
        .into_response()
}

fn ok_response() -> Response {
    Json(StatusResponse {
        status: "ok".to_string(),
        message: None,
    })
    .into_response()
}

fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::UnknownRow(key) => error_response(StatusCode::NOT_FOUND, format!("no row {}", key)),
        other => {
            error!("storage failure: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn parse_field(raw: &str) -> Result<Field, Response> {
    raw.parse::<Field>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_editor))
        .route("/api/state", get(get_state))
        .route("/api/title", put(update_title))
        .route("/api/window", get(get_window))
        .route("/api/search", put(update_search))
        .route("/api/search/toggle", post(toggle_search))
        .route("/api/rows/add", post(request_add_row))
        .route("/api/rows/:key", patch(update_cell))
        .route("/api/rows/:key/select", post(toggle_select))
        .route("/api/select_all", post(toggle_select_all))
        .route("/api/draft", patch(update_draft).delete(discard_draft))
        .route("/api/draft/commit", post(commit_draft))
        .route("/api/reload", post(reload))
        .route("/api/export", get(export_snapshot))
        .route("/api/export/csv", get(export_csv))
        .route("/api/export/xlsx", get(export_xlsx))
        .route("/api/import", post(import_snapshot))
        .nest_service(
            "/static",
            ServeDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        )
        .with_state(state)
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(config.open_store());
    let mut editor = Editor::from_config(store.clone(), &config);

    let must_seed = !config.no_seed && store.is_empty();
    if !must_seed {
        editor.set_seed_phase(SeedPhase::Abandoned);
    }

    let app_state = Arc::new(AppState::new(editor, config.row_height)?);

    if must_seed {
        let state = app_state.clone();
        let source = config.dataset_source();
        tokio::spawn(async move {
            seed_store(store, &source, |phase| state.editor().set_seed_phase(phase)).await;
        });
    }

    let ticker_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            ticker_state.editor().tick(Instant::now());
        }
    });

    let app = router(app_state);
    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_editor(State(state): State<Arc<AppState>>) -> Response {
    let title = state.editor().shell().title().to_string();
    let columns: Vec<_> = Field::ALL
        .iter()
        .map(|field| {
            serde_json::json!({
                "key": field.key(),
                "title": field.title(),
                "width": u32::from(field.width()) * 10,
            })
        })
        .collect();

    let data = serde_json::json!({
        "title": title,
        "columns": columns,
        "row_height": state.row_height,
        "loading_text": LOADING_TEXT,
        "error_title": ERROR_TITLE,
        "error_message": ERROR_MESSAGE,
    });

    match state.templates.render("editor", &data) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("template rendering failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.editor().view())
}

async fn update_title(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TitleUpdate>,
) -> Response {
    let mut editor = state.editor();
    match editor.edit_title(&payload.name) {
        Ok(()) => Json(editor.view()).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn get_window(
    Query(params): Query<WindowQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mut editor = state.editor();
    editor.tick(Instant::now());
    let grid = editor.grid_mut();
    if let Some(height) = params.height {
        grid.resize(height);
    }
    if let Some(offset) = params.offset {
        grid.scroll_to(offset);
    }
    Json(grid.render_window())
}

async fn update_search(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchUpdate>,
) -> Response {
    state.editor().edit_search(&payload.query);
    ok_response()
}

async fn toggle_search(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut editor = state.editor();
    editor.toggle_search();
    Json(editor.view())
}

async fn request_add_row(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut editor = state.editor();
    editor.press_add_row();
    editor.tick(Instant::now());
    Json(editor.grid().render_window())
}

async fn update_cell(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CellUpdate>,
) -> Response {
    let key = match key.parse::<RowKey>() {
        Ok(key) => key,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let field = match parse_field(&payload.field) {
        Ok(field) => field,
        Err(response) => return response,
    };

    match state.editor().grid_mut().edit_cell(key, field, &payload.value) {
        Ok(errors) => Json(CellResponse {
            status: "ok".to_string(),
            errors,
        })
        .into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn toggle_select(Path(key): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    match key.parse::<RowKey>() {
        Ok(key) => {
            let mut editor = state.editor();
            editor.grid_mut().toggle_select(key);
            Json(editor.grid().render_window()).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn toggle_select_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut editor = state.editor();
    editor.grid_mut().toggle_select_all();
    Json(editor.grid().render_window())
}

async fn update_draft(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CellUpdate>,
) -> Response {
    let field = match parse_field(&payload.field) {
        Ok(field) => field,
        Err(response) => return response,
    };
    if state.editor().grid_mut().edit_draft(field, &payload.value) {
        ok_response()
    } else {
        error_response(StatusCode::CONFLICT, "no row is being added")
    }
}

async fn commit_draft(State(state): State<Arc<AppState>>) -> Response {
    match state.editor().grid_mut().commit_draft() {
        Ok(CommitOutcome::Committed(key)) => Json(CommitResponse::Committed { key }).into_response(),
        Ok(CommitOutcome::Rejected(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(CommitResponse::Rejected { errors }),
        )
            .into_response(),
        Ok(CommitOutcome::NoDraft) => error_response(StatusCode::CONFLICT, "no row is being added"),
        Err(e) => store_error_response(e),
    }
}

async fn discard_draft(State(state): State<Arc<AppState>>) -> Response {
    state.editor().grid_mut().discard_draft();
    ok_response()
}

async fn reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut editor = state.editor();
    editor.reload();
    Json(editor.view())
}

/// File name for a download of the sheet `title`. Quotes, backslashes and
/// control characters cannot appear inside the quoted header value.
fn download_name(title: &str, extension: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    let stem = if stem.trim().is_empty() { "sheet" } else { stem.trim() };
    format!("{}.{}", stem, extension)
}

fn attachment(content_type: &'static str, title: &str, extension: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name(title, extension)),
            ),
        ],
        body,
    )
        .into_response()
}

fn export_failed(e: ExportError) -> Response {
    error!("export failed: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    let editor = state.editor();
    let csv = downloader::to_csv(editor.grid().displayed_rows());
    attachment("text/csv", editor.shell().title(), "csv", csv.into_bytes())
}

async fn export_xlsx(State(state): State<Arc<AppState>>) -> Response {
    let editor = state.editor();
    let title = editor.shell().title().to_string();
    match downloader::to_xlsx(&title, editor.grid().displayed_rows()) {
        Ok(bytes) => attachment(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            &title,
            "xlsx",
            bytes,
        ),
        Err(e) => export_failed(e),
    }
}

async fn export_snapshot(State(state): State<Arc<AppState>>) -> Response {
    let editor = state.editor();
    match saving::encode_snapshot(&editor.store().snapshot()) {
        Ok(bytes) => attachment(
            "application/gzip",
            editor.shell().title(),
            "json.gz",
            bytes,
        ),
        Err(e) => export_failed(e),
    }
}

async fn import_snapshot(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut file_data = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("snapshot") {
            match field.bytes().await {
                Ok(bytes) => file_data = bytes.to_vec(),
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            }
        }
    }

    if file_data.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No file data received");
    }

    let snapshot = match saving::decode_snapshot(&file_data) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Failed to load sheet: {}", e),
            );
        }
    };

    let mut editor = state.editor();
    if let Err(e) = editor.store().replace_all(snapshot) {
        return store_error_response(e);
    }
    editor.reload();
    info!("imported sheet with {} rows", editor.store().len());
    ok_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn download_names_are_safe_header_values() {
        assert_eq!(download_name("people", "csv"), "people.csv");
        assert_eq!(download_name("say \"hi\"\r\nX-Evil: 1", "csv"), "say _hi___X-Evil: 1.csv");
        assert_eq!(download_name("a\\b", "xlsx"), "a_b.xlsx");
        assert_eq!(download_name("  ", "json.gz"), "sheet.json.gz");

        let value = format!("attachment; filename=\"{}\"", download_name("x\ny", "csv"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn cell_edits_answer_with_errors_keyed_by_field() {
        let mut errors = FieldErrors::new();
        errors.insert(Field::Version, "Version must be a number".to_string());
        let body = serde_json::to_value(CellResponse {
            status: "ok".to_string(),
            errors,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": "ok", "errors": {"version": "Version must be a number"}})
        );
    }
}
