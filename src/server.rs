use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::models::ImportFormat;
use crate::tracker::{Ingestor, Upload};

pub const ADVISOR_HEADER: &str = "x-advisor-id";
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[".csv", ".tsv", ".txt"];
const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xls", ".ods"];

pub struct AppState {
    pub ingestor: Ingestor,
}

#[derive(Serialize)]
struct GenericResponse {
    success: bool,
    message: String,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(GenericResponse {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

fn error_response(e: IngestError) -> Response {
    match &e {
        IngestError::NotFound { .. } => failure(StatusCode::NOT_FOUND, e.to_string()),
        _ => {
            error!("Import request failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Authentication is handled upstream; the advisor arrives as a header.
fn advisor_id(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(ADVISOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, format!("Missing {} header", ADVISOR_HEADER)))
}

pub fn validate_file_extension(file_name: &str) -> Result<(), String> {
    let ext = file_name
        .rfind('.')
        .map(|idx| file_name[idx..].to_lowercase())
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        Err("Spreadsheet files are not supported. Export the sheet as CSV and upload that.".to_string())
    } else {
        Err(format!("Invalid file type. Allowed: {}", ALLOWED_EXTENSIONS.join(", ")))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/bulk-import/wbr", post(upload_wbr_handler))
        .route("/bulk-import/mis", post(upload_mis_handler))
        .route("/bulk-import/history", get(history_handler))
        .route("/bulk-import/{id}", get(status_handler))
        .route("/bulk-import/{id}/errors", get(errors_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload_wbr_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    upload(state, headers, multipart, ImportFormat::Wbr).await
}

async fn upload_mis_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    upload(state, headers, multipart, ImportFormat::Mis).await
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Upload>, String> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(format!("Invalid multipart body: {}", e)),
        };
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Failed to read upload: {}", e))?;
        return Ok(Some(Upload::from_bytes(file_name, &data)));
    }
}

async fn upload(
    state: Arc<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
    format: ImportFormat,
) -> Response {
    let advisor = match advisor_id(&headers) {
        Ok(advisor) => advisor,
        Err(response) => return response,
    };
    info!("Upload of {} export for advisor {}", format, advisor);

    let upload = match read_file_field(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return failure(StatusCode::BAD_REQUEST, "No file uploaded"),
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };
    if let Err(message) = validate_file_extension(&upload.file_name) {
        warn!("Rejected upload {}: {}", upload.file_name, message);
        return failure(StatusCode::BAD_REQUEST, message);
    }

    match state.ingestor.ingest(&advisor, format, upload).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(e),
    }
}

async fn history_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let advisor = match advisor_id(&headers) {
        Ok(advisor) => advisor,
        Err(response) => return response,
    };
    match state.ingestor.get_history(&advisor).await {
        Ok(runs) => Json(runs).into_response(),
        Err(e) => error_response(e),
    }
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let advisor = match advisor_id(&headers) {
        Ok(advisor) => advisor,
        Err(response) => return response,
    };
    match state.ingestor.get_status(&id, &advisor).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(e),
    }
}

async fn errors_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let advisor = match advisor_id(&headers) {
        Ok(advisor) => advisor,
        Err(response) => return response,
    };
    match state.ingestor.get_errors(&id, &advisor).await {
        Ok(errors) => Json(errors).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("holdings.csv").is_ok());
        assert!(validate_file_extension("HOLDINGS.TSV").is_ok());
        assert!(validate_file_extension("mis.export.txt").is_ok());

        let err = validate_file_extension("book.xlsx").unwrap_err();
        assert!(err.contains("Spreadsheet"));
        let err = validate_file_extension("report.pdf").unwrap_err();
        assert_eq!(err, "Invalid file type. Allowed: .csv, .tsv, .txt");
        assert!(validate_file_extension("noextension").is_err());
    }

    #[test]
    fn test_advisor_header() {
        let mut headers = HeaderMap::new();
        assert!(advisor_id(&headers).is_err());

        headers.insert(ADVISOR_HEADER, HeaderValue::from_static("  "));
        assert!(advisor_id(&headers).is_err());

        headers.insert(ADVISOR_HEADER, HeaderValue::from_static(" adv-1 "));
        assert_eq!(advisor_id(&headers).ok().as_deref(), Some("adv-1"));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = error_response(IngestError::not_found("run-9"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = error_response(IngestError::Store(anyhow::anyhow!("disk full")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
