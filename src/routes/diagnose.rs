use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json as ResponseJson, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::models::{AppState, DiagnoseResponse, DiagnosisRequest, ImagePayload, ReportRecord};
use crate::report::{JsonExporter, PdfExporter, ReportExporter};
use crate::types::{AppError, AppResult};

/// Multipart framing on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.pipeline.max_image_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/api/diagnose", post(diagnose).layer(DefaultBodyLimit::max(body_limit)))
        .route("/api/reports/{id}", get(get_report))
        .route("/api/reports/{id}/pdf", get(download_pdf))
        .route("/api/reports/{id}/json", get(download_json))
        .with_state(state)
}

/// POST /api/diagnose - multipart `image` plus optional `crop`
async fn diagnose(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ResponseJson<DiagnoseResponse>, AppError> {
    let request = read_upload(multipart, state.config.pipeline.max_image_bytes).await?;
    info!(
        image_bytes = request.image.len(),
        format = ?request.image.format(),
        crop_hint = ?request.crop_hint,
        "Diagnosis request received"
    );

    let record = state.pipeline.run(&request).await?;
    let record = state.reports.insert(record).await;

    Ok(Json(DiagnoseResponse {
        pdf_url: format!("/api/reports/{}/pdf", record.id),
        json_url: format!("/api/reports/{}/json", record.id),
        report: record.as_ref().clone(),
    }))
}

async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> AppResult<DiagnosisRequest> {
    let mut image = None;
    let mut crop = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InputRejected(format!("invalid upload: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InputRejected(format!("could not read image: {}", e)))?;
                image = Some(bytes);
            }
            Some("crop") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InputRejected(format!("could not read crop: {}", e)))?;
                crop = Some(text);
            }
            _ => {}
        }
    }

    let bytes = image.ok_or_else(|| AppError::InputRejected("no image was uploaded".to_string()))?;
    let image = ImagePayload::from_bytes(bytes, max_bytes)?;
    Ok(DiagnosisRequest::new(image, crop))
}

/// GET /api/reports/{id}
async fn get_report(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.reports.get(&id).await {
        Some(record) => Json(record.as_ref().clone()).into_response(),
        None => not_found(&id),
    }
}

/// GET /api/reports/{id}/pdf
async fn download_pdf(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.reports.get(&id).await else {
        return not_found(&id);
    };
    let exporter = PdfExporter::new(state.config.report.public_base_url.clone());
    download(exporter, record).await
}

/// GET /api/reports/{id}/json
async fn download_json(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.reports.get(&id).await else {
        return not_found(&id);
    };
    download(JsonExporter, record).await
}

async fn download<E>(exporter: E, record: Arc<ReportRecord>) -> Response
where
    E: ReportExporter + 'static,
{
    let rendered = tokio::task::spawn_blocking(move || {
        let bytes = exporter.export(&record)?;
        Ok::<_, AppError>((exporter.content_type(), exporter.file_name(&record), bytes))
    })
    .await
    .map_err(|e| AppError::Export(format!("export task failed: {}", e)));

    match rendered {
        Ok(Ok((content_type, file_name, bytes))) => (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
            ],
            bytes,
        )
            .into_response(),
        Ok(Err(e)) | Err(e) => e.into_response(),
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "NotFound",
            "message": format!("No report with id {}", id),
        })),
    )
        .into_response()
}
