//! HTTP surface exercised through the router without binding a socket

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use crop_doctor::config::{Config, PipelineConfig, ReportConfig, SearchConfig, ServerConfig, VisionConfig};
use crop_doctor::{create_router, AppState};

use common::*;

const BOUNDARY: &str = "cropdoctorboundary";

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".into(),
            cors_allowed_origins: vec!["http://localhost:5173".into()],
        },
        vision: VisionConfig {
            base_url: "http://localhost".into(),
            api_key: "test-key".into(),
            vision_model: "vision".into(),
            reasoning_model: "reasoning".into(),
            max_tokens: 512,
        },
        search: SearchConfig {
            base_url: "http://localhost".into(),
            serper_api_key: String::new(),
            max_results: 8,
            country: "us".into(),
        },
        pipeline: PipelineConfig::default(),
        report: ReportConfig {
            output_dir: PathBuf::from("reports"),
            public_base_url: None,
            cache_capacity: 8,
        },
    }
}

fn app(vision: FakeVision) -> axum::Router {
    let pipeline = pipeline(&Arc::new(vision), &Arc::new(FakeSearch::with_hits()));
    create_router(AppState::new(test_config(), pipeline))
}

fn upload(image: &[u8], crop: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(crop) = crop {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"crop\"\r\n\r\n{crop}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"leaf.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/diagnose")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app(FakeVision::healthy_pipeline()).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["vision_configured"], true);
    assert_eq!(body["search_configured"], false);
    assert_eq!(body["cached_reports"], 0);
}

#[tokio::test]
async fn test_diagnose_then_download() {
    let app = app(FakeVision::healthy_pipeline());

    let response = app.clone().oneshot(upload(PNG_LEAF, Some("Tomato"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["report"]["diagnosis"]["disease_name"], "Early Blight");
    let id = body["report"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["pdf_url"], format!("/api/reports/{id}/pdf"));

    let response = app.clone().oneshot(get(&format!("/api/reports/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], id.as_str());

    let response = app.clone().oneshot(get(&format!("/api/reports/{id}/pdf"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains(&format!("report_{id}.pdf")));
    let pdf = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let response = app.oneshot(get(&format!("/api/reports/{id}/json"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], id.as_str());
}

#[tokio::test]
async fn test_unknown_report_is_404() {
    let response = app(FakeVision::healthy_pipeline())
        .oneshot(get("/api/reports/CROP_DIAG_missing/pdf"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_image_is_400() {
    let response = app(FakeVision::healthy_pipeline())
        .oneshot(upload(b"GIF89a not a leaf", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "InputRejected");
}

#[tokio::test]
async fn test_unreachable_vision_is_502() {
    let vision = FakeVision {
        identify: None,
        ..FakeVision::healthy_pipeline()
    };
    let response = app(vision).oneshot(upload(PNG_LEAF, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = json_body(response).await;
    assert_eq!(body["error"], "CapabilityUnavailable");
    assert!(body["message"].as_str().unwrap().contains("unreachable"));
}
