//! Core data model of a diagnosis session.
//!
//! Every artifact is produced once by its stage and never mutated afterwards;
//! later stages attach new artifacts to the report instead of overwriting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::DiagnosisPipeline;
use crate::config::Config;
use crate::report::ReportRegistry;
use crate::types::{AppError, AppResult};

/// Disease name used when the capability cannot identify anything
pub const UNKNOWN_DISEASE: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<DiagnosisPipeline>,
    pub reports: ReportRegistry,
}

impl AppState {
    pub fn new(config: Config, pipeline: DiagnosisPipeline) -> Self {
        let reports = ReportRegistry::new(config.report.cache_capacity);
        Self {
            config,
            pipeline: Arc::new(pipeline),
            reports,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn media_type(&self) -> String {
        match self {
            ImageFormat::Jpeg => mime::IMAGE_JPEG.to_string(),
            ImageFormat::Png => mime::IMAGE_PNG.to_string(),
            ImageFormat::Webp => "image/webp".to_string(),
        }
    }

    /// Detect the format from the leading magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

/// A validated leaf photograph
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    bytes: bytes::Bytes,
    format: ImageFormat,
}

impl ImagePayload {
    /// Validate raw upload bytes before any capability call is made
    pub fn from_bytes(bytes: impl Into<bytes::Bytes>, max_bytes: usize) -> AppResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AppError::InputRejected("image payload is empty".to_string()));
        }
        if bytes.len() > max_bytes {
            return Err(AppError::InputRejected(format!(
                "image is {} bytes, limit is {} bytes",
                bytes.len(),
                max_bytes
            )));
        }
        let format = ImageFormat::sniff(&bytes).ok_or_else(|| {
            AppError::InputRejected(
                "unsupported or corrupt image; use JPEG, PNG or WEBP".to_string(),
            )
        })?;
        Ok(Self { bytes, format })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
        BASE64.encode(&self.bytes)
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub image: ImagePayload,
    pub crop_hint: Option<String>,
}

impl DiagnosisRequest {
    pub fn new(image: ImagePayload, crop_hint: Option<String>) -> Self {
        let crop_hint = crop_hint
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Self { image, crop_hint }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Lenient parse of the capability's free-text severity
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "mild" | "low" | "minor" | "slight" => Some(Severity::Mild),
            "moderate" | "medium" | "intermediate" => Some(Severity::Moderate),
            "severe" | "high" | "critical" | "extreme" => Some(Severity::Severe),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Mild => write!(f, "Mild"),
            Severity::Moderate => write!(f, "Moderate"),
            Severity::Severe => write!(f, "Severe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub disease_name: String,
    pub crop: String,
    /// Always within [0.0, 1.0]
    pub confidence: f64,
    pub severity: Severity,
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl DiagnosisResult {
    /// Sentinel result for a photo in which no disease could be identified
    pub fn inconclusive(crop: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            disease_name: UNKNOWN_DISEASE.to_string(),
            crop: crop.into(),
            confidence: 0.0,
            severity: Severity::Mild,
            symptoms: Vec::new(),
            reasoning: reasoning.into(),
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.disease_name.eq_ignore_ascii_case(UNKNOWN_DISEASE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,
    pub cause: String,
    pub spread: String,
    pub favorable_conditions: Vec<String>,
    pub impact: String,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.cause.is_empty()
            && self.spread.is_empty()
            && self.favorable_conditions.is_empty()
            && self.impact.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentCategory {
    Chemical,
    Organic,
}

impl TreatmentCategory {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "chemical" | "synthetic" | "fungicide" | "bactericide" => Some(TreatmentCategory::Chemical),
            "organic" | "biological" | "natural" | "cultural" => Some(TreatmentCategory::Organic),
            _ => None,
        }
    }
}

impl std::fmt::Display for TreatmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreatmentCategory::Chemical => write!(f, "Chemical"),
            TreatmentCategory::Organic => write!(f, "Organic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentOption {
    pub name: String,
    pub category: TreatmentCategory,
    pub dosage: String,
    pub frequency: String,
    pub safety_notes: String,
    pub source: String,
    #[serde(default)]
    pub active_ingredient: String,
    #[serde(default)]
    pub application_method: String,
    #[serde(default)]
    pub timing: String,
    #[serde(default)]
    pub effectiveness: String,
}

impl TreatmentOption {
    /// Identity used for deduplication
    pub fn dedup_key(&self) -> (String, TreatmentCategory) {
        (self.name.trim().to_lowercase(), self.category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    Preparation,
    Application,
    Monitoring,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepPhase::Preparation => write!(f, "Preparation"),
            StepPhase::Application => write!(f, "Application"),
            StepPhase::Monitoring => write!(f, "Monitoring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionStep {
    pub number: u32,
    pub phase: StepPhase,
    pub title: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionSet {
    pub steps: Vec<InstructionStep>,
    pub prevention: Vec<String>,
    #[serde(default)]
    pub recommended_treatment: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub immediate_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportSection {
    Diagnosis,
    Explanation,
    Treatments,
    Instructions,
}

impl std::fmt::Display for ReportSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportSection::Diagnosis => write!(f, "Diagnosis"),
            ReportSection::Explanation => write!(f, "Explanation"),
            ReportSection::Treatments => write!(f, "Treatments"),
            ReportSection::Instructions => write!(f, "Instructions"),
        }
    }
}

/// Explicit flag on a section that is incomplete or was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportNotice {
    pub section: ReportSection,
    pub message: String,
}

impl ReportNotice {
    pub fn new(section: ReportSection, message: impl Into<String>) -> Self {
        Self {
            section,
            message: message.into(),
        }
    }
}

/// Counters collected while running the stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub search_hits: u32,
    pub rejected_treatments: u32,
    pub duplicate_treatments: u32,
}

/// Terminal, immutable aggregate of one diagnosis session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub diagnosis: DiagnosisResult,
    pub explanation: Explanation,
    pub treatments: Vec<TreatmentOption>,
    pub instructions: InstructionSet,
    pub notices: Vec<ReportNotice>,
    #[serde(default)]
    pub diagnostics: PipelineDiagnostics,
}

impl ReportRecord {
    pub fn is_degraded(&self) -> bool {
        !self.notices.is_empty()
    }

    pub fn notices_for(&self, section: ReportSection) -> impl Iterator<Item = &ReportNotice> {
        self.notices.iter().filter(move |n| n.section == section)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub vision_configured: bool,
    pub search_configured: bool,
    pub cached_reports: usize,
}

/// Body of a successful `POST /api/diagnose`
#[derive(Debug, Serialize)]
pub struct DiagnoseResponse {
    pub report: ReportRecord,
    pub pdf_url: String,
    pub json_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: crate::types::ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(&PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
    }

    #[test]
    fn test_image_payload_rejections() {
        let empty = ImagePayload::from_bytes(Vec::new(), 1024);
        assert!(matches!(empty, Err(AppError::InputRejected(_))));

        let too_big = ImagePayload::from_bytes(vec![0xFF; 2048], 1024);
        assert!(matches!(too_big, Err(AppError::InputRejected(_))));

        let text = ImagePayload::from_bytes(b"hello world".to_vec(), 1024);
        assert!(matches!(text, Err(AppError::InputRejected(_))));

        let png = ImagePayload::from_bytes(PNG_HEADER.to_vec(), 1024).unwrap();
        assert_eq!(png.format().media_type(), "image/png");
        assert_eq!(png.len(), 8);
    }

    #[test]
    fn test_crop_hint_is_trimmed() {
        let image = ImagePayload::from_bytes(PNG_HEADER.to_vec(), 1024).unwrap();
        assert_eq!(
            DiagnosisRequest::new(image.clone(), Some("  Tomato ".into())).crop_hint.as_deref(),
            Some("Tomato")
        );
        assert!(DiagnosisRequest::new(image, Some("   ".into())).crop_hint.is_none());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("Moderate"), Some(Severity::Moderate));
        assert_eq!(Severity::parse(" HIGH "), Some(Severity::Severe));
        assert_eq!(Severity::parse("low"), Some(Severity::Mild));
        assert_eq!(Severity::parse("catastrophic?"), None);
    }

    #[test]
    fn test_category_parse_and_dedup_key() {
        assert_eq!(TreatmentCategory::parse("Organic"), Some(TreatmentCategory::Organic));
        assert_eq!(TreatmentCategory::parse("fungicide"), Some(TreatmentCategory::Chemical));
        assert_eq!(TreatmentCategory::parse(""), None);

        let option = TreatmentOption {
            name: "  Neem Oil ".into(),
            category: TreatmentCategory::Organic,
            dosage: String::new(),
            frequency: String::new(),
            safety_notes: String::new(),
            source: String::new(),
            active_ingredient: String::new(),
            application_method: String::new(),
            timing: String::new(),
            effectiveness: String::new(),
        };
        assert_eq!(option.dedup_key(), ("neem oil".to_string(), TreatmentCategory::Organic));
    }

    #[test]
    fn test_inconclusive_sentinel() {
        let result = DiagnosisResult::inconclusive("Tomato", "leaf looks healthy");
        assert!(result.is_inconclusive());
        assert_eq!(result.confidence, 0.0);
        assert!(result.symptoms.is_empty());
    }
}
