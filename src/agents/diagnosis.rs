//! Diagnosis Agent
//!
//! Sends the leaf photograph to the vision capability and turns its answer
//! into a [`DiagnosisResult`]. The capability's free text is never trusted
//! as-is: confidence is normalised into [0, 1], severity is mapped onto the
//! fixed enum, and a "no disease" answer becomes the inconclusive sentinel.
//!
//! Only a capability outage is fatal here. An unreadable answer degrades to
//! the inconclusive sentinel so the request still yields a report.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{ask_vision, StageContext, StageOutcome};
use crate::capabilities::{VisionRequest, VisionTask};
use crate::models::{DiagnosisRequest, DiagnosisResult, ReportNotice, ReportSection, Severity};
use crate::types::{AppError, AppResult};
use crate::utils::parse_model_json;

const UNKNOWN_CROP: &str = "Unknown crop";

/// Names a capability uses when it sees nothing wrong
const NO_DISEASE_NAMES: [&str; 6] = ["", "unknown", "none", "healthy", "n/a", "no disease"];

/// Raw JSON response from the vision capability
#[derive(Debug, Deserialize)]
struct IdentificationRaw {
    #[serde(default = "default_true")]
    disease_detected: bool,
    #[serde(default)]
    disease_name: Option<String>,
    #[serde(default)]
    crop_type: Option<String>,
    #[serde(default)]
    confidence_score: Option<Value>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    visible_symptoms: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn default_true() -> bool {
    true
}

pub struct DiagnosisAgent;

impl DiagnosisAgent {
    /// Identify the disease shown in the request's photograph
    pub async fn identify(
        ctx: &StageContext<'_>,
        request: &DiagnosisRequest,
    ) -> AppResult<StageOutcome<DiagnosisResult>> {
        info!(
            image_bytes = request.image.len(),
            crop_hint = ?request.crop_hint,
            "Starting disease identification"
        );

        let vision_request = VisionRequest {
            task: VisionTask::Identify,
            system: "You are an expert plant pathologist. You identify crop diseases from leaf photographs and answer only with JSON.".to_string(),
            prompt: Self::create_identification_prompt(request.crop_hint.as_deref()),
            image: Some(request.image.clone()),
        };

        // Capability outages propagate: nothing downstream is meaningful without a diagnosis
        let response = match ask_vision(ctx, &vision_request).await {
            Ok(response) => response,
            Err(AppError::MalformedResponse(reason)) => {
                warn!(error = %reason, "Identification answer unusable, marking inconclusive");
                return Ok(Self::unreadable(request, &reason));
            }
            Err(e) => return Err(e),
        };

        match Self::parse_identification(&response, request.crop_hint.as_deref()) {
            Ok(result) => {
                info!(
                    disease = %result.disease_name,
                    crop = %result.crop,
                    confidence = result.confidence,
                    severity = %result.severity,
                    symptoms = result.symptoms.len(),
                    "Identification complete"
                );
                if result.is_inconclusive() {
                    Ok(StageOutcome::degraded(result, Self::inconclusive_notice()))
                } else {
                    Ok(StageOutcome::complete(result))
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse identification, marking inconclusive");
                Ok(Self::unreadable(request, &e.to_string()))
            }
        }
    }

    pub fn inconclusive_notice() -> ReportNotice {
        ReportNotice::new(
            ReportSection::Diagnosis,
            "Diagnosis inconclusive: no disease could be identified in the photo. Explanation and treatment research were skipped.",
        )
    }

    fn unreadable(request: &DiagnosisRequest, reason: &str) -> StageOutcome<DiagnosisResult> {
        let crop = request.crop_hint.clone().unwrap_or_else(|| UNKNOWN_CROP.to_string());
        StageOutcome {
            value: DiagnosisResult::inconclusive(crop, ""),
            notices: vec![
                Self::inconclusive_notice(),
                ReportNotice::new(
                    ReportSection::Diagnosis,
                    format!("The identification answer could not be read: {}", reason),
                ),
            ],
        }
    }

    fn create_identification_prompt(crop_hint: Option<&str>) -> String {
        let hint = match crop_hint {
            Some(crop) => format!("The farmer reports that this plant is: {crop}.\n"),
            None => String::new(),
        };

        format!(r#"Examine the attached photograph of a crop leaf and identify any disease.
{hint}
OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "disease_detected": true,
  "disease_name": "Common name of the disease, or \"unknown\" if none can be identified",
  "crop_type": "Crop species shown",
  "confidence_score": 0.0,
  "severity": "mild | moderate | severe",
  "visible_symptoms": ["Symptom 1", "Symptom 2"],
  "reasoning": "One or two sentences explaining the identification"
}}

IMPORTANT:
- confidence_score is a number between 0 and 1
- If the leaf looks healthy or the photo is unclear, set "disease_detected" to false
- List only symptoms that are actually visible in the photo
- Respond with ONLY the JSON object"#)
    }

    /// Validate the capability's answer at the boundary
    fn parse_identification(response: &str, crop_hint: Option<&str>) -> AppResult<DiagnosisResult> {
        let raw: IdentificationRaw = parse_model_json(response, "identification")?;

        let crop = raw
            .crop_type
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("unknown"))
            .or_else(|| crop_hint.map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_CROP.to_string());

        let reasoning = raw.reasoning.unwrap_or_default().trim().to_string();

        let disease_name = raw.disease_name.unwrap_or_default().trim().to_string();
        let names_nothing = NO_DISEASE_NAMES
            .iter()
            .any(|n| disease_name.eq_ignore_ascii_case(n));

        if !raw.disease_detected || names_nothing {
            return Ok(DiagnosisResult::inconclusive(crop, reasoning));
        }

        let confidence = match raw.confidence_score.as_ref().and_then(normalize_confidence) {
            Some(confidence) => confidence,
            None => {
                warn!(raw = ?raw.confidence_score, "Missing or invalid confidence, using 0.0");
                0.0
            }
        };

        let severity = match raw.severity.as_deref().and_then(Severity::parse) {
            Some(severity) => severity,
            None => {
                warn!(raw = ?raw.severity, "Unrecognised severity, using Moderate");
                Severity::Moderate
            }
        };

        let mut symptoms: Vec<String> = Vec::new();
        for symptom in raw.visible_symptoms {
            let symptom = symptom.trim().to_string();
            if !symptom.is_empty() && !symptoms.contains(&symptom) {
                symptoms.push(symptom);
            }
        }

        Ok(DiagnosisResult {
            disease_name,
            crop,
            confidence,
            severity,
            symptoms,
            reasoning,
        })
    }
}

/// Map a capability confidence (fraction, percentage or "92%") into [0, 1]
pub fn normalize_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            let (number, percent) = match trimmed.strip_suffix('%') {
                Some(stripped) => (stripped.trim(), true),
                None => (trimmed, false),
            };
            let parsed: f64 = number.parse().ok()?;
            if percent {
                parsed / 100.0
            } else {
                parsed
            }
        }
        _ => return None,
    };

    if !raw.is_finite() {
        return None;
    }

    let fraction = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(fraction.clamp(0.0, 1.0))
}
