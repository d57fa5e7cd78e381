//! Explanation Agent
//!
//! Asks the reasoning capability for a plain-language account of what causes
//! the diagnosed disease, how it spreads and why it matters.

use serde::Deserialize;
use tracing::{info, warn};

use super::{ask_vision, StageContext, StageOutcome};
use crate::capabilities::{VisionRequest, VisionTask};
use crate::models::{DiagnosisResult, Explanation, ReportNotice, ReportSection};
use crate::utils::parse_model_json;

#[derive(Debug, Deserialize)]
struct ExplanationRaw {
    #[serde(default)]
    simple_summary: String,
    #[serde(default)]
    what_causes_it: String,
    #[serde(default)]
    how_it_spreads: String,
    #[serde(default)]
    favorable_conditions: Vec<String>,
    #[serde(default)]
    why_harmful: String,
}

pub struct ExplanationAgent;

impl ExplanationAgent {
    /// Explain a conclusive diagnosis. Never fails: problems degrade to an empty explanation.
    pub async fn explain(ctx: &StageContext<'_>, diagnosis: &DiagnosisResult) -> StageOutcome<Explanation> {
        info!(disease = %diagnosis.disease_name, crop = %diagnosis.crop, "Generating explanation");

        let request = VisionRequest {
            task: VisionTask::Explain,
            system: "You are an agricultural extension officer who explains plant diseases to farmers in simple, accurate language.".to_string(),
            prompt: Self::create_explanation_prompt(diagnosis),
            image: None,
        };

        let response = match ask_vision(ctx, &request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Explanation call failed, continuing without explanation");
                return StageOutcome::degraded(
                    Explanation::default(),
                    ReportNotice::new(
                        ReportSection::Explanation,
                        format!("Explanation unavailable: {}", e),
                    ),
                );
            }
        };

        match Self::parse_explanation(&response) {
            Some(explanation) => {
                info!(summary_len = explanation.summary.len(), "Explanation complete");
                StageOutcome::complete(explanation)
            }
            None => {
                warn!("Failed to parse explanation, keeping raw text as summary");
                let summary = response.trim().to_string();
                StageOutcome::degraded(
                    Explanation {
                        summary,
                        ..Explanation::default()
                    },
                    ReportNotice::new(
                        ReportSection::Explanation,
                        "Explanation was returned as unstructured text; cause and spread details are missing.",
                    ),
                )
            }
        }
    }

    fn create_explanation_prompt(diagnosis: &DiagnosisResult) -> String {
        let symptoms = if diagnosis.symptoms.is_empty() {
            "not listed".to_string()
        } else {
            diagnosis.symptoms.join("; ")
        };

        format!(r#"A {crop} plant has been diagnosed with {disease} (severity: {severity}).
Observed symptoms: {symptoms}

Explain this disease to a farmer with no scientific training.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "simple_summary": "Two or three sentences a farmer can act on",
  "what_causes_it": "The pathogen or condition responsible",
  "how_it_spreads": "How the disease moves between plants and fields",
  "favorable_conditions": ["Condition 1", "Condition 2"],
  "why_harmful": "Expected impact on yield or quality if untreated"
}}

Respond with ONLY the JSON object"#,
            crop = diagnosis.crop,
            disease = diagnosis.disease_name,
            severity = diagnosis.severity,
            symptoms = symptoms,
        )
    }

    fn parse_explanation(response: &str) -> Option<Explanation> {
        let raw: ExplanationRaw = parse_model_json(response, "explanation").ok()?;

        let explanation = Explanation {
            summary: raw.simple_summary.trim().to_string(),
            cause: raw.what_causes_it.trim().to_string(),
            spread: raw.how_it_spreads.trim().to_string(),
            favorable_conditions: raw
                .favorable_conditions
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            impact: raw.why_harmful.trim().to_string(),
        };

        if explanation.is_empty() {
            None
        } else {
            Some(explanation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    #[test]
    fn test_parse_explanation() {
        let response = r#"{"simple_summary": "A fungal disease of tomato leaves.", "what_causes_it": "Alternaria solani", "how_it_spreads": "Splashing water", "favorable_conditions": ["Warm weather", " ", "Wet leaves"], "why_harmful": "Defoliation lowers yield"}"#;
        let explanation = ExplanationAgent::parse_explanation(response).unwrap();
        assert_eq!(explanation.cause, "Alternaria solani");
        assert_eq!(explanation.favorable_conditions, vec!["Warm weather", "Wet leaves"]);
    }

    #[test]
    fn test_parse_rejects_empty_and_prose() {
        assert!(ExplanationAgent::parse_explanation("{}").is_none());
        assert!(ExplanationAgent::parse_explanation("It is a fungus.").is_none());
    }

    #[test]
    fn test_prompt_includes_diagnosis() {
        let diagnosis = DiagnosisResult {
            disease_name: "Late Blight".into(),
            crop: "Potato".into(),
            confidence: 0.8,
            severity: Severity::Severe,
            symptoms: vec!["Dark water-soaked lesions".into()],
            reasoning: String::new(),
        };
        let prompt = ExplanationAgent::create_explanation_prompt(&diagnosis);
        assert!(prompt.contains("Potato"));
        assert!(prompt.contains("Late Blight"));
        assert!(prompt.contains("Severe"));
        assert!(prompt.contains("Dark water-soaked lesions"));
    }
}
