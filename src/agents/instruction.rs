//! Instruction Agent
//!
//! Synthesises one ordered application plan spanning all treatment options,
//! plus prevention guidance. With no treatments the plan is prevention-only.

use serde::Deserialize;
use tracing::{info, warn};

use super::{ask_vision, StageContext, StageOutcome};
use crate::capabilities::{VisionRequest, VisionTask};
use crate::models::{
    DiagnosisResult, InstructionSet, InstructionStep, ReportNotice, ReportSection, StepPhase, TreatmentOption,
};
use crate::types::AppResult;
use crate::utils::parse_model_json;

/// General crop hygiene used whenever tailored prevention advice is unavailable
const GENERAL_PREVENTION: [&str; 6] = [
    "Use disease-resistant varieties where available",
    "Maintain proper plant spacing so foliage dries quickly",
    "Water at the base of plants and avoid overhead irrigation",
    "Practice crop rotation with non-host crops",
    "Remove and destroy infected crop residue after harvest",
    "Disinfect tools after working with infected plants",
];

#[derive(Debug, Deserialize)]
struct InstructionsRaw {
    #[serde(default)]
    recommended_treatment: String,
    #[serde(default)]
    why_chosen: String,
    #[serde(default)]
    immediate_action: String,
    #[serde(default)]
    preparation_steps: Vec<StepRaw>,
    #[serde(default)]
    application_steps: Vec<StepRaw>,
    #[serde(default)]
    monitoring_steps: Vec<StepRaw>,
    #[serde(default)]
    prevention_tips: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StepRaw {
    #[serde(default)]
    title: String,
    #[serde(default)]
    instruction: String,
}

pub struct InstructionAgent;

impl InstructionAgent {
    /// Build the plan for a conclusive diagnosis. Never fails.
    pub async fn synthesize(
        ctx: &StageContext<'_>,
        diagnosis: &DiagnosisResult,
        treatments: &[TreatmentOption],
    ) -> StageOutcome<InstructionSet> {
        info!(
            disease = %diagnosis.disease_name,
            treatments = treatments.len(),
            "Synthesising application instructions"
        );

        let request = VisionRequest {
            task: VisionTask::Instruct,
            system: "You are an agronomist writing clear, safe, step-by-step field instructions for farmers.".to_string(),
            prompt: Self::create_instruction_prompt(diagnosis, treatments),
            image: None,
        };

        let parsed = match ask_vision(ctx, &request).await {
            Ok(response) => Self::parse_instructions(&response, !treatments.is_empty()),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(instructions) => {
                info!(
                    steps = instructions.steps.len(),
                    prevention = instructions.prevention.len(),
                    "Instructions complete"
                );
                StageOutcome::complete(instructions)
            }
            Err(e) => {
                warn!(error = %e, "Instruction synthesis failed, using general prevention advice");
                StageOutcome::degraded(
                    Self::general_care(diagnosis),
                    ReportNotice::new(
                        ReportSection::Instructions,
                        format!(
                            "Step-by-step instructions unavailable ({}); showing general prevention advice only.",
                            e
                        ),
                    ),
                )
            }
        }
    }

    /// Prevention-only plan that needs no capability call
    pub fn general_care(diagnosis: &DiagnosisResult) -> InstructionSet {
        let immediate_action = if diagnosis.is_inconclusive() {
            "No disease was identified. If symptoms persist, retake a clear, close-up photo of the affected leaves in good light.".to_string()
        } else {
            format!(
                "Isolate or remove visibly infected {} leaves and follow local extension guidance for {}.",
                diagnosis.crop.to_lowercase(),
                diagnosis.disease_name
            )
        };

        InstructionSet {
            steps: Vec::new(),
            prevention: GENERAL_PREVENTION.iter().map(|t| t.to_string()).collect(),
            recommended_treatment: String::new(),
            rationale: String::new(),
            immediate_action,
        }
    }

    fn create_instruction_prompt(diagnosis: &DiagnosisResult, treatments: &[TreatmentOption]) -> String {
        let header = format!(
            "Disease: {}\nCrop: {}\nSeverity: {}\n",
            diagnosis.disease_name, diagnosis.crop, diagnosis.severity
        );

        if treatments.is_empty() {
            return format!(r#"{header}
No treatment products were found for this disease.
Give the farmer prevention guidance only.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "immediate_action": "The single most urgent thing to do today",
  "prevention_tips": ["Tip 1", "Tip 2", "Tip 3"]
}}

Respond with ONLY the JSON object"#);
        }

        let mut options = String::new();
        for (i, t) in treatments.iter().enumerate() {
            options.push_str(&format!(
                "{}. {} ({}) - dosage: {}; frequency: {}; method: {}; safety: {}\n",
                i + 1,
                t.name,
                t.category,
                or_unknown(&t.dosage),
                or_unknown(&t.frequency),
                or_unknown(&t.application_method),
                or_unknown(&t.safety_notes),
            ));
        }

        format!(r#"{header}
AVAILABLE TREATMENTS:
{options}
Write ONE coherent plan that covers all of the treatments above (which to prepare,
how to apply them, how to alternate or combine them safely, and how to monitor
progress), plus prevention advice for future seasons.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "recommended_treatment": "Name of the treatment to start with",
  "why_chosen": "Why that treatment comes first",
  "immediate_action": "The single most urgent thing to do today",
  "preparation_steps": [{{"title": "Short title", "instruction": "What to do"}}],
  "application_steps": [{{"title": "Short title", "instruction": "What to do"}}],
  "monitoring_steps": [{{"title": "Short title", "instruction": "What to do"}}],
  "prevention_tips": ["Tip 1", "Tip 2", "Tip 3"]
}}

Respond with ONLY the JSON object"#)
    }

    fn parse_instructions(response: &str, with_steps: bool) -> AppResult<InstructionSet> {
        let raw: InstructionsRaw = parse_model_json(response, "instructions")?;

        let mut steps = Vec::new();
        if with_steps {
            let phases = [
                (StepPhase::Preparation, raw.preparation_steps),
                (StepPhase::Application, raw.application_steps),
                (StepPhase::Monitoring, raw.monitoring_steps),
            ];
            for (phase, phase_steps) in phases {
                for step in phase_steps {
                    let instruction = step.instruction.trim().to_string();
                    if instruction.is_empty() {
                        continue;
                    }
                    steps.push(InstructionStep {
                        number: steps.len() as u32 + 1,
                        phase,
                        title: step.title.trim().to_string(),
                        instruction,
                    });
                }
            }
        }

        let mut prevention: Vec<String> = raw
            .prevention_tips
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if prevention.is_empty() {
            prevention = GENERAL_PREVENTION.iter().map(|t| t.to_string()).collect();
        }

        Ok(InstructionSet {
            steps,
            prevention,
            recommended_treatment: raw.recommended_treatment.trim().to_string(),
            rationale: raw.why_chosen.trim().to_string(),
            immediate_action: raw.immediate_action.trim().to_string(),
        })
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "not specified"
    } else {
        value
    }
}
