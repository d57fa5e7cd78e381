//! Report Assembly
//!
//! Aggregates the stage outputs into the immutable [`ReportRecord`], and
//! hands finished records to the exporters (PDF and JSON).
//!
//! Assembly performs no external calls. It only assigns the identifier and
//! timestamp, and validates the record invariant:
//!
//! - confidence is finite and inside [0, 1]
//! - an inconclusive diagnosis has confidence 0.0 and carries a notice
//! - treatments have names and are unique by (name, category)
//! - instruction steps are numbered contiguously from 1

pub mod export;
pub mod pdf;
pub mod qr;
pub mod registry;

pub use export::{import_json, write_exports, JsonExporter, ReportExporter};
pub use pdf::PdfExporter;
pub use qr::QrMatrix;
pub use registry::ReportRegistry;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::agents::DiagnosisAgent;
use crate::models::{
    DiagnosisResult, Explanation, InstructionSet, PipelineDiagnostics, ReportNotice, ReportRecord, ReportSection,
    TreatmentOption,
};
use crate::types::{AppError, AppResult};

/// Everything the stages produced for one request
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutputs {
    pub diagnosis: DiagnosisResult,
    pub explanation: Explanation,
    pub treatments: Vec<TreatmentOption>,
    pub instructions: InstructionSet,
    pub notices: Vec<ReportNotice>,
    pub diagnostics: PipelineDiagnostics,
}

/// `CROP_DIAG_<timestamp>_<random suffix>`
pub fn generate_report_id(created_at: DateTime<Utc>) -> String {
    format!(
        "CROP_DIAG_{}_{:016x}",
        created_at.format("%Y%m%d%H%M%S"),
        rand::random::<u64>()
    )
}

/// Assemble with a fresh identifier and the current time
pub fn assemble_report(outputs: StageOutputs) -> AppResult<ReportRecord> {
    let created_at = Utc::now();
    assemble_report_with(outputs, generate_report_id(created_at), created_at)
}

/// Deterministic assembly with an injected identifier and timestamp
pub fn assemble_report_with(
    outputs: StageOutputs,
    id: String,
    created_at: DateTime<Utc>,
) -> AppResult<ReportRecord> {
    let StageOutputs {
        diagnosis,
        explanation,
        treatments,
        instructions,
        mut notices,
        diagnostics,
    } = outputs;

    if diagnosis.is_inconclusive()
        && !notices.iter().any(|n| n.section == ReportSection::Diagnosis)
    {
        notices.insert(0, DiagnosisAgent::inconclusive_notice());
    }

    let record = ReportRecord {
        id,
        created_at,
        diagnosis,
        explanation,
        treatments,
        instructions,
        notices,
        diagnostics,
    };

    validate_record(&record)?;
    Ok(record)
}

/// Check a record against the report invariant
pub fn validate_record(record: &ReportRecord) -> AppResult<()> {
    if record.id.trim().is_empty() {
        return Err(AppError::ValidationFailure("report id is empty".to_string()));
    }

    let diagnosis = &record.diagnosis;
    if diagnosis.disease_name.trim().is_empty() {
        return Err(AppError::ValidationFailure("diagnosis has no disease name".to_string()));
    }
    if !diagnosis.confidence.is_finite() || !(0.0..=1.0).contains(&diagnosis.confidence) {
        return Err(AppError::ValidationFailure(format!(
            "confidence {} is outside [0, 1]",
            diagnosis.confidence
        )));
    }
    if diagnosis.is_inconclusive() {
        if diagnosis.confidence != 0.0 {
            return Err(AppError::ValidationFailure(
                "inconclusive diagnosis must have confidence 0.0".to_string(),
            ));
        }
        if !record.treatments.is_empty() {
            return Err(AppError::ValidationFailure(
                "inconclusive diagnosis must not carry treatments".to_string(),
            ));
        }
    }

    let mut keys = HashSet::new();
    for treatment in &record.treatments {
        if treatment.name.trim().is_empty() {
            return Err(AppError::ValidationFailure("treatment without a name".to_string()));
        }
        if !keys.insert(treatment.dedup_key()) {
            return Err(AppError::ValidationFailure(format!(
                "duplicate treatment '{}' ({})",
                treatment.name, treatment.category
            )));
        }
    }

    for (index, step) in record.instructions.steps.iter().enumerate() {
        if step.number as usize != index + 1 {
            return Err(AppError::ValidationFailure(format!(
                "instruction step {} is numbered {}",
                index + 1,
                step.number
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstructionStep, Severity, StepPhase, TreatmentCategory};
    use chrono::TimeZone;

    fn outputs() -> StageOutputs {
        StageOutputs {
            diagnosis: DiagnosisResult {
                disease_name: "Early Blight".into(),
                crop: "Tomato".into(),
                confidence: 0.92,
                severity: Severity::Moderate,
                symptoms: vec!["Concentric rings".into()],
                reasoning: String::new(),
            },
            explanation: Explanation::default(),
            treatments: vec![TreatmentOption {
                name: "Copper Hydroxide".into(),
                category: TreatmentCategory::Chemical,
                dosage: "2 g/L".into(),
                frequency: "Every 7 days".into(),
                safety_notes: "Gloves".into(),
                source: String::new(),
                active_ingredient: String::new(),
                application_method: String::new(),
                timing: String::new(),
                effectiveness: String::new(),
            }],
            instructions: InstructionSet {
                steps: vec![InstructionStep {
                    number: 1,
                    phase: StepPhase::Application,
                    title: "Spray".into(),
                    instruction: "Spray both sides".into(),
                }],
                prevention: vec!["Rotate crops".into()],
                ..InstructionSet::default()
            },
            notices: vec![],
            diagnostics: PipelineDiagnostics::default(),
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let a = assemble_report_with(outputs(), "CROP_DIAG_fixed".into(), fixed_time()).unwrap();
        let b = assemble_report_with(outputs(), "CROP_DIAG_fixed".into(), fixed_time()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let now = fixed_time();
        let a = generate_report_id(now);
        let b = generate_report_id(now);
        assert!(a.starts_with("CROP_DIAG_20260314093000_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let mut bad = outputs();
        bad.diagnosis.confidence = 1.5;
        let err = assemble_report_with(bad, "id".into(), fixed_time()).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailure(_)));
    }

    #[test]
    fn test_rejects_duplicate_treatments() {
        let mut bad = outputs();
        let dup = bad.treatments[0].clone();
        bad.treatments.push(dup);
        assert!(assemble_report_with(bad, "id".into(), fixed_time()).is_err());
    }

    #[test]
    fn test_rejects_gapped_step_numbers() {
        let mut bad = outputs();
        bad.instructions.steps[0].number = 2;
        assert!(assemble_report_with(bad, "id".into(), fixed_time()).is_err());
    }

    #[test]
    fn test_inconclusive_gets_notice() {
        let mut inconclusive = outputs();
        inconclusive.diagnosis = DiagnosisResult::inconclusive("Tomato", "");
        inconclusive.treatments.clear();

        let record = assemble_report_with(inconclusive, "id".into(), fixed_time()).unwrap();
        assert_eq!(record.notices_for(ReportSection::Diagnosis).count(), 1);
        assert!(record.is_degraded());
    }
}
