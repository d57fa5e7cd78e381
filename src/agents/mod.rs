//! Agent System
//!
//! The stages that turn one leaf photograph into a diagnosis report:
//!
//! - **Diagnosis Agent**: identifies disease, crop, confidence and severity
//! - **Explanation Agent**: explains cause, spread and impact in plain words
//! - **Treatment Agent**: researches chemical and organic treatments on the web
//! - **Instruction Agent**: writes the application plan and prevention tips
//!
//! ## Pipeline Overview
//!
//! ```text
//! DiagnosisRequest
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Diagnosis  │  → fatal on capability outage
//! └─────────────┘
//!      │ ("unknown" short-circuits to assembly)
//!      ├──────────────────┐
//!      ▼                  ▼
//! ┌─────────────┐   ┌─────────────┐
//! │ Explanation │   │  Treatment  │  → web search + extraction
//! └─────────────┘   └─────────────┘
//!      │                  │
//!      │                  ▼
//!      │            ┌─────────────┐
//!      │            │ Instruction │
//!      │            └─────────────┘
//!      ▼                  ▼
//! ┌───────────────────────────────┐
//! │        Report Assembly        │
//! └───────────────────────────────┘
//!      │
//!      ▼
//!  ReportRecord
//! ```
//!
//! Stages run strictly one after another. Past the diagnosis stage nothing
//! aborts the request: failures degrade the affected section and attach a
//! notice to the report.

pub mod diagnosis;
pub mod explanation;
pub mod instruction;
pub mod treatment;

pub use diagnosis::DiagnosisAgent;
pub use explanation::ExplanationAgent;
pub use instruction::InstructionAgent;
pub use treatment::{dedupe_treatments, TreatmentAgent, TreatmentResearch};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::capabilities::{LlmVision, VisionReasoning, VisionRequest, WebSearch};
use crate::config::Config;
use crate::models::{
    DiagnosisRequest, Explanation, InstructionSet, PipelineDiagnostics, ReportNotice, ReportRecord, ReportSection,
};
use crate::report::{assemble_report, StageOutputs};
use crate::search::SerperClient;
use crate::types::{AppError, AppResult};
use crate::utils::{with_retry, RetryPolicy};

/// A stage artifact plus the notices explaining any degradation
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<T> {
    pub value: T,
    pub notices: Vec<ReportNotice>,
}

impl<T> StageOutcome<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            notices: Vec::new(),
        }
    }

    pub fn degraded(value: T, notice: ReportNotice) -> Self {
        Self {
            value,
            notices: vec![notice],
        }
    }
}

/// Borrowed view of the capabilities a stage may call
pub struct StageContext<'a> {
    pub vision: &'a dyn VisionReasoning,
    pub search: &'a dyn WebSearch,
    pub policy: &'a RetryPolicy,
}

/// One vision call under the shared retry policy
pub(crate) async fn ask_vision(ctx: &StageContext<'_>, request: &VisionRequest) -> AppResult<String> {
    let vision = ctx.vision;
    let label = format!("vision_{}", request.task);
    with_retry(ctx.policy, &label, move || vision.reason(request)).await
}

/// Runs the stages for one request at a time; safe to share between requests
pub struct DiagnosisPipeline {
    vision: Arc<dyn VisionReasoning>,
    search: Arc<dyn WebSearch>,
    policy: RetryPolicy,
    deadline: Option<Duration>,
}

impl DiagnosisPipeline {
    pub fn new(vision: Arc<dyn VisionReasoning>, search: Arc<dyn WebSearch>) -> Self {
        Self {
            vision,
            search,
            policy: RetryPolicy::default(),
            deadline: None,
        }
    }

    /// Build the production pipeline. Both clients share one connection pool.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.pipeline.capability_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let vision = LlmVision::with_client(http.clone(), &config.vision)?;

        let search = SerperClient::from_config(http, &config.search)
            .ok_or_else(|| AppError::Config("SERPER_API_KEY must be set".to_string()))?;

        Ok(Self::new(Arc::new(vision), Arc::new(search))
            .with_retry_policy(RetryPolicy::from_config(&config.pipeline))
            .with_deadline(config.pipeline.request_deadline()))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            vision: self.vision.as_ref(),
            search: self.search.as_ref(),
            policy: &self.policy,
        }
    }

    /// Execute the full diagnosis pipeline and assemble the report
    pub async fn run(&self, request: &DiagnosisRequest) -> AppResult<ReportRecord> {
        let outputs = self.run_stages(request).await?;
        let record = assemble_report(outputs)?;

        info!(
            report_id = %record.id,
            disease = %record.diagnosis.disease_name,
            treatments = record.treatments.len(),
            notices = record.notices.len(),
            "Diagnosis pipeline complete"
        );

        Ok(record)
    }

    /// Run every stage and collect their outputs without assembling
    pub async fn run_stages(&self, request: &DiagnosisRequest) -> AppResult<StageOutputs> {
        let started = Instant::now();
        let ctx = self.context();

        info!(image_bytes = request.image.len(), "Starting diagnosis pipeline");

        // Step 1: Diagnosis - the only stage allowed to abort the request
        let diagnosis = DiagnosisAgent::identify(&ctx, request).await?;
        let mut notices = diagnosis.notices;
        let diagnosis = diagnosis.value;

        if diagnosis.is_inconclusive() {
            info!("Diagnosis inconclusive, skipping explanation and research");
            return Ok(StageOutputs {
                instructions: InstructionAgent::general_care(&diagnosis),
                diagnosis,
                explanation: Explanation::default(),
                treatments: Vec::new(),
                notices,
                diagnostics: PipelineDiagnostics::default(),
            });
        }

        // Step 2: Explanation
        let explanation = if self.deadline_exceeded(started) {
            notices.push(Self::deadline_notice(ReportSection::Explanation));
            Explanation::default()
        } else {
            let outcome = ExplanationAgent::explain(&ctx, &diagnosis).await;
            notices.extend(outcome.notices);
            outcome.value
        };

        // Step 3: Treatment research
        let research = if self.deadline_exceeded(started) {
            notices.push(Self::deadline_notice(ReportSection::Treatments));
            TreatmentResearch::default()
        } else {
            let outcome = TreatmentAgent::research(&ctx, &diagnosis).await;
            notices.extend(outcome.notices);
            outcome.value
        };

        // Step 4: Instructions
        let instructions: InstructionSet = if self.deadline_exceeded(started) {
            notices.push(Self::deadline_notice(ReportSection::Instructions));
            InstructionAgent::general_care(&diagnosis)
        } else {
            let outcome = InstructionAgent::synthesize(&ctx, &diagnosis, &research.options).await;
            notices.extend(outcome.notices);
            outcome.value
        };

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            notices = notices.len(),
            "All stages finished"
        );

        Ok(StageOutputs {
            diagnosis,
            explanation,
            treatments: research.options,
            instructions,
            notices,
            diagnostics: PipelineDiagnostics {
                search_hits: research.search_hits,
                rejected_treatments: research.rejected,
                duplicate_treatments: research.duplicates,
            },
        })
    }

    fn deadline_exceeded(&self, started: Instant) -> bool {
        match self.deadline {
            Some(deadline) if started.elapsed() >= deadline => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Request deadline exceeded");
                true
            }
            _ => false,
        }
    }

    fn deadline_notice(section: ReportSection) -> ReportNotice {
        ReportNotice::new(section, format!("{} skipped: the request deadline was exceeded.", section))
    }
}
