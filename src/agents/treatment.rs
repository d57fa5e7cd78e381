//! Treatment Research Agent
//!
//! Searches the web for chemical and organic treatments of the diagnosed
//! disease, then has the reasoning capability normalise the raw snippets into
//! [`TreatmentOption`] records.
//!
//! Records without a name or a recognisable category are dropped and
//! counted. Duplicates by (name, category) are dropped as well; the first one
//! seen wins, so the result order is deterministic.

use std::collections::HashSet;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ask_vision, StageContext, StageOutcome};
use crate::capabilities::{VisionRequest, VisionTask};
use crate::models::{DiagnosisResult, ReportNotice, ReportSection, TreatmentCategory, TreatmentOption};
use crate::search::SearchHit;
use crate::types::AppResult;
use crate::utils::{parse_model_json, with_retry};

/// Snippets forwarded to the extraction prompt
const MAX_SNIPPETS: usize = 12;

/// Output of the research stage plus the counters kept for diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreatmentResearch {
    pub options: Vec<TreatmentOption>,
    pub search_hits: u32,
    pub rejected: u32,
    pub duplicates: u32,
}

#[derive(Debug, Deserialize)]
struct ExtractionRaw {
    #[serde(default)]
    treatments: Vec<TreatmentRaw>,
}

#[derive(Debug, Deserialize)]
struct TreatmentRaw {
    #[serde(default, rename = "type")]
    category: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    active_ingredient: Option<String>,
    #[serde(default)]
    dosage: Option<String>,
    #[serde(default)]
    application_method: Option<String>,
    #[serde(default)]
    timing: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    safety_precautions: Option<String>,
    #[serde(default)]
    effectiveness: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
}

pub struct TreatmentAgent;

impl TreatmentAgent {
    /// Research treatments for a conclusive diagnosis. Never fails.
    pub async fn research(ctx: &StageContext<'_>, diagnosis: &DiagnosisResult) -> StageOutcome<TreatmentResearch> {
        let queries = Self::build_queries(diagnosis);
        info!(disease = %diagnosis.disease_name, queries = queries.len(), "Starting treatment research");

        let (hits, failed_queries) = Self::collect_hits(ctx, &queries).await;

        if failed_queries == queries.len() {
            warn!("Every treatment search failed");
            return StageOutcome::degraded(
                TreatmentResearch::default(),
                ReportNotice::new(
                    ReportSection::Treatments,
                    "Treatment research unavailable: the web search service could not be reached.",
                ),
            );
        }

        let search_hits = hits.len() as u32;
        if hits.is_empty() {
            info!("Search returned no results, no treatments to extract");
            return StageOutcome::degraded(TreatmentResearch::default(), Self::no_treatments_notice());
        }

        let request = VisionRequest {
            task: VisionTask::Extract,
            system: "You are a crop protection specialist. You extract treatment records from web search results and answer only with JSON.".to_string(),
            prompt: Self::create_extraction_prompt(diagnosis, &hits),
            image: None,
        };

        let response = match ask_vision(ctx, &request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Treatment extraction failed");
                return StageOutcome::degraded(
                    TreatmentResearch {
                        search_hits,
                        ..TreatmentResearch::default()
                    },
                    ReportNotice::new(
                        ReportSection::Treatments,
                        format!("Treatment details could not be extracted: {}", e),
                    ),
                );
            }
        };

        let research = match Self::parse_extraction(&response) {
            Ok(research) => TreatmentResearch { search_hits, ..research },
            Err(e) => {
                warn!(error = %e, "Failed to parse treatment extraction");
                return StageOutcome::degraded(
                    TreatmentResearch {
                        search_hits,
                        ..TreatmentResearch::default()
                    },
                    ReportNotice::new(
                        ReportSection::Treatments,
                        format!("Treatment details could not be extracted: {}", e),
                    ),
                );
            }
        };

        info!(
            options = research.options.len(),
            rejected = research.rejected,
            duplicates = research.duplicates,
            "Treatment research complete"
        );

        let mut notices = Vec::new();
        if research.options.is_empty() {
            notices.push(Self::no_treatments_notice());
        }
        if failed_queries > 0 {
            notices.push(ReportNotice::new(
                ReportSection::Treatments,
                format!("{} of {} treatment searches failed; results may be incomplete.", failed_queries, queries.len()),
            ));
        }

        StageOutcome { value: research, notices }
    }

    fn no_treatments_notice() -> ReportNotice {
        ReportNotice::new(
            ReportSection::Treatments,
            "No treatments found for this diagnosis. Consult a local agricultural extension officer.",
        )
    }

    /// Chemical and organic queries for the diagnosed disease and crop
    pub fn build_queries(diagnosis: &DiagnosisResult) -> Vec<String> {
        let subject = if diagnosis.crop.trim().is_empty() || diagnosis.crop.eq_ignore_ascii_case("unknown crop") {
            diagnosis.disease_name.clone()
        } else {
            format!("{} {}", diagnosis.disease_name, diagnosis.crop)
        };

        vec![
            format!("{} treatment", subject),
            format!("{} organic treatment", subject),
        ]
    }

    /// Run every query concurrently; hits come back in query order, deduplicated by URL
    async fn collect_hits(ctx: &StageContext<'_>, queries: &[String]) -> (Vec<SearchHit>, usize) {
        let search = ctx.search;
        let policy = ctx.policy;

        let results: Vec<AppResult<Vec<SearchHit>>> = join_all(queries.iter().map(|query| {
            with_retry(policy, "web_search", move || search.search(query))
        }))
        .await;

        let mut seen_urls = HashSet::new();
        let mut hits = Vec::new();
        let mut failed = 0;

        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(query = %query, count = found.len(), "Search query complete");
                    for hit in found {
                        if seen_urls.insert(hit.url.clone()) {
                            hits.push(hit);
                        }
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Search query failed");
                    failed += 1;
                }
            }
        }

        (hits, failed)
    }

    fn create_extraction_prompt(diagnosis: &DiagnosisResult, hits: &[SearchHit]) -> String {
        let mut sources = String::new();
        for (i, hit) in hits.iter().take(MAX_SNIPPETS).enumerate() {
            sources.push_str(&format!("[{}] {}\nURL: {}\n{}\n\n", i + 1, hit.title, hit.url, hit.snippet));
        }

        format!(r#"Disease: {disease}
Crop: {crop}
Severity: {severity}

WEB SEARCH RESULTS:
{sources}
From the search results above, extract every concrete treatment product or practice for this disease.
Include both chemical and organic options when the results mention them.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "treatments": [
    {{
      "type": "chemical | organic",
      "product_name": "Product or practice name",
      "active_ingredient": "Active ingredient and concentration, if known",
      "dosage": "Amount per litre or per area",
      "application_method": "How to apply",
      "timing": "When to apply",
      "frequency": "How often to repeat",
      "safety_precautions": "Protective equipment, pre-harvest interval, mixing warnings",
      "effectiveness": "high | medium | low",
      "source_url": "URL of the search result this came from"
    }}
  ]
}}

IMPORTANT:
- Only use information present in the search results
- Leave a field as an empty string when the results do not say
- Respond with ONLY the JSON object"#,
            disease = diagnosis.disease_name,
            crop = diagnosis.crop,
            severity = diagnosis.severity,
            sources = sources,
        )
    }

    /// Validate extracted records and drop invalid ones and duplicates
    fn parse_extraction(response: &str) -> AppResult<TreatmentResearch> {
        let raw: ExtractionRaw = parse_model_json(response, "treatment extraction")?;

        let mut valid = Vec::new();
        let mut rejected = 0u32;

        for record in raw.treatments {
            match Self::validate_record(record) {
                Some(option) => valid.push(option),
                None => rejected += 1,
            }
        }

        if rejected > 0 {
            debug!(rejected, "Dropped treatment records without name or category");
        }

        let before = valid.len();
        let options = dedupe_treatments(valid);
        let duplicates = (before - options.len()) as u32;

        Ok(TreatmentResearch {
            options,
            search_hits: 0,
            rejected,
            duplicates,
        })
    }

    fn validate_record(record: TreatmentRaw) -> Option<TreatmentOption> {
        let name = clean(record.product_name);
        if name.is_empty() {
            return None;
        }
        let category = TreatmentCategory::parse(record.category.as_deref().unwrap_or(""))?;

        Some(TreatmentOption {
            name,
            category,
            dosage: clean(record.dosage),
            frequency: clean(record.frequency),
            safety_notes: clean(record.safety_precautions),
            source: clean(record.source_url),
            active_ingredient: clean(record.active_ingredient),
            application_method: clean(record.application_method),
            timing: clean(record.timing),
            effectiveness: clean(record.effectiveness),
        })
    }
}

fn clean(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Keep the first occurrence of every (name, category) pair, preserving order
pub fn dedupe_treatments(options: Vec<TreatmentOption>) -> Vec<TreatmentOption> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(options.len());
    for option in options {
        if seen.insert(option.dedup_key()) {
            unique.push(option);
        }
    }
    unique
}
