//! Deterministic capability doubles shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::Content;
use lopdf::{Document, Object};

use crop_doctor::capabilities::{VisionReasoning, VisionRequest, VisionTask, WebSearch};
use crop_doctor::models::{DiagnosisRequest, ImagePayload};
use crop_doctor::search::SearchHit;
use crop_doctor::types::{AppError, AppResult};
use crop_doctor::utils::RetryPolicy;
use crop_doctor::DiagnosisPipeline;

pub const PNG_LEAF: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDRleafleafleaf";

pub const EARLY_BLIGHT: &str = r#"{
  "disease_detected": true,
  "disease_name": "Early Blight",
  "crop_type": "Tomato",
  "confidence_score": 92,
  "severity": "Moderate",
  "visible_symptoms": ["Concentric rings on lower leaves", "Yellow halo around lesions"],
  "reasoning": "Target-board lesions on older leaves"
}"#;

pub const EXPLANATION: &str = r#"{
  "simple_summary": "Early blight is a fungal disease that spots and kills older tomato leaves.",
  "what_causes_it": "The fungus Alternaria solani",
  "how_it_spreads": "Spores splash from soil and infected debris onto leaves",
  "favorable_conditions": ["Warm temperatures", "Long leaf wetness"],
  "why_harmful": "Leaf loss reduces fruit size and yield"
}"#;

pub const EXTRACTION: &str = r#"Here are the treatments:
```json
{
  "treatments": [
    {"type": "chemical", "product_name": "Copper Hydroxide", "dosage": "2 g/L", "frequency": "Every 7-10 days", "safety_precautions": "Wear gloves and goggles", "source_url": "https://extension.umn.edu/early-blight"},
    {"type": "Organic", "product_name": "Neem Oil", "dosage": "5 ml/L", "frequency": "Weekly", "safety_precautions": "Spray in the evening"},
    {"type": "chemical", "product_name": "copper hydroxide ", "dosage": "3 g/L"},
    {"type": "homeopathic", "product_name": "Mystery Tonic"},
    {"type": "organic", "product_name": ""}
  ]
}
```"#;

pub const INSTRUCTIONS: &str = r#"{
  "recommended_treatment": "Copper Hydroxide",
  "why_chosen": "Protects healthy leaves quickly",
  "immediate_action": "Remove spotted lower leaves today",
  "preparation_steps": [{"title": "Mix", "instruction": "Dissolve 2 g copper hydroxide per litre of water"}],
  "application_steps": [{"title": "Spray", "instruction": "Cover both sides of all leaves"}],
  "monitoring_steps": [{"title": "Inspect", "instruction": "Check new leaves after 5 days"}],
  "prevention_tips": ["Mulch around plants", "Rotate away from tomatoes for 2 years"]
}"#;

pub const PREVENTION_ONLY: &str = r#"{
  "immediate_action": "Remove spotted lower leaves today",
  "prevention_tips": ["Mulch around plants"]
}"#;

#[derive(Default)]
pub struct FakeVision {
    pub identify: Option<String>,
    pub explain: Option<String>,
    pub extract: Option<String>,
    pub instruct: Option<String>,
    pub delay: Duration,
    pub calls: Mutex<Vec<VisionTask>>,
}

impl FakeVision {
    pub fn healthy_pipeline() -> Self {
        Self {
            identify: Some(EARLY_BLIGHT.to_string()),
            explain: Some(EXPLANATION.to_string()),
            extract: Some(EXTRACTION.to_string()),
            instruct: Some(INSTRUCTIONS.to_string()),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, task: VisionTask) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| **t == task).count()
    }
}

#[async_trait]
impl VisionReasoning for FakeVision {
    async fn reason(&self, request: &VisionRequest) -> AppResult<String> {
        self.calls.lock().unwrap().push(request.task);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = match request.task {
            VisionTask::Identify => &self.identify,
            VisionTask::Explain => &self.explain,
            VisionTask::Extract => &self.extract,
            VisionTask::Instruct => &self.instruct,
        };
        reply
            .clone()
            .ok_or_else(|| AppError::CapabilityUnavailable(format!("{} endpoint unreachable", request.task)))
    }
}

#[derive(Default)]
pub struct FakeSearch {
    pub hits: Vec<SearchHit>,
    pub calls: AtomicUsize,
}

impl FakeSearch {
    pub fn with_hits() -> Self {
        Self {
            hits: vec![
                SearchHit {
                    title: "Early blight in home gardens".into(),
                    snippet: "Apply copper hydroxide at 2 g/L every 7-10 days.".into(),
                    url: "https://extension.umn.edu/early-blight".into(),
                },
                SearchHit {
                    title: "Organic control of early blight".into(),
                    snippet: "Neem oil at 5 ml/L weekly slows spread.".into(),
                    url: "https://example.org/neem".into(),
                },
            ],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, _query: &str) -> AppResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.clone())
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(2),
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
    }
}

pub fn pipeline(vision: &Arc<FakeVision>, search: &Arc<FakeSearch>) -> DiagnosisPipeline {
    DiagnosisPipeline::new(vision.clone(), search.clone()).with_retry_policy(fast_policy())
}

pub fn leaf_request() -> DiagnosisRequest {
    let image = ImagePayload::from_bytes(PNG_LEAF, 1024).unwrap();
    DiagnosisRequest::new(image, None)
}

/// All shown strings, the number of filled rectangles and the page count
pub fn decode_pdf(bytes: &[u8]) -> (String, usize, usize) {
    let doc = Document::load_mem(bytes).unwrap();
    let pages = doc.get_pages();
    let mut text = String::new();
    let mut rects = 0;
    for page_id in pages.values() {
        let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
        for op in content.operations {
            match op.operator.as_str() {
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        text.extend(bytes.iter().map(|b| *b as char));
                        text.push('\n');
                    }
                }
                "re" => rects += 1,
                _ => {}
            }
        }
    }
    (text, rects, pages.len())
}
