use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

/// Vision-reasoning provider (OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: String,
    /// Model used for tasks that carry the leaf photograph
    pub vision_model: String,
    /// Model used for text-only reasoning tasks
    pub reasoning_model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    pub serper_api_key: String,
    pub max_results: usize,
    pub country: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub capability_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub request_deadline_secs: Option<u64>,
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub cache_capacity: usize,
}

impl PipelineConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn request_deadline(&self) -> Option<Duration> {
        self.request_deadline_secs.map(Duration::from_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capability_timeout_secs: 60,
            max_retries: 2,
            backoff_ms: 500,
            request_deadline_secs: None,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let pipeline_defaults = PipelineConfig::default();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            vision: VisionConfig {
                base_url: env::var("VISION_API_BASE")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
                api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                vision_model: env::var("VISION_MODEL")
                    .unwrap_or_else(|_| "google/gemini-2.0-flash-001".to_string()),
                reasoning_model: env::var("REASONING_MODEL")
                    .unwrap_or_else(|_| "google/gemini-2.0-flash-001".to_string()),
                max_tokens: env::var("VISION_MAX_TOKENS")
                    .unwrap_or_else(|_| "2048".to_string())
                    .parse()?,
            },
            search: SearchConfig {
                base_url: env::var("SERPER_BASE_URL")
                    .unwrap_or_else(|_| "https://google.serper.dev".to_string()),
                serper_api_key: env::var("SERPER_API_KEY").unwrap_or_default(),
                max_results: env::var("SEARCH_MAX_RESULTS")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()?,
                country: env::var("SEARCH_COUNTRY").unwrap_or_else(|_| "us".to_string()),
            },
            pipeline: PipelineConfig {
                capability_timeout_secs: env::var("CAPABILITY_TIMEOUT_SECS")
                    .map(|v| v.parse())
                    .unwrap_or(Ok(pipeline_defaults.capability_timeout_secs))?,
                max_retries: env::var("CAPABILITY_MAX_RETRIES")
                    .map(|v| v.parse())
                    .unwrap_or(Ok(pipeline_defaults.max_retries))?,
                backoff_ms: env::var("CAPABILITY_BACKOFF_MS")
                    .map(|v| v.parse())
                    .unwrap_or(Ok(pipeline_defaults.backoff_ms))?,
                request_deadline_secs: env::var("REQUEST_DEADLINE_SECS")
                    .ok()
                    .map(|v| v.parse())
                    .transpose()?,
                max_image_bytes: env::var("MAX_IMAGE_BYTES")
                    .map(|v| v.parse())
                    .unwrap_or(Ok(pipeline_defaults.max_image_bytes))?,
            },
            report: ReportConfig {
                output_dir: env::var("REPORT_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("reports")),
                public_base_url: env::var("REPORT_PUBLIC_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                cache_capacity: env::var("REPORT_CACHE_CAPACITY")
                    .unwrap_or_else(|_| "256".to_string())
                    .parse()?,
            },
        })
    }
}
