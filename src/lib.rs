// Crop Doctor - crop disease diagnosis from leaf photographs

pub mod agents;       // Diagnosis, explanation, treatment research, instructions
pub mod capabilities; // Vision-reasoning and web-search seams
pub mod config;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod report;       // Assembly, registry, PDF/JSON/QR exporters
pub mod routes;
pub mod search;       // Serper web search
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use agents::DiagnosisPipeline;
pub use config::Config;
pub use models::{AppState, ReportRecord};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
