//! Search Module
//!
//! Web search used by the treatment research stage. Serper (Google results
//! over a JSON API) is the backend.

pub mod serper;

pub use serper::{is_extension_source, SearchHit, SerperClient};
