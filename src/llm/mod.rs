// LLM abstraction layer

pub mod provider;
pub mod openrouter;

pub use provider::*;
