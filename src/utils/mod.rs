// Utility functions

pub mod json;
pub mod logger;
pub mod retry;

pub use json::*;
pub use logger::*;
pub use retry::*;
