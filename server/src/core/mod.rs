//! vidtrack Core
//!
//! Job orchestration, external process integration and the artifact store.
//! Everything here is transport-agnostic; the HTTP layer lives in `crate::http`.

pub mod analysis;
pub mod jobs;
pub mod process;
pub mod settings;
pub mod store;
pub mod transcode;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_destructive;
