//! TOOLRELAY Runtime
//!
//! Drives a generation engine through a configured session. Tool calls the
//! engine makes mid-generation are escorted across the boundary by the
//! session's invocation broker.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod testing;

pub use config::{
    ConfigError, RuntimeConfig, SessionConfig, StructuredRequest, TextRequest, ToolGenerationRequest,
    DEFAULT_INSTRUCTIONS,
};
pub use engine::{
    Availability, GenerationError, GenerationErrorKind, GenerationOptions, LanguageEngine,
    RespondRequest, Sampling, UnavailableReason,
};
pub use error::BridgeError;
pub use session::SessionCoordinator;
