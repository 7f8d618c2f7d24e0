//! Engine configuration and structured document parsing.

pub mod error;
pub mod parser;
pub mod settings;

pub use error::ConfigError;
pub use parser::{parse_document, DocumentFormat};
pub use settings::{load_config, EngineConfig};
