//! Data model, configuration, errors and the generator trait shared by the
//! walkgen pattern generators.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::WalkConfig;
pub use error::{ConfigError, EditError, GenerationError, WalkError};
pub use traits::PatternGenerator;
pub use types::*;
