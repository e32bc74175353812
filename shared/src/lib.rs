pub mod environment;
pub mod error;

// Re-export commonly used items
pub use environment::{
    Environment, EnvironmentConfig, ACTIVE, ACTIVE_ENVIRONMENT, DEVELOPMENT, PRODUCTION,
};
pub use error::{EnvironmentError, Result};
