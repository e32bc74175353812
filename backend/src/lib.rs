pub mod config;
pub mod error;
pub mod frontend;
pub mod health;
pub mod middleware;
pub mod proxy;
pub mod upstream;

pub use shared::{Environment, EnvironmentConfig, ACTIVE, ACTIVE_ENVIRONMENT};
