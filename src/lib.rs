pub mod admin;
pub mod aggregate;
pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod models;
pub mod openapi;
pub mod ownership;
pub mod pagination;
pub mod password;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;
pub mod visibility;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
