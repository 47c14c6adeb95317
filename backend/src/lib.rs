pub mod axum_http;
pub mod config;
