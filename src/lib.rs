pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod server; // HTTP surface for the session

pub use error::AnalysisError;
