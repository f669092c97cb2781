pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod staging;
pub mod types;
