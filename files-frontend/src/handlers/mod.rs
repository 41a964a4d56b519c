pub mod app;
pub mod files;
pub mod metrics;
pub mod oauth;
