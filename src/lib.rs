pub mod color;
pub mod config;
pub mod data;
pub mod density;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod render;
