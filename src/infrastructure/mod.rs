//! Infrastructure layer - concrete implementations of pipeline ports
//!
//! HTTP clients for the generation and brand-analysis services, the image
//! compositing engine, SQLite persistence, and object storage.

pub mod brand_analysis;
pub mod compositing;
pub mod generation_api;
pub mod health;
pub mod repository;
pub mod storage;

pub use brand_analysis::HttpBrandAnalyzer;
pub use compositing::{composite_images, target_dimensions, CompositingEngine};
pub use generation_api::HttpGenerationClient;
pub use health::{NoopHealthLogger, SqliteHealthLogger};
pub use repository::SqliteJobRepository;
pub use storage::HttpResultStore;
