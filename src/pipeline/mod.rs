//! Render pipeline domain - turns a design request into one or more finished
//! images by orchestrating external generation, compositing, and storage
//!
//! The orchestrator fans out one submit per requested variant, persists one
//! row per variant regardless of submit outcome, and reconciles state through
//! caller-driven polling. The mockup flow is its synchronous, best-effort
//! sibling.

pub mod admission;
pub mod errors;
pub mod mockup;
pub mod orchestrator;
pub mod prompt;
pub mod traits;
pub mod types;

pub use admission::*;
pub use errors::*;
pub use mockup::*;
pub use orchestrator::*;
pub use prompt::*;
pub use traits::*;
pub use types::*;
