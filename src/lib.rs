//! wrapflow - generative render pipeline for vehicle wrap design
//!
//! Turns a design request (a vehicle photo plus stylistic parameters, or a
//! brand/logo brief) into finished images by orchestrating an external
//! generation service, optionally compositing the result with a template
//! image, persisting the final artifact, and exposing progress through a
//! poll-based status protocol.
//!
//! The [`pipeline`] module holds the domain: the orchestrator, the job state
//! machine, prompt construction, and admission control, all behind port
//! traits. The [`infrastructure`] module provides the concrete adapters.

#![deny(unsafe_code)]

pub mod config;
pub mod infrastructure;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{
    GenerationJob, JobRef, MockupJob, MockupPipeline, ReconcileOutcome, RenderError,
    RenderOrchestrator, SubmitMockupRequest, SubmitRenderRequest,
};
