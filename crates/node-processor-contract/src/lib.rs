//! Node-Processor Contract (C6) and processor registry.
//!
//! This crate models only the *calling contract* between the Workflow
//! Processor and external per-node processors (`spec.md` §4.6) — the
//! processors themselves (LLM, image generation, compositor, paint, TTS,
//! Lottie, video crop, ...) are explicitly out of scope and live outside
//! this workspace entirely.

pub mod contract;
pub mod registry;

pub use contract::{NodeProcessor, ProcessorInput, ProcessorOutput};
pub use registry::ProcessorRegistry;
