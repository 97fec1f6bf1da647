//! Workflow Processor (C4) and Batch Resolver (C5): dependency planning,
//! batch/task materialization, per-canvas-exclusive dispatch, the worker
//! loop that executes a batch's tasks, and export-result composition.
//!
//! `canvas-graph` owns the data model and the pure Graph Resolver;
//! `canvas-store` owns persistence; `node-processor-contract` owns the
//! calling contract into external per-node processors. This crate is the
//! scheduler that sits on top of all three.

pub mod batch;
pub mod batch_resolver;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod plan;
pub mod run;
pub mod worker;

pub use batch::{process_nodes, ProcessNodesOutcome};
pub use batch_resolver::{resolve_batch_result, AssetUrlResolver, ExportData, ExportResult};
pub use config::EngineConfig;
pub use dispatch::{dispatch_envelope, InMemoryWorkQueue, WorkQueue};
pub use error::{ProcessError, Result, TaskFailure};
pub use plan::{build_plan, ExecutionPlan};
pub use run::{run, run_status, RunPayloadValue, RunRequest, RunResult};
pub use worker::{execute_batch, run_worker_loop};
