//! Execution orchestration for loom workflows
//!
//! Takes a validated workflow graph, attempts to run it through the
//! external execution runtime, falls back to the deterministic simulator
//! when that runtime is unreachable, records the outcome, and turns run
//! results into a replayable timeline.

mod orchestrator;
mod registry;
mod remote;
mod request;
mod service;
mod simulator;
mod timeline;

pub use orchestrator::{Orchestrator, RunReport};
pub use registry::{builtin_templates, CustomNodeDraft, NodeRegistry};
pub use remote::{HttpRunner, RemoteRunner, RemoteUnavailable, DEFAULT_RUNNER_TIMEOUT};
pub use request::{build_request, RequestNode, RequestWorkflow, RunRequest};
pub use service::{
    ExecuteRequest, ImportWorkflowResponse, LoomService, SaveWorkflowRequest,
    SaveWorkflowResponse, WorkflowDetail, WorkflowExportBundle,
};
pub use simulator::{FixedTiming, Simulator, TimingSource, UniformTiming};
pub use timeline::{timeline_entries, timeline_from_record, TimelineBuilder, TimelineEntry};
