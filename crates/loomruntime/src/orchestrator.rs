use crate::remote::RemoteRunner;
use crate::request::build_request;
use crate::simulator::Simulator;
use chrono::{DateTime, Utc};
use loomcore::{EventBus, ExecutionEvent, ExecutionId, RunOutcome, WorkflowData, WorkflowGraph};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Outcome of one orchestrated run, remote or simulated
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub execution_id: ExecutionId,
    pub outcome: RunOutcome,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub simulated: bool,
    /// Why the fallback ran, when it did. Diagnostic context only; the
    /// run itself still reports whatever the fallback computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Runs one workflow to completion: a single remote attempt, then the
/// simulator when that attempt is unavailable
///
/// Graph validation errors propagate; nothing past validation is fatal.
pub struct Orchestrator {
    runner: Option<Arc<dyn RemoteRunner>>,
    simulator: Simulator,
    events: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        runner: Option<Arc<dyn RemoteRunner>>,
        simulator: Simulator,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            runner,
            simulator,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn execute(
        &self,
        workflow_id: Option<&str>,
        data: &WorkflowData,
    ) -> loomcore::Result<RunReport> {
        let graph = WorkflowGraph::new(data)?;

        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            "starting run {} ({} nodes)",
            execution_id,
            graph.node_count()
        );
        self.events.emit(ExecutionEvent::RunStarted {
            execution_id,
            workflow_id: workflow_id.map(str::to_string),
            timestamp: started_at,
        });

        let request = build_request(&graph);
        let (outcome, diagnostic) = match &self.runner {
            Some(runner) => match runner.run(&request).await {
                Ok(outcome) => (outcome, None),
                Err(err) => {
                    tracing::warn!("run {} falling back to simulator: {}", execution_id, err);
                    (self.simulator.run(&graph), Some(err.reason))
                }
            },
            None => (
                self.simulator.run(&graph),
                Some("no execution runtime configured".to_string()),
            ),
        };
        let simulated = diagnostic.is_some();

        for result in &outcome.nodes {
            let node_title = graph
                .node(&result.id)
                .map(|node| node.title.clone())
                .unwrap_or_else(|| result.id.clone());
            self.events.emit(ExecutionEvent::NodeFinished {
                execution_id,
                node_title,
                result: result.clone(),
                timestamp: Utc::now(),
            });
        }

        let duration_seconds = start.elapsed().as_secs_f64();
        let completed_at = Utc::now();
        tracing::info!(
            "run {} completed in {:.3}s (simulated: {})",
            execution_id,
            duration_seconds,
            simulated
        );
        self.events.emit(ExecutionEvent::RunCompleted {
            execution_id,
            status: outcome.status,
            duration_seconds,
            simulated,
            timestamp: completed_at,
        });

        Ok(RunReport {
            execution_id,
            outcome,
            duration_seconds,
            started_at,
            completed_at,
            simulated,
            diagnostic,
        })
    }
}
