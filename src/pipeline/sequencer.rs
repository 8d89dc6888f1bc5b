use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Stage, StageFailure};
use crate::media::MediaBackend;
use crate::pipeline::workspace::Workspace;
use crate::planning::OperationPlan;

/// Final artifact of one clip's stage chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipArtifact {
    /// Position of the clip in the declared timeline
    pub clip: usize,
    pub path: PathBuf,
}

/// Resolves once `true` is sent; never resolves if the sender is gone first
pub async fn cancelled(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Runs each clip's stage chain, several clips at a time
pub struct PipelineSequencer<B: MediaBackend> {
    backend: Arc<B>,
    semaphore: Arc<Semaphore>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<B: MediaBackend> PipelineSequencer<B> {
    pub fn new(backend: Arc<B>, max_concurrent_clips: usize) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(max_concurrent_clips.max(1))),
            cancel: None,
        }
    }

    /// Stop early when `true` is sent on `signal`
    ///
    /// Cancelling aborts every running stage and waits for the tasks to
    /// finish before [`run`](Self::run) returns `Interrupted`, so nothing
    /// writes into the workspace afterwards.
    pub fn with_cancellation(mut self, signal: watch::Receiver<bool>) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Process every plan and return the final artifacts in timeline order
    ///
    /// A failing clip stops at its failing stage while the other clips run
    /// to completion; all failures are reported together.
    pub async fn run(
        &self,
        plans: &[OperationPlan],
        workspace: &Arc<Workspace>,
    ) -> Result<Vec<ClipArtifact>, PipelineError> {
        let mut tasks = JoinSet::new();
        for (position, plan) in plans.iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&self.semaphore);
            let workspace = Arc::clone(workspace);
            let plan = plan.clone();

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_clip(backend.as_ref(), &plan, &workspace).await,
                    Err(_) => Err(StageFailure {
                        clip: plan.clip,
                        stage: Stage::Trim,
                        reason: "worker pool closed".to_string(),
                    }),
                };
                (position, outcome)
            });
        }

        let mut cancel = self.cancel.clone();
        let mut finished: Vec<Option<ClipArtifact>> = vec![None; plans.len()];
        let mut failures = Vec::new();
        loop {
            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = async {
                    match cancel.as_mut() {
                        Some(signal) => cancelled(signal).await,
                        None => std::future::pending().await,
                    }
                } => {
                    warn!("Cancelling {} running clips", tasks.len());
                    tasks.shutdown().await;
                    return Err(PipelineError::Interrupted);
                }
            };
            let Some(joined) = joined else { break };

            let (position, outcome) = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => return Err(PipelineError::Interrupted),
            };

            match outcome {
                Ok(artifact) => finished[position] = Some(artifact),
                Err(failure) => {
                    warn!(clip = failure.clip, stage = %failure.stage, "{}", failure.reason);
                    failures.push(failure);
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.clip);
            return Err(PipelineError::ClipsFailed(failures));
        }

        let artifacts: Vec<ClipArtifact> = finished.into_iter().flatten().collect();
        info!("Processed {} clips", artifacts.len());
        Ok(artifacts)
    }
}

/// Thread one clip through trim, audio, speed, motion and rescale
async fn run_clip<B: MediaBackend>(
    backend: &B,
    plan: &OperationPlan,
    workspace: &Workspace,
) -> Result<ClipArtifact, StageFailure> {
    let mut current = plan.source.clone();

    for (stage, operation) in plan.stages() {
        let output = workspace.artifact(plan.clip, stage);
        let fail = |reason: String| StageFailure { clip: plan.clip, stage, reason };

        match operation {
            Some(operation) => {
                debug!(clip = plan.clip, stage = %stage, "{} {:?} -> {:?}", operation.kind(), current, output);
                backend
                    .transform(&current, &operation, &output)
                    .await
                    .map_err(|e| fail(e.to_string()))?;
            }
            // Pass-through stages only ever forward workspace artifacts
            None if current.starts_with(workspace.root()) => {
                tokio::fs::rename(&current, &output)
                    .await
                    .map_err(|e| fail(format!("forwarding {:?}: {}", current, e)))?;
            }
            None => {
                tokio::fs::copy(&current, &output)
                    .await
                    .map_err(|e| fail(format!("copying {:?}: {}", current, e)))?;
            }
        }

        current = output;
    }

    Ok(ClipArtifact { clip: plan.clip, path: current })
}
