use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::media::MediaBackend;
use crate::pipeline::sequencer::ClipArtifact;
use crate::pipeline::workspace::Workspace;

/// Joins the final clip artifacts into the output file
pub struct Concatenator<B: MediaBackend> {
    backend: Arc<B>,
}

impl<B: MediaBackend> Concatenator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Join `artifacts` in timeline order into `destination`
    ///
    /// The output is assembled inside the workspace and only moved to
    /// `destination` once the join succeeded.
    pub async fn concat(
        &self,
        artifacts: &[ClipArtifact],
        expected: usize,
        workspace: &Workspace,
        destination: &Path,
    ) -> Result<(), PipelineError> {
        let mut inputs: Vec<(usize, PathBuf)> = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            if tokio::fs::try_exists(&artifact.path).await.unwrap_or(false) {
                inputs.push((artifact.clip, artifact.path.clone()));
            }
        }

        if inputs.len() != expected {
            return Err(PipelineError::ArtifactMismatch {
                expected,
                actual: inputs.len(),
            });
        }

        inputs.sort_by_key(|(clip, _)| *clip);
        let inputs: Vec<PathBuf> = inputs.into_iter().map(|(_, path)| path).collect();

        let partial = workspace.partial_output();
        info!("Joining {} clips", inputs.len());
        self.backend
            .concat(&inputs, &partial)
            .await
            .map_err(|e| PipelineError::ConcatFailed { reason: e.to_string() })?;

        move_into_place(&partial, destination)
            .await
            .map_err(|e| PipelineError::ConcatFailed {
                reason: format!("moving output to {:?}: {}", destination, e),
            })?;

        debug!("Output written to {:?}", destination);
        Ok(())
    }
}

async fn move_into_place(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Rename fails across filesystems; fall back to copying
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}
