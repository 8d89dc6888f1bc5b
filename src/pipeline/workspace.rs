use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Local;
use tracing::{debug, warn};

use crate::error::Stage;

/// Container used for every intermediate artifact
const ARTIFACT_EXTENSION: &str = "mp4";

/// Distinguishes workspaces created by one process within the same millisecond
static RUN_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Scoped root for the intermediate artifacts of one run
///
/// The directory is created on construction and removed exactly once, either
/// by an explicit [`Workspace::close`] or when the value is dropped. Every
/// clip writes under its own index so concurrent clips never collide.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    closed: AtomicBool,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `base`
    pub fn create(base: &Path) -> io::Result<Self> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S%3f");
        let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let root = base.join(format!("stitch-{}-{}-{}", std::process::id(), stamp, sequence));
        fs::create_dir_all(base)?;
        // Fails rather than adopting a directory another run owns
        fs::create_dir(&root)?;
        debug!("Created workspace {:?}", root);

        Ok(Self {
            root,
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact a clip's stage writes
    pub fn artifact(&self, clip: usize, stage: Stage) -> PathBuf {
        self.root
            .join(format!("clip{:04}-{}.{}", clip, stage, ARTIFACT_EXTENSION))
    }

    /// Where the concatenated output is assembled before it is moved out
    pub fn partial_output(&self) -> PathBuf {
        self.root.join(format!("output.partial.{}", ARTIFACT_EXTENSION))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Remove the workspace; returns `false` if it was already closed
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed workspace {:?}", self.root),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {:?}: {}", self.root, e),
        }
        true
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.close();
    }
}
