use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{ConfigError, PipelineError, Result, StitchError},
    media::MediaBackend,
    pipeline::{cancelled, Concatenator, PipelineSequencer, Workspace},
    planning::{FrameTimeResolver, OperationPlan, ResolvedTimeline, TimelineSummary, TransformPlanner},
    timeline::{load_timeline, Timeline},
};

/// A timeline fully resolved and planned, ready to be executed
#[derive(Debug, Clone)]
pub struct CompiledTimeline {
    pub resolved: ResolvedTimeline,
    pub summary: TimelineSummary,

    /// One plan per playable clip, in timeline order
    pub plans: Vec<OperationPlan>,
}

/// Main engine that turns a timeline description into one output video
///
/// The engine follows a clear pipeline:
/// 1. Timeline Parsing - Read sources and entries from the timeline file
/// 2. Resolution - Probe sources and convert frame markers to time windows
/// 3. Planning - Derive the per-clip operations and motion parameters
/// 4. Clip Processing - Run every clip's stage chain in the workspace
/// 5. Concatenation - Join the clips into the final output
pub struct StitchEngine<B: MediaBackend> {
    config: Config,
    backend: Arc<B>,
}

impl<B: MediaBackend> StitchEngine<B> {
    pub fn new(config: Config, backend: Arc<B>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stitch the timeline at `timeline_path` into `output_path`
    pub async fn compose<P: AsRef<Path>>(&self, timeline_path: P, output_path: P) -> Result<()> {
        self.compose_with_shutdown(timeline_path, output_path, std::future::pending())
            .await
    }

    /// Like [`compose`](Self::compose), but stops early when `shutdown` resolves
    ///
    /// On shutdown no further stages are started and running tool processes
    /// are killed. The workspace is removed only once every running stage has
    /// stopped, then `Interrupted` is returned.
    pub async fn compose_with_shutdown<P, F>(
        &self,
        timeline_path: P,
        output_path: P,
        shutdown: F,
    ) -> Result<()>
    where
        P: AsRef<Path>,
        F: Future<Output = ()>,
    {
        let timeline_path = timeline_path.as_ref();
        let output_path = output_path.as_ref();

        info!("🎬 Starting Timeline-Stitcher");
        info!("   Timeline: {:?}", timeline_path);
        info!("   Output: {:?}", output_path);
        info!("   Backend: {}", self.backend.name());

        // Pipeline Step 1: Timeline Parsing
        info!("📄 Step 1: Reading timeline...");
        let timeline = load_timeline(timeline_path)?;
        info!(
            "   Loaded {} sources, {} entries",
            timeline.sources().count(),
            timeline.len()
        );

        self.stitch(&timeline, output_path, shutdown).await
    }

    /// Run an already parsed timeline inside a fresh workspace
    pub async fn stitch<F>(&self, timeline: &Timeline, output_path: &Path, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let workspace = Arc::new(Workspace::create(&self.config.pipeline.work_dir)?);
        debug!("Workspace: {:?}", workspace.root());

        let (cancel, signal) = watch::channel(false);
        let run = self.run(timeline, &workspace, output_path, signal);
        tokio::pin!(run);

        let finished = tokio::select! {
            result = &mut run => Some(result),
            _ = shutdown => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                warn!("Interrupt received, stopping running stages");
                let _ = cancel.send(true);
                // Nothing may still write into the workspace once it is removed
                let _ = run.await;
                Err(PipelineError::Interrupted.into())
            }
        };

        workspace.close();

        match &result {
            Ok(()) => info!("🎉 Stitching complete! Output saved to: {:?}", output_path),
            Err(e) => warn!("Stitching failed: {}", e),
        }
        result
    }

    /// Parse-free front half of the pipeline: resolve and plan every clip
    ///
    /// Probes sources but never transcodes, so it doubles as a dry run.
    pub async fn compile(&self, timeline: &Timeline) -> Result<CompiledTimeline> {
        // Pipeline Step 2: Resolution
        info!("🔍 Step 2: Resolving frame markers...");
        let resolved = FrameTimeResolver::new(Arc::clone(&self.backend))
            .resolve(timeline)
            .await?;

        if resolved.clips.is_empty() {
            return Err(ConfigError::EmptyTimeline.into());
        }

        // Pipeline Step 3: Planning
        info!("🧭 Step 3: Planning clip operations...");
        let summary = TimelineSummary::from_clips(&resolved.clips);
        match summary.target {
            Some(target) => info!("   Target resolution: {}", target),
            None => info!("   Target resolution: unknown, no rescaling"),
        }
        info!("   Expected duration: {:.2}s", summary.total_duration);

        let plans = TransformPlanner::new(summary).plan_all(&resolved.clips)?;
        for plan in &plans {
            info!("   {}", plan);
        }

        Ok(CompiledTimeline { resolved, summary, plans })
    }

    async fn run(
        &self,
        timeline: &Timeline,
        workspace: &Arc<Workspace>,
        output_path: &Path,
        mut signal: watch::Receiver<bool>,
    ) -> Result<()> {
        let compiled = until_cancelled(&mut signal, self.compile(timeline)).await?;

        // Pipeline Step 4: Clip Processing
        info!(
            "⚙️  Step 4: Processing {} clips ({} at a time)...",
            compiled.plans.len(),
            self.config.pipeline.max_concurrent_clips
        );
        let artifacts = PipelineSequencer::new(
            Arc::clone(&self.backend),
            self.config.pipeline.max_concurrent_clips,
        )
        .with_cancellation(signal.clone())
        .run(&compiled.plans, workspace)
        .await?;

        // Pipeline Step 5: Concatenation
        info!("🎞️  Step 5: Joining clips...");
        let concatenator = Concatenator::new(Arc::clone(&self.backend));
        until_cancelled(
            &mut signal,
            concatenator.concat(&artifacts, compiled.plans.len(), workspace, output_path),
        )
        .await
    }
}

async fn until_cancelled<T, F, E>(signal: &mut watch::Receiver<bool>, work: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<StitchError>,
{
    tokio::select! {
        result = work => result.map_err(Into::into),
        _ = cancelled(signal) => Err(PipelineError::Interrupted.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GeometryError, Stage, StitchError};
    use crate::media::backend::fake::FakeBackend;
    use crate::media::{SourceInfo, StageOperation};
    use crate::planning::{Validity, ZoomDirection};
    use crate::timeline::{parse_timeline, Resolution};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn info(fps: f64, duration: f64) -> SourceInfo {
        SourceInfo {
            fps,
            duration,
            has_audio: true,
            resolution: Some(Resolution::new(1920, 1080)),
        }
    }

    struct Fixture {
        dir: TempDir,
        engine: StitchEngine<FakeBackend>,
        backend: Arc<FakeBackend>,
    }

    impl Fixture {
        fn new(backend: FakeBackend) -> Self {
            let dir = tempdir().unwrap();
            let mut config = Config::default();
            config.pipeline.work_dir = dir.path().join("work");
            config.pipeline.max_concurrent_clips = 2;
            let backend = Arc::new(backend);
            let engine = StitchEngine::new(config, Arc::clone(&backend));
            Self { dir, engine, backend }
        }

        fn write_timeline(&self, text: &str) -> PathBuf {
            let path = self.dir.path().join("timeline.txt");
            std::fs::write(&path, text).unwrap();
            path
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("Data").join("output.mp4")
        }

        fn leftover_workspaces(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("work"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    const SCENARIO_A: &str = "video; a; 0; a.mp4\n\
        video; b; 0; b.mp4\n\
        timeline; a; 1; [0]; [150]\n\
        timeline; b; 2; [0]; [150]\n";

    #[tokio::test]
    async fn test_scenario_a_two_clips_end_to_end() {
        let fixture = Fixture::new(
            FakeBackend::new()
                .with_source("a.mp4", info(30.0, 10.0))
                .with_source("b.mp4", info(30.0, 10.0)),
        );
        let timeline_path = fixture.write_timeline(SCENARIO_A);
        let output = fixture.output();

        let compiled = fixture
            .engine
            .compile(&parse_timeline(SCENARIO_A).unwrap())
            .await
            .unwrap();
        assert!((compiled.summary.total_duration - 7.5).abs() < 1e-9);
        assert!((compiled.resolved.clips[0].effective_duration() - 5.0).abs() < 1e-9);
        assert!((compiled.resolved.clips[1].effective_duration() - 2.5).abs() < 1e-9);
        for plan in &compiled.plans {
            assert!(!plan.flags.zoom && !plan.flags.pan && !plan.flags.scale);
        }

        fixture.engine.compose(timeline_path, output.clone()).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "trim\n---\ntrim\nspeed\n"
        );
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_scenario_b_overrun_is_clamped_and_kept() {
        let fixture = Fixture::new(FakeBackend::new().with_source("a.mp4", info(24.0, 8.0)));
        let timeline = parse_timeline("video; a; 0; a.mp4\ntimeline; a; 1; [0]; [240]\n").unwrap();

        let compiled = fixture.engine.compile(&timeline).await.unwrap();

        assert_eq!(compiled.resolved.clips.len(), 1);
        let clip = &compiled.resolved.clips[0];
        assert_eq!(clip.window.end, 8.0);
        assert!(matches!(clip.validity, Validity::Clamped { .. }));
        assert_eq!(compiled.plans[0].trim.end, 8.0);
    }

    #[tokio::test]
    async fn test_scenarios_c_and_d_zoom_and_pan() {
        let fixture = Fixture::new(FakeBackend::new().with_source("a.mp4", info(30.0, 10.0)));
        let timeline = parse_timeline(
            "video; a; 0; a.mp4\n\
             timeline; a; 1; [0, 960:540, 1920x1080]; [150, 960:540, 960x540]\n\
             timeline; a; 1; [0, 100:100, 640x360]; [150, 500:100, 640x360]\n",
        )
        .unwrap();

        let compiled = fixture.engine.compile(&timeline).await.unwrap();

        let zoom = compiled.plans[0].zoom.as_ref().unwrap();
        assert_eq!(zoom.direction, ZoomDirection::In);
        assert_eq!(zoom.factor, 2.0);
        assert!(!compiled.plans[0].flags.pan);

        let pan = compiled.plans[1].pan.as_ref().unwrap();
        assert!(!compiled.plans[1].flags.zoom);
        assert_eq!(pan.velocity.1, 0.0);
        assert!(pan.velocity.0 > 0.0);
    }

    #[tokio::test]
    async fn test_malformed_timeline_invokes_no_tools() {
        let fixture = Fixture::new(FakeBackend::new().with_source("a.mp4", info(30.0, 10.0)));
        let timeline_path = fixture.write_timeline("video; a; 0; a.mp4\ntimeline; missing; 1; [0]; [10]\n");

        let err = fixture
            .engine
            .compose(timeline_path, fixture.output())
            .await
            .unwrap_err();

        assert!(matches!(err, StitchError::Config(ConfigError::AtLine { line: 2, .. })));
        assert!(fixture.backend.calls().is_empty());
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_fully_dropped_timeline_is_empty() {
        let fixture = Fixture::new(FakeBackend::new().with_source("a.mp4", info(30.0, 2.0)));
        let timeline_path = fixture.write_timeline("video; a; 0; a.mp4\ntimeline; a; 1; [300]; [330]\n");

        let err = fixture
            .engine
            .compose(timeline_path, fixture.output())
            .await
            .unwrap_err();

        assert!(matches!(err, StitchError::Config(ConfigError::EmptyTimeline)));
        assert!(fixture.backend.transforms().is_empty());
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_invalid_geometry_aborts_before_transcoding() {
        let fixture = Fixture::new(FakeBackend::new().with_source("a.mp4", info(30.0, 10.0)));
        let timeline_path = fixture.write_timeline(
            "video; a; 0; a.mp4\ntimeline; a; 1; [0, 1:1, 640x360]; [30, 1:1, 0x360]\n",
        );

        let err = fixture
            .engine
            .compose(timeline_path, fixture.output())
            .await
            .unwrap_err();

        assert!(matches!(err, StitchError::Geometry(GeometryError::ZeroWidth { clip: 0 })));
        assert!(fixture.backend.transforms().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failure_reports_clip_and_cleans_up() {
        let fixture = Fixture::new(
            FakeBackend::new()
                .with_source("a.mp4", info(30.0, 10.0))
                .with_source("b.mp4", info(30.0, 10.0))
                .failing_when(|_, op| matches!(op, StageOperation::ChangeSpeed { .. })),
        );
        let timeline_path = fixture.write_timeline(SCENARIO_A);
        let output = fixture.output();

        let err = fixture.engine.compose(timeline_path, output.clone()).await.unwrap_err();

        match err {
            StitchError::Pipeline(PipelineError::ClipsFailed(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].clip, 1);
                assert_eq!(failures[0].stage, Stage::Speed);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_concat_failure_leaves_no_output() {
        let fixture = Fixture::new(
            FakeBackend::new()
                .with_source("a.mp4", info(30.0, 10.0))
                .with_source("b.mp4", info(30.0, 10.0))
                .failing_concat(),
        );
        let timeline_path = fixture.write_timeline(SCENARIO_A);
        let output = fixture.output();

        let err = fixture.engine.compose(timeline_path, output.clone()).await.unwrap_err();

        assert!(matches!(err, StitchError::Pipeline(PipelineError::ConcatFailed { .. })));
        assert!(!output.exists());
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_stops_run_and_cleans_up() {
        let fixture = Fixture::new(
            FakeBackend::new()
                .with_source("a.mp4", info(30.0, 10.0))
                .with_source("b.mp4", info(30.0, 10.0))
                .with_delay(Duration::from_secs(30)),
        );
        let timeline_path = fixture.write_timeline(SCENARIO_A);
        let output = fixture.output();

        let err = fixture
            .engine
            .compose_with_shutdown(
                timeline_path,
                output.clone(),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StitchError::Pipeline(PipelineError::Interrupted)));
        assert!(!output.exists());
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interrupt_removes_workspace_after_running_stages_stop() {
        let fixture = Fixture::new(
            FakeBackend::new()
                .with_source("a.mp4", info(30.0, 10.0))
                .with_source("b.mp4", info(30.0, 10.0))
                .with_delay(Duration::from_secs(30)),
        );
        let timeline_path = fixture.write_timeline(SCENARIO_A);

        let err = fixture
            .engine
            .compose_with_shutdown(
                timeline_path,
                fixture.output(),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::Pipeline(PipelineError::Interrupted)));

        // Both trims were in flight; each was torn down while its workspace existed
        let interrupted = fixture.backend.interrupted_stages();
        assert_eq!(interrupted, vec![true, true]);
        assert_eq!(fixture.leftover_workspaces(), 0);
    }
}
