use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::{EncodingConfig, ToolConfig};
use crate::error::{ProbeError, ToolError};
use crate::media::backend::{MediaBackend, SourceInfo, StageOperation};
use crate::planning::{AudioSource, PanMotion, ZoomDirection, ZoomMotion};
use crate::timeline::Resolution;

/// Lines of stderr kept when a tool fails
const STDERR_TAIL_LINES: usize = 12;

/// `atempo` only accepts factors in this range per instance
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Media backend driving the `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    tools: ToolConfig,
    encoding: EncodingConfig,
}

impl FfmpegBackend {
    pub fn new(tools: ToolConfig, encoding: EncodingConfig) -> Self {
        Self { tools, encoding }
    }

    pub fn probe_args(path: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "stream=codec_type,r_frame_rate,width,height".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "json".into(),
            path.display().to_string(),
        ]
    }

    /// Full argument list for one stage
    pub fn transform_args(&self, input: &Path, operation: &StageOperation, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into()];

        match operation {
            StageOperation::Trim(window) => {
                args.extend([
                    "-ss".into(),
                    secs(window.start),
                    "-i".into(),
                    input.display().to_string(),
                    "-t".into(),
                    secs(window.duration()),
                ]);
                args.extend(self.video_codec_args());
                args.extend(self.audio_codec_args());
            }
            StageOperation::AttachAudio(audio) => {
                args.extend(["-i".into(), input.display().to_string()]);
                match audio {
                    AudioSource::Silence { .. } => args.extend([
                        "-f".into(),
                        "lavfi".into(),
                        "-i".into(),
                        format!(
                            "anullsrc=channel_layout=stereo:sample_rate={}",
                            self.encoding.audio_sample_rate
                        ),
                    ]),
                    AudioSource::Track { path, offset } => args.extend([
                        "-ss".into(),
                        secs(*offset),
                        "-i".into(),
                        path.display().to_string(),
                        // A short track is padded with silence so -shortest keeps the video length
                        "-af".into(),
                        "apad".into(),
                    ]),
                }
                args.extend([
                    "-map".into(),
                    "0:v:0".into(),
                    "-map".into(),
                    "1:a:0".into(),
                    "-c:v".into(),
                    "copy".into(),
                    "-shortest".into(),
                ]);
                args.extend(self.audio_codec_args());
            }
            StageOperation::ChangeSpeed { factor } => {
                args.extend([
                    "-i".into(),
                    input.display().to_string(),
                    "-filter_complex".into(),
                    speed_filter(*factor),
                    "-map".into(),
                    "[v]".into(),
                    "-map".into(),
                    "[a]".into(),
                ]);
                args.extend(self.video_codec_args());
                args.extend(self.audio_codec_args());
            }
            StageOperation::Zoom(zoom) => {
                args.extend(["-i".into(), input.display().to_string(), "-vf".into(), zoom_filter(zoom)]);
                args.extend(self.video_codec_args());
                args.extend(["-c:a".into(), "copy".into()]);
            }
            StageOperation::Pan(pan) => {
                args.extend(["-i".into(), input.display().to_string(), "-vf".into(), pan_filter(pan)]);
                args.extend(self.video_codec_args());
                args.extend(["-c:a".into(), "copy".into()]);
            }
            StageOperation::Rescale { target } => {
                args.extend(["-i".into(), input.display().to_string(), "-vf".into(), scale_filter(*target)]);
                args.extend(self.video_codec_args());
                args.extend(["-c:a".into(), "copy".into()]);
            }
        }

        args.extend(["-y".into(), output.display().to_string()]);
        args
    }

    pub fn concat_args(&self, inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into()];
        for input in inputs {
            args.extend(["-i".into(), input.display().to_string()]);
        }

        let pads: String = (0..inputs.len()).map(|i| format!("[{i}:v:0][{i}:a:0]")).collect();
        args.extend([
            "-filter_complex".into(),
            format!("{}concat=n={}:v=1:a=1[v][a]", pads, inputs.len()),
            "-map".into(),
            "[v]".into(),
            "-map".into(),
            "[a]".into(),
        ]);
        args.extend(self.video_codec_args());
        args.extend(self.audio_codec_args());
        args.extend(["-y".into(), output.display().to_string()]);
        args
    }

    fn video_codec_args(&self) -> [String; 8] {
        [
            "-c:v".into(),
            self.encoding.video_codec.clone(),
            "-preset".into(),
            self.encoding.preset.clone(),
            "-crf".into(),
            self.encoding.crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ]
    }

    fn audio_codec_args(&self) -> [String; 2] {
        ["-c:a".into(), self.encoding.audio_codec.clone()]
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        [&self.tools.ffmpeg, &self.tools.ffprobe].iter().all(|program| {
            std::process::Command::new(program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    async fn probe(&self, path: &Path) -> Result<SourceInfo, ProbeError> {
        let args = Self::probe_args(path);
        let output = run_tool(&self.tools.ffprobe, &args, self.tools.probe_timeout())
            .await
            .map_err(|e| match e {
                ToolError::TimedOut { secs } => ProbeError::TimedOut {
                    path: path.display().to_string(),
                    secs,
                },
                other => ProbeError::ToolFailed {
                    path: path.display().to_string(),
                    reason: other.to_string(),
                },
            })?;

        parse_probe_output(path, &String::from_utf8_lossy(&output.stdout))
    }

    async fn transform(
        &self,
        input: &Path,
        operation: &StageOperation,
        output: &Path,
    ) -> Result<(), ToolError> {
        let args = self.transform_args(input, operation, output);
        run_tool(&self.tools.ffmpeg, &args, self.tools.stage_timeout()).await?;
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let args = self.concat_args(inputs, output);
        run_tool(&self.tools.ffmpeg, &args, self.tools.stage_timeout()).await?;
        Ok(())
    }
}

/// Run an external tool to completion, killing it if `limit` elapses
async fn run_tool(program: &Path, args: &[String], limit: Duration) -> Result<Output, ToolError> {
    debug!("Running {} {}", program.display(), args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::Spawn {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ToolError::Spawn {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?,
        Err(_) => {
            return Err(ToolError::TimedOut {
                secs: limit.as_secs_f64().ceil() as u64,
            })
        }
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    r_frame_rate: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output into [`SourceInfo`]
pub fn parse_probe_output(path: &Path, json: &str) -> Result<SourceInfo, ProbeError> {
    let path_str = path.display().to_string();
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| ProbeError::ToolFailed {
        path: path_str.clone(),
        reason: format!("unreadable probe output: {}", e),
    })?;

    let is_type = |s: &ProbeStream, kind: &str| s.codec_type.as_deref() == Some(kind);

    let video = probe
        .streams
        .iter()
        .find(|s| is_type(s, "video"))
        .ok_or_else(|| ProbeError::MissingVideoStream { path: path_str.clone() })?;

    let raw_rate = video.r_frame_rate.clone().unwrap_or_default();
    let fps = parse_frame_rate(&raw_rate).ok_or_else(|| ProbeError::UnrecognizedFrameRate {
        path: path_str.clone(),
        raw: raw_rate.clone(),
    })?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| ProbeError::ToolFailed {
            path: path_str.clone(),
            reason: "no duration reported".to_string(),
        })?;

    let resolution = match (video.width, video.height) {
        (Some(width), Some(height)) => Some(Resolution::new(width, height)),
        _ => None,
    };

    Ok(SourceInfo {
        fps,
        duration,
        has_audio: probe.streams.iter().any(|s| is_type(s, "audio")),
        resolution,
    })
}

/// Frame rate given as `30` or `30000/1001`
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    let rate = match parts.as_slice() {
        [value] => value.trim().parse::<f64>().ok()?,
        [num, den] => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        _ => return None,
    };
    rate.is_finite().then_some(rate)
}

/// `atempo` chain whose factors multiply to `factor`, each within range
pub fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut stages = Vec::new();
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);

    stages
        .iter()
        .map(|f| format!("atempo={}", num(*f)))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn speed_filter(factor: f64) -> String {
    format!(
        "[0:v]setpts={}*PTS[v];[0:a]{}[a]",
        num(1.0 / factor),
        atempo_chain(factor)
    )
}

/// `zoompan` moving the zoom level linearly per frame around a fixed center
pub fn zoom_filter(zoom: &ZoomMotion) -> String {
    // Derived from the frame number so rounding never accumulates over long zooms
    let travel = zoom.magnitude() - 1.0;
    let level = match zoom.direction {
        ZoomDirection::In => format!(
            "min({}+{}*on/{},{})",
            num(zoom.start_level),
            num(travel),
            num(zoom.frames),
            num(zoom.end_level)
        ),
        ZoomDirection::Out => format!(
            "max({}-{}*on/{},{})",
            num(zoom.start_level),
            num(travel),
            num(zoom.frames),
            num(zoom.end_level)
        ),
    };

    format!(
        "zoompan=z='{}':x='clip({}-iw/zoom/2,0,iw-iw/zoom)':y='clip({}-ih/zoom/2,0,ih-ih/zoom)':d=1:s={}:fps={}",
        level,
        num(zoom.center.x),
        num(zoom.center.y),
        zoom.output,
        num(zoom.fps)
    )
}

/// `crop` whose origin moves at constant velocity over time
pub fn pan_filter(pan: &PanMotion) -> String {
    let Resolution { width, height } = pan.resolution;
    format!(
        "crop={w}:{h}:x='clip({x0}+{vx}*min(t,{d})-{w}/2,0,iw-{w})':y='clip({y0}+{vy}*min(t,{d})-{h}/2,0,ih-{h})'",
        w = width,
        h = height,
        x0 = num(pan.from.x),
        y0 = num(pan.from.y),
        vx = num(pan.velocity.0),
        vy = num(pan.velocity.1),
        d = num(pan.duration),
    )
}

/// Letterboxed scale to an exact frame size
pub fn scale_filter(target: Resolution) -> String {
    let Resolution { width, height } = target;
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
        w = width,
        h = height
    )
}

fn secs(value: f64) -> String {
    format!("{:.6}", value)
}

fn num(value: f64) -> String {
    let text = format!("{:.6}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
