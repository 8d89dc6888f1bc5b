//! Line-oriented timeline format.
//!
//! ```text
//! # sources: name; reference frame; optional audio track; media path
//! video; intro; 0; ; ./Data/intro.mp4
//! video; talk; 12; ./Data/talk.wav; ./Data/talk.mp4
//!
//! # entries: source; speed; optional audio directive; start; end
//! timeline; intro; 1; none; [0]; [150]
//! timeline; talk; 2; ; [0, 960:540, 1920x1080]; [300, 960:540, 960x540]
//! timeline; talk; 1/2; replace=./Data/voice.wav; [300]; [390]
//! ```
//!
//! The older form where the source record starts directly with its name
//! (`video1; 0; ./Data/clip.mp4`) is still accepted.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::timeline::types::{AudioDirective, Endpoint, Speed, Timeline};

const SOURCE_KEYWORDS: [&str; 2] = ["video", "source"];
const TIMELINE_KEYWORD: &str = "timeline";

/// Load and parse a timeline file
pub fn load_timeline<P: AsRef<Path>>(path: P) -> Result<Timeline> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;
    Ok(parse_timeline(&content)?)
}

/// Parse timeline text into a [`Timeline`]
///
/// Source records must precede the timeline records that reference them.
pub fn parse_timeline(text: &str) -> std::result::Result<Timeline, ConfigError> {
    let mut timeline = Timeline::new();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        parse_record(&mut timeline, line).map_err(|e| e.at_line(i + 1))?;
    }

    debug!(
        "Parsed {} sources and {} timeline entries",
        timeline.sources().count(),
        timeline.len()
    );
    Ok(timeline)
}

fn parse_record(timeline: &mut Timeline, line: &str) -> std::result::Result<(), ConfigError> {
    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    let keyword = fields[0];

    if keyword == TIMELINE_KEYWORD {
        parse_entry(timeline, &fields[1..])
    } else if SOURCE_KEYWORDS.contains(&keyword) {
        parse_source(timeline, &fields[1..])
    } else if SOURCE_KEYWORDS.iter().any(|k| keyword.starts_with(k)) {
        parse_source(timeline, &fields)
    } else {
        Err(malformed(format!("unknown record '{}'", keyword)))
    }
}

/// `NAME; REF_FRAME; [AUDIO]; PATH`
fn parse_source(timeline: &mut Timeline, fields: &[&str]) -> std::result::Result<(), ConfigError> {
    let (name, ref_frame, audio, path) = match fields {
        [name, ref_frame, path] => (*name, *ref_frame, "", *path),
        [name, ref_frame, audio, path] => (*name, *ref_frame, *audio, *path),
        _ => {
            return Err(malformed(format!(
                "source record needs 3 or 4 fields, found {}",
                fields.len()
            )))
        }
    };

    if name.is_empty() {
        return Err(malformed("source name is empty"));
    }
    if path.is_empty() {
        return Err(malformed(format!("source '{}' has no media path", name)));
    }

    let ref_frame = ref_frame
        .parse()
        .map_err(|_| malformed(format!("reference frame '{}' is not a frame number", ref_frame)))?;
    let audio_path = (!audio.is_empty()).then(|| PathBuf::from(audio));

    timeline.add_source(name, ref_frame, audio_path, path)
}

/// `SOURCE; SPEED; [AUDIO]; START; END`
fn parse_entry(timeline: &mut Timeline, fields: &[&str]) -> std::result::Result<(), ConfigError> {
    let (name, speed, audio, start, end) = match fields {
        [name, speed, start, end] => (*name, *speed, "", *start, *end),
        [name, speed, audio, start, end] => (*name, *speed, *audio, *start, *end),
        _ => {
            return Err(malformed(format!(
                "timeline record needs 4 or 5 fields, found {}",
                fields.len()
            )))
        }
    };

    let source = timeline
        .source(name)
        .ok_or_else(|| ConfigError::UnknownSource { name: name.to_string() })?;

    let speed: Speed = speed
        .parse()
        .map_err(|_| malformed(format!("speed '{}' is not a positive number", speed)))?;

    let audio = match audio {
        "" => source
            .audio_path
            .clone()
            .map(AudioDirective::Replace)
            .unwrap_or_default(),
        other => parse_audio_directive(other)?,
    };

    let start: Endpoint = start.parse()?;
    let end: Endpoint = end.parse()?;

    timeline.add_entry(name, speed, audio, start, end)
}

fn parse_audio_directive(text: &str) -> std::result::Result<AudioDirective, ConfigError> {
    match text {
        "none" => Ok(AudioDirective::None),
        "silence" | "silent" => Ok(AudioDirective::Silence),
        _ => match text.split_once('=') {
            Some(("replace", path)) if !path.trim().is_empty() => {
                Ok(AudioDirective::Replace(PathBuf::from(path.trim())))
            }
            _ => Err(malformed(format!("unknown audio directive '{}'", text))),
        },
    }
}

fn malformed(reason: impl Into<String>) -> ConfigError {
    ConfigError::MalformedRecord { reason: reason.into() }
}
