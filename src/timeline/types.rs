use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// A named reference to a physical media file
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Unique key used by timeline records
    pub name: String,

    /// Frame considered time zero for this source (reserved for alignment)
    pub ref_frame: u64,

    /// Separately recorded audio track, if any
    pub audio_path: Option<PathBuf>,

    /// Path to the media file
    pub path: PathBuf,
}

/// A 2D pixel coordinate inside a source frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Center {
    pub x: f64,
    pub y: f64,
}

impl Center {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl FromStr for Center {
    type Err = ();

    /// Parses `X:Y`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.split_once(':').ok_or(())?;
        let x: f64 = x.trim().parse().map_err(|_| ())?;
        let y: f64 = y.trim().parse().map_err(|_| ())?;
        if !x.is_finite() || !y.is_finite() {
            return Err(());
        }
        Ok(Self { x, y })
    }
}

impl fmt::Display for Center {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for Resolution {
    type Err = ();

    /// Parses `WxH`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s.split_once(['x', 'X']).ok_or(())?;
        let width = w.trim().parse().map_err(|_| ())?;
        let height = h.trim().parse().map_err(|_| ())?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Visual-transform target declared at an endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    pub center: Center,
    pub resolution: Resolution,
}

/// One side of a clip's usage window
///
/// A bare endpoint (no framing) means no visual transform at this boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    /// Frame index into the source
    pub frame: u64,

    pub framing: Option<Framing>,
}

impl Endpoint {
    pub fn bare(frame: u64) -> Self {
        Self { frame, framing: None }
    }

    pub fn framed(frame: u64, center: Center, resolution: Resolution) -> Self {
        Self {
            frame,
            framing: Some(Framing { center, resolution }),
        }
    }

    pub fn center(&self) -> Option<Center> {
        self.framing.map(|f| f.center)
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.framing.map(|f| f.resolution)
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    /// Parses `[FRAME]` or `[FRAME, X:Y, WxH]`; the brackets are optional
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedEndpoint { text: s.trim().to_string() };

        let inner = s.trim();
        let inner = inner.strip_prefix('[').unwrap_or(inner);
        let inner = inner.strip_suffix(']').unwrap_or(inner);
        let fields: Vec<&str> = inner.split(',').map(str::trim).collect();

        match fields.as_slice() {
            [frame] => {
                let frame = frame.parse().map_err(|_| malformed())?;
                Ok(Self::bare(frame))
            }
            [frame, center, resolution] => {
                let frame = frame.parse().map_err(|_| malformed())?;
                let center = center.parse().map_err(|_| malformed())?;
                let resolution = resolution.parse().map_err(|_| malformed())?;
                Ok(Self::framed(frame, center, resolution))
            }
            _ => Err(malformed()),
        }
    }
}

/// Playback speed factor (strictly positive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed(f64);

impl Speed {
    pub const NORMAL: Speed = Speed(1.0);

    pub fn new(factor: f64) -> Option<Self> {
        (factor.is_finite() && factor > 0.0).then_some(Self(factor))
    }

    pub fn factor(&self) -> f64 {
        self.0
    }

    pub fn is_normal(&self) -> bool {
        self.0 == 1.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl FromStr for Speed {
    type Err = ();

    /// Parses a decimal (`0.5`) or a ratio (`1/2`); empty means normal speed
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::NORMAL);
        }

        let factor = match s.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.trim().parse().map_err(|_| ())?;
                let den: f64 = den.trim().parse().map_err(|_| ())?;
                num / den
            }
            None => s.parse().map_err(|_| ())?,
        };

        Self::new(factor).ok_or(())
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// What to do with a clip's audio track
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AudioDirective {
    /// Keep the clip's own audio
    #[default]
    None,

    /// Replace audio with generated silence
    Silence,

    /// Replace audio with the track at the given path
    Replace(PathBuf),
}

impl AudioDirective {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for AudioDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Silence => f.write_str("silence"),
            Self::Replace(path) => write!(f, "replace={}", path.display()),
        }
    }
}

/// One clip instance in final output order
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    /// Name of the referenced [`Source`]
    pub source: String,
    pub speed: Speed,
    pub audio: AudioDirective,
    pub start: Endpoint,
    pub end: Endpoint,
}

impl TimelineEntry {
    /// Whether the entry declares a visual transform at either endpoint
    pub fn has_framing(&self) -> bool {
        self.start.framing.is_some() || self.end.framing.is_some()
    }
}

/// Parsed sources and timeline entries in declaration order
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    sources: Vec<Source>,
    index: HashMap<String, usize>,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; names must be unique
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        ref_frame: u64,
        audio_path: Option<PathBuf>,
        path: impl Into<PathBuf>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ConfigError::DuplicateSource { name });
        }

        self.index.insert(name.clone(), self.sources.len());
        self.sources.push(Source {
            name,
            ref_frame,
            audio_path,
            path: path.into(),
        });
        Ok(())
    }

    /// Append a timeline entry referencing an already registered source
    pub fn add_entry(
        &mut self,
        source: &str,
        speed: Speed,
        audio: AudioDirective,
        start: Endpoint,
        end: Endpoint,
    ) -> Result<(), ConfigError> {
        if !self.index.contains_key(source) {
            return Err(ConfigError::UnknownSource { name: source.to_string() });
        }

        if end.frame < start.frame {
            return Err(ConfigError::MalformedRecord {
                reason: format!(
                    "end frame {} precedes start frame {}",
                    end.frame, start.frame
                ),
            });
        }

        self.entries.push(TimelineEntry {
            source: source.to_string(),
            speed,
            audio,
            start,
            end,
        });
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.index.get(name).map(|&i| &self.sources[i])
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter()
    }

    /// Entries paired with the source they reference
    pub fn clips(&self) -> impl Iterator<Item = (&TimelineEntry, &Source)> {
        self.entries
            .iter()
            .filter_map(move |entry| self.source(&entry.source).map(|source| (entry, source)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct media paths used by at least one entry, in first-use order
    pub fn used_paths(&self) -> Vec<&Path> {
        let mut seen = Vec::new();
        for (_, source) in self.clips() {
            if !seen.contains(&source.path.as_path()) {
                seen.push(source.path.as_path());
            }
        }
        seen
    }
}
