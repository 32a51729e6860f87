use serde::Serialize;

use crate::time::format_clock;
use crate::timeline::PeriodKey;
use crate::voices::{Voice, VoiceSet};

/// How a period enters or leaves its neighbouring transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeMode {
    /// `<` or `>`: fade to silence before changing.
    #[default]
    Silence,
    /// `-`: cross-fade when the voices are compatible, else via silence.
    Normal,
    /// `=`: slide pitches and amplitudes across the transition.
    Slide,
}

impl FadeMode {
    pub fn from_fade_in(c: u8) -> Option<Self> {
        match c {
            b'<' => Some(FadeMode::Silence),
            b'-' => Some(FadeMode::Normal),
            b'=' => Some(FadeMode::Slide),
            _ => None,
        }
    }

    pub fn from_fade_out(c: u8) -> Option<Self> {
        match c {
            b'>' => Some(FadeMode::Silence),
            b'-' => Some(FadeMode::Normal),
            b'=' => Some(FadeMode::Slide),
            _ => None,
        }
    }
}

/// Role of a period while the timeline is being built and corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    /// A period named by a time-line.
    Normal { fade_in: FadeMode, fade_out: FadeMode },
    /// Transition placeholder whose start is not yet known.
    Unspecified,
    /// Transition that starts where the following period was scheduled.
    Transition,
    /// `->` transition starting at the time-line's own time.
    Slide,
    /// Second half of a split transition.
    Midpoint,
}

impl PeriodKind {
    pub fn is_transition(&self) -> bool {
        matches!(
            self,
            PeriodKind::Unspecified | PeriodKind::Transition | PeriodKind::Slide
        )
    }

    pub fn fade_in(&self) -> FadeMode {
        match *self {
            PeriodKind::Normal { fade_in, .. } => fade_in,
            _ => FadeMode::Silence,
        }
    }

    pub fn fade_out(&self) -> FadeMode {
        match *self {
            PeriodKind::Normal { fade_out, .. } => fade_out,
            _ => FadeMode::Silence,
        }
    }
}

/// One node of the circular timeline. Voices blend linearly from `v0` at
/// `time` to `v1` at the start of the next node.
#[derive(Debug, Clone)]
pub struct Period {
    pub time: i32,
    pub v0: VoiceSet,
    pub v1: VoiceSet,
    pub kind: PeriodKind,
    pub(crate) next: PeriodKey,
    pub(crate) prev: PeriodKey,
}

impl Period {
    pub fn next(&self) -> PeriodKey {
        self.next
    }

    pub fn prev(&self) -> PeriodKey {
        self.prev
    }
}

/// Serializable view of a compiled period, as printed by `check --json`.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub start: String,
    pub start_ms: i32,
    pub duration_ms: i32,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel: usize,
    pub from: Voice,
    pub to: Voice,
}

impl PeriodSummary {
    pub(crate) fn new(period: &Period, duration_ms: i32) -> Self {
        let channels = period
            .v0
            .iter()
            .zip(period.v1.iter())
            .enumerate()
            .filter(|(_, (a, b))| !a.is_off() || !b.is_off())
            .map(|(channel, (a, b))| ChannelSummary {
                channel,
                from: *a,
                to: *b,
            })
            .collect();
        Self {
            start: format_clock(period.time),
            start_ms: period.time,
            duration_ms,
            channels,
        }
    }
}
