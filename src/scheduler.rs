//! Walks the compiled timeline as playback time advances and turns the
//! interpolated voices into oscillator settings for the mixer.

use tracing::debug;

use crate::dsp::{ST_AMP, ST_SIZ};
use crate::parser::Schedule;
use crate::rolloff::Rolloff;
use crate::time::{duration_0, duration_24, format_clock};
use crate::timeline::PeriodKey;
use crate::voices::{Voice, VoiceKind, AMP_FULL, N_CH};

/// Oscillator state for one of the synthesis channels.
///
/// Phases are 16.16 fixed-point indices into a table of `ST_SIZ` entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Channel {
    /// Current interpolated voice.
    pub voice: Voice,
    pub amp: i32,
    /// Right-hand amplitude of a binaural tone.
    pub amp2: i32,
    pub phase1: u32,
    pub phase2: u32,
    pub inc1: i32,
    pub inc2: i32,
    /// Current bell amplitude, decaying towards zero.
    pub bell_level: i32,
    /// Samples left until the next bell decay step.
    pub bell_countdown: i32,
    /// Spin sweep width in noise-history entries, scaled by `2^24 / ST_AMP`.
    pub spin_width: i32,
}

impl Channel {
    fn reset(&mut self) {
        self.phase1 = 0;
        self.phase2 = 0;
        self.bell_level = 0;
        self.bell_countdown = 0;
    }
}

pub type Channels = [Channel; N_CH];

/// Tracks the period that contains the current playback time.
pub struct PeriodTracker {
    current: PeriodKey,
    rate: u32,
    spin_width_max: f64,
}

impl PeriodTracker {
    /// Start at the head of `schedule`. `None` for an empty timeline.
    pub fn new(schedule: &Schedule, rate: u32) -> Option<Self> {
        Some(Self {
            current: schedule.timeline().head()?,
            rate,
            spin_width_max: 127.0 / 1e-6 / rate as f64,
        })
    }

    /// Move to the period containing `now` and recompute every channel.
    ///
    /// Bells are rung only when a new period has been entered.
    pub fn update(
        &mut self,
        schedule: &Schedule,
        now: i32,
        rolloff: &Rolloff,
        channels: &mut Channels,
    ) {
        let timeline = schedule.timeline();
        let mut t0 = timeline[self.current].time;
        let mut t1 = timeline[timeline[self.current].next()].time;
        let mut trigger = false;
        while (now >= t0) ^ (now >= t1) ^ (t1 > t0) {
            self.current = timeline[self.current].next();
            t0 = timeline[self.current].time;
            t1 = timeline[timeline[self.current].next()].time;
            trigger = true;
        }
        if trigger {
            debug!(start = %format_clock(t0), now = %format_clock(now), "entered period");
        }

        let rat1 = duration_0(t0, now) as f64 / duration_24(t0, t1) as f64;
        let rat0 = 1.0 - rat1;
        let period = &timeline[self.current];
        for (ch, (v0, v1)) in channels
            .iter_mut()
            .zip(period.v0.iter().zip(period.v1.iter()))
        {
            if ch.voice.kind() != v0.kind() {
                ch.reset();
            }
            ch.voice = match *v0 {
                // A bell only rings briefly, so it never slides.
                Voice::Bell { .. } => *v0,
                Voice::Spin { .. } => match v0.blend(v1, rat0, rat1) {
                    Voice::Spin { amp, width, rate } => Voice::Spin {
                        amp,
                        width: width.clamp(-self.spin_width_max, self.spin_width_max),
                        rate,
                    },
                    other => other,
                },
                _ => v0.blend(v1, rat0, rat1),
            };
        }

        if !rolloff.is_empty() {
            limit_amplitudes(channels, rolloff);
        }
        for ch in channels.iter_mut() {
            self.configure(ch, rolloff, trigger);
        }
    }

    fn increment(&self, freq: f64) -> i32 {
        (freq / self.rate as f64 * ST_SIZ as f64 * 65536.0) as i32
    }

    fn configure(&self, ch: &mut Channel, rolloff: &Rolloff, trigger: bool) {
        match ch.voice {
            Voice::Off => {}
            Voice::Binaural { amp, carr, res } => {
                let freq1 = carr + res / 2.0;
                let freq2 = carr - res / 2.0;
                if rolloff.is_empty() {
                    ch.amp = amp as i32;
                    ch.amp2 = ch.amp;
                } else {
                    ch.amp = (amp * rolloff.adjust(freq1)) as i32;
                    ch.amp2 = (amp * rolloff.adjust(freq2)) as i32;
                }
                ch.inc1 = self.increment(freq1);
                ch.inc2 = self.increment(freq2);
            }
            Voice::Noise { amp } | Voice::Mix { amp } => {
                ch.amp = amp as i32;
            }
            Voice::Bell { amp, carr } => {
                ch.amp = amp as i32;
                ch.inc1 = self.increment(carr);
                if trigger {
                    ch.bell_level = ch.amp;
                    ch.bell_countdown = (self.rate / 20) as i32;
                }
            }
            Voice::Spin { amp, width, rate } => {
                ch.amp = amp as i32;
                ch.inc1 = self.increment(rate);
                ch.spin_width =
                    (width * 1e-6 * self.rate as f64 * (1 << 24) as f64 / ST_AMP as f64) as i32;
            }
            Voice::Wave { amp, carr, res, .. } => {
                ch.amp = amp as i32;
                ch.inc1 = self.increment(carr + res / 2.0);
                ch.inc2 = self.increment(carr - res / 2.0);
                // The two sidebands run in opposite directions.
                if ch.inc1 > ch.inc2 {
                    ch.inc2 = -ch.inc2;
                } else {
                    ch.inc1 = -ch.inc1;
                }
            }
        }
    }
}

/// Keep the summed amplitude within full scale, shrinking beat tones first
/// and sharing what is left among the other voices.
fn limit_amplitudes(channels: &mut Channels, rolloff: &Rolloff) {
    let mut beat = 0.0;
    let mut other = 0.0;
    for ch in channels.iter() {
        match ch.voice {
            Voice::Off => {}
            Voice::Binaural { amp, carr, res } | Voice::Wave { amp, carr, res, .. } => {
                let adj = rolloff
                    .adjust(carr + res / 2.0)
                    .max(rolloff.adjust(carr - res / 2.0));
                beat += amp * adj;
            }
            voice => other += voice.amp(),
        }
    }
    if beat + other <= AMP_FULL {
        return;
    }
    let adj_beat = if beat > AMP_FULL { AMP_FULL / beat } else { 1.0 };
    let adj_other = if other > 0.0 {
        (AMP_FULL - beat * adj_beat) / other
    } else {
        1.0
    };
    for ch in channels.iter_mut() {
        let scale = match ch.voice.kind() {
            VoiceKind::Off => continue,
            VoiceKind::Binaural | VoiceKind::Wave(_) => adj_beat,
            _ => adj_other,
        };
        let amp = ch.voice.amp();
        ch.voice.set_amp(amp * scale);
    }
}
