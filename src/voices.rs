use serde::Serialize;

use crate::scan::Scanner;

/// Number of synthesis channels.
pub const N_CH: usize = 16;

/// Internal amplitude for 100%.
pub const AMP_FULL: f64 = 4096.0;

/// Display percentage to internal amplitude.
#[inline]
pub fn amp_from_percent(pc: f64) -> f64 {
    40.96 * pc
}

/// Internal amplitude to display percentage.
#[inline]
pub fn amp_to_percent(amp: f64) -> f64 {
    amp / 40.96
}

/// One signal generator and its parameters.
///
/// Amplitudes use the internal 0-4096 scale. `carr` is a frequency in Hz for
/// tones and bells; for spin, `width` is the sweep width in microseconds and
/// `rate` the (signed) rotation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Voice {
    Off,
    Binaural { amp: f64, carr: f64, res: f64 },
    Noise { amp: f64 },
    Bell { amp: f64, carr: f64 },
    Spin { amp: f64, width: f64, rate: f64 },
    Mix { amp: f64 },
    Wave { wave: u8, amp: f64, carr: f64, res: f64 },
}

/// The generator selected by a [`Voice`], without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    Off,
    Binaural,
    Noise,
    Bell,
    Spin,
    Mix,
    Wave(u8),
}

pub type VoiceSet = [Voice; N_CH];

pub const SILENCE: VoiceSet = [Voice::Off; N_CH];

impl Default for Voice {
    fn default() -> Self {
        Voice::Off
    }
}

impl Voice {
    pub fn kind(&self) -> VoiceKind {
        match *self {
            Voice::Off => VoiceKind::Off,
            Voice::Binaural { .. } => VoiceKind::Binaural,
            Voice::Noise { .. } => VoiceKind::Noise,
            Voice::Bell { .. } => VoiceKind::Bell,
            Voice::Spin { .. } => VoiceKind::Spin,
            Voice::Mix { .. } => VoiceKind::Mix,
            Voice::Wave { wave, .. } => VoiceKind::Wave(wave),
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Voice::Off)
    }

    pub fn is_bell(&self) -> bool {
        matches!(self, Voice::Bell { .. })
    }

    /// Tone generators whose two sidebands sit at `carr ± res/2`.
    pub fn is_pitched(&self) -> bool {
        matches!(self, Voice::Binaural { .. } | Voice::Wave { .. })
    }

    pub fn amp(&self) -> f64 {
        match *self {
            Voice::Off => 0.0,
            Voice::Binaural { amp, .. }
            | Voice::Noise { amp }
            | Voice::Bell { amp, .. }
            | Voice::Spin { amp, .. }
            | Voice::Mix { amp }
            | Voice::Wave { amp, .. } => amp,
        }
    }

    pub fn set_amp(&mut self, value: f64) {
        match self {
            Voice::Off => {}
            Voice::Binaural { amp, .. }
            | Voice::Noise { amp }
            | Voice::Bell { amp, .. }
            | Voice::Spin { amp, .. }
            | Voice::Mix { amp }
            | Voice::Wave { amp, .. } => *amp = value,
        }
    }

    pub fn with_amp(mut self, value: f64) -> Self {
        self.set_amp(value);
        self
    }

    /// Pitch-like parameters (carrier, resonance), for the types that have both.
    pub fn pitch(&self) -> Option<(f64, f64)> {
        match *self {
            Voice::Binaural { carr, res, .. } | Voice::Wave { carr, res, .. } => Some((carr, res)),
            Voice::Spin { width, rate, .. } => Some((width, rate)),
            _ => None,
        }
    }

    fn set_pitch(&mut self, p0: f64, p1: f64) {
        match self {
            Voice::Binaural { carr, res, .. } | Voice::Wave { carr, res, .. } => {
                *carr = p0;
                *res = p1;
            }
            Voice::Spin { width, rate, .. } => {
                *width = p0;
                *rate = p1;
            }
            _ => {}
        }
    }

    /// Average two voices of the same kind: amplitude always, and the pitch
    /// parameters for tones, waves and spin.
    pub fn average(&self, other: &Voice) -> Voice {
        let mut out = self.with_amp((self.amp() + other.amp()) / 2.0);
        if let (Some((a0, a1)), Some((b0, b1))) = (self.pitch(), other.pitch()) {
            out.set_pitch((a0 + b0) / 2.0, (a1 + b1) / 2.0);
        }
        out
    }

    /// Linear blend from `self` (weight `rat0`) to `end` (weight `rat1`).
    ///
    /// Bells never blend: they only ring at the start of a period. A voice
    /// whose end point has a different kind keeps its start value.
    pub fn blend(&self, end: &Voice, rat0: f64, rat1: f64) -> Voice {
        let mix = |a: f64, b: f64| rat0 * a + rat1 * b;
        match (*self, *end) {
            (
                Voice::Binaural { amp, carr, res },
                Voice::Binaural { amp: a1, carr: c1, res: r1 },
            ) => Voice::Binaural {
                amp: mix(amp, a1),
                carr: mix(carr, c1),
                res: mix(res, r1),
            },
            (Voice::Noise { amp }, Voice::Noise { amp: a1 }) => Voice::Noise { amp: mix(amp, a1) },
            (Voice::Mix { amp }, Voice::Mix { amp: a1 }) => Voice::Mix { amp: mix(amp, a1) },
            (
                Voice::Spin { amp, width, rate },
                Voice::Spin { amp: a1, width: w1, rate: r1 },
            ) => Voice::Spin {
                amp: mix(amp, a1),
                width: mix(width, w1),
                rate: mix(rate, r1),
            },
            (
                Voice::Wave { wave, amp, carr, res },
                Voice::Wave { wave: w1, amp: a1, carr: c1, res: r1 },
            ) if wave == w1 => Voice::Wave {
                wave,
                amp: mix(amp, a1),
                carr: mix(carr, c1),
                res: mix(res, r1),
            },
            (start, _) => start,
        }
    }

    /// Parse one preset token such as `200+10/20`, `pink/30` or
    /// `wave03:150-4/15`. `-` is an explicit off.
    pub fn parse_token(token: &str) -> Option<Voice> {
        if token == "-" {
            return Some(Voice::Off);
        }
        let pct = |v: f64| amp_from_percent(v);

        let noise = || {
            let mut s = Scanner::new(token);
            s.lit("pink/")?;
            let amp = s.float()?;
            s.end()?;
            Some(Voice::Noise { amp: pct(amp) })
        };
        let bell = || {
            let mut s = Scanner::new(token);
            s.lit("bell")?;
            let carr = s.float()?;
            s.lit("/")?;
            let amp = s.float()?;
            s.end()?;
            Some(Voice::Bell { amp: pct(amp), carr })
        };
        let mix = || {
            let mut s = Scanner::new(token);
            s.lit("mix/")?;
            let amp = s.float()?;
            s.end()?;
            Some(Voice::Mix { amp: pct(amp) })
        };
        let tone = || {
            let mut s = Scanner::new(token);
            let carr = s.float()?;
            let res = s.float()?;
            s.lit("/")?;
            let amp = s.float()?;
            s.end()?;
            Some(Voice::Binaural { amp: pct(amp), carr, res })
        };
        let plain_tone = || {
            let mut s = Scanner::new(token);
            let carr = s.float()?;
            s.lit("/")?;
            let amp = s.float()?;
            s.end()?;
            Some(Voice::Binaural { amp: pct(amp), carr, res: 0.0 })
        };
        let spin = || {
            let mut s = Scanner::new(token);
            s.lit("spin:")?;
            let width = s.float()?;
            let rate = s.float()?;
            s.lit("/")?;
            let amp = s.float()?;
            s.end()?;
            Some(Voice::Spin { amp: pct(amp), width, rate })
        };

        noise()
            .or_else(bell)
            .or_else(mix)
            .or_else(tone)
            .or_else(plain_tone)
            .or_else(spin)
    }
}

/// Result of scanning a `waveNN:CARR RES/AMP` token. The wave number is
/// range-checked by the caller so it can report a precise diagnostic.
pub struct WaveToken {
    pub wave: i64,
    pub amp: f64,
    pub carr: f64,
    pub res: f64,
}

pub fn parse_wave_token(token: &str) -> Option<WaveToken> {
    let mut s = Scanner::new(token);
    s.lit("wave")?;
    let wave = s.int()?;
    s.lit(":")?;
    let carr = s.float()?;
    let res = s.float()?;
    s.lit("/")?;
    let amp = s.float()?;
    s.end()?;
    Some(WaveToken {
        wave,
        amp: amp_from_percent(amp),
        carr,
        res,
    })
}

/// Channel-by-channel equality of two voice sets.
pub fn voices_eq(a: &VoiceSet, b: &VoiceSet) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}
