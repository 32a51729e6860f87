//! Per-sample synthesis into fixed-size output chunks, and the clock that
//! tracks how much time each chunk covers.

use crate::dsp::dither::Dither;
use crate::dsp::noise::PinkNoise;
use crate::dsp::{alloc_table, SineTable, WaveTables, PHASE_MASK};
use crate::error::Result;
use crate::scheduler::{Channel, Channels};
use crate::time::H24;
use crate::voices::{Voice, N_CH};

/// Size of an output chunk and the time it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGeometry {
    /// Interleaved 16-bit samples per chunk (two per frame).
    pub shorts: usize,
    /// Whole milliseconds per chunk.
    pub buf_ms: i32,
    /// Remaining fraction of a millisecond per chunk, in 1/65536ths.
    pub buf_lo: i32,
}

impl ChunkGeometry {
    /// `sample_rate * 2 / param_rate` samples, rounded down to a power of two.
    pub fn new(sample_rate: u32, param_rate: u32) -> Self {
        let mut shorts = (sample_rate as usize * 2 / param_rate.max(1) as usize).max(2);
        while shorts & (shorts - 1) != 0 {
            shorts &= shorts - 1;
        }
        let lo = (0x10000 as f64 * 1000.0 * 0.5 * shorts as f64 / sample_rate as f64) as i32;
        Self {
            shorts,
            buf_ms: lo >> 16,
            buf_lo: lo & 0xFFFF,
        }
    }

    pub fn bytes(&self) -> usize {
        self.shorts * 2
    }

    pub fn frames(&self) -> usize {
        self.shorts / 2
    }
}

/// Time of day in milliseconds, advanced one chunk at a time with a 16-bit
/// fractional remainder so that long runs do not drift.
#[derive(Debug, Clone, Copy)]
pub struct ChunkClock {
    geometry: ChunkGeometry,
    now: i32,
    now_lo: i32,
}

impl ChunkClock {
    pub fn new(start: i32, geometry: ChunkGeometry) -> Self {
        Self {
            geometry,
            now: start,
            now_lo: 0,
        }
    }

    pub fn now(&self) -> i32 {
        self.now
    }

    pub fn advance(&mut self) {
        let mut ms = self.geometry.buf_ms;
        self.now_lo += self.geometry.buf_lo;
        if self.now_lo >= 0x10000 {
            ms += self.now_lo >> 16;
            self.now_lo &= 0xFFFF;
        }
        self.now += ms;
        if self.now >= H24 {
            self.now -= H24;
        }
    }
}

#[inline]
fn step(phase: u32, inc: i32) -> u32 {
    phase.wrapping_add(inc as u32) & PHASE_MASK
}

#[inline]
fn saturate(acc: i64) -> i32 {
    acc.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// The sixteen channels together with the generators they draw on.
pub struct Synth<'a> {
    sine: &'a SineTable,
    noise: PinkNoise,
    dither: Dither,
    channels: Channels,
    out: Vec<u8>,
    bell_period: i32,
}

impl<'a> Synth<'a> {
    pub fn new(sine: &'a SineTable, sample_rate: u32, geometry: ChunkGeometry) -> Result<Self> {
        Ok(Self {
            sine,
            noise: PinkNoise::new(),
            dither: Dither::new(),
            channels: [Channel::default(); N_CH],
            out: alloc_table::<u8>(geometry.bytes())?,
            bell_period: (sample_rate / 20) as i32,
        })
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut Channels {
        &mut self.channels
    }

    /// Synthesize one chunk and return it as little-endian interleaved
    /// stereo samples.
    pub fn render(&mut self, waves: &WaveTables) -> &[u8] {
        for frame in self.out.chunks_exact_mut(4) {
            let ns = self.noise.next_sample() as i64;
            let mut left: i64 = 0;
            let mut right: i64 = 0;

            for ch in self.channels.iter_mut() {
                let amp = ch.amp as i64;
                match ch.voice {
                    // There is no mix input, so mix channels add nothing.
                    Voice::Off | Voice::Mix { .. } => {}
                    Voice::Binaural { .. } => {
                        ch.phase1 = step(ch.phase1, ch.inc1);
                        ch.phase2 = step(ch.phase2, ch.inc2);
                        left += amp * self.sine.at(ch.phase1) as i64;
                        right += ch.amp2 as i64 * self.sine.at(ch.phase2) as i64;
                    }
                    Voice::Noise { .. } => {
                        left += ns * amp;
                        right += ns * amp;
                    }
                    Voice::Bell { .. } => {
                        if ch.bell_level == 0 {
                            continue;
                        }
                        ch.phase1 = step(ch.phase1, ch.inc1);
                        let val = ch.bell_level as i64 * self.sine.at(ch.phase1) as i64;
                        left += val;
                        right += val;
                        ch.bell_countdown -= 1;
                        if ch.bell_countdown < 0 {
                            // Roughly 8% quieter every 50ms.
                            ch.bell_countdown = self.bell_period;
                            ch.bell_level -= 1 + ch.bell_level / 12;
                        }
                    }
                    Voice::Spin { .. } => {
                        ch.phase1 = step(ch.phase1, ch.inc1);
                        let val =
                            ((ch.spin_width as i64 * self.sine.at(ch.phase1) as i64) >> 24) as i32;
                        left += amp * self.noise.history(128 + val) as i64;
                        right += amp * self.noise.history(128 - val) as i64;
                    }
                    Voice::Wave { wave, .. } => {
                        let Some(table) = waves.get(wave as usize) else {
                            continue;
                        };
                        ch.phase1 = step(ch.phase1, ch.inc1);
                        ch.phase2 = step(ch.phase2, ch.inc2);
                        left += amp * table[(ch.phase1 >> 16) as usize] as i64;
                        right += amp * table[(ch.phase2 >> 16) as usize] as i64;
                    }
                }
            }

            let (l, r) = self.dither.truncate(saturate(left), saturate(right));
            frame[..2].copy_from_slice(&l.to_le_bytes());
            frame[2..].copy_from_slice(&r.to_le_bytes());
        }
        &self.out
    }
}
