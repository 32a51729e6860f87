use super::ST_AMP;

/// Number of smoothed low-frequency bands.
pub const NS_BANDS: usize = 9;
/// Noise is generated internally with amplitude `ST_AMP << NS_ADJ`.
pub const NS_ADJ: u32 = 12;
const NS_AMP: i32 = ST_AMP << NS_ADJ;
const NS_STEP: i32 = NS_AMP / 65535 / (NS_BANDS as i32 + 1);
const RAND_MULT: i32 = 75;
/// Length of the history ring read by the spin effect.
pub const HISTORY_LEN: usize = 256;

#[derive(Clone, Copy, Default)]
struct Band {
    val: i32,
    inc: i32,
}

/// Simulated pink noise with the same scaling as the sine table.
///
/// A base white term is drawn on every call; band `k` is re-aimed at a fresh
/// random value every `2^(k+1)` calls and glides towards it in between,
/// giving roughly 3dB/octave of falloff.
pub struct PinkNoise {
    seed: i32,
    bands: [Band; NS_BANDS],
    counter: u32,
    history: [i32; HISTORY_LEN],
    history_pos: u8,
}

impl Default for PinkNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl PinkNoise {
    pub fn new() -> Self {
        Self {
            seed: 2,
            bands: [Band::default(); NS_BANDS],
            counter: 0,
            history: [0; HISTORY_LEN],
            history_pos: 0,
        }
    }

    /// Repeating sequence of 65536 odd numbers in -65535..=65535, after the
    /// ZX Spectrum generator.
    #[inline]
    fn next_random(&mut self) -> i32 {
        self.seed = self.seed * RAND_MULT % 131074;
        (self.seed - 65535) * NS_STEP
    }

    /// Generate the next sample and record it in the history ring.
    pub fn next_sample(&mut self) -> i32 {
        let off = self.counter;
        self.counter = self.counter.wrapping_add(1);
        let mut tot = self.next_random();
        let mut cnt: u32 = 1;
        let mut k = 0;

        while k < NS_BANDS && cnt & off != 0 {
            let val = self.next_random();
            cnt += cnt;
            let band = &mut self.bands[k];
            band.inc = (val - band.val) / cnt as i32;
            band.val += band.inc;
            tot += band.val;
            k += 1;
        }
        for band in &mut self.bands[k..] {
            band.val += band.inc;
            tot += band.val;
        }

        let out = tot >> NS_ADJ;
        self.history[self.history_pos as usize] = out;
        self.history_pos = self.history_pos.wrapping_add(1);
        out
    }

    /// Past noise sample `offset` entries after the current write position,
    /// wrapping around the ring.
    #[inline]
    pub fn history(&self, offset: i32) -> i32 {
        self.history[(self.history_pos as i32).wrapping_add(offset) as u8 as usize]
    }
}
