/// Accumulators above this level are left undithered so that adding the
/// dither can never carry into the sign bit.
pub const DITHER_CEILING: i32 = 0x7FFF_0000;

/// 16-bit linear congruential sequence used to dither the truncation of
/// 32-bit mix accumulators down to 16-bit output samples.
#[derive(Default)]
pub struct Dither {
    rand0: i32,
    rand1: i32,
}

impl Dither {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the sequence, returning a value in `0..0x10000`.
    #[inline]
    pub fn next_value(&mut self) -> i32 {
        self.rand0 = self.rand1;
        self.rand1 = (self.rand0.wrapping_mul(0x660D).wrapping_add(0xF35F)) & 0xFFFF;
        self.rand0
    }

    /// Truncate a pair of accumulators to output samples, adding the same
    /// dither value to both channels.
    #[inline]
    pub fn truncate(&mut self, left: i32, right: i32) -> (i16, i16) {
        let d = self.next_value();
        (apply(left, d), apply(right, d))
    }
}

#[inline]
fn apply(acc: i32, d: i32) -> i16 {
    let acc = if acc <= DITHER_CEILING { acc + d } else { acc };
    (acc >> 16) as i16
}
