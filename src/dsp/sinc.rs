//! Band-limited periodic waveforms from a handful of sample points.
//!
//! The points are repeated twice, the second copy inverted, and interpolated
//! with a periodic sinc function (see
//! <http://www-ccrma.stanford.edu/~jos/resample/>). The result is written in
//! the same format as the sine table.

use super::{alloc_table, ST_AMP, ST_SIZ};
use crate::error::Result;

/// Build a waveform table from `points`, each already normalised to 0..=1.
/// Callers must supply at least two points.
pub fn sinc_interpolate(points: &[f64]) -> Result<Vec<i32>> {
    let np = points.len();
    debug_assert!(np >= 2, "waveform needs at least two points, got {np}");

    // A true periodic sinc is sin(x)/x times an endless series that converges
    // slowly; 1-4t^2 over the first half cycle stays within about 5% of it.
    let mut sinc = alloc_table::<f64>(ST_SIZ)?;
    sinc[0] = 1.0;
    for a in (1..=ST_SIZ / 2).rev() {
        let tt = a as f64 / ST_SIZ as f64;
        let adj = 1.0 - 4.0 * tt * tt;
        let xx = 2.0 * np as f64 * std::f64::consts::PI * tt;
        let vv = adj * xx.sin() / xx;
        sinc[a] = vv;
        sinc[ST_SIZ - a] = vv;
    }

    let mask = ST_SIZ - 1;
    let mut out = alloc_table::<f64>(ST_SIZ)?;
    for (b, &val) in points.iter().enumerate() {
        let off = b * ST_SIZ / np / 2;
        for (a, &s) in sinc.iter().enumerate() {
            out[(a + off) & mask] += s * val;
            out[(a + off + ST_SIZ / 2) & mask] -= s * val;
        }
    }

    let (dmin, dmax) = out
        .iter()
        .fold((0.0f64, 0.0f64), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mut table = alloc_table::<i32>(ST_SIZ)?;
    if dmax - dmin <= f64::EPSILON {
        tracing::warn!("waveform is flat, using silence");
        return Ok(table);
    }
    let off = -0.5 * (dmax + dmin);
    let adj = ST_AMP as f64 / ((dmax - dmin) / 2.0);
    for (dst, &v) in table.iter_mut().zip(out.iter()) {
        *dst = ((v + off) * adj) as i32;
    }
    Ok(table)
}

/// Rescale raw sample values to 0..=1. A flat list maps to all zeros.
pub fn normalise(samples: &mut [f64]) {
    let (lo, hi) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    for s in samples.iter_mut() {
        *s = if range > 0.0 { (*s - lo) / range } else { 0.0 };
    }
}
