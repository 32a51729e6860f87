use std::str::FromStr;

use crate::error::{Error, Result};
use crate::scan::float_prefix;

/// Most entries a roll-off table may hold.
pub const MAX_POINTS: usize = 16;

/// Headphone roll-off compensation: amplitude multipliers by frequency,
/// interpolated linearly between entries and held flat beyond the ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rolloff {
    points: Vec<(f64, f64)>,
}

impl Rolloff {
    /// Parse `freq=mult[,freq=mult]...`. Entries may come in any order.
    pub fn parse(spec: &str) -> Result<Self> {
        let bad = || {
            Error::Config(format!(
                "Bad roll-off spec; expecting <freq>=<amp>[,<freq>=<amp>]...: {spec}"
            ))
        };
        let mut points = Vec::new();
        if spec.trim().is_empty() {
            return Ok(Self { points });
        }
        for entry in spec.split(',').map(str::trim) {
            if points.len() >= MAX_POINTS {
                return Err(Error::Config(format!(
                    "Too many roll-off frequencies; maximum is {MAX_POINTS}"
                )));
            }
            let (freq, len) = float_prefix(entry).ok_or_else(bad)?;
            let after = entry[len..].strip_prefix('=').ok_or_else(bad)?.trim_start();
            let (adj, _) = float_prefix(after)
                .filter(|&(_, len)| len == after.len())
                .ok_or_else(bad)?;
            points.push((freq, adj));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Multiplier for `freq`. An empty table leaves amplitudes unchanged.
    pub fn adjust(&self, freq: f64) -> f64 {
        let (Some(&(f_lo, a_lo)), Some(&(f_hi, a_hi))) = (self.points.first(), self.points.last())
        else {
            return 1.0;
        };
        if freq <= f_lo {
            return a_lo;
        }
        if freq >= f_hi {
            return a_hi;
        }
        let upper = self
            .points
            .iter()
            .position(|&(f, _)| freq < f)
            .unwrap_or(self.points.len() - 1);
        let (f0, a0) = self.points[upper - 1];
        let (f1, a1) = self.points[upper];
        a0 + (a1 - a0) * (freq - f0) / (f1 - f0)
    }
}

impl FromStr for Rolloff {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Rolloff::parse(s)
    }
}
