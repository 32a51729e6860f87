pub mod dither;
pub mod noise;
pub mod sinc;

use crate::error::Result;

/// Amplitude of a wave in the sine table.
pub const ST_AMP: i32 = 0x7FFFF;
/// Number of entries in the sine table (power of two).
pub const ST_SIZ: usize = 16384;
/// Mask applied to 16.16 phase accumulators.
pub const PHASE_MASK: u32 = ((ST_SIZ as u32) << 16) - 1;
/// Number of user-definable waveform slots (`wave00` to `wave99`).
pub const N_WAVES: usize = 100;

/// Allocate a zeroed table, reporting allocation failure instead of aborting.
pub(crate) fn alloc_table<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut table = Vec::new();
    table.try_reserve_exact(len)?;
    table.resize(len, T::default());
    Ok(table)
}

/// One cycle of a sine wave scaled to `±ST_AMP`.
pub struct SineTable {
    table: Vec<i32>,
}

impl SineTable {
    pub fn new() -> Result<Self> {
        let mut table = alloc_table::<i32>(ST_SIZ)?;
        for (a, v) in table.iter_mut().enumerate() {
            *v = (ST_AMP as f64 * (a as f64 * std::f64::consts::PI * 2.0 / ST_SIZ as f64).sin())
                as i32;
        }
        Ok(Self { table })
    }

    #[inline]
    pub fn at(&self, phase: u32) -> i32 {
        self.table[(phase >> 16) as usize]
    }
}

/// Custom waveform tables, indexed by the `NN` of `waveNN`.
#[derive(Debug)]
pub struct WaveTables {
    waves: Vec<Option<Vec<i32>>>,
}

impl Default for WaveTables {
    fn default() -> Self {
        Self {
            waves: vec![None; N_WAVES],
        }
    }
}

impl WaveTables {
    pub fn is_defined(&self, index: usize) -> bool {
        self.waves.get(index).is_some_and(|w| w.is_some())
    }

    pub fn insert(&mut self, index: usize, table: Vec<i32>) {
        debug_assert_eq!(table.len(), ST_SIZ);
        self.waves[index] = Some(table);
    }

    pub fn get(&self, index: usize) -> Option<&[i32]> {
        self.waves.get(index).and_then(|w| w.as_deref())
    }

    pub fn defined_count(&self) -> usize {
        self.waves.iter().filter(|w| w.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_table_quarter_points() {
        let sine = SineTable::new().unwrap();
        let quarter = (ST_SIZ as u32 / 4) << 16;
        assert_eq!(sine.at(0), 0);
        assert_eq!(sine.at(quarter), ST_AMP);
        assert!((sine.at(3 * quarter) + ST_AMP).abs() <= 1);
        assert!(sine.at(2 * quarter).abs() <= 1);
    }

    #[test]
    fn wave_slots() {
        let mut waves = WaveTables::default();
        assert!(!waves.is_defined(7));
        waves.insert(7, vec![0; ST_SIZ]);
        assert!(waves.is_defined(7));
        assert!(!waves.is_defined(100));
        assert_eq!(waves.defined_count(), 1);
        assert!(waves.get(6).is_none());
    }
}
