//! Circular doubly-linked list of periods, held in a slot arena.

use std::ops::{Index, IndexMut};

use slotmap::SlotMap;

use crate::models::{Period, PeriodKind};
use crate::time::duration_0;
use crate::voices::VoiceSet;

slotmap::new_key_type! {
    pub struct PeriodKey;
}

#[derive(Debug)]
pub struct Timeline {
    periods: SlotMap<PeriodKey, Period>,
    head: Option<PeriodKey>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            periods: SlotMap::with_key(),
            head: None,
        }
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// The node the list is anchored on. Iteration starts here.
    pub fn head(&self) -> Option<PeriodKey> {
        self.head
    }

    /// Append a node at the end of the cycle, just before the head.
    pub fn push_back(
        &mut self,
        time: i32,
        v0: VoiceSet,
        v1: VoiceSet,
        kind: PeriodKind,
    ) -> PeriodKey {
        match self.head {
            Some(head) => {
                let last = self.periods[head].prev;
                self.insert_after(last, time, v0, v1, kind)
            }
            None => {
                let key = self.periods.insert_with_key(|key| Period {
                    time,
                    v0,
                    v1,
                    kind,
                    next: key,
                    prev: key,
                });
                self.head = Some(key);
                key
            }
        }
    }

    /// Splice a new node in between `at` and its successor.
    pub fn insert_after(
        &mut self,
        at: PeriodKey,
        time: i32,
        v0: VoiceSet,
        v1: VoiceSet,
        kind: PeriodKind,
    ) -> PeriodKey {
        let next = self.periods[at].next;
        let key = self.periods.insert(Period {
            time,
            v0,
            v1,
            kind,
            next,
            prev: at,
        });
        self.periods[at].next = key;
        self.periods[next].prev = key;
        key
    }

    /// Remove `key` from the cycle. When it is the head, the head moves back
    /// to its predecessor.
    pub fn unlink(&mut self, key: PeriodKey) -> Option<Period> {
        let period = self.periods.remove(key)?;
        if period.next == key {
            self.head = None;
            return Some(period);
        }
        self.periods[period.prev].next = period.next;
        self.periods[period.next].prev = period.prev;
        if self.head == Some(key) {
            self.head = Some(period.prev);
        }
        Some(period)
    }

    /// Walk the cycle once, starting at the head.
    pub fn iter(&self) -> impl Iterator<Item = (PeriodKey, &Period)> + '_ {
        let head = self.head;
        let mut cur = head;
        std::iter::from_fn(move || {
            let key = cur?;
            let period = &self.periods[key];
            cur = Some(period.next).filter(|next| Some(*next) != head);
            Some((key, period))
        })
    }

    /// Length of the period starting at `key`. A lone node spans nothing.
    pub fn duration(&self, key: PeriodKey) -> i32 {
        let period = &self.periods[key];
        duration_0(period.time, self.periods[period.next].time)
    }

    /// Sum of every period's length around the cycle.
    pub fn total_ms(&self) -> i64 {
        self.iter().map(|(key, _)| self.duration(key) as i64).sum()
    }
}

impl Index<PeriodKey> for Timeline {
    type Output = Period;

    fn index(&self, key: PeriodKey) -> &Period {
        &self.periods[key]
    }
}

impl IndexMut<PeriodKey> for Timeline {
    fn index_mut(&mut self, key: PeriodKey) -> &mut Period {
        &mut self.periods[key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voices::SILENCE;

    fn times(timeline: &Timeline) -> Vec<i32> {
        timeline.iter().map(|(_, p)| p.time).collect()
    }

    #[test]
    fn push_back_keeps_the_cycle_closed() {
        let mut tl = Timeline::new();
        assert!(tl.iter().next().is_none());
        let a = tl.push_back(0, SILENCE, SILENCE, PeriodKind::Transition);
        assert_eq!(tl[a].next(), a);
        assert_eq!(tl[a].prev(), a);
        let b = tl.push_back(100, SILENCE, SILENCE, PeriodKind::Transition);
        let c = tl.push_back(200, SILENCE, SILENCE, PeriodKind::Transition);
        assert_eq!(times(&tl), vec![0, 100, 200]);
        assert_eq!(tl[c].next(), a);
        assert_eq!(tl[a].prev(), c);
        assert_eq!(tl[b].prev(), a);
    }

    #[test]
    fn insert_and_unlink() {
        let mut tl = Timeline::new();
        let a = tl.push_back(0, SILENCE, SILENCE, PeriodKind::Transition);
        let c = tl.push_back(200, SILENCE, SILENCE, PeriodKind::Transition);
        let b = tl.insert_after(a, 100, SILENCE, SILENCE, PeriodKind::Midpoint);
        assert_eq!(times(&tl), vec![0, 100, 200]);
        assert_eq!(tl.total_ms(), 200 + (crate::time::H24 - 200) as i64);

        tl.unlink(a);
        assert_eq!(tl.head(), Some(c));
        assert_eq!(times(&tl), vec![200, 100]);
        tl.unlink(b);
        assert_eq!(tl[c].next(), c);
        assert_eq!(tl.duration(c), 0);
        tl.unlink(c);
        assert!(tl.head().is_none());
        assert!(tl.is_empty());
    }
}
