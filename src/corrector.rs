//! Resolves the raw timeline produced by the compiler into its final form.
//!
//! The compiler leaves a transition placeholder after every period. The
//! passes here give each transition a start time and a minimum width, split
//! it at its midpoint where the voices cannot be cross-faded directly, and
//! finally drop periods that have become redundant or empty.

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{FadeMode, PeriodKind};
use crate::time::{duration_0, midpoint, H24};
use crate::timeline::{PeriodKey, Timeline};
use crate::voices::{voices_eq, Voice, N_CH};

/// Run every correction pass over `timeline`.
pub fn correct(timeline: &mut Timeline, fade_ms: i32) -> Result<()> {
    let raw = timeline.len();
    resolve_transition_times(timeline);
    widen_short_transitions(timeline, fade_ms);
    split_transitions(timeline);
    let split = timeline.len();
    collapse(timeline);
    debug!(
        raw,
        split,
        corrected = timeline.len(),
        "timeline corrected"
    );

    if timeline.len() > 1 && timeline.total_ms() > H24 as i64 {
        return Err(Error::TotalTime);
    }
    Ok(())
}

fn keys(timeline: &Timeline) -> Vec<PeriodKey> {
    timeline.iter().map(|(key, _)| key).collect()
}

/// A transition with no explicit start begins where the following period
/// was scheduled.
fn resolve_transition_times(timeline: &mut Timeline) {
    for key in keys(timeline) {
        if timeline[key].kind == PeriodKind::Unspecified {
            let next = timeline[key].next;
            timeline[key].time = timeline[next].time;
            timeline[key].kind = PeriodKind::Transition;
        }
    }
}

/// Stretch transitions shorter than `fade_ms` into both neighbours, taking no
/// more than half the shortfall from each and never more than the neighbour
/// has.
fn widen_short_transitions(timeline: &mut Timeline, fade_ms: i32) {
    for key in keys(timeline) {
        if timeline[key].kind != PeriodKind::Transition {
            continue;
        }
        let prev = timeline[key].prev;
        let next = timeline[key].next;
        let after = timeline[next].next;
        let width = duration_0(timeline[key].time, timeline[next].time);
        if width >= fade_ms {
            continue;
        }
        let adj = (fade_ms - width) / 2;
        let adj0 = adj.min(duration_0(timeline[prev].time, timeline[key].time));
        let adj1 = adj.min(duration_0(timeline[next].time, timeline[after].time));
        timeline[key].time = (timeline[key].time - adj0 + H24) % H24;
        timeline[next].time = (timeline[next].time + adj1) % H24;
    }
}

/// Fill in the voices of every transition, splitting it in two where some
/// channel has to pass through silence.
fn split_transitions(timeline: &mut Timeline) {
    for key in keys(timeline) {
        if timeline[key].kind.is_transition() {
            split_transition(timeline, key);
        }
    }
}

fn split_transition(timeline: &mut Timeline, key: PeriodKey) {
    let prev = timeline[key].prev;
    let next = timeline[key].next;
    let slide = timeline[key].kind == PeriodKind::Slide;

    // `start` is where the first half begins, `end` where the second half ends.
    let mut start = timeline[prev].v1;
    let mut end = timeline[next].v0;

    // Bells ring on entry to a period, so they never carry into a transition,
    // except into a slide which instead drops the incoming bell.
    for (vp, vq) in start.iter_mut().zip(end.iter_mut()) {
        if vp.is_bell() && !slide {
            *vp = Voice::Off;
        }
        if vq.is_bell() && slide {
            *vq = Voice::Off;
        }
    }

    let mut fade_out = timeline[prev].kind.fade_out();
    let mut fade_in = timeline[next].kind.fade_in();

    if slide {
        fade_out = FadeMode::Slide;
        fade_in = FadeMode::Slide;
        for (vp, vq) in start.iter_mut().zip(end.iter_mut()) {
            if vp.is_off() && !vq.is_off() && !vq.is_bell() {
                *vp = vq.with_amp(0.0);
            } else if !vp.is_off() && vq.is_off() {
                *vq = vp.with_amp(0.0);
            }
        }
    }

    let mut first_end = start;
    let mut second_start = end;
    let mut needs_midpoint = false;
    let mut silence_next = [false; N_CH];

    for a in 0..N_CH {
        let vp = first_end[a];
        let vq = second_start[a];
        let hard = fade_out == FadeMode::Silence
            || fade_in == FadeMode::Silence
            || vp.kind() != vq.kind()
            || ((fade_out == FadeMode::Normal || fade_in == FadeMode::Normal)
                && vp.is_pitched()
                && vp.pitch() != vq.pitch());

        if hard {
            first_end[a].set_amp(0.0);
            second_start[a].set_amp(0.0);
            needs_midpoint = true;
            if vq.is_bell() {
                // Ring the bell from the midpoint instead of the next period.
                second_start[a].set_amp(end[a].amp());
                silence_next[a] = true;
            }
        } else if vp.is_bell() {
            second_start[a] = Voice::Off;
            end[a] = Voice::Off;
        } else {
            let avg = vp.average(&vq);
            first_end[a] = avg;
            second_start[a] = avg;
        }
    }

    timeline[key].v0 = start;
    if needs_midpoint {
        timeline[key].v1 = first_end;
        let mid = midpoint(timeline[key].time, timeline[next].time);
        timeline.insert_after(key, mid, second_start, end, PeriodKind::Midpoint);
    } else {
        timeline[key].v1 = end;
    }

    for (a, silence) in silence_next.iter().enumerate() {
        if *silence {
            timeline[next].v0[a] = Voice::Off;
            timeline[next].v1[a] = Voice::Off;
        }
    }
}

/// Merge each period whose voices never change into its successor, and drop
/// zero-length periods, restarting from the head after every removal.
fn collapse(timeline: &mut Timeline) {
    'restart: while timeline.len() > 1 {
        let Some(head) = timeline.head() else {
            return;
        };
        let mut key = head;
        loop {
            let next = timeline[key].next;
            let period = &timeline[key];
            let successor = &timeline[next];
            if voices_eq(&period.v0, &period.v1)
                && voices_eq(&period.v0, &successor.v0)
                && voices_eq(&period.v0, &successor.v1)
            {
                timeline[next].time = timeline[key].time;
            }
            if timeline[key].time == timeline[next].time {
                timeline.unlink(key);
                continue 'restart;
            }
            key = next;
            if key == head {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voices::{VoiceSet, SILENCE};

    const MIN: i32 = 60_000;

    fn preset(voices: &[Voice]) -> VoiceSet {
        let mut set = SILENCE;
        set[..voices.len()].copy_from_slice(voices);
        set
    }

    fn tone(carr: f64, res: f64, amp: f64) -> Voice {
        Voice::Binaural { amp, carr, res }
    }

    fn normal(fade_in: FadeMode, fade_out: FadeMode) -> PeriodKind {
        PeriodKind::Normal { fade_in, fade_out }
    }

    /// Build the raw list the compiler would produce for `lines`.
    fn raw(lines: &[(i32, VoiceSet)]) -> Timeline {
        raw_with(lines, normal(FadeMode::Normal, FadeMode::Normal))
    }

    /// As `raw`, with every time-line carrying the same fade marks.
    fn raw_with(lines: &[(i32, VoiceSet)], kind: PeriodKind) -> Timeline {
        let mut tl = Timeline::new();
        for &(time, voices) in lines {
            tl.push_back(time, voices, voices, kind);
            tl.push_back(0, SILENCE, SILENCE, PeriodKind::Unspecified);
        }
        tl
    }

    fn times(tl: &Timeline) -> Vec<i32> {
        tl.iter().map(|(_, p)| p.time).collect()
    }

    #[test]
    fn short_transitions_are_widened_symmetrically() {
        let a = preset(&[tone(100.0, 4.0, 1000.0)]);
        let b = preset(&[tone(200.0, 4.0, 1000.0)]);
        let mut tl = raw(&[(0, a), (12 * 60 * MIN, b)]);
        resolve_transition_times(&mut tl);
        assert_eq!(times(&tl), vec![0, 720 * MIN, 720 * MIN, 0]);
        widen_short_transitions(&mut tl, MIN);
        assert_eq!(
            times(&tl),
            vec![30_000, 720 * MIN - 30_000, 720 * MIN + 30_000, H24 - 30_000]
        );
    }

    #[test]
    fn widening_is_limited_by_neighbour_slack() {
        let a = preset(&[tone(100.0, 4.0, 1000.0)]);
        let b = preset(&[tone(200.0, 4.0, 1000.0)]);
        let mut tl = raw(&[(0, a), (10_000, b)]);
        resolve_transition_times(&mut tl);
        widen_short_transitions(&mut tl, MIN);
        // The first period is only 10s long, so the first transition can
        // only borrow 10s from it; the second side gives the full 30s.
        let t = times(&tl);
        assert_eq!(t[1], 0);
        assert_eq!(t[2], 40_000);
        assert_eq!(duration_0(t[1], t[2]), 40_000);
        // The first period has been squeezed to nothing and gives nothing
        // further to the wrap-around transition.
        assert_eq!(t[0], 0);
        assert_eq!(t[3], H24 - 30_000);
    }

    #[test]
    fn identical_presets_collapse_to_one_period() {
        let a = preset(&[tone(100.0, 4.0, 1000.0), Voice::Noise { amp: 500.0 }]);
        let mut tl = raw(&[(0, a), (12 * 60 * MIN, a)]);
        correct(&mut tl, MIN).unwrap();
        assert_eq!(tl.len(), 1);
        let (_, only) = tl.iter().next().unwrap();
        assert!(voices_eq(&only.v0, &a));
        assert!(voices_eq(&only.v1, &a));
    }

    #[test]
    fn compatible_voices_cross_fade_without_a_midpoint() {
        let a = preset(&[tone(200.0, 10.0, 1000.0)]);
        let b = preset(&[tone(200.0, 10.0, 3000.0)]);
        let mut tl = raw(&[(0, a), (12 * 60 * MIN, b)]);
        correct(&mut tl, 10 * MIN).unwrap();
        // Two periods and two single-segment transitions.
        assert_eq!(tl.len(), 4);
        let (_, transition) = tl
            .iter()
            .find(|(_, p)| p.time == 12 * 60 * MIN - 5 * MIN)
            .unwrap();
        assert_eq!(transition.v0[0], a[0]);
        assert_eq!(transition.v1[0], b[0]);
        let halfway = transition.v0[0].blend(&transition.v1[0], 0.5, 0.5);
        assert_eq!(halfway.amp(), 2000.0);
    }

    #[test]
    fn pitch_change_fades_through_silence() {
        let a = preset(&[tone(200.0, 10.0, 1000.0)]);
        let b = preset(&[tone(300.0, 10.0, 3000.0)]);
        let mut tl = raw(&[(0, a), (12 * 60 * MIN, b)]);
        correct(&mut tl, 10 * MIN).unwrap();
        assert_eq!(tl.len(), 6);
        let start = 12 * 60 * MIN - 5 * MIN;
        let (key, first) = tl.iter().find(|(_, p)| p.time == start).unwrap();
        assert_eq!(first.v0[0], a[0]);
        assert_eq!(first.v1[0].amp(), 0.0);
        let second = &tl[tl[key].next()];
        assert_eq!(second.time, 12 * 60 * MIN);
        assert_eq!(second.v0[0], b[0].with_amp(0.0));
        assert_eq!(second.v1[0], b[0]);
    }

    #[test]
    fn silence_marks_force_a_midpoint_between_identical_presets() {
        let a = preset(&[tone(200.0, 10.0, 819.2)]);
        let kind = normal(FadeMode::Silence, FadeMode::Silence);
        let mut tl = raw_with(&[(0, a), (12 * 60 * MIN, a)], kind);
        correct(&mut tl, MIN).unwrap();
        assert_eq!(tl.len(), 6);

        let transitions: Vec<_> = tl
            .iter()
            .filter(|(_, p)| p.kind == PeriodKind::Transition)
            .map(|(_, p)| p)
            .collect();
        assert_eq!(transitions.len(), 2);
        for t in transitions {
            assert_eq!(t.v0[0], a[0]);
            assert_eq!(t.v1[0], a[0].with_amp(0.0));
        }

        let mut midpoints: Vec<_> = tl
            .iter()
            .filter(|(_, p)| p.kind == PeriodKind::Midpoint)
            .map(|(_, p)| p)
            .collect();
        midpoints.sort_by_key(|p| p.time);
        assert_eq!(
            midpoints.iter().map(|p| p.time).collect::<Vec<_>>(),
            vec![0, 12 * 60 * MIN]
        );
        for m in midpoints {
            assert_eq!(m.v0[0].amp(), 0.0);
            assert_eq!(m.v1[0], a[0]);
        }
    }

    #[test]
    fn slide_marks_cross_fade_pitch_changes_directly() {
        let a = preset(&[tone(200.0, 10.0, 1000.0)]);
        let b = preset(&[tone(300.0, 10.0, 3000.0)]);
        let slide = normal(FadeMode::Slide, FadeMode::Slide);
        let mut tl = raw_with(&[(0, a), (12 * 60 * MIN, b)], slide);
        correct(&mut tl, MIN).unwrap();
        assert_eq!(tl.len(), 4);
        assert!(tl.iter().all(|(_, p)| p.kind != PeriodKind::Midpoint));

        let (_, t) = tl
            .iter()
            .find(|(_, p)| p.time == 12 * 60 * MIN - 30_000)
            .unwrap();
        assert_eq!(t.v0[0], a[0]);
        assert_eq!(t.v1[0], b[0]);
        let halfway = t.v0[0].blend(&t.v1[0], 0.5, 0.5);
        assert_eq!(halfway.amp(), 2000.0);
        assert_eq!(halfway.pitch(), Some((250.0, 10.0)));

        // Without the marks the same change goes through silence.
        let mut tl = raw(&[(0, a), (12 * 60 * MIN, b)]);
        correct(&mut tl, MIN).unwrap();
        assert_eq!(tl.len(), 6);
    }

    #[test]
    fn slides_keep_pitch_changes_continuous() {
        let a = preset(&[tone(200.0, 10.0, 1000.0)]);
        let b = preset(&[tone(300.0, 4.0, 3000.0), Voice::Noise { amp: 800.0 }]);
        let mut tl = Timeline::new();
        let kind = normal(FadeMode::Normal, FadeMode::Normal);
        tl.push_back(0, a, a, kind);
        tl.push_back(0, SILENCE, SILENCE, PeriodKind::Slide);
        tl.push_back(60 * MIN, b, b, kind);
        tl.push_back(0, SILENCE, SILENCE, PeriodKind::Unspecified);
        correct(&mut tl, MIN).unwrap();

        let (_, slide) = tl
            .iter()
            .find(|(_, p)| p.v0[0] == a[0] && p.v1[0] != a[0])
            .unwrap();
        // Both halves were averaged, so no midpoint was needed.
        assert_eq!(slide.v1[0], b[0]);
        // The noise appears from zero amplitude instead of a hard cut.
        assert_eq!(slide.v0[1], Voice::Noise { amp: 0.0 });
        assert_eq!(slide.v1[1], Voice::Noise { amp: 800.0 });
    }

    #[test]
    fn bells_are_retriggered_not_faded() {
        let bell = Voice::Bell { amp: 2000.0, carr: 440.0 };
        let a = preset(&[tone(200.0, 10.0, 1000.0)]);
        let b = preset(&[tone(200.0, 10.0, 1000.0), bell]);
        let mut tl = raw(&[(0, a), (60 * MIN, b)]);
        correct(&mut tl, MIN).unwrap();

        // The bell rings from the middle of the incoming transition and the
        // period after it no longer carries it.
        let (key, mid) = tl.iter().find(|(_, p)| p.v0[1].is_bell()).unwrap();
        assert_eq!(mid.time, 60 * MIN);
        assert_eq!(mid.v0[1].amp(), 2000.0);
        let after = &tl[tl[key].next()];
        assert!(after.v0[1].is_off());
        assert!(after.v1[1].is_off());
        // The outgoing transition never starts with the bell.
        assert!(tl
            .iter()
            .filter(|(_, p)| p.kind == PeriodKind::Transition)
            .all(|(_, p)| !p.v0[1].is_bell()));
    }

    #[test]
    fn schedules_over_a_day_are_rejected() {
        let a = preset(&[tone(100.0, 4.0, 1000.0)]);
        let b = preset(&[tone(200.0, 4.0, 1000.0)]);
        let c = preset(&[Voice::Noise { amp: 900.0 }]);
        let mut tl = raw(&[(600 * MIN, a), (540 * MIN, b), (660 * MIN, c)]);
        let err = correct(&mut tl, MIN).unwrap_err();
        assert!(matches!(err, Error::TotalTime));
        assert_eq!(err.to_string(), "Total time is greater than 24 hours");
    }

    #[test]
    fn ordered_schedules_fit_in_a_day() {
        let a = preset(&[tone(100.0, 4.0, 1000.0)]);
        let b = preset(&[tone(200.0, 4.0, 1000.0)]);
        let c = preset(&[Voice::Noise { amp: 900.0 }]);
        let mut tl = raw(&[(540 * MIN, a), (600 * MIN, b), (660 * MIN, c)]);
        correct(&mut tl, MIN).unwrap();
        assert_eq!(tl.total_ms(), H24 as i64);
    }
}
