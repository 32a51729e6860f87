//! Millisecond-of-day arithmetic. Every timestamp in a schedule is an `i32`
//! number of milliseconds since midnight, and all period lengths wrap at 24h.

/// 24 hours in milliseconds.
pub const H24: i32 = 86_400_000;

/// Length of the period starting at `t0` and ending at `t1`.
///
/// Equal times give a full day, not zero: a period whose successor starts at
/// the same time of day covers the whole cycle.
#[inline]
pub fn duration_24(t0: i32, t1: i32) -> i32 {
    let td = t1 - t0;
    if td > 0 {
        td
    } else {
        td + H24
    }
}

/// Length of the period starting at `t0` and ending at `t1`, with equal
/// times giving zero.
#[inline]
pub fn duration_0(t0: i32, t1: i32) -> i32 {
    let td = t1 - t0;
    if td >= 0 {
        td
    } else {
        td + H24
    }
}

/// Midpoint of the period from `t0` to `t1`, going forwards through midnight
/// when `t1 < t0`.
#[inline]
pub fn midpoint(t0: i32, t1: i32) -> i32 {
    let mid = if t1 < t0 {
        (H24 as i64 + t0 as i64 + t1 as i64) / 2
    } else {
        (t0 as i64 + t1 as i64) / 2
    };
    (mid % H24 as i64) as i32
}

/// Parse `HH:MM` or `HH:MM:SS` at the start of `text`.
///
/// Returns the time in milliseconds and the number of bytes consumed, or
/// `None` when the text does not start with a valid time. Each field takes at
/// most two digits, so `12:001` parses as `12:00` leaving `1` unconsumed.
pub fn parse_clock(text: &str) -> Option<(i32, usize)> {
    let bytes = text.as_bytes();
    let (hh, mut pos) = two_digits(bytes, 0)?;
    if bytes.get(pos) != Some(&b':') {
        return None;
    }
    let (mm, next) = two_digits(bytes, pos + 1)?;
    pos = next;
    let mut ss = 0;
    if bytes.get(pos) == Some(&b':') {
        if let Some((s, next)) = two_digits(bytes, pos + 1) {
            ss = s;
            pos = next;
        }
    }
    if hh >= 24 || mm >= 60 || ss >= 60 {
        return None;
    }
    Some((((hh * 60 + mm) * 60 + ss) * 1000, pos))
}

fn two_digits(bytes: &[u8], start: usize) -> Option<(i32, usize)> {
    let mut val = 0;
    let mut pos = start;
    while pos < bytes.len() && pos - start < 2 && bytes[pos].is_ascii_digit() {
        val = val * 10 + (bytes[pos] - b'0') as i32;
        pos += 1;
    }
    if pos == start {
        None
    } else {
        Some((val, pos))
    }
}

/// Format a millisecond-of-day value as `HH:MM:SS.mmm`.
pub fn format_clock(t: i32) -> String {
    let t = t.rem_euclid(H24);
    let ms = t % 1000;
    let s = t / 1000;
    format!("{:02}:{:02}:{:02}.{:03}", s / 3600, s / 60 % 60, s % 60, ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn durations_wrap_around_midnight() {
        let mut rng = StdRng::seed_from_u64(0x5ba6e);
        for _ in 0..10_000 {
            let t0 = rng.gen_range(0..H24);
            let t1 = rng.gen_range(0..H24);
            if t0 != t1 {
                assert_eq!(duration_24(t0, t1) + duration_24(t1, t0), H24);
                assert_eq!(duration_0(t0, t1), duration_24(t0, t1));
            }
            assert_eq!(duration_24(t0, t0), H24);
            assert_eq!(duration_0(t0, t0), 0);
        }
    }

    #[test]
    fn midpoint_crosses_midnight() {
        assert_eq!(midpoint(0, 1000), 500);
        assert_eq!(midpoint(H24 - 1000, 1000), 0);
        assert_eq!(midpoint(H24 / 2, H24 / 2), H24 / 2);
        assert_eq!(midpoint(H24 - 30_000, 30_000), 0);
    }

    #[test]
    fn clock_parsing() {
        assert_eq!(parse_clock("12:30"), Some((45_000_000, 5)));
        assert_eq!(parse_clock("00:00:10+"), Some((10_000, 8)));
        assert_eq!(parse_clock("1:05"), Some((3_900_000, 4)));
        assert_eq!(parse_clock("10:00:"), Some((36_000_000, 5)));
        assert_eq!(parse_clock("24:00"), None);
        assert_eq!(parse_clock("12:60"), None);
        assert_eq!(parse_clock("12"), None);
        assert_eq!(parse_clock("ab:cd"), None);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00:00.000");
        assert_eq!(format_clock(H24 - 1), "23:59:59.999");
        assert_eq!(format_clock(36_030_500), "10:00:30.500");
    }
}
