//! Tiny cursor for the fixed token grammars of the sequence language.
//!
//! Numbers follow `strtod` conventions (optional sign, optional fraction,
//! optional exponent) so that `200+10/5` splits into `200`, `+10` and `5`.

pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Consume `lit` if the remaining text starts with it.
    pub fn lit(&mut self, lit: &str) -> Option<()> {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            Some(())
        } else {
            None
        }
    }

    fn skip_space(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Number, after any leading whitespace.
    pub fn float(&mut self) -> Option<f64> {
        self.skip_space();
        let (val, len) = float_prefix(self.rest())?;
        self.pos += len;
        Some(val)
    }

    pub fn int(&mut self) -> Option<i64> {
        self.skip_space();
        let (val, len) = int_prefix(self.rest())?;
        self.pos += len;
        Some(val)
    }

    /// Succeeds only when everything has been consumed.
    pub fn end(&self) -> Option<()> {
        if self.pos == self.text.len() {
            Some(())
        } else {
            None
        }
    }
}

fn digits(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    pos
}

/// Longest decimal floating-point number at the start of `text`.
pub fn float_prefix(text: &str) -> Option<(f64, usize)> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        pos += 1;
    }
    let int_end = digits(bytes, pos);
    let mut mantissa_digits = int_end - pos;
    pos = int_end;
    if bytes.get(pos) == Some(&b'.') {
        let frac_end = digits(bytes, pos + 1);
        mantissa_digits += frac_end - pos - 1;
        pos = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }
    if matches!(bytes.get(pos), Some(b'e') | Some(b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let exp_end = digits(bytes, exp);
        if exp_end > exp {
            pos = exp_end;
        }
    }
    text[..pos].parse().ok().map(|v| (v, pos))
}

/// Signed decimal integer at the start of `text`.
pub fn int_prefix(text: &str) -> Option<(i64, usize)> {
    let bytes = text.as_bytes();
    let start = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let end = digits(bytes, start);
    if end == start {
        return None;
    }
    text[..end].parse().ok().map(|v| (v, end))
}
