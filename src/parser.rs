//! Compiler for the schedule language.
//!
//! ```text
//! ## Comments starting with two hashes are logged
//! wave01: 0 3 4 2 1
//! alpha: 200+10/20 pink/10
//! rise: {
//!   +00:00 alpha
//!   +00:10 beta ->
//! }
//! NOW alpha
//! 22:00 <> rise
//! ```
//!
//! Name definitions are collected first, so time-lines may refer to names
//! defined further down. Time-lines are then resolved in source order into
//! the raw period list, which the corrector turns into the final timeline.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::corrector;
use crate::dsp::sinc::{normalise, sinc_interpolate};
use crate::dsp::{WaveTables, N_WAVES, ST_SIZ};
use crate::error::{Error, Result};
use crate::models::{FadeMode, PeriodKind, PeriodSummary};
use crate::scan::float_prefix;
use crate::time::{duration_0, parse_clock, H24};
use crate::timeline::Timeline;
use crate::voices::{parse_wave_token, Voice, VoiceSet, N_CH, SILENCE};

/// Block expansion deeper than this is treated as runaway recursion.
const MAX_BLOCK_DEPTH: usize = 32;
const MAX_WAVE_SAMPLES: usize = ST_SIZ / 2;

/// A compiled sequence: the corrected timeline plus the waveform tables its
/// voices refer to.
#[derive(Debug)]
pub struct Schedule {
    pub(crate) timeline: Timeline,
    pub(crate) waves: WaveTables,
    pub(crate) first_time: i32,
    pub(crate) last_time: i32,
    pub(crate) mix_flag: bool,
}

impl Schedule {
    /// Time of the first time-line in the source.
    pub fn first_time(&self) -> i32 {
        self.first_time
    }

    /// Time of the last time-line in the source.
    pub fn last_time(&self) -> i32 {
        self.last_time
    }

    /// Milliseconds from the first time-line to the last.
    pub fn span_ms(&self) -> i32 {
        duration_0(self.first_time, self.last_time)
    }

    /// Whether any preset uses `mix/AMP`, which turns off the default
    /// full-level pass-through of the mix input.
    pub fn mix_flag(&self) -> bool {
        self.mix_flag
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn waves(&self) -> &WaveTables {
        &self.waves
    }

    /// The corrected periods in order, starting from the timeline head.
    pub fn periods(&self) -> Vec<PeriodSummary> {
        self.timeline
            .iter()
            .map(|(key, period)| PeriodSummary::new(period, self.timeline.duration(key)))
            .collect()
    }
}

/// Compile `text` into a corrected schedule. `fade_ms` is the minimum width
/// given to transitions that do not specify one.
pub fn compile(text: &str, fade_ms: i32) -> Result<Schedule> {
    let mut compiler = Compiler::default();
    compiler.read_definitions(text)?;
    compiler.check_wave_refs()?;
    for line in std::mem::take(&mut compiler.time_lines) {
        compiler.time_line(line.number, line.text, 0)?;
    }

    let (Some(first_time), Some(last_time)) = (compiler.first_time, compiler.last_time) else {
        return Err(Error::syntax(0, "", "No time-lines in sequence"));
    };
    let Compiler {
        mut timeline,
        waves,
        mix_flag,
        names,
        ..
    } = compiler;
    debug!(
        names = names.len(),
        waves = waves.defined_count(),
        periods = timeline.len(),
        "sequence read"
    );
    drop(names);

    corrector::correct(&mut timeline, fade_ms)?;
    Ok(Schedule {
        timeline,
        waves,
        first_time,
        last_time,
        mix_flag,
    })
}

/// One non-blank line with comments and surrounding whitespace removed.
#[derive(Clone, Copy)]
struct Line<'a> {
    number: usize,
    text: &'a str,
}

fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.lines().enumerate().filter_map(|(idx, raw)| {
        let trimmed = raw.trim_start();
        if let Some(comment) = trimmed.strip_prefix("##") {
            info!("{}", comment.trim());
        }
        let content = match trimmed.find('#') {
            Some(pos) => &trimmed[..pos],
            None => trimmed,
        }
        .trim_end();
        (!content.is_empty()).then_some(Line {
            number: idx + 1,
            text: content,
        })
    })
}

/// `name:` followed by whitespace, where the name starts with a letter and
/// continues with letters, digits, `_` or `-`.
fn is_name_def(text: &str) -> bool {
    let bytes = text.as_bytes();
    if !bytes.first().is_some_and(u8::is_ascii_alphabetic) {
        return false;
    }
    let end = bytes
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-'))
        .unwrap_or(bytes.len());
    bytes.get(end) == Some(&b':') && bytes.get(end + 1).is_some_and(u8::is_ascii_whitespace)
}

/// `waveNN` with exactly two digits.
fn wave_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("wave")?;
    if digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

#[derive(Clone)]
enum NameDef {
    Voices(VoiceSet),
    Block(Vec<String>),
}

struct WaveRef {
    wave: usize,
    number: usize,
    text: String,
}

#[derive(Default)]
struct Compiler<'a> {
    names: HashMap<String, NameDef>,
    waves: WaveTables,
    wave_refs: Vec<WaveRef>,
    time_lines: Vec<Line<'a>>,
    timeline: Timeline,
    mix_flag: bool,
    last_abs_time: Option<i32>,
    first_time: Option<i32>,
    last_time: Option<i32>,
}

fn bad_sequence(line: Line<'_>) -> Error {
    Error::syntax(line.number, line.text, "Bad sequence file content")
}

impl<'a> Compiler<'a> {
    fn read_definitions(&mut self, text: &'a str) -> Result<()> {
        let mut lines = lines(text);
        let mut at_start = true;
        while let Some(line) = lines.next() {
            if line.text.starts_with('-') {
                if !at_start {
                    return Err(Error::syntax(
                        line.number,
                        line.text,
                        "Options are only permitted at start of sequence file",
                    ));
                }
                // Accepted for compatibility; has no effect.
                if line.text != "-SE" {
                    return Err(Error::syntax(line.number, line.text, "Options not supported"));
                }
                continue;
            }
            at_start = false;
            if is_name_def(line.text) {
                self.name_def(line, &mut lines)?;
            } else {
                self.time_lines.push(line);
            }
        }
        Ok(())
    }

    fn name_def(&mut self, line: Line<'a>, lines: &mut impl Iterator<Item = Line<'a>>) -> Result<()> {
        let Some((word, rest)) = line.text.split_once(|c: char| c.is_ascii_whitespace()) else {
            return Err(bad_sequence(line));
        };
        let name = word.trim_end_matches(':');

        if let Some(index) = wave_index(name) {
            return self.wave_def(line, index, rest);
        }

        let rest = rest.trim_start();
        if rest.starts_with('{') {
            if rest != "{" {
                return Err(bad_sequence(line));
            }
            let block = read_block(line, lines)?;
            self.names.insert(name.to_string(), NameDef::Block(block));
            return Ok(());
        }

        let voices = self.preset(line, rest)?;
        self.names.insert(name.to_string(), NameDef::Voices(voices));
        Ok(())
    }

    fn wave_def(&mut self, line: Line<'_>, index: usize, rest: &str) -> Result<()> {
        if self.waves.is_defined(index) {
            return Err(Error::syntax(
                line.number,
                line.text,
                format!("Waveform {index:02} already defined"),
            ));
        }
        let mut samples = Vec::new();
        for word in rest.split_ascii_whitespace() {
            let value = float_prefix(word)
                .filter(|(_, len)| *len == word.len())
                .map(|(v, _)| v)
                .ok_or_else(|| {
                    Error::syntax(
                        line.number,
                        line.text,
                        "Expecting floating-point numbers on this waveform definition line",
                    )
                })?;
            if samples.len() >= MAX_WAVE_SAMPLES {
                return Err(Error::syntax(
                    line.number,
                    line.text,
                    format!("Too many samples on line (maximum {MAX_WAVE_SAMPLES})"),
                ));
            }
            samples.push(value);
        }
        if samples.len() < 2 {
            return Err(Error::syntax(
                line.number,
                line.text,
                "Expecting at least two samples in the waveform",
            ));
        }
        normalise(&mut samples);
        let table = sinc_interpolate(&samples)?;
        self.waves.insert(index, table);
        debug!(wave = index, samples = samples.len(), "waveform defined");
        Ok(())
    }

    fn preset(&mut self, line: Line<'_>, rest: &str) -> Result<VoiceSet> {
        let mut voices = SILENCE;
        let mut words = rest.split_ascii_whitespace();
        let mut ch = 0;
        while let Some(word) = words.next() {
            if ch >= N_CH {
                return Err(Error::syntax(
                    line.number,
                    line.text,
                    format!("Too many voices (maximum {N_CH})"),
                ));
            }
            let voice = match self.voice(line, word)? {
                Some(voice) => voice,
                // `CARR RES/AMP` may also be written with a space before RES.
                None => match words.next() {
                    Some(next) => self.voice(line, &format!("{word} {next}"))?,
                    None => None,
                }
                .ok_or_else(|| bad_sequence(line))?,
            };
            voices[ch] = voice;
            ch += 1;
        }
        Ok(voices)
    }

    /// Interpret one preset token, or `None` if it matches no voice form.
    fn voice(&mut self, line: Line<'_>, token: &str) -> Result<Option<Voice>> {
        if let Some(w) = parse_wave_token(token) {
            let wave = match usize::try_from(w.wave) {
                Ok(wave) if wave < N_WAVES => wave,
                _ => {
                    return Err(Error::syntax(
                        line.number,
                        line.text,
                        "Only wave00 to wave99 is permitted",
                    ))
                }
            };
            self.wave_refs.push(WaveRef {
                wave,
                number: line.number,
                text: line.text.to_string(),
            });
            return Ok(Some(Voice::Wave {
                wave: wave as u8,
                amp: w.amp,
                carr: w.carr,
                res: w.res,
            }));
        }
        let Some(voice) = Voice::parse_token(token) else {
            return Ok(None);
        };
        if matches!(voice, Voice::Mix { .. }) {
            self.mix_flag = true;
        }
        Ok(Some(voice))
    }

    fn check_wave_refs(&self) -> Result<()> {
        match self.wave_refs.iter().find(|r| !self.waves.is_defined(r.wave)) {
            Some(r) => Err(Error::syntax(
                r.number,
                &r.text,
                format!("Waveform {:02} has not been defined", r.wave),
            )),
            None => Ok(()),
        }
    }

    fn time_line(&mut self, number: usize, text: &str, depth: usize) -> Result<()> {
        let line = Line { number, text };
        let mut words = text.split_ascii_whitespace();
        let time_word = words.next().ok_or_else(|| bad_sequence(line))?;
        let time = self.time_expr(line, time_word)?;
        self.first_time.get_or_insert(time);
        self.last_time = Some(time);

        let mut word = words.next().ok_or_else(|| bad_sequence(line))?;
        let mut fade_in = FadeMode::Normal;
        let mut fade_out = FadeMode::Normal;
        if !word.as_bytes()[0].is_ascii_alphabetic() {
            let &[fi, fo] = word.as_bytes() else {
                return Err(bad_sequence(line));
            };
            fade_in = FadeMode::from_fade_in(fi).ok_or_else(|| bad_sequence(line))?;
            fade_out = FadeMode::from_fade_out(fo).ok_or_else(|| bad_sequence(line))?;
            word = words.next().ok_or_else(|| bad_sequence(line))?;
        }

        let voices = match self.names.get(word).cloned() {
            None => {
                return Err(Error::syntax(
                    number,
                    text,
                    format!("Name \"{word}\" not defined"),
                ))
            }
            Some(NameDef::Voices(voices)) => voices,
            Some(NameDef::Block(block)) => {
                if depth >= MAX_BLOCK_DEPTH {
                    return Err(Error::syntax(number, text, "Block definitions nested too deeply"));
                }
                // Each block line is re-read with this line's time in front.
                for block_line in &block {
                    self.time_line(number, &format!("{time_word}{block_line}"), depth + 1)?;
                }
                return Ok(());
            }
        };

        self.timeline
            .push_back(time, voices, voices, PeriodKind::Normal { fade_in, fade_out });
        match words.next() {
            None => {
                self.timeline
                    .push_back(0, SILENCE, SILENCE, PeriodKind::Unspecified);
            }
            Some("->") => {
                self.timeline.push_back(time, SILENCE, SILENCE, PeriodKind::Slide);
            }
            Some(_) => return Err(bad_sequence(line)),
        }
        Ok(())
    }

    /// `NOW`, `HH:MM[:SS]` and `+HH:MM[:SS]` terms. A relative term with no
    /// absolute term before it counts from the last absolute time seen.
    fn time_expr(&mut self, line: Line<'_>, word: &str) -> Result<i32> {
        let bad_time = || {
            Error::syntax(
                line.number,
                line.text,
                format!("Badly constructed time \"{word}\""),
            )
        };
        let mut time: Option<i32> = None;
        let mut rest = word;
        if let Some(after) = rest.strip_prefix("NOW") {
            time = Some(0);
            self.last_abs_time = Some(0);
            rest = after;
        }
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('+') {
                if time.is_none() {
                    time = Some(self.last_abs_time.ok_or_else(|| {
                        Error::syntax(
                            line.number,
                            line.text,
                            "Relative time without previous absolute time",
                        )
                    })?);
                }
                rest = after;
            } else if time.is_some() {
                return Err(bad_time());
            }
            let (term, len) = parse_clock(rest).ok_or_else(bad_time)?;
            rest = &rest[len..];
            time = Some(match time {
                None => {
                    self.last_abs_time = Some(term);
                    term
                }
                Some(t) => (t + term) % H24,
            });
        }
        time.ok_or_else(bad_time)
    }
}

fn read_block<'a>(
    open: Line<'a>,
    lines: &mut impl Iterator<Item = Line<'a>>,
) -> Result<Vec<String>> {
    let mut block = Vec::new();
    for line in lines {
        if line.text.starts_with('}') {
            if line.text != "}" {
                return Err(bad_sequence(line));
            }
            if block.is_empty() {
                return Err(Error::syntax(
                    line.number,
                    line.text,
                    "Empty blocks not permitted",
                ));
            }
            return Ok(block);
        }
        if !line.text.starts_with('+') {
            return Err(Error::syntax(
                line.number,
                line.text,
                "All lines in the block must have relative time",
            ));
        }
        block.push(line.text.to_string());
    }
    Err(Error::syntax(
        open.number,
        open.text,
        "End-of-file within block definition (missing '}')",
    ))
}
