use tracing::{debug, warn};

use crate::audio_io::OutputSink;
use crate::dsp::SineTable;
use crate::error::{bounded, Error, Result};
use crate::mixer::{ChunkClock, ChunkGeometry, Synth};
use crate::parser::{compile, Schedule};
use crate::rolloff::Rolloff;
use crate::scheduler::PeriodTracker;
use crate::time::format_clock;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_PARAM_RATE: u32 = 10;
pub const DEFAULT_FADE_MS: u32 = 60_000;

/// Engine settings. Zero (or `None`) leaves the current value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub sample_rate: u32,
    /// Oscillator updates per second; sets the chunk size.
    pub param_rate: u32,
    /// Minimum transition width in milliseconds.
    pub fade_ms: u32,
    /// Roll-off compensation spec. An empty string clears the table.
    pub rolloff: Option<String>,
}

/// How much audio [`Session::run`] produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Budget {
    /// From the first time-line to the last; unlimited if they coincide.
    #[default]
    Schedule,
    /// Exactly this many bytes.
    Bytes(u64),
    /// Until the sink fails.
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub bytes: u64,
    pub chunks: u64,
    /// Clock time reached when the run ended.
    pub end_ms: i32,
}

/// Everything the engine needs between calls: lookup tables, parameters and
/// the loaded sequence.
pub struct Session {
    sine: Option<SineTable>,
    sample_rate: u32,
    param_rate: u32,
    fade_ms: u32,
    rolloff: Rolloff,
    schedule: Option<Schedule>,
    last_error: String,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            sine: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            param_rate: DEFAULT_PARAM_RATE,
            fade_ms: DEFAULT_FADE_MS,
            rolloff: Rolloff::default(),
            schedule: None,
            last_error: String::new(),
        }
    }

    /// Build the sine table. Calling it again has no effect.
    pub fn init(&mut self) -> Result<()> {
        if self.sine.is_none() {
            let sine = SineTable::new();
            self.sine = Some(self.record(sine)?);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.sine.is_some()
    }

    pub fn set_parameters(&mut self, params: &Parameters) -> Result<()> {
        let rolloff = match params.rolloff.as_deref() {
            Some(spec) => {
                let parsed = Rolloff::parse(spec);
                Some(self.record(parsed)?)
            }
            None => None,
        };
        if params.sample_rate != 0 {
            self.sample_rate = params.sample_rate;
        }
        if params.param_rate != 0 {
            self.param_rate = params.param_rate;
        }
        if params.fade_ms != 0 {
            self.fade_ms = params.fade_ms;
        }
        if let Some(rolloff) = rolloff {
            self.rolloff = rolloff;
        }
        debug!(
            sample_rate = self.sample_rate,
            param_rate = self.param_rate,
            fade_ms = self.fade_ms,
            rolloff = self.rolloff.points().len(),
            "parameters set"
        );
        Ok(())
    }

    /// Current settings, with the roll-off table written back out as a spec.
    pub fn parameters(&self) -> Parameters {
        let rolloff = self
            .rolloff
            .points()
            .iter()
            .map(|(freq, adj)| format!("{freq}={adj}"))
            .collect::<Vec<_>>()
            .join(",");
        Parameters {
            sample_rate: self.sample_rate,
            param_rate: self.param_rate,
            fade_ms: self.fade_ms,
            rolloff: (!rolloff.is_empty()).then_some(rolloff),
        }
    }

    /// Compile `text` and make it the current sequence. On failure no
    /// sequence remains loaded.
    pub fn parse_sequence(&mut self, text: &str) -> Result<&Schedule> {
        self.schedule = None;
        let fade_ms = i32::try_from(self.fade_ms).unwrap_or(i32::MAX);
        let compiled = compile(text, fade_ms);
        let schedule = self.record(compiled)?;
        Ok(self.schedule.insert(schedule))
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Render the loaded sequence into `sink`.
    pub fn run<S: OutputSink>(&mut self, sink: &mut S, budget: Budget) -> Result<RunSummary> {
        let result = self.render(sink, budget);
        self.record(result)
    }

    /// Bytes a [`Budget::Schedule`] run produces, `None` when unlimited.
    pub fn budget_bytes(&self, budget: Budget) -> Option<u64> {
        match budget {
            Budget::Schedule => {
                let span = self.schedule.as_ref()?.span_ms();
                let frames = (span as f64 * 0.001 * self.sample_rate as f64) as u64;
                (frames > 0).then_some(4 * frames)
            }
            Budget::Bytes(n) => Some(n),
            Budget::Unlimited => None,
        }
    }

    fn render<S: OutputSink>(&self, sink: &mut S, budget: Budget) -> Result<RunSummary> {
        let sine = self.sine.as_ref().ok_or(Error::NotInitialized)?;
        let schedule = self.schedule.as_ref().ok_or(Error::NoSequence)?;
        let mut remaining = self.budget_bytes(budget);
        let geometry = ChunkGeometry::new(self.sample_rate, self.param_rate);
        let mut clock = ChunkClock::new(schedule.first_time(), geometry);
        let mut summary = RunSummary {
            bytes: 0,
            chunks: 0,
            end_ms: clock.now(),
        };
        if remaining == Some(0) {
            return Ok(summary);
        }

        let mut tracker =
            PeriodTracker::new(schedule, self.sample_rate).ok_or(Error::NoSequence)?;
        let mut synth = Synth::new(sine, self.sample_rate, geometry)?;
        debug!(
            start = %format_clock(clock.now()),
            chunk_bytes = geometry.bytes(),
            budget = ?remaining,
            "rendering"
        );

        tracker.update(schedule, clock.now(), &self.rolloff, synth.channels_mut());
        loop {
            tracker.update(schedule, clock.now(), &self.rolloff, synth.channels_mut());
            let chunk = synth.render(schedule.waves());
            let len = match remaining {
                Some(left) if left < chunk.len() as u64 => left as usize,
                _ => chunk.len(),
            };
            sink.write(&chunk[..len]).map_err(Error::Sink)?;
            summary.bytes += len as u64;
            summary.chunks += 1;
            if let Some(left) = remaining.as_mut() {
                *left -= len as u64;
                if *left == 0 {
                    break;
                }
            }
            clock.advance();
        }

        summary.end_ms = clock.now();
        debug!(bytes = summary.bytes, chunks = summary.chunks, "render finished");
        Ok(summary)
    }

    /// Drop the loaded sequence and its waveform tables.
    pub fn free_sequence(&mut self) {
        self.schedule = None;
    }

    /// Release everything, including the sine table.
    pub fn exit(&mut self) {
        self.free_sequence();
        self.sine = None;
    }

    /// The most recent failure, or an empty string.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!(kind = ?err.kind(), "{err}");
            self.last_error = bounded(&err.to_string());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SinkError, MAX_MESSAGE_LEN};

    const SEQ: &str = "a: pink/10\nb: 200+10/20\n00:00:00 a\n00:00:01 b\n";

    fn ready(text: &str) -> Session {
        let mut session = Session::new();
        session.init().unwrap();
        session.parse_sequence(text).unwrap();
        session
    }

    fn collect(session: &mut Session, budget: Budget) -> (Result<RunSummary>, Vec<usize>) {
        let mut calls = Vec::new();
        let mut sink = |pcm: &[u8]| -> std::result::Result<(), SinkError> {
            calls.push(pcm.len());
            Ok(())
        };
        let result = session.run(&mut sink, budget);
        (result, calls)
    }

    #[test]
    fn lifecycle_errors() {
        let mut session = Session::new();
        let (result, calls) = collect(&mut session, Budget::Unlimited);
        assert!(matches!(result, Err(Error::NotInitialized)));
        assert!(calls.is_empty());
        assert_eq!(session.last_error(), "Engine not initialised");

        session.init().unwrap();
        session.init().unwrap();
        let (result, _) = collect(&mut session, Budget::Unlimited);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(session.last_error(), "No sequence loaded");

        session.parse_sequence(SEQ).unwrap();
        session.free_sequence();
        session.free_sequence();
        assert!(matches!(
            collect(&mut session, Budget::Unlimited).0,
            Err(Error::NoSequence)
        ));

        session.parse_sequence(SEQ).unwrap();
        session.exit();
        assert!(!session.is_initialized());
        assert!(session.schedule().is_none());
        session.exit();
    }

    #[test]
    fn zero_parameters_keep_current_values() {
        let mut session = Session::new();
        session
            .set_parameters(&Parameters {
                sample_rate: 48_000,
                rolloff: Some("400=2,100=1".into()),
                ..Parameters::default()
            })
            .unwrap();
        session.set_parameters(&Parameters::default()).unwrap();
        let params = session.parameters();
        assert_eq!(params.sample_rate, 48_000);
        assert_eq!(params.param_rate, DEFAULT_PARAM_RATE);
        assert_eq!(params.fade_ms, DEFAULT_FADE_MS);
        assert_eq!(params.rolloff.as_deref(), Some("100=1,400=2"));

        session
            .set_parameters(&Parameters {
                rolloff: Some(String::new()),
                ..Parameters::default()
            })
            .unwrap();
        assert_eq!(session.parameters().rolloff, None);
    }

    #[test]
    fn bad_rolloff_is_reported_and_ignored() {
        let mut session = Session::new();
        let err = session
            .set_parameters(&Parameters {
                sample_rate: 8_000,
                rolloff: Some("100:1".into()),
                ..Parameters::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(session.last_error().contains("100:1"));
        assert_eq!(session.parameters().sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn failed_compile_unloads_the_previous_sequence() {
        let mut session = ready(SEQ);
        let err = session.parse_sequence("00:00 missing\n").unwrap_err();
        assert_eq!(err.line(), Some(1));
        assert!(session.schedule().is_none());
        assert!(session.last_error().contains("line 1"));
    }

    #[test]
    fn last_error_is_bounded() {
        let mut session = Session::new();
        let line = format!("00:00 {}\n", "x".repeat(1000));
        assert!(session.parse_sequence(&line).is_err());
        assert!(!session.last_error().is_empty());
        assert!(session.last_error().len() <= MAX_MESSAGE_LEN);
    }

    #[test]
    fn byte_budget_truncates_the_last_chunk() {
        let mut session = ready(SEQ);
        let (result, calls) = collect(&mut session, Budget::Bytes(40_000));
        assert_eq!(calls, vec![16_384, 16_384, 7_232]);
        let summary = result.unwrap();
        assert_eq!(summary.bytes, 40_000);
        assert_eq!(summary.chunks, 3);

        let (result, calls) = collect(&mut session, Budget::Bytes(16_384));
        assert_eq!(calls, vec![16_384]);
        assert_eq!(result.unwrap().chunks, 1);

        let (result, calls) = collect(&mut session, Budget::Bytes(0));
        assert!(calls.is_empty());
        assert_eq!(result.unwrap().bytes, 0);
    }

    #[test]
    fn schedule_budget_covers_first_to_last_line() {
        let mut session = ready(SEQ);
        assert_eq!(session.budget_bytes(Budget::Schedule), Some(4 * 44_100));
        let (result, calls) = collect(&mut session, Budget::Schedule);
        assert_eq!(result.unwrap().bytes, 4 * 44_100);
        assert_eq!(calls.iter().sum::<usize>(), 4 * 44_100);

        let single = ready("a: pink/10\n00:00 a\n");
        assert_eq!(single.budget_bytes(Budget::Schedule), None);
    }

    #[test]
    fn unlimited_runs_until_the_sink_fails() {
        let mut session = ready(SEQ);
        let mut calls = 0;
        let mut sink = |_: &[u8]| -> std::result::Result<(), SinkError> {
            calls += 1;
            if calls == 5 {
                Err("disk full".into())
            } else {
                Ok(())
            }
        };
        let err = session.run(&mut sink, Budget::Unlimited).unwrap_err();
        assert_eq!(calls, 5);
        assert_eq!(err.kind(), ErrorKind::Sink);
        assert_eq!(session.last_error(), "Output error: disk full");
    }

    #[test]
    fn clock_runs_from_the_first_time_line() {
        let mut session = ready("a: pink/10\nb: pink/20\n08:00 a\n09:00 b\n");
        let (result, _) = collect(&mut session, Budget::Bytes(16_384 * 11));
        // Ten advances of about 92.88ms each.
        let end = result.unwrap().end_ms;
        assert!((8 * 3_600_000 + 928..=8 * 3_600_000 + 930).contains(&end), "{end}");
    }
}
