//! Compiles binaural-beat sequences into a 24-hour timeline and renders them
//! as 16-bit stereo PCM.

pub mod audio_io;
#[cfg(feature = "playback")]
pub mod command;
pub mod config;
mod corrector;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod models;
pub mod parser;
pub mod rolloff;
mod scan;
pub mod scheduler;
pub mod time;
pub mod timeline;
pub mod voices;

pub use audio_io::{OutputSink, ProgressSink, RawSink, WavSink};
pub use config::EngineConfig;
pub use engine::{Budget, Parameters, RunSummary, Session};
pub use error::{Error, ErrorKind, Result, SinkError};
pub use models::PeriodSummary;
pub use parser::{compile, Schedule};
pub use rolloff::Rolloff;
pub use voices::Voice;
