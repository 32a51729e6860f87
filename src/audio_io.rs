//! Destinations for rendered PCM.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::SinkError;
use crate::time::{format_clock, H24};

/// Receives interleaved stereo 16-bit little-endian samples, one chunk per
/// call. Returning an error ends the run.
pub trait OutputSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError>;
}

impl<F> OutputSink for F
where
    F: FnMut(&[u8]) -> Result<(), SinkError>,
{
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        self(pcm)
    }
}

fn samples(pcm: &[u8]) -> impl Iterator<Item = i16> + '_ {
    pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]))
}

/// 16-bit stereo WAV file.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavSink {
    /// Create `path`, along with any missing parent directories.
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: hound::WavWriter::create(path, spec)?,
        })
    }

    /// Write the header lengths and close the file.
    pub fn finalize(self) -> Result<(), SinkError> {
        self.writer.finalize()?;
        Ok(())
    }
}

impl OutputSink for WavSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        for s in samples(pcm) {
            self.writer.write_sample(s)?;
        }
        Ok(())
    }
}

/// Headerless PCM to any writer, such as stdout.
pub struct RawSink<W: Write> {
    out: W,
}

impl<W: Write> RawSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> OutputSink for RawSink<W> {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        self.out.write_all(pcm)?;
        Ok(())
    }
}

/// Passes chunks through to another sink, logging the play position once
/// for every second of audio.
pub struct ProgressSink<S> {
    inner: S,
    start_ms: i32,
    bytes_per_second: u64,
    bytes: u64,
    reported: u64,
}

impl<S: OutputSink> ProgressSink<S> {
    pub fn new(inner: S, sample_rate: u32, start_ms: i32) -> Self {
        Self {
            inner,
            start_ms,
            bytes_per_second: sample_rate as u64 * 4,
            bytes: 0,
            reported: 0,
        }
    }

    /// Seconds of audio written so far.
    pub fn seconds(&self) -> u64 {
        self.bytes / self.bytes_per_second.max(1)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: OutputSink> OutputSink for ProgressSink<S> {
    fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
        self.inner.write(pcm)?;
        self.bytes += pcm.len() as u64;
        let seconds = self.seconds();
        if seconds > self.reported {
            self.reported = seconds;
            let clock = (self.start_ms as i64 + seconds as i64 * 1000).rem_euclid(H24 as i64);
            info!(position = %format_clock(clock as i32), elapsed_s = seconds, "playing");
        }
        Ok(())
    }
}

#[cfg(feature = "playback")]
pub use stream::StreamSink;

#[cfg(feature = "playback")]
mod stream {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam::channel::Receiver;
    use ringbuf::traits::{Consumer, Producer, Split};
    use ringbuf::HeapRb;
    use tracing::{debug, error};

    use super::{samples, OutputSink};
    use crate::command::{Command, PlaybackState};
    use crate::error::SinkError;

    /// About half a second of stereo audio at 44.1kHz.
    const RING_SAMPLES: usize = 44_100;

    /// Live output through the default audio device.
    ///
    /// Writes block while the ring is full, which paces synthesis to the
    /// device clock.
    pub struct StreamSink {
        producer: ringbuf::HeapProd<i16>,
        _stream: cpal::Stream,
        commands: Receiver<Command>,
        state: PlaybackState,
        paused: Arc<AtomicBool>,
        pending: Vec<i16>,
    }

    impl StreamSink {
        pub fn open(sample_rate: u32, commands: Receiver<Command>) -> Result<Self, SinkError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no output device available")?;
            let format = device.default_output_config()?.sample_format();
            let config = cpal::StreamConfig {
                channels: 2,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let ring = HeapRb::<i16>::new(RING_SAMPLES);
            let (producer, mut consumer) = ring.split();
            let paused = Arc::new(AtomicBool::new(false));
            let gate = Arc::clone(&paused);

            let stream = match format {
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let popped = if gate.load(Ordering::Relaxed) {
                            0
                        } else {
                            consumer.pop_slice(data)
                        };
                        data[popped..].fill(0);
                    },
                    |err| error!("stream error: {err}"),
                    None,
                )?,
                cpal::SampleFormat::F32 => {
                    let mut temp: Vec<i16> = vec![0; 4096];
                    device.build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            if temp.len() < data.len() {
                                temp.resize(data.len(), 0);
                            }
                            let popped = if gate.load(Ordering::Relaxed) {
                                0
                            } else {
                                consumer.pop_slice(&mut temp[..data.len()])
                            };
                            for (out, s) in data.iter_mut().zip(&temp[..popped]) {
                                *out = *s as f32 / 32768.0;
                            }
                            data[popped..].fill(0.0);
                        },
                        |err| error!("stream error: {err}"),
                        None,
                    )?
                }
                other => return Err(format!("unsupported sample format {other:?}").into()),
            };
            stream.play()?;
            debug!(sample_rate, "audio stream started");

            Ok(Self {
                producer,
                _stream: stream,
                commands,
                state: PlaybackState::default(),
                paused,
                pending: Vec::new(),
            })
        }
    }

    impl OutputSink for StreamSink {
        fn write(&mut self, pcm: &[u8]) -> Result<(), SinkError> {
            self.pending.clear();
            self.pending.extend(samples(pcm));
            let mut sent = 0;
            loop {
                self.state.poll(&self.commands);
                if self.state.stopped {
                    return Err("playback stopped".into());
                }
                self.paused.store(self.state.paused, Ordering::Relaxed);
                sent += self.producer.push_slice(&self.pending[sent..]);
                if sent == self.pending.len() {
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}
