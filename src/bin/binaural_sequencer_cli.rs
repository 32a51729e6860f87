use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use binaural_sequencer::time::format_clock;
use binaural_sequencer::voices::amp_to_percent;
use binaural_sequencer::{Budget, EngineConfig, Parameters, RawSink, Session, Voice, WavSink};

/// Compile and render binaural-beat sequence files
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a sequence to a WAV file, stdout or the sound card
    Run(RunArgs),
    /// Compile a sequence and print the resulting timeline
    Check(CheckArgs),
    /// Generate a default config file and exit
    GenerateConfig(ConfigArgs),
}

#[derive(ClapArgs)]
struct EngineArgs {
    /// Configuration file; defaults are used if it does not exist
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Output sample rate in Hz
    #[arg(long)]
    rate: Option<u32>,
    /// Minimum transition width in milliseconds
    #[arg(long)]
    fade_ms: Option<u32>,
    /// Roll-off compensation, e.g. `100=1.5,500=1,2000=1.2`
    #[arg(long)]
    rolloff: Option<String>,
}

#[derive(ClapArgs)]
struct RunArgs {
    /// Path to the sequence file
    #[arg(long)]
    path: PathBuf,
    /// WAV file to write; relative paths go under the configured output directory
    #[arg(long, conflicts_with_all = ["raw", "play"])]
    out: Option<PathBuf>,
    /// Write raw 16-bit stereo PCM to stdout
    #[arg(long, default_value_t = false, conflicts_with = "play")]
    raw: bool,
    /// Play through the default audio device (requires `--features playback`)
    #[arg(long, default_value_t = false)]
    play: bool,
    /// Stop after this many bytes of PCM instead of at the last time-line
    #[arg(long)]
    bytes: Option<u64>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(ClapArgs)]
struct CheckArgs {
    /// Path to the sequence file
    #[arg(long)]
    path: PathBuf,
    /// Print the timeline as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(ClapArgs)]
struct ConfigArgs {
    /// Output path for the generated configuration
    #[arg(long, default_value = "config.toml")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_command(args)?,
        Commands::Check(args) => check_command(args)?,
        Commands::GenerateConfig(cfg) => {
            EngineConfig::generate_default(&cfg.out)?;
            println!("Generated default config at {}", cfg.out.display());
        }
    }
    Ok(())
}

impl EngineArgs {
    fn load(&self) -> Result<(EngineConfig, Parameters)> {
        let config = EngineConfig::load_or_default(&self.config)?;
        let mut params = config.parameters();
        if let Some(rate) = self.rate {
            params.sample_rate = rate;
        }
        if let Some(fade_ms) = self.fade_ms {
            params.fade_ms = fade_ms;
        }
        if let Some(rolloff) = &self.rolloff {
            params.rolloff = Some(rolloff.clone());
        }
        Ok((config, params))
    }
}

fn load_session(path: &Path, params: &Parameters) -> Result<Session> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading sequence {}", path.display()))?;
    let mut session = Session::new();
    session.set_parameters(params)?;
    let schedule = session.parse_sequence(&text)?;
    info!(
        periods = schedule.timeline().len(),
        span = %format_clock(schedule.span_ms()),
        "sequence loaded"
    );
    Ok(session)
}

fn run_command(args: RunArgs) -> Result<()> {
    let (config, params) = args.engine.load()?;
    let mut session = load_session(&args.path, &params)?;
    session.init()?;
    let rate = session.parameters().sample_rate;
    let start = session.schedule().map_or(0, |s| s.first_time());
    let budget = args.bytes.map_or(Budget::Schedule, Budget::Bytes);

    if args.play {
        return play(&mut session, budget, rate, start);
    }
    if session.budget_bytes(budget).is_none() {
        bail!("sequence has no end time; pass --bytes to limit the output");
    }

    if args.raw {
        let mut sink = RawSink::new(std::io::BufWriter::new(std::io::stdout().lock()));
        let summary = session.run(&mut sink, budget)?;
        sink.into_inner().flush()?;
        info!(bytes = summary.bytes, "raw output written");
        return Ok(());
    }

    let name = args.out.unwrap_or_else(|| {
        let stem = args.path.file_stem().unwrap_or_default();
        PathBuf::from(stem).with_extension("wav")
    });
    let out_path = config.output_path(&name);
    let mut sink = WavSink::create(&out_path, rate).map_err(|e| anyhow!(e))?;
    let start_time = std::time::Instant::now();
    let summary = session.run(&mut sink, budget)?;
    sink.finalize().map_err(|e| anyhow!(e))?;
    println!(
        "Generated {} ({} s of audio) in {:.2}s",
        out_path.display(),
        summary.bytes / (rate as u64 * 4),
        start_time.elapsed().as_secs_f32()
    );
    Ok(())
}

#[cfg(feature = "playback")]
fn play(session: &mut Session, budget: Budget, rate: u32, start: i32) -> Result<()> {
    use binaural_sequencer::audio_io::StreamSink;
    use binaural_sequencer::command::{self, Command};
    use binaural_sequencer::{Error, ProgressSink};

    let (tx, rx) = command::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(Command::Stop);
    })?;
    let stream = StreamSink::open(rate, rx).map_err(|e| anyhow!(e))?;
    let mut sink = ProgressSink::new(stream, rate, start);

    println!("Playing... press Ctrl+C to stop");
    match session.run(&mut sink, budget) {
        Ok(summary) => {
            // Let the device drain what is still queued.
            std::thread::sleep(std::time::Duration::from_millis(500));
            info!(bytes = summary.bytes, "playback finished");
            Ok(())
        }
        Err(Error::Sink(e)) if e.to_string() == "playback stopped" => {
            println!("Stopped at {} s", sink.seconds());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(feature = "playback"))]
fn play(_: &mut Session, _: Budget, _: u32, _: i32) -> Result<()> {
    bail!("live playback requires building with `--features playback`")
}

fn check_command(args: CheckArgs) -> Result<()> {
    let (_, params) = args.engine.load()?;
    let session = load_session(&args.path, &params)?;
    let schedule = session
        .schedule()
        .context("no sequence loaded")?;
    let periods = schedule.periods();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&periods)?);
        return Ok(());
    }
    for period in &periods {
        println!("{}  {:>9} ms", period.start, period.duration_ms);
        for ch in &period.channels {
            println!(
                "    {:2}: {} -> {}",
                ch.channel,
                describe(&ch.from),
                describe(&ch.to)
            );
        }
    }
    println!(
        "{} periods, {} from first to last time-line",
        periods.len(),
        format_clock(schedule.span_ms())
    );
    Ok(())
}

/// A voice written back in sequence-file notation.
fn describe(voice: &Voice) -> String {
    let pc = amp_to_percent(voice.amp());
    match *voice {
        Voice::Off => "-".to_string(),
        Voice::Binaural { carr, res, .. } => format!("{carr}{res:+}/{pc:.2}"),
        Voice::Noise { .. } => format!("pink/{pc:.2}"),
        Voice::Bell { carr, .. } => format!("bell{carr}/{pc:.2}"),
        Voice::Spin { width, rate, .. } => format!("spin:{width}{rate:+}/{pc:.2}"),
        Voice::Mix { .. } => format!("mix/{pc:.2}"),
        Voice::Wave {
            wave, carr, res, ..
        } => format!("wave{wave:02}:{carr}{res:+}/{pc:.2}"),
    }
}
