use chrono::Local;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod input;
mod output;
mod render;

use input::{EngineSource, PcmSource, ReaderSource, SourceKind, SynthConfig, WavFileSource};
use output::{format_duration, generate_filename, AudioFormat};
use render::{RenderError, RenderOptions, DEFAULT_CHUNK_FRAMES};

/// Render a MIDI file (or any PCM stream) into a WAV file
#[derive(Parser, Debug)]
#[command(name = "mid2wav")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input: MIDI file for the engine, raw PCM file (`-` for stdin), WAV file, or HOST:PORT
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file, or an existing directory to create a timestamped file in
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Where PCM comes from
    #[arg(long, value_enum, default_value_t = SourceKind::Engine)]
    source: SourceKind,

    /// Synthesis engine program writing raw s16le PCM to stdout
    #[arg(long, env = "MID2WAV_ENGINE", value_name = "PROGRAM")]
    engine: Option<String>,

    /// Extra argument passed to the engine before the input path (repeatable)
    #[arg(short = 'E', long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Embedded FM bank number
    #[arg(short, long, default_value = "59")]
    bank: u32,

    /// Number of emulated chips
    #[arg(short, long, default_value = "2")]
    chips: u32,

    /// Sample rate (Hz)
    #[arg(short, long, default_value = "48000")]
    rate: u32,

    /// Channel count
    #[arg(long, default_value = "2")]
    channels: u16,

    /// Frames pulled from the source per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_FRAMES)]
    chunk_frames: usize,

    /// Ask the engine to loop the song (needs --max-seconds)
    #[arg(long = "loop", requires = "max_seconds")]
    looping: bool,

    /// Stop after this many seconds of audio
    #[arg(long, value_name = "SECS")]
    max_seconds: Option<f64>,

    /// Re-read the finished file and check its header and length
    #[arg(long)]
    verify: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    // Validate input mode
    if args.source == SourceKind::Engine && args.engine.is_none() {
        eprintln!("Error: --source engine needs --engine <PROGRAM> (or MID2WAV_ENGINE)");
        std::process::exit(1);
    }
    if args.max_seconds.is_some_and(|secs| !(secs > 0.0)) {
        eprintln!("Error: --max-seconds must be positive");
        std::process::exit(1);
    }

    let config = synth_config(&args);

    let (mut source, format) = open_source(&args, &config)?;
    let output_path = resolve_output(&args.output, &args.input);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStopping...");
            interrupted.store(true, Ordering::SeqCst);
        })?;
    }

    let options = RenderOptions {
        chunk_frames: args.chunk_frames,
        max_frames: args
            .max_seconds
            .map(|secs| (secs * format.sample_rate() as f64).round() as u64),
    };

    info!(
        "Rendering {} -> {} ({} Hz, {} ch)",
        args.input.display(),
        output_path.display(),
        format.sample_rate(),
        format.channels()
    );

    let started = Local::now();
    let sink = BufWriter::new(File::create(&output_path)?);
    let summary = match render::render(&mut source, sink, format, options, &interrupted) {
        Ok(summary) => summary,
        Err(RenderError::Interrupted { data_bytes }) => {
            warn!(
                "Interrupted! {} holds {} bytes of audio behind an empty header",
                output_path.display(),
                data_bytes
            );
            drop(source);
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };
    let elapsed = Local::now() - started;

    if args.verify {
        let verified = output::verify::verify_wav(&output_path, &format, summary.data_bytes)?;
        info!(
            "Verified {} frames ({} data bytes)",
            verified.frames, verified.header.data_size
        );
    }

    println!(
        "Saved {} ({}, {} bytes) in {:.2}s",
        output_path.display(),
        format_duration(summary.duration_secs),
        summary.data_bytes as u64 + 44,
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    Ok(())
}

/// Engine settings taken from the command line
fn synth_config(args: &Args) -> SynthConfig {
    SynthConfig {
        sample_rate: args.rate,
        channels: args.channels,
        bank: args.bank,
        chips: args.chips,
        looping: args.looping,
        extra_args: args.engine_args.clone(),
    }
}

/// Build the PCM source and the format the output must use
fn open_source(
    args: &Args,
    config: &SynthConfig,
) -> Result<(Box<dyn PcmSource>, AudioFormat), Box<dyn std::error::Error>> {
    let format = AudioFormat::pcm16(config.sample_rate, config.channels)?;

    let source: Box<dyn PcmSource> = match args.source {
        SourceKind::Engine => {
            let program = args.engine.as_deref().unwrap_or_default();
            Box::new(EngineSource::spawn(program, &args.input, config)?)
        }
        SourceKind::Raw => Box::new(ReaderSource::open(&args.input, format.block_align())?),
        SourceKind::Tcp => {
            let addr = args.input.to_string_lossy();
            Box::new(ReaderSource::connect(&addr, format.block_align())?)
        }
        SourceKind::Wav => {
            let source = WavFileSource::open(&args.input)?;
            let wav_format = source.format();
            if wav_format != format {
                info!(
                    "Using input WAV format ({} Hz, {} ch)",
                    wav_format.sample_rate(),
                    wav_format.channels()
                );
            }
            return Ok((Box::new(source), wav_format));
        }
    };

    Ok((source, format))
}

/// Resolve the output path, generating a filename when given a directory
fn resolve_output(output: &Path, input: &Path) -> PathBuf {
    if output.is_dir() {
        output.join(generate_filename(input, Local::now()))
    } else {
        output.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use crate::input::Pull;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["mid2wav"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_wav_source_overrides_rate_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&input, spec).unwrap();
        for i in 0..10i16 {
            writer.write_sample(i).unwrap();
        }
        writer.finalize().unwrap();

        let args = parse(&[
            "-i",
            input.to_str().unwrap(),
            "-o",
            "out.wav",
            "--source",
            "wav",
            "-r",
            "48000",
            "--channels",
            "2",
        ]);
        let (mut source, format) = open_source(&args, &synth_config(&args)).unwrap();
        assert_eq!(format, AudioFormat::pcm16(22050, 1).unwrap());

        let mut buf = [0u8; 64];
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(20));
    }

    #[test]
    fn test_raw_source_uses_flag_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.raw");
        std::fs::write(&input, [0u8; 12]).unwrap();

        let args = parse(&[
            "-i",
            input.to_str().unwrap(),
            "-o",
            "out.wav",
            "--source",
            "raw",
            "-r",
            "44100",
            "--channels",
            "1",
        ]);
        let (mut source, format) = open_source(&args, &synth_config(&args)).unwrap();
        assert_eq!(format, AudioFormat::pcm16(44100, 1).unwrap());

        let mut buf = [0u8; 8];
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::data(8));
        assert_eq!(source.pull(&mut buf).unwrap(), Pull::last(4));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let args = parse(&["-i", "-", "-o", "out.wav", "--source", "raw", "--channels", "0"]);
        assert!(open_source(&args, &synth_config(&args)).is_err());
    }

    #[test]
    fn test_synth_config_passthrough() {
        let args = parse(&[
            "-i", "song.mid", "-o", "out.wav", "-b", "14", "-c", "4", "--loop", "--max-seconds",
            "30", "-E", "--emu-nuked",
        ]);
        let config = synth_config(&args);
        assert_eq!(config.bank, 14);
        assert_eq!(config.chips, 4);
        assert!(config.looping);
        assert_eq!(config.extra_args, ["--emu-nuked"]);
        assert_eq!(config.sample_rate, 48000);
    }

    #[test]
    fn test_cli_requires_input_output_and_loop_cap() {
        assert!(Args::try_parse_from(["mid2wav", "-o", "out.wav"]).is_err());
        assert!(Args::try_parse_from(["mid2wav", "-i", "song.mid"]).is_err());
        assert!(Args::try_parse_from(["mid2wav", "-i", "song.mid", "-o", "out.wav", "--loop"]).is_err());
    }

    #[test]
    fn test_output_directory_gets_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_output(dir.path(), Path::new("music/e1m1.mid"));

        assert_eq!(resolved.parent(), Some(dir.path()));
        let name = resolved.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("e1m1_"), "{}", name);
        assert!(name.ends_with(".wav"), "{}", name);
        // e1m1_YYYY-mm-dd_HH-MM-SS.wav
        assert_eq!(name.len(), "e1m1_".len() + 19 + ".wav".len());
    }

    #[test]
    fn test_output_file_path_kept() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("render.wav");
        assert_eq!(resolve_output(&target, Path::new("song.mid")), target);
    }
}
