//! lyrika - batch lyric transliteration and MIDI lyric injection.
//!
//! Three modes:
//!
//! - `translate`: rewrite XML (MEI/MusicXML) files with transliterated
//!   lyric text, preserving the original under an `orig` attribute.
//! - `convert`: render MusicXML scores to MIDI and merge synchronized
//!   lyric meta-events into the track carrying the melody.
//! - `inject`: merge an existing `.align.json` into an existing MIDI
//!   file, standalone.
//!
//! # Usage
//!
//! ```bash
//! lyrika translate --input-dir scores/ --output-dir scores_phon/
//! lyrika convert --input-dir scores_phon/ --output-dir midi/ --inject-lyrics
//! lyrika inject song.mid song.align.json
//! ```
//!
//! Per-file failures are logged and reported at the end of a run; they
//! never abort the batch.

use anyhow::{Context, Result};
use lyrika::batch::{run_convert, run_translate, BatchConfig};
use lyrika::midi::{inject_lyrics_from_file, InjectOutcome};
use std::path::PathBuf;

/// The operation selected on the command line.
enum Mode {
    Translate,
    Convert,
    /// Standalone injection: (midi file, alignment json).
    Inject(PathBuf, PathBuf),
}

/// Command-line options for the application.
struct CliOptions {
    mode: Mode,
    input_dir: PathBuf,
    output_dir: PathBuf,
    align_dir: Option<PathBuf>,
    inject_lyrics: bool,
    pre_transliterated: bool,
    overwrite: bool,
    verbose: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - mode: `translate`, `convert`, or `inject <midi> <align.json>`
    /// - `--input-dir <dir>` / `--output-dir <dir>`: batch directories
    /// - `--align-dir <dir>`: also write `.align.json` artifacts (convert)
    /// - `--inject-lyrics`: merge lyric meta-events into outputs (convert)
    /// - `--pre-transliterated`: lyrics are already Latin, skip mapping
    /// - `--overwrite`: replace existing outputs
    /// - `--verbose`: debug-level logging
    /// - `--help` or `-h`: print help and exit
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        if args.len() < 2 {
            print_usage(&args);
            std::process::exit(2);
        }

        let mut positional: Vec<String> = Vec::new();
        let mut input_dir: Option<PathBuf> = None;
        let mut output_dir: Option<PathBuf> = None;
        let mut align_dir: Option<PathBuf> = None;
        let mut inject_lyrics = false;
        let mut pre_transliterated = false;
        let mut overwrite = false;
        let mut verbose = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--input-dir" => {
                    i += 1;
                    input_dir = Some(require_value(&args, i, "--input-dir"));
                }
                "--output-dir" => {
                    i += 1;
                    output_dir = Some(require_value(&args, i, "--output-dir"));
                }
                "--align-dir" => {
                    i += 1;
                    align_dir = Some(require_value(&args, i, "--align-dir"));
                }
                "--inject-lyrics" => inject_lyrics = true,
                "--pre-transliterated" => pre_transliterated = true,
                "--overwrite" => overwrite = true,
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => {
                    print_usage(&args);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(2);
                }
                other => positional.push(other.to_string()),
            }
            i += 1;
        }

        let mode = match positional.first().map(String::as_str) {
            Some("translate") => Mode::Translate,
            Some("convert") => Mode::Convert,
            Some("inject") => {
                if positional.len() != 3 {
                    eprintln!("inject requires: lyrika inject <file.mid> <file.align.json>");
                    std::process::exit(2);
                }
                Mode::Inject(
                    PathBuf::from(&positional[1]),
                    PathBuf::from(&positional[2]),
                )
            }
            Some(other) => {
                eprintln!("Unknown mode: {}", other);
                eprintln!("Use --help for usage information");
                std::process::exit(2);
            }
            None => {
                print_usage(&args);
                std::process::exit(2);
            }
        };

        Self {
            mode,
            input_dir: input_dir.unwrap_or_else(|| PathBuf::from(".")),
            output_dir: output_dir.unwrap_or_else(|| PathBuf::from("out")),
            align_dir,
            inject_lyrics,
            pre_transliterated,
            overwrite,
            verbose,
        }
    }
}

fn require_value(args: &[String], index: usize, flag: &str) -> PathBuf {
    match args.get(index) {
        Some(value) => PathBuf::from(value),
        None => {
            eprintln!("Error: {} requires a path argument", flag);
            std::process::exit(2);
        }
    }
}

fn print_usage(args: &[String]) {
    let program = args.first().map(String::as_str).unwrap_or("lyrika");
    eprintln!("lyrika - Cyrillic lyric transliteration and MIDI lyric injection");
    eprintln!();
    eprintln!("Usage: {} <mode> [OPTIONS]", program);
    eprintln!();
    eprintln!("Modes:");
    eprintln!("  translate                Rewrite XML files with transliterated lyrics");
    eprintln!("  convert                  Render MusicXML to MIDI (with optional lyric injection)");
    eprintln!("  inject <mid> <json>      Merge an .align.json into an existing MIDI file");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --input-dir DIR          Directory to scan for inputs (default: .)");
    eprintln!("  --output-dir DIR         Directory for outputs (default: out)");
    eprintln!("  --align-dir DIR          Also write .align.json artifacts (convert)");
    eprintln!("  --inject-lyrics          Merge lyric meta-events into rendered MIDI (convert)");
    eprintln!("  --pre-transliterated     Lyrics are already Latin; skip transliteration");
    eprintln!("  --overwrite              Replace outputs that already exist");
    eprintln!("  -v, --verbose            Debug-level logging");
    eprintln!("  -h, --help               Print this help message");
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse();

    // Initialize logging; RUST_LOG overrides the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.mode {
        Mode::Translate | Mode::Convert => {
            let mut config = BatchConfig::new(cli.input_dir, cli.output_dir);
            config.align_dir = cli.align_dir;
            config.inject_lyrics = cli.inject_lyrics;
            config.pre_transliterated = cli.pre_transliterated;
            config.overwrite = cli.overwrite;

            let result = match cli.mode {
                Mode::Translate => run_translate(&config),
                _ => run_convert(&config),
            };
            match result {
                Ok(_report) => Ok(()),
                Err(e) => {
                    tracing::error!("{}", e);
                    std::process::exit(2);
                }
            }
        }
        Mode::Inject(midi_path, align_path) => {
            let outcome = inject_lyrics_from_file(&midi_path, &align_path)
                .with_context(|| format!("lyric injection failed for {}", midi_path.display()))?;
            match outcome {
                InjectOutcome::Injected { track, events } => {
                    tracing::info!(
                        "injected {} lyric events on track {} of {}",
                        events,
                        track,
                        midi_path.display()
                    );
                }
                InjectOutcome::NothingToInject => {
                    tracing::info!("nothing to inject for {}", midi_path.display());
                }
            }
            Ok(())
        }
    }
}
