//! Batch orchestration over a directory of notation files.
//!
//! Two stages mirror the pipeline's two halves: *translate* rewrites
//! XML documents with transliterated lyric text, and *convert* renders
//! MusicXML scores to MIDI and injects synchronized lyric events.
//! Files are processed one at a time; a failing file is logged and
//! counted but never aborts the batch. Only setup problems (missing
//! input directory, uncreatable output directory) abort a stage.

use crate::align::{build_alignments, save_alignments, AlignmentRecord};
use crate::midi::{
    inject_lyrics_file, write_score, InjectOutcome, DEFAULT_TICKS_PER_QUARTER,
};
use crate::score::{parse_musicxml, ScoreNote};
use crate::translit::{transliterate_document, PassThrough, TextMapper, Transliterator};
use crate::util::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Input extensions for the translate stage (any lyric-bearing XML).
const TRANSLATE_EXTENSIONS: [&str; 3] = ["mei", "xml", "musicxml"];

/// Input extensions for the convert stage (parseable scores).
const CONVERT_EXTENSIONS: [&str; 2] = ["xml", "musicxml"];

/// Errors that abort a whole stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("input directory does not exist: {0}")]
    MissingInputDir(PathBuf),
    #[error("cannot create output directory {0}: {1}")]
    OutputDir(PathBuf, std::io::Error),
}

/// Per-file failures: logged with the filename, counted, and skipped.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("unreadable input: {0}")]
    Unreadable(String),
    #[error("cannot write output: {0}")]
    Output(String),
}

/// Configuration for a batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// When set, convert also writes an `.align.json` per file here.
    pub align_dir: Option<PathBuf>,
    /// Merge lyric meta-events into the rendered MIDI files.
    pub inject_lyrics: bool,
    /// Source lyrics are already Latin; skip transliteration.
    pub pre_transliterated: bool,
    /// Replace outputs that already exist.
    pub overwrite: bool,
}

impl BatchConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            align_dir: None,
            inject_lyrics: false,
            pre_transliterated: false,
            overwrite: false,
        }
    }
}

/// Aggregate result of a stage.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Files processed successfully.
    pub processed: usize,
    /// Files skipped because the output already existed.
    pub skipped: usize,
    /// Inputs that failed, in processing order.
    pub failed: Vec<PathBuf>,
    /// Translate stage only: total transliterated elements.
    pub elements_changed: usize,
}

impl BatchReport {
    fn log_summary(&self, stage: &str) {
        tracing::info!(
            "{} done: {} processed, {} skipped, {} failed",
            stage,
            self.processed,
            self.skipped,
            self.failed.len()
        );
        if !self.failed.is_empty() {
            tracing::warn!("failed files: {:?}", self.failed);
        }
    }
}

/// Recursively collects files under `dir` with one of `extensions`
/// (case-insensitive), sorted for deterministic processing order.
pub fn find_input_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files(dir, extensions, &mut files);
    files.sort();
    files
}

fn collect_files(dir: &Path, extensions: &[&str], out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extensions, out);
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_lowercase();
            if extensions.iter().any(|e| *e == ext) {
                out.push(path);
            }
        }
    }
}

/// Runs the translate stage: every XML input is rewritten with
/// transliterated lyric text into the output directory.
pub fn run_translate(config: &BatchConfig) -> Result<BatchReport, StageError> {
    prepare_dirs(&config.input_dir, &config.output_dir)?;
    let mapper = Transliterator::ukrainian();

    let files = find_input_files(&config.input_dir, &TRANSLATE_EXTENSIONS);
    if files.is_empty() {
        tracing::info!("no input files found in {}", config.input_dir.display());
        return Ok(BatchReport::default());
    }

    let mut report = BatchReport::default();
    for input in &files {
        let output = output_path(config, input, None);
        if output.exists() && !config.overwrite {
            tracing::info!("skipping (exists): {}", output.display());
            report.skipped += 1;
            continue;
        }
        match translate_file(input, &output, &mapper) {
            Ok(changed) => {
                report.processed += 1;
                report.elements_changed += changed;
                tracing::info!(
                    "wrote {} ({} transliterated elements)",
                    output.display(),
                    changed
                );
            }
            Err(e) => {
                report.failed.push(input.clone());
                tracing::warn!("failed to translate {}: {}", input.display(), e);
            }
        }
    }

    report.log_summary("translate");
    Ok(report)
}

/// Runs the convert stage: every MusicXML input is rendered to MIDI,
/// with optional alignment artifacts and lyric injection.
pub fn run_convert(config: &BatchConfig) -> Result<BatchReport, StageError> {
    prepare_dirs(&config.input_dir, &config.output_dir)?;
    if let Some(align_dir) = &config.align_dir {
        fs::create_dir_all(align_dir)
            .map_err(|e| StageError::OutputDir(align_dir.clone(), e))?;
    }

    let mapper: Box<dyn TextMapper> = if config.pre_transliterated {
        Box::new(PassThrough)
    } else {
        Box::new(Transliterator::ukrainian())
    };

    let files = find_input_files(&config.input_dir, &CONVERT_EXTENSIONS);
    if files.is_empty() {
        tracing::info!("no input files found in {}", config.input_dir.display());
        return Ok(BatchReport::default());
    }

    let mut report = BatchReport::default();
    for input in &files {
        let output = output_path(config, input, Some("mid"));
        if output.exists() && !config.overwrite {
            tracing::info!("skipping (exists): {}", output.display());
            report.skipped += 1;
            continue;
        }
        match convert_file(config, input, &output, mapper.as_ref()) {
            Ok(()) => {
                report.processed += 1;
                tracing::info!("converted {} -> {}", input.display(), output.display());
            }
            Err(e) => {
                report.failed.push(input.clone());
                tracing::warn!("failed to convert {}: {}", input.display(), e);
            }
        }
    }

    report.log_summary("convert");
    Ok(report)
}

/// Maps an input file to its output path, mirroring the input
/// directory's relative layout.
fn output_path(config: &BatchConfig, input: &Path, extension: Option<&str>) -> PathBuf {
    let relative = input
        .strip_prefix(&config.input_dir)
        .unwrap_or_else(|_| Path::new(input.file_name().unwrap_or(input.as_os_str())));
    let mut out = config.output_dir.join(relative);
    if let Some(ext) = extension {
        out.set_extension(ext);
    }
    out
}

fn prepare_dirs(input: &Path, output: &Path) -> Result<(), StageError> {
    if !input.is_dir() {
        return Err(StageError::MissingInputDir(input.to_path_buf()));
    }
    fs::create_dir_all(output).map_err(|e| StageError::OutputDir(output.to_path_buf(), e))?;
    Ok(())
}

fn translate_file(
    input: &Path,
    output: &Path,
    mapper: &dyn TextMapper,
) -> Result<usize, FileError> {
    let data = fs::read(input).map_err(|e| FileError::Unreadable(e.to_string()))?;
    let (rewritten, changed) =
        transliterate_document(&data, mapper).map_err(|e| FileError::Unreadable(e.to_string()))?;

    ensure_parent(output)?;
    write_atomic(output, &rewritten).map_err(|e| FileError::Output(e.to_string()))?;
    Ok(changed)
}

fn convert_file(
    config: &BatchConfig,
    input: &Path,
    output: &Path,
    mapper: &dyn TextMapper,
) -> Result<(), FileError> {
    let data = fs::read(input).map_err(|e| FileError::Unreadable(e.to_string()))?;
    let score = parse_musicxml(&data).map_err(|e| FileError::Unreadable(e.to_string()))?;

    let notes: Vec<ScoreNote> = score.all_notes().cloned().collect();
    let alignments = build_alignments(&notes, mapper);

    // Primary conversion: the plain MIDI rendering.
    let bytes = write_score(&score, DEFAULT_TICKS_PER_QUARTER)
        .map_err(|e| FileError::Output(e.to_string()))?;
    ensure_parent(output)?;
    write_atomic(output, &bytes).map_err(|e| FileError::Output(e.to_string()))?;

    if let Some(align_dir) = &config.align_dir {
        save_alignment_artifact(align_dir, input, &alignments);
    }

    // Post-processing: lyric injection. The primary output above is
    // already valid; an injection failure degrades the result but does
    // not fail the file.
    if config.inject_lyrics {
        match inject_lyrics_file(output, &alignments) {
            Ok(InjectOutcome::Injected { track, events }) => {
                tracing::debug!(
                    "injected {} lyric events on track {} of {}",
                    events,
                    track,
                    output.display()
                );
            }
            Ok(InjectOutcome::NothingToInject) => {
                tracing::debug!("no lyric events to inject for {}", output.display());
            }
            Err(e) => {
                tracing::error!("lyric injection failed for {}: {}", output.display(), e);
            }
        }
    }

    Ok(())
}

fn save_alignment_artifact(align_dir: &Path, input: &Path, alignments: &[AlignmentRecord]) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "score".to_string());
    let path = align_dir.join(format!("{}.align.json", stem));
    if let Err(e) = save_alignments(&path, alignments) {
        tracing::warn!("failed to write {}: {}", path.display(), e);
    }
}

fn ensure_parent(path: &Path) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FileError::Output(e.to_string()))?;
    }
    Ok(())
}
