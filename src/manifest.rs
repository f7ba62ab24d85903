//! NeMo-style JSON-lines manifests: prediction input and match output.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AlignmentError;
use crate::types::{Chunk, ChunkMatch, UnmatchedReason};

const MATCHED_TEXT_SUFFIX: &str = "_matched.txt";

/// One line of an ASR prediction manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub audio_filepath: String,
    pub pred_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// One line of the match output manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_text_path: Option<String>,
    pub text: String,
    pub chunk_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub best_match_range: [usize; 2],
    pub cer: f64,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatched_reason: Option<UnmatchedReason>,
    pub attempts: u32,
}

/// Reads a prediction manifest. With `use_id` the entries are sorted by their
/// `id` field and the id becomes the chunk index; otherwise line order is used.
pub fn read_manifest(path: &Path, use_id: bool) -> Result<Vec<Chunk>, AlignmentError> {
    let file = File::open(path).map_err(|e| AlignmentError::io("open prediction manifest", e))?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| AlignmentError::io("read prediction manifest", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: PredictionEntry = serde_json::from_str(&line)
            .map_err(|e| AlignmentError::json("parse prediction manifest line", e))?;
        entries.push(entry);
    }
    chunks_from_entries(entries, use_id)
}

pub fn chunks_from_entries(
    mut entries: Vec<PredictionEntry>,
    use_id: bool,
) -> Result<Vec<Chunk>, AlignmentError> {
    if use_id {
        if let Some(position) = entries.iter().position(|e| e.id.is_none()) {
            return Err(AlignmentError::degenerate(format!(
                "manifest entry {position} has no id but id ordering was requested"
            )));
        }
        entries.sort_by_key(|e| e.id);
    }

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| Chunk {
            index: if use_id {
                entry.id.unwrap_or(position as u64)
            } else {
                position as u64
            },
            predicted_text: entry.pred_text,
            duration: entry.duration,
            audio_filepath: Some(entry.audio_filepath),
            text: entry.text,
        })
        .collect())
}

/// Turns committed matches into output records one at a time, accumulating
/// chunk durations into start/end times. `texts_dir`, when set, names the
/// per-chunk matched text file of each record.
#[derive(Debug, Clone)]
pub struct MatchRecordBuilder<'a> {
    texts_dir: Option<&'a Path>,
    current_time: Option<f64>,
}

impl<'a> MatchRecordBuilder<'a> {
    pub fn new(texts_dir: Option<&'a Path>) -> Self {
        Self {
            texts_dir,
            current_time: Some(0.0),
        }
    }

    /// Records must be fed in chunk order; a chunk without a duration stops
    /// the clock for every later record.
    pub fn next(&mut self, chunk: &Chunk, record: &ChunkMatch) -> MatchRecord {
        let start_time = self.current_time;
        let end_time = match (self.current_time, chunk.duration) {
            (Some(t), Some(d)) => Some(t + d),
            _ => None,
        };
        self.current_time = end_time;

        MatchRecord {
            audio_filepath: chunk.audio_filepath.clone(),
            matched_text_path: self.texts_dir.and_then(|dir| {
                matched_text_path(dir, chunk).map(|p| p.to_string_lossy().into_owned())
            }),
            text: record.text.trim().to_string(),
            chunk_text: record.chunk_text.clone(),
            start_time: chunk.duration.and(start_time),
            end_time,
            duration: chunk.duration,
            best_match_range: [record.span.begin, record.span.end],
            cer: record.cer,
            accepted: record.accepted,
            unmatched_reason: record.unmatched_reason,
            attempts: record.attempts,
        }
    }
}

pub fn match_records(
    chunks: &[Chunk],
    matches: &[ChunkMatch],
    texts_dir: Option<&Path>,
) -> Vec<MatchRecord> {
    let mut builder = MatchRecordBuilder::new(texts_dir);
    matches
        .iter()
        .zip(chunks)
        .map(|(record, chunk)| builder.next(chunk, record))
        .collect()
}

/// JSON-lines match manifest written one record at a time, so an interrupted
/// run leaves every committed record on disk.
pub struct MatchManifestWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl MatchManifestWriter {
    pub fn create(path: &Path) -> Result<Self, AlignmentError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AlignmentError::io("create match manifest directory", e))?;
        }
        let file =
            File::create(path).map_err(|e| AlignmentError::io("create match manifest", e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Appends one line and flushes it.
    pub fn append(&mut self, record: &MatchRecord) -> Result<(), AlignmentError> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| AlignmentError::json("serialize match record", e))?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .map_err(|e| AlignmentError::io("write match manifest", e))?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

pub fn write_match_manifest(path: &Path, records: &[MatchRecord]) -> Result<(), AlignmentError> {
    let mut writer = MatchManifestWriter::create(path)?;
    for record in records {
        writer.append(record)?;
    }
    Ok(())
}

pub fn read_match_manifest(path: &Path) -> Result<Vec<MatchRecord>, AlignmentError> {
    let data =
        fs::read_to_string(path).map_err(|e| AlignmentError::io("read match manifest", e))?;
    data.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| AlignmentError::json("parse match record", e))
        })
        .collect()
}

/// `<dir>/<audio stem>_matched.txt`, or `None` for chunks without audio.
pub fn matched_text_path(dir: &Path, chunk: &Chunk) -> Option<PathBuf> {
    let audio = Path::new(chunk.audio_filepath.as_deref()?);
    let stem = audio.file_stem()?.to_string_lossy();
    Some(dir.join(format!("{stem}{MATCHED_TEXT_SUFFIX}")))
}

/// Writes the record's matched text file. Returns `false` when the record
/// names no path.
pub fn write_matched_text(record: &MatchRecord) -> Result<bool, AlignmentError> {
    let Some(path) = record.matched_text_path.as_deref() else {
        return Ok(false);
    };
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AlignmentError::io("create matched text directory", e))?;
    }
    fs::write(path, &record.text).map_err(|e| AlignmentError::io("write matched text file", e))?;
    Ok(true)
}

/// Writes one matched text file per record that names a path.
pub fn write_matched_texts(records: &[MatchRecord]) -> Result<usize, AlignmentError> {
    let mut written = 0usize;
    for record in records {
        written += usize::from(write_matched_text(record)?);
    }
    Ok(written)
}

pub fn read_transcript(path: &Path) -> Result<String, AlignmentError> {
    fs::read_to_string(path).map_err(|e| AlignmentError::io("read reference transcript", e))
}

pub fn write_transcript(path: &Path, text: &str) -> Result<(), AlignmentError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AlignmentError::io("create transcript directory", e))?;
    }
    fs::write(path, text).map_err(|e| AlignmentError::io("write combined transcript", e))
}
