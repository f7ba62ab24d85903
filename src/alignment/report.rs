use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::alignment::cer::wer;
use crate::config::AlignerConfig;
use crate::error::AlignmentError;
use crate::types::{AlignmentOutput, Chunk, ChunkMatch, Span, UnmatchedReason};

pub const REPORT_SCHEMA_VERSION: u32 = 1;
const WORST_TOP_N: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct AlignmentReport {
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    pub counts: ReportCounts,
    pub acceptance_ratio: f32,
    pub accepted_cer: Option<CerDistribution>,
    /// Share of transcript characters covered by accepted spans.
    pub coverage: f32,
    pub total_attempts: u64,
    pub longest_unmatched_streak: u32,
    pub order_violations: u32,
    /// Accepted chunks whose span is not their own text in a combined
    /// transcript. Only set when the transcript was combined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displaced_chunks: Option<u32>,
    pub lost: bool,
    pub worst_chunks: Vec<WorstChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkReport>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub manifest_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    pub language: String,
    pub cer_threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub total: u32,
    pub accepted: u32,
    pub exhausted_window: u32,
    pub below_threshold_after_retries: u32,
    pub empty_prediction: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CerDistribution {
    pub mean: f32,
    pub p50: f32,
    pub p90: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorstChunk {
    pub chunk_index: u64,
    pub cer: f32,
    pub accepted: bool,
}

/// Compares aligned and raw ASR texts against ground-truth chunk texts.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub chunks_with_ground_truth: u32,
    pub aligned_wer_mean: f32,
    pub asr_wer_mean: f32,
    pub aligned_exact_match: f32,
    pub asr_exact_match: f32,
}

impl AlignmentReport {
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Writes the report as pretty JSON followed by a newline, creating parent
/// directories as needed.
pub fn write_report(path: &Path, report: &AlignmentReport) -> Result<(), AlignmentError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AlignmentError::io("create report directory", e))?;
    }
    let file = File::create(path).map_err(|e| AlignmentError::io("create report file", e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| AlignmentError::json("serialize alignment report", e))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| AlignmentError::io("write report file", e))
}

pub fn compute_report(
    output: &AlignmentOutput,
    chunks: &[Chunk],
    config: &AlignerConfig,
) -> AlignmentReport {
    let matches = &output.matches;
    let counts = count_states(matches);
    let mut notes = Vec::new();

    let acceptance_ratio = ratio(counts.accepted as usize, matches.len());

    let accepted_cers: Vec<f64> = matches.iter().filter(|m| m.accepted).map(|m| m.cer).collect();
    let accepted_cer = cer_distribution(&accepted_cers);

    let transcript_len = output.transcript.chars().count();
    let covered: usize = matches.iter().filter(|m| m.accepted).map(|m| m.span.len()).sum();
    let coverage = ratio(covered, transcript_len);

    let total_attempts = matches.iter().map(|m| u64::from(m.attempts)).sum();
    let longest_unmatched_streak = longest_unmatched_streak(matches);
    let order_violations = count_order_violations(matches);
    if order_violations > 0 {
        notes.push(format!(
            "{order_violations} accepted span(s) overlap or precede an earlier accepted span"
        ));
    }

    let lost = is_lost(matches, config.lost_search_cer, config.lost_streak);
    if lost {
        notes.push(format!(
            "last {} chunks all scored above lost_search_cer {:.2}",
            config.lost_streak, config.lost_search_cer
        ));
    }
    if output.cancelled {
        notes.push(format!(
            "run cancelled after {} of {} chunks",
            matches.len(),
            chunks.len()
        ));
    }
    let displaced_chunks = output
        .transcript_combined
        .then(|| count_displaced(matches, &output.source_spans));
    if output.transcript_combined {
        notes.push("transcript synthesized from chunk texts".to_string());
    }
    if let Some(displaced) = displaced_chunks.filter(|&n| n > 0) {
        notes.push(format!(
            "{displaced} accepted chunk(s) matched text other than their own in the combined transcript"
        ));
    }

    AlignmentReport {
        schema_version: REPORT_SCHEMA_VERSION,
        meta: None,
        counts,
        acceptance_ratio,
        accepted_cer,
        coverage,
        total_attempts,
        longest_unmatched_streak,
        order_violations,
        displaced_chunks,
        lost,
        worst_chunks: worst_chunks(matches, WORST_TOP_N),
        benchmark: benchmark(matches, chunks),
        notes,
    }
}

fn count_states(matches: &[ChunkMatch]) -> ReportCounts {
    let mut counts = ReportCounts {
        total: to_u32(matches.len()),
        ..ReportCounts::default()
    };
    for record in matches {
        if record.accepted {
            counts.accepted += 1;
            continue;
        }
        match record.unmatched_reason {
            Some(UnmatchedReason::ExhaustedWindow) => counts.exhausted_window += 1,
            Some(UnmatchedReason::EmptyPrediction) => counts.empty_prediction += 1,
            Some(UnmatchedReason::BelowThresholdAfterRetries) | None => {
                counts.below_threshold_after_retries += 1
            }
        }
    }
    counts
}

fn longest_unmatched_streak(matches: &[ChunkMatch]) -> u32 {
    let mut longest = 0usize;
    let mut current = 0usize;
    for record in matches {
        if record.accepted {
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    to_u32(longest)
}

fn count_order_violations(matches: &[ChunkMatch]) -> u32 {
    let mut violations = 0usize;
    let mut last_end: Option<usize> = None;
    for record in matches.iter().filter(|m| m.accepted) {
        if last_end.is_some_and(|end| record.span.begin < end) {
            violations += 1;
        }
        last_end = Some(record.span.end);
    }
    to_u32(violations)
}

fn count_displaced(matches: &[ChunkMatch], source_spans: &[Span]) -> u32 {
    let displaced = matches
        .iter()
        .zip(source_spans)
        .filter(|(record, source)| record.accepted && record.span != **source)
        .count();
    to_u32(displaced)
}

fn is_lost(matches: &[ChunkMatch], lost_search_cer: f64, lost_streak: usize) -> bool {
    if lost_streak == 0 || matches.len() < lost_streak {
        return false;
    }
    matches[matches.len() - lost_streak..]
        .iter()
        .all(|m| m.cer > lost_search_cer)
}

fn worst_chunks(matches: &[ChunkMatch], top_n: usize) -> Vec<WorstChunk> {
    let mut entries: Vec<WorstChunk> = matches
        .iter()
        .filter(|m| m.cer > 0.0)
        .map(|m| WorstChunk {
            chunk_index: m.chunk_index,
            cer: m.cer as f32,
            accepted: m.accepted,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.cer
            .partial_cmp(&a.cer)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    entries.truncate(top_n);
    entries
}

fn benchmark(matches: &[ChunkMatch], chunks: &[Chunk]) -> Option<BenchmarkReport> {
    let ground_truth: HashMap<u64, &str> = chunks
        .iter()
        .filter_map(|chunk| chunk.text.as_deref().map(|text| (chunk.index, text)))
        .collect();
    if ground_truth.is_empty() {
        return None;
    }

    let mut aligned_wers = Vec::new();
    let mut asr_wers = Vec::new();
    let mut aligned_exact = 0usize;
    let mut asr_exact = 0usize;
    for record in matches {
        let Some(truth) = ground_truth.get(&record.chunk_index) else {
            continue;
        };
        let truth = normalize_for_comparison(truth);
        let aligned = normalize_for_comparison(&record.text);
        let asr = normalize_for_comparison(&record.chunk_text);

        aligned_wers.push(wer(&truth, &aligned));
        asr_wers.push(wer(&truth, &asr));
        aligned_exact += usize::from(aligned == truth);
        asr_exact += usize::from(asr == truth);
    }
    if aligned_wers.is_empty() {
        return None;
    }

    let n = aligned_wers.len();
    Some(BenchmarkReport {
        chunks_with_ground_truth: to_u32(n),
        aligned_wer_mean: mean(&aligned_wers) as f32,
        asr_wer_mean: mean(&asr_wers) as f32,
        aligned_exact_match: ratio(aligned_exact, n),
        asr_exact_match: ratio(asr_exact, n),
    })
}

/// Lowercase, punctuation dropped, whitespace collapsed.
fn normalize_for_comparison(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cer_distribution(values: &[f64]) -> Option<CerDistribution> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(CerDistribution {
        mean: mean(&sorted) as f32,
        p50: percentile_sorted(&sorted, 0.5) as f32,
        p90: percentile_sorted(&sorted, 0.9) as f32,
        max: sorted[sorted.len() - 1] as f32,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let clamped = percentile.clamp(0.0, 1.0);
    let max_index = (sorted_values.len() - 1) as f64;
    let rank = clamped * max_index;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = rank - lower as f64;
        sorted_values[lower] * (1.0 - weight) + sorted_values[upper] * weight
    }
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) as f32
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u64, span: (usize, usize), cer: f64, reason: Option<UnmatchedReason>) -> ChunkMatch {
        ChunkMatch {
            chunk_index: index,
            span: Span::new(span.0, span.1),
            text: String::new(),
            chunk_text: String::new(),
            cer,
            accepted: reason.is_none(),
            unmatched_reason: reason,
            attempts: 1,
        }
    }

    fn output(matches: Vec<ChunkMatch>, transcript: &str) -> AlignmentOutput {
        AlignmentOutput {
            matches,
            transcript: transcript.to_string(),
            transcript_combined: false,
            source_spans: Vec::new(),
            cancelled: false,
        }
    }

    #[test]
    fn counts_and_streaks() {
        let matches = vec![
            record(0, (0, 10), 0.1, None),
            record(1, (10, 10), 0.9, Some(UnmatchedReason::BelowThresholdAfterRetries)),
            record(2, (10, 10), 1.0, Some(UnmatchedReason::EmptyPrediction)),
            record(3, (12, 20), 0.3, None),
            record(4, (20, 20), 1.0, Some(UnmatchedReason::ExhaustedWindow)),
        ];
        let report = compute_report(&output(matches, &"x".repeat(20)), &[], &AlignerConfig::default());

        assert_eq!(
            report.counts,
            ReportCounts {
                total: 5,
                accepted: 2,
                exhausted_window: 1,
                below_threshold_after_retries: 1,
                empty_prediction: 1,
            }
        );
        assert_eq!(report.longest_unmatched_streak, 2);
        assert_eq!(report.order_violations, 0);
        assert!((report.acceptance_ratio - 0.4).abs() < 1e-6);
        assert!((report.coverage - 0.9).abs() < 1e-6);
        assert_eq!(report.total_attempts, 5);
        assert!(report.benchmark.is_none());

        let dist = report.accepted_cer.expect("distribution");
        assert!((dist.mean - 0.2).abs() < 1e-6);
        assert!((dist.max - 0.3).abs() < 1e-6);
        assert_eq!(report.worst_chunks[0].chunk_index, 2);
    }

    #[test]
    fn overlapping_accepted_spans_are_flagged() {
        let matches = vec![record(0, (0, 10), 0.1, None), record(1, (5, 15), 0.1, None)];
        let report = compute_report(&output(matches, &"x".repeat(20)), &[], &AlignerConfig::default());
        assert_eq!(report.order_violations, 1);
        assert_eq!(report.notes.len(), 1);
    }

    #[test]
    fn lost_when_tail_stays_above_search_cer() {
        let config = AlignerConfig {
            lost_streak: 3,
            ..AlignerConfig::default()
        };
        let mut matches = vec![record(0, (0, 5), 0.1, None)];
        for i in 1..4 {
            matches.push(record(i, (5, 5), 0.8, Some(UnmatchedReason::BelowThresholdAfterRetries)));
        }
        let report = compute_report(&output(matches.clone(), "abcdefgh"), &[], &config);
        assert!(report.lost);

        matches.push(record(4, (5, 8), 0.2, None));
        let report = compute_report(&output(matches, "abcdefgh"), &[], &config);
        assert!(!report.lost);
    }

    #[test]
    fn benchmark_compares_aligned_and_asr_text() {
        let mut first = record(0, (0, 17), 0.1, None);
        first.text = "Once upon a time,".to_string();
        first.chunk_text = "once upon a tme".to_string();
        let mut second = record(1, (18, 36), 0.1, None);
        second.text = "in a faraway land,".to_string();
        second.chunk_text = "in a faraway land".to_string();

        let mut chunks = vec![Chunk::new(0, "once upon a tme"), Chunk::new(1, "in a faraway land")];
        chunks[0].text = Some("Once upon a time".to_string());
        chunks[1].text = Some("in a faraway land".to_string());

        let report = compute_report(
            &output(vec![first, second], "Once upon a time, in a faraway land,"),
            &chunks,
            &AlignerConfig::default(),
        );
        let bench = report.benchmark.expect("benchmark");
        assert_eq!(bench.chunks_with_ground_truth, 2);
        assert_eq!(bench.aligned_wer_mean, 0.0);
        assert!((bench.asr_wer_mean - 0.125).abs() < 1e-6);
        assert_eq!(bench.aligned_exact_match, 1.0);
        assert_eq!(bench.asr_exact_match, 0.5);
    }

    #[test]
    fn combined_runs_count_chunks_matched_outside_their_own_text() {
        let mut out = output(
            vec![
                record(0, (0, 6), 0.0, None),
                record(1, (12, 18), 0.1, None),
                record(2, (18, 18), 0.9, Some(UnmatchedReason::BelowThresholdAfterRetries)),
            ],
            "first. second. third.",
        );
        out.transcript_combined = true;
        out.source_spans = vec![Span::new(0, 6), Span::new(7, 14), Span::new(15, 21)];
        let report = compute_report(&out, &[], &AlignerConfig::default());
        assert_eq!(report.displaced_chunks, Some(1));
        assert!(report.notes.iter().any(|n| n.contains("1 accepted chunk(s) matched text")));

        let reference_run = output(vec![record(0, (0, 6), 0.0, None)], "first.");
        let report = compute_report(&reference_run, &[], &AlignerConfig::default());
        assert_eq!(report.displaced_chunks, None);
    }

    #[test]
    fn written_report_is_pretty_json_with_meta() {
        let path = std::env::temp_dir()
            .join(format!("vac_aligner_rs_{}_report", std::process::id()))
            .join("report.json");
        let mut out = output(vec![record(0, (0, 3), 0.0, None)], "abc");
        out.cancelled = true;
        let chunks = vec![Chunk::new(0, "abc"), Chunk::new(1, "d")];
        let report = compute_report(&out, &chunks, &AlignerConfig::default()).with_meta(Meta {
            generated_at: "2024-01-01T00:00:00+00:00".to_string(),
            manifest_path: "chunks.json".to_string(),
            transcript_path: None,
            language: "default".to_string(),
            cer_threshold: 0.35,
        });
        write_report(&path, &report).expect("write report");

        let data = fs::read_to_string(&path).expect("read report");
        assert!(data.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&data).expect("valid json");
        assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
        assert_eq!(value["meta"]["manifest_path"], "chunks.json");
        assert!(value["meta"].get("transcript_path").is_none());
        assert!(value.get("displaced_chunks").is_none());
        assert_eq!(value["counts"]["accepted"], 1);
        assert!(value["notes"][0]
            .as_str()
            .is_some_and(|note| note.contains("cancelled after 1 of 2")));

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn cancelled_runs_are_noted() {
        let mut out = output(vec![record(0, (0, 3), 0.0, None)], "abc");
        out.cancelled = true;
        let chunks = vec![Chunk::new(0, "abc"), Chunk::new(1, "def")];
        let report = compute_report(&out, &chunks, &AlignerConfig::default());
        assert!(report.notes.iter().any(|n| n.contains("cancelled after 1 of 2")));
        assert!(report.worst_chunks.is_empty());
    }
}
