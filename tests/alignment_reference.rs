use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use libtest_mimic::{Arguments, Failed, Trial};
use serde::Deserialize;
use vac_aligner_rs::{
    AlignerBuilder, AlignerConfig, AlignmentInput, AlignmentOutput, Chunk, ChunkMatch,
    UnmatchedReason,
};

const SUITE_NAME: &str = "alignment_fixture_matches_expected";
const FIXTURE_DIR: &str = "test-data/alignments";

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    reference: Option<String>,
    #[serde(default)]
    config: Option<AlignerConfig>,
    chunks: Vec<FixtureChunk>,
    expected: Vec<ExpectedMatch>,
}

#[derive(Debug, Deserialize)]
struct FixtureChunk {
    pred_text: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpectedMatch {
    accepted: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    span: Option<[usize; 2]>,
    #[serde(default)]
    unmatched_reason: Option<UnmatchedReason>,
    #[serde(default)]
    attempts: Option<u32>,
}

fn main() {
    let args = Arguments::from_args();
    let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    let fixtures = match load_fixtures(&repo_root.join(FIXTURE_DIR)) {
        Ok(fixtures) => fixtures,
        Err(err) => {
            run_setup_failure(&args, err);
            return;
        }
    };
    if fixtures.is_empty() {
        run_setup_failure(&args, format!("No fixtures found under {FIXTURE_DIR}."));
        return;
    }

    let tests = fixtures
        .into_iter()
        .map(|fixture| {
            let name = format!("{SUITE_NAME}::{}", fixture.name);
            Trial::test(name, move || run_fixture(&fixture))
        })
        .collect();
    libtest_mimic::run(&args, tests).exit();
}

fn run_setup_failure(args: &Arguments, message: String) {
    let trial = Trial::test(format!("{SUITE_NAME}::setup"), move || Err(Failed::from(message)));
    libtest_mimic::run(args, vec![trial]).exit();
}

fn load_fixtures(dir: &Path) -> Result<Vec<Fixture>, String> {
    let entries = fs::read_dir(dir)
        .map_err(|err| format!("Failed to list fixture directory '{}': {err}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let data = fs::read_to_string(path)
                .map_err(|err| format!("Failed to read fixture '{}': {err}", path.display()))?;
            serde_json::from_str(&data)
                .map_err(|err| format!("Failed to parse fixture '{}': {err}", path.display()))
        })
        .collect()
}

fn run_fixture(fixture: &Fixture) -> Result<(), Failed> {
    let config = fixture.config.clone().unwrap_or_default();
    let threshold = config.cer_threshold;
    let aligner = AlignerBuilder::new(config)
        .build()
        .map_err(|err| format!("{}: build failed: {err}", fixture.name))?;

    let chunks: Vec<Chunk> = fixture
        .chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut chunk = Chunk::new(i as u64, c.pred_text.as_str());
            chunk.text = c.text.clone();
            chunk
        })
        .collect();
    let input = AlignmentInput {
        chunks,
        reference: fixture.reference.clone(),
    };
    let output = aligner
        .align(&input)
        .map_err(|err| format!("{}: align failed: {err}", fixture.name))?;

    check_invariants(&output, input.chunks.len(), threshold)?;

    if output.matches.len() != fixture.expected.len() {
        return Err(format!(
            "expected {} matches, got {}",
            fixture.expected.len(),
            output.matches.len()
        )
        .into());
    }
    for (position, (actual, expected)) in output.matches.iter().zip(&fixture.expected).enumerate() {
        check_match(position, actual, expected)?;
    }
    Ok(())
}

fn check_invariants(output: &AlignmentOutput, chunk_count: usize, threshold: f64) -> Result<(), Failed> {
    if output.cancelled || output.matches.len() != chunk_count {
        return Err(format!(
            "incomplete run: {} matches for {chunk_count} chunks",
            output.matches.len()
        )
        .into());
    }

    let transcript_len = output.transcript.chars().count();
    let mut last_end = 0usize;
    for record in &output.matches {
        if record.span.begin > record.span.end || record.span.end > transcript_len {
            return Err(format!("chunk {} span {:?} out of bounds", record.chunk_index, record.span).into());
        }
        if !(0.0..=1.0).contains(&record.cer) {
            return Err(format!("chunk {} cer {} outside [0, 1]", record.chunk_index, record.cer).into());
        }
        if record.accepted != (record.cer <= threshold) {
            return Err(format!(
                "chunk {} accepted={} disagrees with cer {} and threshold {threshold}",
                record.chunk_index, record.accepted, record.cer
            )
            .into());
        }
        if record.accepted {
            if record.span.begin < last_end {
                return Err(format!(
                    "chunk {} span {:?} starts before previous accepted end {last_end}",
                    record.chunk_index, record.span
                )
                .into());
            }
            last_end = record.span.end;
        }
    }
    Ok(())
}

fn check_match(position: usize, actual: &ChunkMatch, expected: &ExpectedMatch) -> Result<(), Failed> {
    if actual.accepted != expected.accepted {
        return Err(format!(
            "match {position}: expected accepted={}, got {} (cer {:.3}, text {:?})",
            expected.accepted, actual.accepted, actual.cer, actual.text
        )
        .into());
    }
    if let Some(text) = &expected.text {
        if &actual.text != text {
            return Err(format!("match {position}: expected text {text:?}, got {:?}", actual.text).into());
        }
    }
    if let Some([begin, end]) = expected.span {
        if (actual.span.begin, actual.span.end) != (begin, end) {
            return Err(format!(
                "match {position}: expected span [{begin}, {end}), got {:?}",
                actual.span
            )
            .into());
        }
    }
    if expected.unmatched_reason.is_some() && actual.unmatched_reason != expected.unmatched_reason {
        return Err(format!(
            "match {position}: expected reason {:?}, got {:?}",
            expected.unmatched_reason, actual.unmatched_reason
        )
        .into());
    }
    if let Some(attempts) = expected.attempts {
        if actual.attempts != attempts {
            return Err(format!(
                "match {position}: expected {attempts} attempts, got {}",
                actual.attempts
            )
            .into());
        }
    }
    Ok(())
}
