use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use vac_aligner_rs::manifest::{
    read_manifest, read_transcript, write_matched_text, write_transcript, MatchManifestWriter,
    MatchRecordBuilder,
};
use vac_aligner_rs::{
    compute_report, write_report, AlignerBuilder, AlignerConfig, AlignmentError, AlignmentInput,
    CancellationToken, Chunk, ChunkMatch, LanguageId, Meta,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LanguageChoice {
    Default,
    Armenian,
}

impl LanguageChoice {
    fn language_id(self) -> LanguageId {
        match self {
            Self::Default => LanguageId::Default,
            Self::Armenian => LanguageId::Armenian,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "align_manifest")]
#[command(about = "Align ASR chunk predictions against a long reference transcript")]
struct Args {
    /// JSON-lines manifest with `audio_filepath` and `pred_text` per chunk.
    #[arg(long, env = "VAC_ALIGN_MANIFEST")]
    manifest: PathBuf,
    /// Reference transcript. Without it the chunk texts are combined instead.
    #[arg(long, env = "VAC_ALIGN_TRANSCRIPT")]
    transcript: Option<PathBuf>,
    #[arg(long, env = "VAC_ALIGN_OUT")]
    out: PathBuf,
    /// Directory for per-chunk `<stem>_matched.txt` files.
    #[arg(long, env = "VAC_ALIGN_TEXTS_DIR")]
    texts_dir: Option<PathBuf>,
    #[arg(long, env = "VAC_ALIGN_REPORT")]
    report: Option<PathBuf>,
    /// JSON aligner configuration; command-line overrides win.
    #[arg(long, env = "VAC_ALIGN_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "VAC_ALIGN_CER_THRESHOLD")]
    cer_threshold: Option<f64>,
    #[arg(long, env = "VAC_ALIGN_LANGUAGE", value_enum)]
    language: Option<LanguageChoice>,
    /// Sort manifest entries by their `id` field.
    #[arg(long, env = "VAC_ALIGN_USE_ID", default_value_t = false)]
    use_id: bool,
    /// Where to save the combined transcript when no reference is given.
    #[arg(long, env = "VAC_ALIGN_COMBINED_OUT")]
    combined_out: Option<PathBuf>,
}

fn main() {
    if let Err(err) = init_tracing() {
        eprintln!("{err}");
        std::process::exit(1);
    }
    if let Err(err) = run() {
        tracing::error!(error = %err, "align_manifest failed");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false),
    );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| format!("Failed to install tracing subscriber: {err}"))
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    let chunks = read_manifest(&args.manifest, args.use_id)
        .map_err(|err| format!("{}: {err}", args.manifest.display()))?;
    let reference = match &args.transcript {
        Some(path) => {
            Some(read_transcript(path).map_err(|err| format!("{}: {err}", path.display()))?)
        }
        None => None,
    };
    tracing::info!(
        manifest = %args.manifest.display(),
        chunks = chunks.len(),
        has_reference = reference.is_some(),
        "loaded inputs"
    );

    let aligner = AlignerBuilder::new(config.clone())
        .build()
        .map_err(|err| format!("Failed to build aligner: {err}"))?;
    let input = AlignmentInput { chunks, reference };

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let mut manifest_writer = MatchManifestWriter::create(&args.out)
        .map_err(|err| format!("{}: {err}", args.out.display()))?;
    let mut record_builder = MatchRecordBuilder::new(args.texts_dir.as_deref());
    let mut text_files = 0usize;
    let mut write_error: Option<AlignmentError> = None;

    let progress = ProgressBar::new(input.chunks.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    let mut accepted = 0u64;
    let mut position = 0usize;
    let output = aligner
        .align_observed(&input, &cancel, &mut |record| {
            if record.accepted {
                accepted += 1;
            }
            progress.set_message(format!("accepted {accepted}"));
            progress.inc(1);

            let chunk = input.chunks.get(position);
            position += 1;
            if write_error.is_some() {
                return;
            }
            let Some(chunk) = chunk else {
                return;
            };
            match stream_record(&mut manifest_writer, &mut record_builder, chunk, record) {
                Ok(wrote_text) => text_files += usize::from(wrote_text),
                Err(err) => {
                    write_error = Some(err);
                    cancel.cancel();
                }
            }
        })
        .map_err(|err| format!("Alignment failed: {err}"))?;
    progress.finish_with_message(format!("accepted {accepted}"));

    if let Some(err) = write_error {
        return Err(format!("Failed to write match output: {err}"));
    }

    if output.transcript_combined {
        if let Some(path) = &args.combined_out {
            write_transcript(path, &output.transcript)
                .map_err(|err| format!("{}: {err}", path.display()))?;
        }
    }

    if let Some(report_path) = &args.report {
        let report = compute_report(&output, &input.chunks, &config).with_meta(Meta {
            generated_at: Utc::now().to_rfc3339(),
            manifest_path: display_path(&args.manifest),
            transcript_path: args.transcript.as_deref().map(display_path),
            language: aligner.language_id().to_string(),
            cer_threshold: config.cer_threshold,
        });
        if report.lost {
            tracing::warn!("alignment looks lost near the end of the run; check the report notes");
        }
        write_report(report_path, &report)
            .map_err(|err| format!("{}: {err}", report_path.display()))?;
    }

    tracing::info!(
        out = %args.out.display(),
        records = manifest_writer.written(),
        text_files,
        "wrote match manifest"
    );
    if output.cancelled {
        return Err(format!(
            "Interrupted after {} of {} chunks; partial output kept in {}",
            output.matches.len(),
            input.chunks.len(),
            args.out.display()
        ));
    }
    Ok(())
}

fn stream_record(
    writer: &mut MatchManifestWriter,
    builder: &mut MatchRecordBuilder<'_>,
    chunk: &Chunk,
    record: &ChunkMatch,
) -> Result<bool, AlignmentError> {
    let record = builder.next(chunk, record);
    writer.append(&record)?;
    write_matched_text(&record)
}

/// Cancels `token` on Ctrl-C. The run stops at the next chunk boundary and
/// everything committed so far is already on disk.
fn install_interrupt_handler(token: CancellationToken) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to start signal runtime: {err}"))?;
    std::thread::Builder::new()
        .name("interrupt-listener".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::warn!("interrupt received; stopping after the current chunk");
                        token.cancel();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to listen for interrupt signal");
                    }
                }
            });
        })
        .map_err(|err| format!("Failed to spawn interrupt listener: {err}"))?;
    Ok(())
}

fn resolve_config(args: &Args) -> Result<AlignerConfig, String> {
    let mut config = match &args.config {
        Some(path) => AlignerConfig::load(path)
            .map_err(|err| format!("{}: {err}", path.display()))?,
        None => AlignerConfig::default(),
    };
    if let Some(threshold) = args.cer_threshold {
        config.cer_threshold = threshold;
    }
    if let Some(language) = args.language {
        config.language = language.language_id();
    }
    config
        .validate()
        .map_err(|err| format!("Invalid configuration: {err}"))?;
    Ok(config)
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
