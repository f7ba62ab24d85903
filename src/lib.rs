pub mod alignment;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod types;

pub use alignment::report::{compute_report, write_report, AlignmentReport, Meta};
pub use config::{AlignerConfig, LanguageId};
pub use error::AlignmentError;
pub use pipeline::builder::AlignerBuilder;
pub use pipeline::cancellation::CancellationToken;
pub use pipeline::runtime::ChunkAligner;
pub use pipeline::traits::{ErrorRateMetric, LanguageProfile};
pub use types::{AlignmentInput, AlignmentOutput, Chunk, ChunkMatch, Span, UnmatchedReason};
