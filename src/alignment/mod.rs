pub mod candidates;
pub mod cer;
pub mod combiner;
pub mod matcher;
pub mod normalize;
pub mod report;
pub mod transcript;
pub mod window;
