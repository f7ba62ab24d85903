pub mod builder;
pub mod cancellation;
pub mod defaults;
pub mod runtime;
pub mod traits;
