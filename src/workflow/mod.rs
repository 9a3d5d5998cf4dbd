pub mod gate;
pub mod lock;
pub mod pipeline;
pub mod types;

pub use pipeline::{CheckReport, Pipeline, RunOptions};
pub use types::RunOutcome;
