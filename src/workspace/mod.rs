pub mod git;
pub mod publisher;

pub use publisher::{Publication, Publisher};
