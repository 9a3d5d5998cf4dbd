pub mod build;
pub mod config;
pub mod error;
pub mod pin;
pub mod platform;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod upstream;
pub mod webhook;
pub mod workflow;
pub mod workspace;
