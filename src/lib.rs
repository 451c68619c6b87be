pub mod chain;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod proxy;
pub mod scheduler;
pub mod state;
