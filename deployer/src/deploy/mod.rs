//! Deployment module

pub mod command;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod submitter;
