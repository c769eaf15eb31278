//! Integration tests driving the deployer against an in-memory domain

mod test_orchestrator;
mod test_progress;
