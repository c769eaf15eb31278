//! WebLogic Deployer Library
//!
//! Deploys archives to a WebLogic domain, verifies them against the runtime
//! graph and resolves the endpoints serving them.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod mgmt;
pub mod models;
pub mod security;
pub mod storage;
pub mod utils;
