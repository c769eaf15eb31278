//! TLS trust handling

pub mod context;
pub mod guard;
