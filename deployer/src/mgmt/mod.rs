//! Management channel

pub mod admin_url;
pub mod channel;
pub mod rest;
