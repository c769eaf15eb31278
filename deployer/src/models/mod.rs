pub mod deployment;
pub mod topology;
