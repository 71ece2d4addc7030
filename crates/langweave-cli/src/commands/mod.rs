//! CLI command implementations

pub mod analyze;
pub mod init;
pub mod run;
pub mod stage;
pub mod validate;
