//! langweave Runtime
//!
//! This crate runs analysis stages: it pulls records from a stage's input
//! connector, analyses them with a shared Natural Language client and routes
//! the results to the output and error connectors.
//!
//! # Features
//!
//! - One client per run, shared by every record
//! - Bounded per-stage concurrency with input-ordered output
//! - `skip_on_error` / `send_to_error` / `stop_on_error` routing
//!
//! # Usage
//!
//! ```rust,ignore
//! use langweave_runtime::Runtime;
//!
//! let runtime = Runtime::new(config);
//! let client = runtime.connect()?;
//! for stage in runtime.config().load_stages()? {
//!     let report = runtime.run(&stage, client.clone()).await?;
//!     println!("{report}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod report;

pub use engine::Runtime;
pub use error::{Error, Result};
pub use report::RunReport;
