//! Stage run summaries

use serde::Serialize;
use std::fmt;

/// Counts for one stage run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Stage name
    pub stage: String,

    /// Records pulled from the input
    pub read: usize,

    /// Records written to the output
    pub emitted: usize,

    /// Records dropped (null text or `skip_on_error`)
    pub skipped: usize,

    /// Entries written to the error connector
    pub errored: usize,
}

impl RunReport {
    /// Empty report for a stage
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} read, {} emitted, {} skipped, {} errored",
            self.stage, self.read, self.emitted, self.skipped, self.errored
        )
    }
}
