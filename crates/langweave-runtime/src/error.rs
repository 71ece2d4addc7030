//! Runtime error types
//!
//! The runtime adds stage and record context to core errors, so it works
//! with `anyhow`. Use [`core_error`] to recover the underlying
//! [`langweave_core::Error`], e.g. to tell a configuration problem from a
//! service failure.

/// Result type for runtime operations
pub type Result<T> = anyhow::Result<T>;

/// Runtime error (re-export anyhow for application-level errors)
pub type Error = anyhow::Error;

/// The core error at the root of a runtime error, if any
pub fn core_error(err: &Error) -> Option<&langweave_core::Error> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<langweave_core::Error>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_core_error_through_context() {
        let result: std::result::Result<(), langweave_core::Error> =
            Err(langweave_core::Error::MissingSourceField {
                field: "body".to_string(),
            });
        let err = result.context("record 3").unwrap_err();
        assert!(matches!(
            core_error(&err),
            Some(langweave_core::Error::MissingSourceField { .. })
        ));
        assert!(core_error(&anyhow::anyhow!("plain")).is_none());
    }
}
