pub mod build;
pub mod completions;

use strata_core::{BuildError, Stage};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DESCRIPTOR_ERROR: u8 = 2;
pub const EXIT_PATCH_ERROR: u8 = 3;

/// A failed command: the message for stderr and the process exit code.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl Failure {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<BuildError> for Failure {
    fn from(err: BuildError) -> Self {
        let code = match (&err, err.stage()) {
            (BuildError::Io(_), _) => EXIT_FAILURE,
            (_, Stage::Load) => EXIT_DESCRIPTOR_ERROR,
            (_, Stage::Patch) => EXIT_PATCH_ERROR,
            _ => EXIT_FAILURE,
        };
        Self::new(code, err.to_string())
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, Failure> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Failure::new(EXIT_FAILURE, format!("JSON serialization failed: {e}")))
}
