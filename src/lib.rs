pub mod color_logger;
pub mod interpolator;
pub mod spline;
pub mod upscaler;
pub mod wav;

pub use color_logger::ColorLogger;
pub use interpolator::{Interpolator, InterpolatorError, Method};
pub use upscaler::{ONE_HUNDRED_PERCENT, ProgressUpdate, Upscaler};

use core::fmt;
use log::error;
use std::process::{ExitCode, Termination};

#[derive(Debug)]
pub enum CliError {
    Message(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<Box<dyn std::error::Error>> for CliError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        CliError::Message(err.to_string())
    }
}

/// Wraps the top-level result so the error is logged once and mapped to a
/// failure exit code.
pub struct TermResult(pub Result<(), CliError>);

impl Termination for TermResult {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{}", err);
                ExitCode::FAILURE
            }
        }
    }
}
