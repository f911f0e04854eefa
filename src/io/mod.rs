//! Output handling for the CLI.
//!
//! This module provides:
//! - Text or JSON output selection
//! - Consistent error envelopes and exit codes

pub mod exit_code;
pub mod format;

pub use exit_code::ExitCode;
pub use format::{JsonResponse, OutputFormat};
