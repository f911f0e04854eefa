//! Terminal display utilities for CLI output.
//!
//! Provides styled tables and progress bars.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{apply_batch_progress, create_progress_bar, create_spinner};
pub use tables::{
    TableBuilder, create_backfill_table, create_records_table, create_results_table,
    create_status_table,
};
pub use theme::{THEME, Theme};
