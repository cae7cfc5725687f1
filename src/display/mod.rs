//! Terminal display utilities for CLI output.
//!
//! Provides styled tables, spinners, and a shared color theme.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{create_spinner, with_spinner};
pub use tables::{create_info_table, create_results_table};
pub use theme::{Status, THEME, Theme};
