//! Terminal output for the `ragindex` CLI.
//!
//! Styled tables for generations and query results, progress bars for
//! builds, and a small color theme that degrades to plain text when
//! stdout is not a terminal.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{TableBuilder, generations_table, results_table};
pub use theme::{THEME, Theme};
