//! Terminal color constants and utilities for CLI output.

use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";

/// Moves the cursor to the start of the previous line.
pub const CURSOR_UP: &str = "\x1b[1A";

/// Wrap `text` in a color and reset.
pub fn paint(color: &str, text: impl std::fmt::Display) -> String {
    format!("{color}{text}{RESET}")
}

/// Flush stdout so progress lines appear before a long-running step.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
