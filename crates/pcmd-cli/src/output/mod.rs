//! User-facing notices
//!
//! Everything here goes to stderr: stdout carries the proxied connection.
//! A colored marker is added only when stderr is a terminal, so the text
//! seen by scripts and ssh logs is exactly the message.

use std::io::{IsTerminal, Write};

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

/// Print a plain status line
pub fn print_notice(msg: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", msg);
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    print_marked(Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    print_marked(Color::Yellow, "⚠ ", msg);
}

fn print_marked(color: Color, marker: &str, msg: &str) {
    let mut stderr = std::io::stderr();
    if !stderr.is_terminal() {
        let _ = writeln!(stderr, "{}", msg);
        return;
    }

    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(color),
        Print(marker),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// `Could not lock <path>. Is there another session already in progress?`
pub fn contention_message(lock_path: &std::path::Path) -> String {
    format!(
        "Could not lock {}. Is there another session already in progress?",
        lock_path.display()
    )
}

/// `Received <signal> signal, giving processes <n> seconds to clean up...`
pub fn stop_message(signal: impl std::fmt::Display, grace_secs: u64) -> String {
    format!(
        "Received {} signal, giving processes {} seconds to clean up...",
        signal, grace_secs
    )
}
