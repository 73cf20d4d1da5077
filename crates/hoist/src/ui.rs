//! Console output helpers.

use colored::Colorize;

use hoist_provision::{Action, PlannedChange};

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(60).bright_black());
    println!();
}

/// Print a step indicator with message.
pub fn print_step(message: &str) {
    println!("{} {}", "▶".cyan(), message.bold());
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print an indented `label: value` line.
pub fn print_field(label: &str, value: &str) {
    println!("  {:<18} {}", format!("{label}:").bright_black(), value);
}

/// Print one planned change, colored by action.
pub fn print_change(change: &PlannedChange) {
    let line = change.to_string();
    let colored = match change.action {
        Action::Create => line.green(),
        Action::Update(_) => line.yellow(),
        Action::Delete => line.red(),
        Action::Drift(_) => line.magenta(),
        Action::NoChange => line.bright_black(),
    };
    println!("  {colored}");
}
