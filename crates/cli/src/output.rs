//! Output formatting helpers

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Render rows in the requested format.
pub fn print_output<T: Serialize + Tabled>(rows: Vec<T>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("(none)");
            } else {
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&rows) {
            Ok(json) => println!("{}", json),
            Err(error) => print_error(&format!("could not render JSON: {}", error)),
        },
        OutputFormat::Yaml => match serde_yaml::to_string(&rows) {
            Ok(yaml) => print!("{}", yaml),
            Err(error) => print_error(&format!("could not render YAML: {}", error)),
        },
    }
}

pub fn print_info(message: &str) {
    println!("{} {}", "•".blue(), message);
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Status glyph for a stage table.
pub fn status_glyph(status: convoy_types::StageStatus) -> String {
    match status {
        convoy_types::StageStatus::Completed => "✓".green().to_string(),
        convoy_types::StageStatus::Failed => "✗".red().to_string(),
        convoy_types::StageStatus::InProgress => "…".yellow().to_string(),
        convoy_types::StageStatus::NotStarted => "·".normal().to_string(),
    }
}
