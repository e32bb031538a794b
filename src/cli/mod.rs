//! CLI commands: prompts and tables over the record stores

pub mod domain;
pub mod server;
pub mod sshkey;

use std::io::{self, BufRead, Write};

use colored::Colorize;
use serde::Serialize;

use crate::config::Paths;
use crate::error::{PlakError, Result};
use crate::ssh::SystemRunner;
use crate::store::{DomainStore, KeyStore, ServerStore};

/// Everything a command needs besides its own arguments
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: Paths,
    pub runner: SystemRunner,
    /// Skip confirmation prompts
    pub assume_yes: bool,
    /// Retry hosts-file writes through `sudo`
    pub elevate: bool,
}

impl Context {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            runner: SystemRunner::new(),
            assume_yes: false,
            elevate: false,
        }
    }

    pub fn servers(&self) -> ServerStore {
        ServerStore::new(&self.paths.ssh_config)
    }

    pub fn domains(&self) -> DomainStore {
        let store = DomainStore::new(&self.paths.hosts_file);
        if self.elevate {
            store.with_elevation(Box::new(self.runner))
        } else {
            store
        }
    }

    pub fn keys(&self) -> KeyStore {
        KeyStore::new(&self.paths.key_dir)
    }

    fn confirm(&self, prompt: &str) -> bool {
        self.assume_yes || confirm(prompt)
    }
}

fn read_line() -> Result<String> {
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        // stdin closed
        return Err(PlakError::Cancelled);
    }
    Ok(input.trim().to_string())
}

/// Ask for a value, falling back to `default` on empty input
pub fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default.dimmed()),
        None => print!("{}: ", label),
    }
    let input = read_line()?;
    Ok(match default {
        Some(default) if input.is_empty() => default.to_string(),
        _ => input,
    })
}

/// Ask for a value that may not be empty
pub fn prompt_required(label: &str) -> Result<String> {
    let value = prompt(label, None)?;
    if value.is_empty() {
        return Err(PlakError::InvalidEntry(format!("{label} cannot be empty")));
    }
    Ok(value)
}

/// Ask for an optional value; empty input means none
pub fn prompt_optional(label: &str) -> Result<Option<String>> {
    let value = prompt(&format!("{label} (optional)"), None)?;
    Ok((!value.is_empty()).then_some(value))
}

/// Ask for one of `choices`
pub fn prompt_choice(label: &str, choices: &[&str], default: &str) -> Result<String> {
    let label = format!("{} ({})", label, choices.join("/"));
    let value = prompt(&label, Some(default))?;
    if choices.iter().any(|c| c.eq_ignore_ascii_case(&value)) {
        Ok(value.to_lowercase())
    } else {
        Err(PlakError::InvalidEntry(format!("'{value}' is not one of {}", choices.join(", "))))
    }
}

/// Ask a yes/no question, defaulting to no
pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    match read_line() {
        Ok(input) => matches!(input.to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Let the user pick a row of the table just printed. `None` on `q`.
pub fn select<'a, T>(items: &'a [T], what: &str) -> Result<Option<&'a T>> {
    let input = prompt(&format!("Enter number of {what} (or 'q' to quit)"), Some("q"))?;
    if input.eq_ignore_ascii_case("q") {
        return Ok(None);
    }

    let choice: usize = input
        .parse()
        .map_err(|_| PlakError::InvalidEntry("please enter a valid number".into()))?;
    if choice < 1 || choice > items.len() {
        return Err(PlakError::InvalidEntry("invalid selection".into()));
    }
    Ok(items.get(choice - 1))
}

/// Print rows under bold headers, columns padded to their widest cell
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{:<width$}", header, width = width).bold().to_string())
        .collect();
    println!("{}", header_line.join("  "));
    let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    println!("{}", "─".repeat(total).dimmed());

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// Same rows with a leading `#` column numbered from 1
pub fn print_numbered_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut numbered_headers = vec!["#"];
    numbered_headers.extend_from_slice(headers);
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            row.insert(0, (i + 1).to_string());
            row
        })
        .collect();
    print_table(&numbered_headers, &rows);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn heading(title: &str) {
    println!("{}", format!("=== {title} ===").cyan().bold());
    println!();
}

pub fn success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

pub fn empty_notice(message: &str) {
    println!("{}", message.italic().yellow());
}
