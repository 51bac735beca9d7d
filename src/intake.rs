/*!
 * Interactive collection of source paths and the container destination
 */

use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::error::{AcquireError, Result};
use crate::types::{absolute_directory, SourcePath};
use crate::utils::strip_surrounding_quotes;

/// Token that ends source path entry
pub const DONE_TOKEN: &str = "done";

/// Prompts the operator over a pair of streams
pub struct Intake<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Intake<R, W> {
    /// Create a new intake over `input` and `output`
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Read source paths until `done` or end of input. Every accepted path
    /// exists; rejected entries are reported and asked for again.
    pub fn collect_sources(&mut self) -> Result<Vec<SourcePath>> {
        writeln!(
            self.output,
            "\nEnter the files or directories to acquire, one per line. Type '{}' when finished:",
            DONE_TOKEN
        )?;

        let mut sources: Vec<SourcePath> = Vec::new();
        while let Some(line) = self.prompt()? {
            if line.eq_ignore_ascii_case(DONE_TOKEN) {
                break;
            }
            if line.is_empty() {
                continue;
            }

            match SourcePath::from_operator_input(&line) {
                Ok(source) if sources.iter().any(|s| s.path == source.path) => {
                    writeln!(self.output, "Already added: {}", source.path.display())?;
                }
                Ok(source) => {
                    tracing::info!(path = %source.path.display(), kind = %source.kind, "source accepted");
                    writeln!(self.output, "Added {}: {}", source.kind, source.path.display())?;
                    sources.push(source);
                }
                Err(e) => {
                    tracing::warn!(input = %line, error = %e, "source rejected");
                    writeln!(self.output, "Path not found: {}", strip_surrounding_quotes(&line))?;
                }
            }
        }

        if sources.is_empty() {
            return Err(AcquireError::NoSources);
        }
        Ok(sources)
    }

    /// Read the directory the container file is created in
    pub fn collect_destination(&mut self) -> Result<PathBuf> {
        writeln!(self.output, "\nEnter the directory where the container file should be saved:")?;

        while let Some(line) = self.prompt()? {
            if line.is_empty() {
                continue;
            }
            let candidate = PathBuf::from(strip_surrounding_quotes(&line));
            if candidate.is_dir() {
                let destination = absolute_directory(&candidate)?;
                tracing::info!(destination = %destination.display(), "destination accepted");
                return Ok(destination);
            }
            writeln!(self.output, "Directory not found: {}", candidate.display())?;
        }

        Err(AcquireError::validation("<input>", "no destination directory was given"))
    }

    /// Ask a yes/no question; only `y` and `yes` count as yes
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        writeln!(self.output, "{} [y/N]", question)?;
        let answer = self.prompt()?.unwrap_or_default();
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    /// Print `> ` and read one trimmed line; `None` at end of input
    fn prompt(&mut self) -> Result<Option<String>> {
        write!(self.output, "> ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}
