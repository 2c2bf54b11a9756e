use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::DocumentFormat;

/// Where a rendered form report is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Stdout,
    File(PathBuf),
}

impl OutputDestination {
    pub fn file(path: impl AsRef<Path>) -> Self {
        OutputDestination::File(path.as_ref().to_path_buf())
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: DocumentFormat,
    pub pretty: bool,
    pub destinations: Vec<OutputDestination>,
}

impl OutputOptions {
    pub fn new(format: DocumentFormat, destinations: Vec<OutputDestination>) -> Self {
        Self {
            format,
            pretty: true,
            destinations,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Render `report` once and write it, newline-terminated, to every destination.
pub fn emit<T: Serialize + ?Sized>(report: &T, options: &OutputOptions) -> Result<()> {
    let rendered = render(report, options.format, options.pretty)?;
    for destination in &options.destinations {
        match destination {
            OutputDestination::Stdout => {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{rendered}")
                    .and_then(|_| stdout.flush())
                    .context("failed to write report to stdout")?;
            }
            OutputDestination::File(path) => fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("failed to write report to {}", path.display()))?,
        }
    }
    Ok(())
}

fn render<T: Serialize + ?Sized>(report: &T, format: DocumentFormat, pretty: bool) -> Result<String> {
    let rendered = match format {
        DocumentFormat::Json if pretty => serde_json::to_string_pretty(report)?,
        DocumentFormat::Json => serde_json::to_string(report)?,
        #[cfg(feature = "yaml")]
        DocumentFormat::Yaml => serde_yaml::to_string(report)?.trim_end().to_string(),
        #[cfg(feature = "toml")]
        DocumentFormat::Toml if pretty => toml::to_string_pretty(report)?.trim_end().to_string(),
        #[cfg(feature = "toml")]
        DocumentFormat::Toml => toml::to_string(report)?.trim_end().to_string(),
    };
    Ok(rendered)
}
