//! Git filter registration

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::archive::{is_archive, SIGNATURE_LEN};

pub const DEFAULT_FILTER_NAME: &str = "zippey";
pub const GITATTRIBUTES: &str = ".gitattributes";

/// A named git filter driver that runs this tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSetup {
    pub name: String,
    /// Command line prefix that invokes the binary
    pub command: String,
}

impl FilterSetup {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// `git config` key/value pairs for the filter driver
    pub fn settings(&self) -> Vec<(String, String)> {
        vec![
            (format!("filter.{}.clean", self.name), format!("{} encode", self.command)),
            (format!("filter.{}.smudge", self.name), format!("{} decode", self.command)),
            (format!("filter.{}.required", self.name), "true".to_string()),
        ]
    }
}

/// Quote a program path for the shell git runs filters through
pub fn shell_quote(path: &str) -> String {
    let plain = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | ':' | '\\'));
    if plain && !path.is_empty() {
        path.to_string()
    } else {
        format!("'{}'", path.replace('\'', r"'\''"))
    }
}

/// `.gitattributes` lines routing `patterns` through the filter
pub fn gitattributes_lines<S: AsRef<str>>(patterns: &[S], name: &str) -> Vec<String> {
    patterns
        .iter()
        .map(|pattern| format!("{} filter={}", pattern.as_ref(), name))
        .collect()
}

/// Append the lines missing from `existing`, keeping everything else as is
pub fn merge_gitattributes(existing: &str, lines: &[String]) -> String {
    let mut merged = existing.to_string();

    for line in lines {
        if merged.lines().any(|l| l.trim() == line) {
            continue;
        }
        if !merged.is_empty() && !merged.ends_with('\n') {
            merged.push('\n');
        }
        merged.push_str(line);
        merged.push('\n');
    }

    merged
}

/// Find extensions of ZIP-based files under `root` as `*.ext` patterns.
/// The `.git` directory is skipped.
pub fn scan_zip_extensions(root: &Path) -> Result<Vec<String>> {
    let mut patterns = BTreeSet::new();

    let walker = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let ext = match entry.path().extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => continue,
        };

        let mut prefix = Vec::with_capacity(SIGNATURE_LEN);
        let read = fs::File::open(entry.path())
            .and_then(|file| file.take(SIGNATURE_LEN as u64).read_to_end(&mut prefix));
        if let Err(err) = read {
            tracing::warn!(path = %entry.path().display(), error = %err, "skipping unreadable file");
            continue;
        }

        if is_archive(&prefix) {
            tracing::debug!(path = %entry.path().display(), "found ZIP-based file");
            patterns.insert(format!("*.{}", ext));
        }
    }

    Ok(patterns.into_iter().collect())
}

/// Register the filter in the repository's local config and route
/// `patterns` through it
pub fn apply<S: AsRef<str>>(repo: &Path, setup: &FilterSetup, patterns: &[S]) -> Result<()> {
    for (key, value) in setup.settings() {
        let status = Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(["config", "--local", key.as_str(), value.as_str()])
            .status()
            .context("Failed to run git")?;
        if !status.success() {
            bail!("git config {} failed ({})", key, status);
        }
        tracing::info!(%key, %value, "configured");
    }

    let path = repo.join(GITATTRIBUTES);
    let existing = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err).with_context(|| format!("Failed to read: {}", path.display())),
    };

    let merged = merge_gitattributes(&existing, &gitattributes_lines(patterns, &setup.name));
    if merged != existing {
        fs::write(&path, merged).with_context(|| format!("Failed to write: {}", path.display()))?;
    }

    Ok(())
}
