//! Line-preserving properties store
//!
//! Backs each instance's mutable `conf/server.conf`. Comments and blank
//! lines survive a load/save cycle; only entry lines are rewritten. The
//! file on disk is the source of truth; callers reload rather than holding
//! a long-lived copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Comment(String),
    Blank,
    Entry { key: String, value: String },
}

/// A key=value properties file with preserved layout
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl PropertiesFile {
    /// Load a properties file; a missing file yields an empty store
    pub fn load(path: &Path) -> Result<Self> {
        let lines = if path.exists() {
            std::fs::read_to_string(path)?
                .lines()
                .map(Self::parse_line)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    fn parse_line(raw: &str) -> Line {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Line::Blank
        } else if trimmed.starts_with('#') || trimmed.starts_with('!') {
            Line::Comment(raw.to_string())
        } else if let Some((key, value)) = trimmed.split_once('=') {
            Line::Entry {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }
        } else {
            // A bare key with no separator is kept verbatim as a comment-like
            // line so saving does not destroy it.
            Line::Comment(raw.to_string())
        }
    }

    /// The path this store reads from and writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set a key, replacing an existing entry in place or appending a new
    /// one. Returns true when the stored value actually changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        for line in self.lines.iter_mut() {
            if let Line::Entry { key: k, value: v } = line {
                if k == key {
                    if v == value {
                        return false;
                    }
                    *v = value.to_string();
                    return true;
                }
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
        });
        true
    }

    /// Remove a key. Returns true when an entry was removed.
    pub fn unset(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));
        self.lines.len() != before
    }

    /// Apply a partial merge. Returns true when any value changed.
    pub fn merge<'a>(&mut self, properties: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
        let mut changed = false;
        for (key, value) in properties {
            changed |= self.set(key, value);
        }
        changed
    }

    /// All entries in file order
    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, value } => Some((key.as_str(), value.as_str())),
                _ => None,
            })
            .collect()
    }

    /// All entries as an owned map
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Write the store back to its file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Comment(raw) => out.push_str(raw),
                Line::Blank => {}
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
            }
            out.push('\n');
        }

        debug!("Saving properties file: {:?}", self.path);
        std::fs::write(&self.path, out)?;
        Ok(())
    }
}
