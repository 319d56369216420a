//! Source path filtering for call and line events
//!
//! Decides which events belong to the traced application and turns absolute
//! source paths into display paths relative to the project root.
//! Supports:
//! - Include prefixes: only paths under one of them are traced
//! - Exclude prefixes: carve out subtrees (e.g. the tracer itself)
//! - Caller-chain trimming with a fallback to the dependency root

use serde::{Deserialize, Serialize};

/// Returns true iff `path` starts with at least one include prefix and with
/// no exclude prefix. Prefixes are matched as plain strings.
pub fn classify<S: AsRef<str>>(path: &str, include: &[S], exclude: &[S]) -> bool {
    include.iter().any(|p| path.starts_with(p.as_ref()))
        && !exclude.iter().any(|p| path.starts_with(p.as_ref()))
}

/// Strip `root` from the front of `path`, falling back to `fallback_root`
/// for frames that live in third-party dependencies.
///
/// Paths under neither root are returned unchanged.
pub fn relativize(path: &str, root: &str, fallback_root: &str) -> String {
    if let Some(rest) = path.strip_prefix(root) {
        return rest.to_string();
    }
    if !fallback_root.is_empty() {
        if let Some(rest) = path.strip_prefix(fallback_root) {
            return rest.to_string();
        }
    }
    path.to_string()
}

/// Path filter built from configured prefixes and project roots
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    root: String,
    dependency_root: String,
}

impl PathFilter {
    /// Create a filter. `root` and `dependency_root` are used for display paths.
    pub fn new(
        include: Vec<String>,
        exclude: Vec<String>,
        root: impl Into<String>,
        dependency_root: impl Into<String>,
    ) -> Self {
        Self {
            include,
            exclude,
            root: root.into(),
            dependency_root: dependency_root.into(),
        }
    }

    /// Check if an event at `path` should be traced
    pub fn should_trace(&self, path: &str) -> bool {
        classify(path, &self.include, &self.exclude)
    }

    /// Display path for an event location
    pub fn display_path(&self, path: &str) -> String {
        relativize(path, &self.root, &self.dependency_root)
    }

    /// Trim a raw backtrace into a caller chain.
    ///
    /// The first frame is the traced method itself and is always dropped;
    /// at most `limit` frames are kept.
    pub fn filter_callers<S: AsRef<str>>(&self, frames: &[S], limit: usize) -> Vec<String> {
        frames
            .iter()
            .skip(1)
            .take(limit)
            .map(|frame| self.display_path(frame.as_ref()))
            .collect()
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }
}

/// Layer a traced source file belongs to, derived from its display path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCategory {
    Controller,
    Model,
    Library,
    /// eval'd or template-generated code, e.g. `(eval)` or `<internal:...>`
    Synthetic,
    Other,
}

impl PathCategory {
    pub fn of(display_path: &str) -> Self {
        if display_path.starts_with("app/controllers") {
            Self::Controller
        } else if display_path.starts_with("app/models") {
            Self::Model
        } else if display_path.starts_with("lib/") {
            Self::Library
        } else if display_path.starts_with('<') || display_path.starts_with('(') {
            Self::Synthetic
        } else {
            Self::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Model => "model",
            Self::Library => "lib",
            Self::Synthetic => "synthetic",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for PathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
