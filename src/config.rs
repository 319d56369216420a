//! Tracer configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! call = true
//! call_details = true
//! line = false
//! exclude_path_prefixes = ["/srv/shop/lib/tracer/"]
//! calls_retention = 5
//! output_dir = "data"
//! ```

use crate::collector::{CALLER_LIMIT, CALLS_LIMIT, LINES_LIMIT};
use crate::error::{CollectorError, Result};
use crate::filter::PathFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to trace, how much to keep, and where to write it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Trace call events
    pub call: bool,
    /// Print per-owner method counts, not just totals
    pub call_details: bool,
    /// Write calls.json at the end of each request
    pub download_call: bool,
    /// Trace line events
    pub line: bool,
    /// Write lines.json at the end of each request
    pub download_line: bool,
    /// Write returns.json at the end of each request
    pub download_return: bool,

    /// Absolute path prefixes to trace. Empty means the project's
    /// `app/` and `lib/` directories.
    pub include_path_prefixes: Vec<String>,
    /// Absolute path prefixes never traced, checked after includes
    pub exclude_path_prefixes: Vec<String>,

    pub caller_limit: usize,
    pub calls_retention: usize,
    pub lines_retention: usize,

    /// Directory receiving calls.json, lines.json and returns.json
    pub output_dir: PathBuf,

    /// Project root; defaults to the working directory
    pub root: Option<PathBuf>,
    /// Root under which third-party dependencies are installed
    pub dependency_root: Option<PathBuf>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            call: true,
            call_details: true,
            download_call: true,
            line: true,
            download_line: true,
            download_return: false,
            include_path_prefixes: Vec::new(),
            exclude_path_prefixes: Vec::new(),
            caller_limit: CALLER_LIMIT,
            calls_retention: CALLS_LIMIT,
            lines_retention: LINES_LIMIT,
            output_dir: PathBuf::from("data"),
            root: None,
            dependency_root: None,
        }
    }
}

impl TracerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.calls_retention == 0 {
            return Err(CollectorError::Config(
                "calls_retention must be >= 1".to_string(),
            ));
        }
        if self.lines_retention == 0 {
            return Err(CollectorError::Config(
                "lines_retention must be >= 1".to_string(),
            ));
        }
        if let Some(prefix) = self
            .include_path_prefixes
            .iter()
            .chain(&self.exclude_path_prefixes)
            .find(|p| !Path::new(p).is_absolute())
        {
            return Err(CollectorError::Config(format!(
                "path prefix must be absolute: {}",
                prefix
            )));
        }
        Ok(())
    }

    /// Build the event path filter for `roots`
    pub fn path_filter(&self, roots: &ProjectRoots) -> PathFilter {
        let include = if self.include_path_prefixes.is_empty() {
            vec![roots.app_prefix(), roots.lib_prefix()]
        } else {
            self.include_path_prefixes.clone()
        };

        PathFilter::new(
            include,
            self.exclude_path_prefixes.clone(),
            roots.root(),
            roots.dependency_root(),
        )
    }

    /// Names of the enabled features, for the startup banner
    pub fn enabled_features(&self) -> Vec<&'static str> {
        [
            ("call", self.call),
            ("call_details", self.call_details),
            ("download_call", self.download_call),
            ("line", self.line),
            ("download_line", self.download_line),
            ("download_return", self.download_return),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

/// Resolved project and dependency roots, as `/`-terminated prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoots {
    root: String,
    dependency_root: String,
}

impl ProjectRoots {
    /// Canonicalize the roots. A missing or non-directory root is a
    /// configuration error.
    pub fn resolve(root: &Path, dependency_root: Option<&Path>) -> Result<Self> {
        let root = canonical_dir(root, "project root")?;
        let dependency_root = match dependency_root {
            Some(dir) => canonical_dir(dir, "dependency root")?,
            None => String::new(),
        };
        Ok(Self {
            root,
            dependency_root,
        })
    }

    /// Resolve roots from the configuration, defaulting the project root to
    /// the working directory.
    pub fn from_config(config: &TracerConfig) -> Result<Self> {
        let root = match &config.root {
            Some(root) => root.clone(),
            None => working_dir_root(std::env::current_dir())?,
        };
        Self::resolve(&root, config.dependency_root.as_deref())
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Empty when no dependency root was configured
    pub fn dependency_root(&self) -> &str {
        &self.dependency_root
    }

    pub fn app_prefix(&self) -> String {
        format!("{}app/", self.root)
    }

    pub fn lib_prefix(&self) -> String {
        format!("{}lib/", self.root)
    }
}

fn working_dir_root(cwd: std::io::Result<PathBuf>) -> Result<PathBuf> {
    cwd.map_err(|e| {
        CollectorError::Config(format!(
            "cannot resolve project root from working directory: {}",
            e
        ))
    })
}

fn canonical_dir(path: &Path, what: &str) -> Result<String> {
    let resolved = path.canonicalize().map_err(|e| {
        CollectorError::Config(format!("cannot resolve {} {}: {}", what, path.display(), e))
    })?;
    if !resolved.is_dir() {
        return Err(CollectorError::Config(format!(
            "{} is not a directory: {}",
            what,
            resolved.display()
        )));
    }

    let mut prefix = resolved.to_string_lossy().into_owned();
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    Ok(prefix)
}
