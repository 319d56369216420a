//! Event records captured during a traced request

use crate::error::{CollectorError, Result};
use crate::filter::PathFilter;
use crate::owner::CallSiteInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one traced request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub sequence: u64,
    pub path: String,
}

impl SessionKey {
    pub fn new(sequence: u64, path: impl Into<String>) -> Self {
        Self {
            sequence,
            path: path.into(),
        }
    }

    /// Tag used to key exported documents, e.g. `"3: /users"`
    pub fn tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sequence, self.path)
    }
}

/// A method invocation inside the traced application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEvent {
    /// Display path relative to the project root
    pub path: String,
    pub line: u32,
    pub method_name: String,
    /// Nearest callers, innermost first, excluding the method itself
    pub caller_chain: Vec<String>,
}

/// A source line executed inside the traced application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEvent {
    pub path: String,
    pub line: u32,
    pub method_name: String,
}

/// Reserved shape for method returns. Nothing records these yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnEvent {
    pub path: String,
    pub line: u32,
    pub method_name: String,
}

/// Call event as emitted by the instrumentation source, before filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCallEvent {
    /// Absolute source path
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub method_name: Option<String>,
    /// Missing call-site metadata resolves to the unknown owner
    #[serde(default)]
    pub call_site: CallSiteInfo,
    /// Backtrace at the call, innermost frame first
    #[serde(default)]
    pub backtrace: Vec<String>,
}

impl RawCallEvent {
    /// Convert into a recordable event with display paths and a trimmed
    /// caller chain.
    pub fn to_event(&self, filter: &PathFilter, caller_limit: usize) -> Result<CallEvent> {
        let method_name = required_method(&self.method_name)?;
        Ok(CallEvent {
            path: filter.display_path(&self.path),
            line: self.line,
            method_name,
            caller_chain: filter.filter_callers(&self.backtrace, caller_limit),
        })
    }
}

/// Line event as emitted by the instrumentation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLineEvent {
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub method_name: Option<String>,
}

impl RawLineEvent {
    pub fn to_event(&self, filter: &PathFilter) -> Result<LineEvent> {
        Ok(LineEvent {
            path: filter.display_path(&self.path),
            line: self.line,
            method_name: required_method(&self.method_name)?,
        })
    }
}

fn required_method(name: &Option<String>) -> Result<String> {
    match name {
        Some(n) if !n.is_empty() => Ok(n.clone()),
        _ => Err(CollectorError::MalformedEvent {
            field: "method_name",
        }),
    }
}
