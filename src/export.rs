//! JSON export of retained session buffers
//!
//! Each document maps a session tag (`"{sequence}: {path}"`) to the session's
//! request path and its ordered events:
//!
//! ```json
//! {
//!   "4: /users": { "path": "/users", "data": [ ... ] },
//!   "5: /users/7": { "path": "/users/7", "data": [ ... ] }
//! }
//! ```
//!
//! Sessions appear in creation order, and reading a document back keeps that
//! order.

use crate::collector::SessionBuffer;
use crate::error::{CollectorError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One exported session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSession<E> {
    pub tag: String,
    pub path: String,
    pub data: Vec<E>,
}

/// Ordered collection of exported sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDocument<E> {
    sessions: Vec<ExportedSession<E>>,
}

impl<E> Default for SessionDocument<E> {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }
}

impl<E: Clone> SessionDocument<E> {
    pub(crate) fn from_buffers<'a, I>(buffers: I) -> Self
    where
        I: Iterator<Item = &'a SessionBuffer<E>>,
        E: 'a,
    {
        let sessions = buffers
            .map(|b| ExportedSession {
                tag: b.key.tag(),
                path: b.key.path.clone(),
                data: b.events.clone(),
            })
            .collect();
        Self { sessions }
    }
}

impl<E> SessionDocument<E> {
    pub fn sessions(&self) -> &[ExportedSession<E>] {
        &self.sessions
    }

    pub fn get(&self, tag: &str) -> Option<&ExportedSession<E>> {
        self.sessions.iter().find(|s| s.tag == tag)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of events across all sessions
    pub fn total_events(&self) -> usize {
        self.sessions.iter().map(|s| s.data.len()).sum()
    }
}

#[derive(Serialize)]
struct SessionBodyRef<'a, E> {
    path: &'a str,
    data: &'a [E],
}

#[derive(Deserialize)]
struct SessionBody<E> {
    path: String,
    data: Vec<E>,
}

impl<E: Serialize> Serialize for SessionDocument<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sessions.len()))?;
        for session in &self.sessions {
            map.serialize_entry(
                &session.tag,
                &SessionBodyRef {
                    path: &session.path,
                    data: &session.data,
                },
            )?;
        }
        map.end()
    }
}

struct DocumentVisitor<E>(PhantomData<E>);

impl<'de, E: Deserialize<'de>> Visitor<'de> for DocumentVisitor<E> {
    type Value = SessionDocument<E>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of session tags to session events")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut sessions = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((tag, body)) = access.next_entry::<String, SessionBody<E>>()? {
            sessions.push(ExportedSession {
                tag,
                path: body.path,
                data: body.data,
            });
        }
        Ok(SessionDocument { sessions })
    }
}

impl<'de, E: Deserialize<'de>> Deserialize<'de> for SessionDocument<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(DocumentVisitor(PhantomData))
    }
}

/// Which buffer a document was exported from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Calls,
    Lines,
    Returns,
}

impl ExportKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Calls => "calls.json",
            Self::Lines => "lines.json",
            Self::Returns => "returns.json",
        }
    }
}

/// Writes session documents into an output directory
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, kind: ExportKind) -> PathBuf {
        self.output_dir.join(kind.file_name())
    }

    /// Serialize `document` and write it, replacing any previous export of
    /// the same kind. Returns the written path.
    pub fn write<E: Serialize>(&self, kind: ExportKind, document: &SessionDocument<E>) -> Result<PathBuf> {
        let path = self.path_for(kind);
        let json = serde_json::to_string_pretty(document)?;

        std::fs::create_dir_all(&self.output_dir).map_err(|source| CollectorError::Export {
            path: self.output_dir.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| CollectorError::Export {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), sessions = document.len(), "export written");
        Ok(path)
    }
}
