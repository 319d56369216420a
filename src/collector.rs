//! Per-request event collection with bounded retention
//!
//! The collector accumulates call, line and return events into one buffer per
//! session and keeps a running overview of call counts grouped by owner label.
//!
//! Retention:
//! - Call buffers are kept for the last `calls_limit` sessions
//! - Line buffers are kept for the last `lines_limit` sessions
//! - Return buffers and the overview are wiped on every `clear()`
//!
//! Eviction is FIFO by session creation order, independent of which session
//! was written last. The collector does no locking: give each concurrently
//! traced request its own instance.

use crate::error::{CollectorError, Result};
use crate::event::{CallEvent, LineEvent, ReturnEvent, SessionKey};
use crate::export::SessionDocument;
use crate::owner::CallSiteInfo;
use std::collections::{HashMap, VecDeque};

/// Default number of sessions whose call buffers are retained
pub const CALLS_LIMIT: usize = 5;
/// Default number of sessions whose line buffers are retained
pub const LINES_LIMIT: usize = 3;
/// Default number of caller frames kept per call event
pub const CALLER_LIMIT: usize = 3;

/// Events recorded for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBuffer<E> {
    pub key: SessionKey,
    pub events: Vec<E>,
}

/// Ordered set of session buffers, oldest first
#[derive(Debug, Clone)]
struct BufferSet<E> {
    sessions: VecDeque<SessionBuffer<E>>,
}

impl<E> Default for BufferSet<E> {
    fn default() -> Self {
        Self {
            sessions: VecDeque::new(),
        }
    }
}

impl<E: Clone> BufferSet<E> {
    fn append(&mut self, key: &SessionKey, event: E) {
        // The active session is almost always the newest one
        if let Some(buffer) = self.sessions.iter_mut().rev().find(|b| &b.key == key) {
            buffer.events.push(event);
            return;
        }
        self.sessions.push_back(SessionBuffer {
            key: key.clone(),
            events: vec![event],
        });
    }

    /// Drop the oldest sessions until at most `limit` remain
    fn evict_to(&mut self, limit: usize) -> usize {
        let mut evicted = 0;
        while self.sessions.len() > limit {
            if let Some(old) = self.sessions.pop_front() {
                tracing::debug!(session = %old.key, events = old.events.len(), "evicted session buffer");
            }
            evicted += 1;
        }
        evicted
    }

    fn clear(&mut self) {
        self.sessions.clear();
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }

    fn document(&self) -> SessionDocument<E> {
        SessionDocument::from_buffers(self.sessions.iter())
    }
}

/// Call count for one method of an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCount {
    pub method_name: String,
    pub count: u64,
}

/// Aggregated calls for one owner label since the last clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewEntry {
    pub owner_label: String,
    /// Display path of the first call seen for this owner
    pub source_path: String,
    /// Per-method counts in first-seen order
    pub per_method_counts: Vec<MethodCount>,
}

impl OverviewEntry {
    fn new(owner_label: String, source_path: String) -> Self {
        Self {
            owner_label,
            source_path,
            per_method_counts: Vec::new(),
        }
    }

    fn increment(&mut self, method_name: &str) {
        match self
            .per_method_counts
            .iter_mut()
            .find(|m| m.method_name == method_name)
        {
            Some(m) => m.count += 1,
            None => self.per_method_counts.push(MethodCount {
                method_name: method_name.to_string(),
                count: 1,
            }),
        }
    }

    pub fn count(&self, method_name: &str) -> u64 {
        self.per_method_counts
            .iter()
            .find(|m| m.method_name == method_name)
            .map_or(0, |m| m.count)
    }

    /// Sum of all method counts for this owner
    pub fn total(&self) -> u64 {
        self.per_method_counts.iter().map(|m| m.count).sum()
    }
}

/// Call counts grouped by owner label, in first-seen owner order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overview {
    entries: Vec<OverviewEntry>,
    index: HashMap<String, usize>,
}

impl Overview {
    fn record(&mut self, owner_label: String, source_path: &str, method_name: &str) {
        let idx = match self.index.get(&owner_label) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(owner_label.clone(), idx);
                self.entries
                    .push(OverviewEntry::new(owner_label, source_path.to_string()));
                idx
            }
        };
        self.entries[idx].increment(method_name);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn get(&self, owner_label: &str) -> Option<&OverviewEntry> {
        self.index.get(owner_label).map(|&idx| &self.entries[idx])
    }

    /// Count of calls to `method_name` attributed to `owner_label`
    pub fn count(&self, owner_label: &str, method_name: &str) -> u64 {
        self.get(owner_label).map_or(0, |e| e.count(method_name))
    }

    pub fn entries(&self) -> &[OverviewEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_calls(&self) -> u64 {
        self.entries.iter().map(OverviewEntry::total).sum()
    }
}

/// Stateful store of per-session call, line and return events
#[derive(Debug)]
pub struct EventCollector {
    calls_limit: usize,
    lines_limit: usize,
    sequence: u64,
    active: Option<SessionKey>,
    calls: BufferSet<CallEvent>,
    lines: BufferSet<LineEvent>,
    returns: BufferSet<ReturnEvent>,
    overview: Overview,
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new(CALLS_LIMIT, LINES_LIMIT)
    }
}

impl EventCollector {
    /// Create a collector retaining call buffers for `calls_limit` sessions
    /// and line buffers for `lines_limit` sessions.
    pub fn new(calls_limit: usize, lines_limit: usize) -> Self {
        Self {
            calls_limit,
            lines_limit,
            sequence: 0,
            active: None,
            calls: BufferSet::default(),
            lines: BufferSet::default(),
            returns: BufferSet::default(),
            overview: Overview::default(),
        }
    }

    /// Current sequence number; incremented by every `clear()`
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn active_session(&self) -> Option<&SessionKey> {
        self.active.as_ref()
    }

    /// Make `(sequence, path)` the active session. Buffers are left untouched.
    pub fn begin_session(&mut self, sequence: u64, path: impl Into<String>) {
        let key = SessionKey::new(sequence, path);
        tracing::debug!(session = %key, "session started");
        self.active = Some(key);
    }

    /// Deactivate the current session; later writes are rejected
    pub fn end_session(&mut self) {
        if let Some(key) = self.active.take() {
            tracing::debug!(session = %key, "session ended");
        }
    }

    /// Prepare for the next session.
    ///
    /// Advances the sequence counter, wipes the overview and all return
    /// buffers, retires the active session and evicts the oldest call and
    /// line buffers beyond their retention limits.
    pub fn clear(&mut self) {
        self.sequence += 1;
        self.active = None;
        self.overview.clear();
        self.returns.clear();

        let calls_evicted = self.calls.evict_to(self.calls_limit);
        let lines_evicted = self.lines.evict_to(self.lines_limit);
        tracing::debug!(
            sequence = self.sequence,
            calls_evicted,
            lines_evicted,
            "collector cleared"
        );
    }

    fn active_key(&self) -> Result<&SessionKey> {
        self.active.as_ref().ok_or(CollectorError::NoActiveSession)
    }

    /// Append a call to the active session and count it in the overview
    /// under the owner resolved from `call_site`.
    pub fn record_call(&mut self, event: CallEvent, call_site: &CallSiteInfo) -> Result<()> {
        let key = self.active_key()?.clone();
        if event.method_name.is_empty() {
            return Err(CollectorError::MalformedEvent {
                field: "method_name",
            });
        }

        self.overview
            .record(call_site.owner_label(), &event.path, &event.method_name);
        self.calls.append(&key, event);
        Ok(())
    }

    /// Append a line to the active session
    pub fn record_line(&mut self, event: LineEvent) -> Result<()> {
        let key = self.active_key()?.clone();
        if event.method_name.is_empty() {
            return Err(CollectorError::MalformedEvent {
                field: "method_name",
            });
        }
        self.lines.append(&key, event);
        Ok(())
    }

    /// Append a return to the active session
    pub fn record_return(&mut self, event: ReturnEvent) -> Result<()> {
        let key = self.active_key()?.clone();
        self.returns.append(&key, event);
        Ok(())
    }

    /// Copy of the overview at this instant
    pub fn snapshot_overview(&self) -> Overview {
        self.overview.clone()
    }

    pub fn call_sessions(&self) -> impl Iterator<Item = &SessionBuffer<CallEvent>> {
        self.calls.sessions.iter()
    }

    pub fn line_sessions(&self) -> impl Iterator<Item = &SessionBuffer<LineEvent>> {
        self.lines.sessions.iter()
    }

    pub fn return_sessions(&self) -> impl Iterator<Item = &SessionBuffer<ReturnEvent>> {
        self.returns.sessions.iter()
    }

    pub fn retained_call_sessions(&self) -> usize {
        self.calls.len()
    }

    pub fn retained_line_sessions(&self) -> usize {
        self.lines.len()
    }

    /// All retained call buffers, oldest session first
    pub fn export_calls(&self) -> SessionDocument<CallEvent> {
        self.calls.document()
    }

    pub fn export_lines(&self) -> SessionDocument<LineEvent> {
        self.lines.document()
    }

    pub fn export_returns(&self) -> SessionDocument<ReturnEvent> {
        self.returns.document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(path: &str, method: &str) -> CallEvent {
        CallEvent {
            path: path.to_string(),
            line: 1,
            method_name: method.to_string(),
            caller_chain: vec![],
        }
    }

    fn line(n: u32) -> LineEvent {
        LineEvent {
            path: "app/models/user.rb".to_string(),
            line: n,
            method_name: "full_name".to_string(),
        }
    }

    fn start(collector: &mut EventCollector, path: &str) {
        collector.clear();
        let seq = collector.sequence();
        collector.begin_session(seq, path);
    }

    #[test]
    fn test_record_without_session_rejected() {
        let mut collector = EventCollector::default();
        let site = CallSiteInfo::instance("User");

        assert!(matches!(
            collector.record_call(call("app/models/user.rb", "save"), &site),
            Err(CollectorError::NoActiveSession)
        ));
        assert!(matches!(
            collector.record_line(line(1)),
            Err(CollectorError::NoActiveSession)
        ));
        assert_eq!(collector.retained_call_sessions(), 0);
        assert!(collector.snapshot_overview().is_empty());
    }

    #[test]
    fn test_record_after_end_session_rejected() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        collector.end_session();
        assert!(collector.record_line(line(1)).is_err());
    }

    #[test]
    fn test_record_call_updates_overview() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");

        let user = CallSiteInfo::instance("User");
        let inherited = CallSiteInfo {
            defining_type: "ApplicationRecord".to_string(),
            receiver_type: Some("User".to_string()),
            ..CallSiteInfo::default()
        };

        collector.record_call(call("app/models/user.rb", "full_name"), &user).unwrap();
        collector.record_call(call("app/models/user.rb", "full_name"), &user).unwrap();
        collector.record_call(call("app/models/user.rb", "email"), &user).unwrap();
        collector
            .record_call(call("app/models/application_record.rb", "touch"), &inherited)
            .unwrap();

        let overview = collector.snapshot_overview();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview.count("User", "full_name"), 2);
        assert_eq!(overview.count("User", "email"), 1);
        assert_eq!(overview.count("User < ApplicationRecord", "touch"), 1);
        assert_eq!(overview.total_calls(), 4);
        assert_eq!(
            overview.get("User < ApplicationRecord").unwrap().source_path,
            "app/models/application_record.rb"
        );
    }

    #[test]
    fn test_source_path_set_on_first_occurrence() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        let site = CallSiteInfo::instance("User");
        collector.record_call(call("app/models/user.rb", "a"), &site).unwrap();
        collector.record_call(call("app/models/concerns/x.rb", "b"), &site).unwrap();

        let overview = collector.snapshot_overview();
        assert_eq!(overview.get("User").unwrap().source_path, "app/models/user.rb");
    }

    #[test]
    fn test_malformed_call_rejected_without_side_effects() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        let site = CallSiteInfo::instance("User");

        assert!(collector.record_call(call("app/models/user.rb", ""), &site).is_err());
        collector.record_call(call("app/models/user.rb", "save"), &site).unwrap();

        assert_eq!(collector.export_calls().total_events(), 1);
        assert_eq!(collector.snapshot_overview().total_calls(), 1);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        let site = CallSiteInfo::instance("User");
        collector.record_call(call("app/models/user.rb", "save"), &site).unwrap();

        let snapshot = collector.snapshot_overview();
        collector.record_call(call("app/models/user.rb", "save"), &site).unwrap();

        assert_eq!(snapshot.count("User", "save"), 1);
        assert_eq!(collector.snapshot_overview().count("User", "save"), 2);
    }

    #[test]
    fn test_clear_wipes_overview_and_returns() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        let site = CallSiteInfo::instance("User");
        collector.record_call(call("app/models/user.rb", "save"), &site).unwrap();
        collector
            .record_return(ReturnEvent {
                path: "app/models/user.rb".to_string(),
                line: 4,
                method_name: "save".to_string(),
            })
            .unwrap();
        collector.record_line(line(2)).unwrap();

        collector.clear();

        assert!(collector.snapshot_overview().is_empty());
        assert_eq!(collector.return_sessions().count(), 0);
        assert_eq!(collector.retained_call_sessions(), 1);
        assert_eq!(collector.retained_line_sessions(), 1);
        assert!(collector.active_session().is_none());
    }

    #[test]
    fn test_clear_increments_sequence() {
        let mut collector = EventCollector::default();
        assert_eq!(collector.sequence(), 0);
        collector.clear();
        collector.clear();
        assert_eq!(collector.sequence(), 2);
    }

    #[test]
    fn test_begin_session_keeps_buffers() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        collector.record_line(line(1)).unwrap();
        collector.begin_session(collector.sequence(), "/users");
        collector.record_line(line(2)).unwrap();

        let sessions: Vec<_> = collector.line_sessions().collect();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].events.len(), 2);
    }

    #[test]
    fn test_call_retention_is_fifo() {
        let mut collector = EventCollector::default();
        let site = CallSiteInfo::instance("User");
        for i in 0..8 {
            start(&mut collector, &format!("/page/{}", i));
            collector.record_call(call("app/models/user.rb", "save"), &site).unwrap();
        }
        collector.clear();

        let paths: Vec<_> = collector.call_sessions().map(|s| s.key.path.clone()).collect();
        assert_eq!(paths, vec!["/page/3", "/page/4", "/page/5", "/page/6", "/page/7"]);
    }

    #[test]
    fn test_line_retention_limit() {
        let mut collector = EventCollector::default();
        for i in 0..6 {
            start(&mut collector, &format!("/page/{}", i));
            collector.record_line(line(i)).unwrap();
        }
        // Active session plus the retained window
        assert_eq!(collector.retained_line_sessions(), LINES_LIMIT + 1);
        collector.clear();
        assert_eq!(collector.retained_line_sessions(), LINES_LIMIT);
    }

    #[test]
    fn test_eviction_ignores_write_recency() {
        let mut collector = EventCollector::new(2, 2);
        start(&mut collector, "/a");
        collector.record_line(line(1)).unwrap();
        let first = collector.active_session().unwrap().clone();
        start(&mut collector, "/b");
        collector.record_line(line(1)).unwrap();

        // Write to the oldest session again
        collector.begin_session(first.sequence, first.path.clone());
        collector.record_line(line(2)).unwrap();

        start(&mut collector, "/c");
        collector.record_line(line(1)).unwrap();
        collector.clear();

        let paths: Vec<_> = collector.line_sessions().map(|s| s.key.path.clone()).collect();
        assert_eq!(paths, vec!["/b", "/c"]);
    }

    #[test]
    fn test_lines_do_not_touch_overview() {
        let mut collector = EventCollector::default();
        start(&mut collector, "/users");
        collector.record_line(line(1)).unwrap();
        assert!(collector.snapshot_overview().is_empty());
    }
}
