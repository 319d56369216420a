//! Recorded event captures
//!
//! A capture is a JSON-lines stream of what an instrumentation source emitted
//! while serving requests. Replaying it through a [`SessionController`]
//! drives the same pipeline a live host would:
//!
//! ```text
//! {"event":"request","method":"GET","path":"/users","uri":"/users?page=2"}
//! {"event":"call","path":"/srv/shop/app/models/user.rb","line":3,"method_name":"full_name","call_site":{"defining_type":"User","receiver_type":"User"},"backtrace":[]}
//! {"event":"line","path":"/srv/shop/app/models/user.rb","line":4,"method_name":"full_name"}
//! {"event":"end"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A call without
//! `call_site` is attributed to the `(unknown)` owner.

use crate::error::CollectorError;
use crate::event::{RawCallEvent, RawLineEvent};
use crate::session::{RequestInfo, RequestOutcome, SessionController};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::io::BufRead;

/// One record of a capture stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureRecord {
    /// A request begins; tracing is armed
    Request(RequestInfo),
    Call(RawCallEvent),
    Line(RawLineEvent),
    /// The response finished streaming; tracing is disarmed
    End,
}

/// Parse one capture line. Returns `None` for blank and comment lines.
pub fn parse_record(line: &str) -> Result<Option<CaptureRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let record = serde_json::from_str(trimmed).context("Invalid capture record")?;
    Ok(Some(record))
}

/// Totals of a replayed capture
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub outcomes: Vec<RequestOutcome>,
    pub recorded_events: usize,
    /// Events outside any request or outside the traced paths
    pub skipped_events: usize,
    /// Well-formed JSON lines that are not a valid capture record
    pub rejected_records: usize,
    /// Requests whose exports failed. Their outcomes are still in `outcomes`.
    pub failed_exports: usize,
}

/// Feed every record of `reader` through `controller`.
///
/// A record that is valid JSON but does not match the capture schema is
/// rejected and skipped. Lines that are not JSON at all, and read errors,
/// stop the replay. A request left open when the replay stops is finished
/// before returning.
pub fn replay<R: BufRead>(reader: R, controller: &mut SessionController) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let replayed = replay_records(reader, controller, &mut summary);
    if controller.is_armed() {
        summary.finish(controller)?;
    }
    replayed.map(|()| summary)
}

fn replay_records<R: BufRead>(
    reader: R,
    controller: &mut SessionController,
    summary: &mut ReplaySummary,
) -> Result<()> {
    for (idx, line) in reader.lines().enumerate() {
        let number = idx + 1;
        let line = line.with_context(|| format!("Failed to read capture line {}", number))?;

        let record = match parse_record(&line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) if is_schema_error(&e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(line = number, error = %reason, "capture record rejected");
                summary.rejected_records += 1;
                continue;
            }
            Err(e) => return Err(e.context(format!("capture line {}", number))),
        };

        match record {
            CaptureRecord::Request(request) => {
                if controller.is_armed() {
                    summary.finish(controller)?;
                }
                controller.start_request(request);
            }
            CaptureRecord::Call(raw) => summary.count(controller.on_call(&raw)),
            CaptureRecord::Line(raw) => summary.count(controller.on_line(&raw)),
            CaptureRecord::End => {
                if controller.is_armed() {
                    summary.finish(controller)?;
                } else {
                    tracing::warn!(line = number, "end record without an open request");
                }
            }
        }
    }
    Ok(())
}

/// True for JSON that parsed but did not fit a capture record
fn is_schema_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<serde_json::Error>()
        .is_some_and(|e| e.classify() == Category::Data)
}

impl ReplaySummary {
    fn count(&mut self, recorded: bool) {
        if recorded {
            self.recorded_events += 1;
        } else {
            self.skipped_events += 1;
        }
    }

    fn finish(&mut self, controller: &mut SessionController) -> Result<()> {
        match controller.finish_request() {
            Ok(outcome) => self.outcomes.push(outcome),
            Err(CollectorError::ExportIncomplete { outcome, source }) => {
                tracing::warn!(error = %source, "export failed; continuing replay");
                self.failed_exports += 1;
                self.outcomes.push(*outcome);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
