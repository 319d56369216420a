//! Request lifecycle around an event collector
//!
//! The controller arms tracing when a request starts, filters raw events from
//! the instrumentation source into the collector while armed, and at the end
//! of the response disarms, renders the overview report and writes the
//! configured exports.
//!
//! Each controller owns its collector. Concurrent requests need one
//! controller each (see [`SessionController::duplicate`]).

use crate::collector::EventCollector;
use crate::config::{ProjectRoots, TracerConfig};
use crate::error::{CollectorError, Result};
use crate::event::{RawCallEvent, RawLineEvent};
use crate::export::{ExportKind, Exporter};
use crate::filter::PathFilter;
use crate::report::{render_overview_report, OverviewReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The request being traced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    /// Request path without the query string; used in the session key
    pub path: String,
    /// Full request URI
    #[serde(default)]
    pub uri: String,
}

/// Result of finishing a traced request
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub request: Option<RequestInfo>,
    /// Present when call tracing is enabled
    pub report: Option<OverviewReport>,
    pub exported: Vec<PathBuf>,
    pub rejected_events: usize,
}

/// Arms and disarms tracing around requests and feeds the collector
#[derive(Debug)]
pub struct SessionController {
    config: TracerConfig,
    filter: PathFilter,
    collector: EventCollector,
    exporter: Exporter,
    armed: bool,
    current: Option<RequestInfo>,
    rejected: usize,
}

impl SessionController {
    pub fn new(config: TracerConfig, roots: &ProjectRoots) -> Result<Self> {
        config.validate()?;
        let filter = config.path_filter(roots);
        let collector = EventCollector::new(config.calls_retention, config.lines_retention);
        let exporter = Exporter::new(config.output_dir.clone());

        tracing::info!(
            features = %config.enabled_features().join(", "),
            root = roots.root(),
            "tracer initialized"
        );

        Ok(Self {
            config,
            filter,
            collector,
            exporter,
            armed: false,
            current: None,
            rejected: 0,
        })
    }

    /// A controller with the same configuration and a fresh collector, for
    /// tracing a concurrent request.
    pub fn duplicate(&self) -> Self {
        Self {
            config: self.config.clone(),
            filter: self.filter.clone(),
            collector: EventCollector::new(self.config.calls_retention, self.config.lines_retention),
            exporter: self.exporter.clone(),
            armed: false,
            current: None,
            rejected: 0,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn collector(&self) -> &EventCollector {
        &self.collector
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Clear the collector, open a session for `request` and arm tracing.
    ///
    /// A request still armed from before is finished first.
    pub fn start_request(&mut self, request: RequestInfo) {
        if self.armed {
            tracing::warn!("previous request was not finished; finishing it now");
            if let Err(e) = self.finish_request() {
                tracing::warn!(error = %e, "failed to finish previous request");
            }
        }

        tracing::info!(method = %request.method, uri = %request.uri, "request started");
        self.collector.clear();
        self.collector
            .begin_session(self.collector.sequence(), request.path.clone());
        self.current = Some(request);
        self.rejected = 0;
        self.armed = true;
    }

    /// Start a request whose end is guaranteed: dropping the guard finishes
    /// the request if [`RequestGuard::finish`] was never called.
    pub fn scoped(&mut self, request: RequestInfo) -> RequestGuard<'_> {
        self.start_request(request);
        RequestGuard {
            controller: self,
            finished: false,
        }
    }

    /// Feed a call event. Returns true if it was recorded.
    pub fn on_call(&mut self, raw: &RawCallEvent) -> bool {
        if !self.armed || !self.config.call || !self.filter.should_trace(&raw.path) {
            return false;
        }

        let recorded = raw
            .to_event(&self.filter, self.config.caller_limit)
            .and_then(|event| self.collector.record_call(event, &raw.call_site));
        self.note(recorded, &raw.path, raw.line)
    }

    /// Feed a line event. Returns true if it was recorded.
    pub fn on_line(&mut self, raw: &RawLineEvent) -> bool {
        if !self.armed || !self.config.line || !self.filter.should_trace(&raw.path) {
            return false;
        }

        let recorded = raw
            .to_event(&self.filter)
            .and_then(|event| self.collector.record_line(event));
        self.note(recorded, &raw.path, raw.line)
    }

    fn note(&mut self, recorded: Result<()>, path: &str, line: u32) -> bool {
        match recorded {
            Ok(()) => true,
            Err(e) => {
                self.rejected += 1;
                tracing::warn!(error = %e, path, line, "event rejected");
                false
            }
        }
    }

    /// Disarm tracing, render the report and write the enabled exports.
    ///
    /// The session is always closed, even when an export fails. After all
    /// exports were attempted the first failure is returned as
    /// [`CollectorError::ExportIncomplete`], which still carries the outcome.
    pub fn finish_request(&mut self) -> Result<RequestOutcome> {
        self.armed = false;
        let request = self.current.take();
        tracing::info!(
            uri = request.as_ref().map_or("", |r| r.uri.as_str()),
            "request finished"
        );

        let report = self
            .config
            .call
            .then(|| render_overview_report(&self.collector.snapshot_overview(), self.config.call_details));

        let mut exported = Vec::new();
        let mut first_error: Option<CollectorError> = None;
        let writes = [
            (self.config.call && self.config.download_call, ExportKind::Calls),
            (self.config.line && self.config.download_line, ExportKind::Lines),
            (self.config.download_return, ExportKind::Returns),
        ];
        for (enabled, kind) in writes {
            if !enabled {
                continue;
            }
            let written = match kind {
                ExportKind::Calls => self.exporter.write(kind, &self.collector.export_calls()),
                ExportKind::Lines => self.exporter.write(kind, &self.collector.export_lines()),
                ExportKind::Returns => self.exporter.write(kind, &self.collector.export_returns()),
            };
            match written {
                Ok(path) => exported.push(path),
                Err(e) => {
                    tracing::warn!(error = %e, "export failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        self.collector.end_session();

        let outcome = RequestOutcome {
            request,
            report,
            exported,
            rejected_events: self.rejected,
        };
        match first_error {
            Some(e) => Err(CollectorError::ExportIncomplete {
                outcome: Box::new(outcome),
                source: Box::new(e),
            }),
            None => Ok(outcome),
        }
    }
}

/// Scope of one traced request
#[derive(Debug)]
pub struct RequestGuard<'a> {
    controller: &'a mut SessionController,
    finished: bool,
}

impl RequestGuard<'_> {
    pub fn on_call(&mut self, raw: &RawCallEvent) -> bool {
        self.controller.on_call(raw)
    }

    pub fn on_line(&mut self, raw: &RawLineEvent) -> bool {
        self.controller.on_line(raw)
    }

    pub fn collector(&self) -> &EventCollector {
        self.controller.collector()
    }

    pub fn finish(mut self) -> Result<RequestOutcome> {
        self.finished = true;
        self.controller.finish_request()
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.controller.finish_request() {
                tracing::warn!(error = %e, "failed to finish aborted request");
                if let Some(report) = e.outcome().and_then(|o| o.report.as_ref()) {
                    tracing::warn!(report = %report, "overview of aborted request");
                }
            }
        }
    }
}
