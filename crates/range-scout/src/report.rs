//! Reports and the sinks that receive them.
//!
//! A [`DatesReport`] is the normalized output of one resync cycle. Sinks are
//! the boundary to the outside: a log line, or a [`Message`] sent towards the
//! top-level reporting context.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::format::Formatter;
use crate::strategy::{DateRangeResult, Provenance};

/// One emitted tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesReport {
    pub resort_id: Option<String>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DatesReport {
    /// Normalize an extraction result.
    pub fn new(resort_id: Option<String>, result: &DateRangeResult, formatter: &Formatter) -> Self {
        Self {
            resort_id,
            check_in: formatter.format(result.check_in()),
            check_out: formatter.format(result.check_out()),
            provenance: result.provenance(),
            detail: result.detail().map(str::to_string),
        }
    }

    /// The report for "looked, found nothing".
    pub fn empty(resort_id: Option<String>) -> Self {
        Self::new(resort_id, &DateRangeResult::none(), &Formatter::default())
    }
}

/// Cross-context wire message: `{"type": "DATES_FOUND", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    #[serde(rename = "DATES_FOUND")]
    DatesFound(DatesReport),
}

/// Receives every report the controller produces, repeats included.
pub trait ResultSink {
    fn emit(&mut self, report: &DatesReport);
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn emit(&mut self, report: &DatesReport) {
        (**self).emit(report)
    }
}

/// Writes each report as one structured `info` event.
#[derive(Debug, Clone)]
pub struct LogSink {
    context: String,
}

impl LogSink {
    /// `context` labels the reporting context, e.g. `top` or `frame-3`.
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

impl ResultSink for LogSink {
    fn emit(&mut self, report: &DatesReport) {
        info!(
            context = %self.context,
            resort_id = report.resort_id.as_deref().unwrap_or("-"),
            check_in = report.check_in.as_deref().unwrap_or("-"),
            check_out = report.check_out.as_deref().unwrap_or("-"),
            provenance = %report.provenance,
            detail = report.detail.as_deref().unwrap_or("-"),
            "dates found"
        );
    }
}

/// Sends each report as a [`Message`] on a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<Message>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl ResultSink for ChannelSink {
    fn emit(&mut self, report: &DatesReport) {
        if self.tx.send(Message::DatesFound(report.clone())).is_err() {
            warn!("report channel closed, dropping report");
        }
    }
}
