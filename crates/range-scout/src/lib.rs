//! # range-scout
//!
//! Date-range extraction for pages that embed a range-picker widget.
//!
//! The picker exposes its check-in/check-out dates differently from build to
//! build: as attributes, as script properties, or only inside its
//! encapsulated markup. range-scout locates the picker, tries each of those
//! surfaces in priority order, normalizes whatever it finds to a canonical
//! timestamp, and reports it with the resort identifier from the page path.
//! A resync controller re-runs the whole pipeline whenever the page changes
//! in a way that could move the dates.
//!
//! ## Modules
//!
//! - [`value`] — Raw values → [`Instant`] (epoch seconds, date objects, `MM/DD/YYYY`)
//! - [`format`] — [`Instant`] → canonical timestamp string, per [`FormatMode`]
//! - [`dom`] — Capability traits for the host page, watch subscriptions, signals
//! - [`locator`] — Finding (and waiting for) the picker element
//! - [`strategy`] — The ordered extraction strategy chain
//! - [`controller`] — The Idle/Active resync state machine
//! - [`report`] — Reports, the wire message, and result sinks
//! - [`relay`] — Routing reports from nested frames to the top frame
//! - [`resort`] — Resort identifier from the page path
//! - [`memory`] — In-memory page host and recording sink
//! - [`config`] — Tunable constants and their validation
//! - [`error`] — Error types

pub mod config;
pub mod controller;
pub mod dom;
pub mod error;
pub mod format;
pub mod locator;
pub mod memory;
pub mod relay;
pub mod report;
pub mod resort;
pub mod strategy;
pub mod value;

pub use config::ScoutConfig;
pub use controller::ResyncController;
pub use dom::{InputField, InputKind, PageHost, PickerElement};
pub use error::ScoutError;
pub use format::{FormatMode, Formatter};
pub use locator::SourceLocator;
pub use memory::{MemoryElement, MemoryPage, NavigationKind, RecordingSink};
pub use relay::{FrameRelay, Origin, TopFrameReporter};
pub use report::{ChannelSink, DatesReport, LogSink, Message, ResultSink};
pub use resort::resort_id_from_path;
pub use strategy::{DateRangeResult, ExtractionChain, PropertyPair, Provenance};
pub use value::{Instant, LocalZone, RawValue};
