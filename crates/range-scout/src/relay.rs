//! Routing reports from nested frames to the top frame.
//!
//! A picker often lives inside an embedded frame that cannot see the top
//! page's path. Each frame sends its [`Message`] to a [`FrameRelay`], which
//! forwards it to the top frame of the same tab. There a
//! [`TopFrameReporter`] fills in the resort identifier and logs the result.

use std::collections::HashMap;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::report::{Message, ResultSink};
use crate::resort::resort_id_from_path;

pub type TabId = u32;
pub type FrameId = u32;

/// Frame id of a tab's top-level context.
pub const TOP_FRAME: FrameId = 0;

/// Where a message came from. Messages from outside any tab carry no tab id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub tab_id: Option<TabId>,
    pub frame_id: FrameId,
}

/// Forwards messages from any frame to its tab's top frame.
#[derive(Debug, Default)]
pub struct FrameRelay {
    top_frames: HashMap<TabId, UnboundedSender<Message>>,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the inbox of a tab's top frame, replacing any previous one.
    pub fn register_top_frame(&mut self, tab_id: TabId, inbox: UnboundedSender<Message>) {
        self.top_frames.insert(tab_id, inbox);
    }

    pub fn unregister(&mut self, tab_id: TabId) {
        self.top_frames.remove(&tab_id);
    }

    /// Forward `message`. Returns `false` when it was dropped.
    pub fn forward(&mut self, origin: Origin, message: Message) -> bool {
        let Some(tab_id) = origin.tab_id else {
            debug!(frame_id = origin.frame_id, "dropping message without tab");
            return false;
        };
        let Some(inbox) = self.top_frames.get(&tab_id) else {
            debug!(tab_id, "no top frame registered");
            return false;
        };
        if inbox.send(message).is_err() {
            warn!(tab_id, "top frame gone, unregistering");
            self.top_frames.remove(&tab_id);
            return false;
        }
        debug!(tab_id, frame_id = origin.frame_id, "forwarded to top frame");
        true
    }
}

/// The top frame's receiving side.
#[derive(Debug)]
pub struct TopFrameReporter<S> {
    resort_id: Option<String>,
    sink: S,
}

impl<S: ResultSink> TopFrameReporter<S> {
    /// `path` is the top page's location path.
    pub fn new(path: &str, sink: S) -> Self {
        Self {
            resort_id: resort_id_from_path(path),
            sink,
        }
    }

    /// Follow a top-level navigation.
    pub fn set_path(&mut self, path: &str) {
        self.resort_id = resort_id_from_path(path);
    }

    /// Complete a report with the top frame's resort identifier and emit it.
    pub fn receive(&mut self, message: Message) {
        match message {
            Message::DatesFound(mut report) => {
                if report.resort_id.is_none() {
                    report.resort_id = self.resort_id.clone();
                }
                self.sink.emit(&report);
            }
        }
    }

    /// Receive until every sender is gone, then hand back the sink.
    pub async fn run(mut self, mut inbox: UnboundedReceiver<Message>) -> S {
        while let Some(message) = inbox.recv().await {
            self.receive(message);
        }
        self.sink
    }
}
