//! Capability interface to the host page.
//!
//! The engine never touches a real document directly. A host implements
//! [`PageHost`] for queries and observer registration, and [`PickerElement`]
//! for reads on the located widget. Observers report back through
//! [`PageSignal`]s tagged with the [`SubscriptionId`] that produced them.

use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::value::RawValue;

// ── Element reads ───────────────────────────────────────────────────────────

/// The kind of an `<input>` inside the encapsulated subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Hidden,
    #[default]
    Text,
    #[serde(other)]
    Other,
}

/// One input element found inside an encapsulated subtree, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct InputField {
    pub kind: InputKind,
    pub name: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub value: String,
}

impl InputField {
    pub fn hidden(name: &str, value: &str) -> Self {
        Self {
            kind: InputKind::Hidden,
            name: Some(name.to_string()),
            value: value.to_string(),
            ..Default::default()
        }
    }

    pub fn text(name: Option<&str>, placeholder: Option<&str>, value: &str) -> Self {
        Self {
            kind: InputKind::Text,
            name: name.map(str::to_string),
            placeholder: placeholder.map(str::to_string),
            value: value.to_string(),
            ..Default::default()
        }
    }
}

/// Read access to a located picker element.
pub trait PickerElement {
    /// A host attribute, `None` when unset.
    fn attribute(&self, name: &str) -> Option<String>;

    /// A script-visible property, [`RawValue::Null`] when missing.
    fn property(&self, name: &str) -> RawValue;

    /// Inputs of the attached encapsulated subtree, or `None` when the
    /// element has no subtree.
    fn encapsulated_inputs(&self) -> Option<Vec<InputField>>;
}

// ── Subscriptions ───────────────────────────────────────────────────────────

/// Identifies one live [`WatchSubscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What a subscription observes.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchTarget<E> {
    /// The whole document subtree.
    Document,
    /// The browsing context (history and lifecycle events).
    Window,
    /// The picker element itself.
    Element(E),
    /// The picker's encapsulated subtree.
    Encapsulated(E),
}

/// Which signal a subscription raises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// Attribute changes, limited to the listed names.
    AttributeMutation { names: Vec<String> },
    /// Child-list changes anywhere below the target.
    SubtreeMutation,
    /// `input` events.
    Input,
    /// `change` events.
    Change,
    /// History pop.
    PopState,
    /// Fragment change.
    HashChange,
    /// The context is going away.
    Unload,
}

/// A live observer registration owned by the resync controller.
///
/// The host keeps a clone so it can raise signals through `callback`; the
/// controller alone decides when the registration ends.
#[derive(Debug, Clone)]
pub struct WatchSubscription<E> {
    pub id: SubscriptionId,
    pub target: WatchTarget<E>,
    pub trigger: TriggerKind,
    pub callback: UnboundedSender<PageSignal>,
}

impl<E> WatchSubscription<E> {
    /// Deliver a signal for this subscription. Returns `false` once the
    /// controller is gone.
    pub fn fire(&self, kind: SignalKind) -> bool {
        self.callback
            .send(PageSignal {
                subscription: self.id,
                kind,
            })
            .is_ok()
    }
}

// ── Signals ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    AttributeMutated { name: String },
    SubtreeMutated,
    Input,
    Change,
    PopState,
    HashChange,
    Unload,
}

/// One observer notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSignal {
    pub subscription: SubscriptionId,
    pub kind: SignalKind,
}

// ── Host ────────────────────────────────────────────────────────────────────

/// The page the engine runs against.
pub trait PageHost {
    type Element: PickerElement + Clone + PartialEq + fmt::Debug;

    /// First element with the given tag name, in document order.
    fn query_tag(&self, tag: &str) -> Option<Self::Element>;

    /// Whether the element is still connected to the document.
    fn is_attached(&self, element: &Self::Element) -> bool;

    /// The current location path, e.g. `/resorts/grand-floridian/rates-rooms`.
    fn pathname(&self) -> String;

    /// Start delivering signals for a subscription.
    fn install(&self, subscription: &WatchSubscription<Self::Element>);

    /// Stop delivering signals for a subscription.
    fn release(&self, id: SubscriptionId);
}

// ── Inbox ───────────────────────────────────────────────────────────────────

/// The controller's receiving end for page signals.
///
/// Signals that a waiter does not consume are pushed back with
/// [`SignalInbox::defer`] and come out again, in arrival order, before any
/// newer signal.
#[derive(Debug)]
pub struct SignalInbox {
    rx: UnboundedReceiver<PageSignal>,
    deferred: VecDeque<PageSignal>,
}

impl SignalInbox {
    pub fn new(rx: UnboundedReceiver<PageSignal>) -> Self {
        Self {
            rx,
            deferred: VecDeque::new(),
        }
    }

    /// Next signal, deferred ones first. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<PageSignal> {
        if let Some(signal) = self.deferred.pop_front() {
            return Some(signal);
        }
        self.rx.recv().await
    }

    /// Next signal that has already arrived, without waiting.
    pub fn try_recv(&mut self) -> Option<PageSignal> {
        if let Some(signal) = self.deferred.pop_front() {
            return Some(signal);
        }
        self.rx.try_recv().ok()
    }

    /// Receive straight from the channel, skipping the deferred queue.
    pub(crate) async fn recv_fresh(&mut self) -> Option<PageSignal> {
        self.rx.recv().await
    }

    pub fn defer(&mut self, signal: PageSignal) {
        self.deferred.push_back(signal);
    }

    pub fn has_deferred(&self, pred: impl Fn(&PageSignal) -> bool) -> bool {
        self.deferred.iter().any(pred)
    }

    /// Remove every deferred signal matching `pred`, returning how many.
    pub fn take_deferred(&mut self, pred: impl Fn(&PageSignal) -> bool) -> usize {
        let before = self.deferred.len();
        self.deferred.retain(|s| !pred(s));
        before - self.deferred.len()
    }
}
