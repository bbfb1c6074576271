//! An in-memory page host.
//!
//! [`MemoryPage`] keeps a flat list of elements and the subscriptions the
//! controller installed. Its mutators raise the same signals a browser's
//! observers would: inserting or removing an element raises a subtree
//! mutation, an attribute write raises an attribute mutation for watchers of
//! that name, and so on. Property writes raise nothing, as on a real page.
//! The replay CLI and the test suites drive the controller through it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;

use crate::dom::{
    InputField, PageHost, PickerElement, SignalKind, SubscriptionId, TriggerKind,
    WatchSubscription, WatchTarget,
};
use crate::report::{DatesReport, ResultSink};
use crate::value::RawValue;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Element ─────────────────────────────────────────────────────────────────

struct ElementState {
    id: u64,
    tag: String,
    attributes: Mutex<BTreeMap<String, String>>,
    properties: Mutex<HashMap<String, RawValue>>,
    encapsulated: Mutex<Option<Vec<InputField>>>,
}

/// A shared handle to an in-memory element. Clones refer to the same node.
#[derive(Clone)]
pub struct MemoryElement(Arc<ElementState>);

impl MemoryElement {
    pub fn new(tag: &str) -> Self {
        Self(Arc::new(ElementState {
            id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed),
            tag: tag.to_string(),
            attributes: Mutex::new(BTreeMap::new()),
            properties: Mutex::new(HashMap::new()),
            encapsulated: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        lock(&self.0.attributes).insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_property(self, name: &str, value: impl Into<RawValue>) -> Self {
        lock(&self.0.properties).insert(name.to_string(), value.into());
        self
    }

    pub fn with_encapsulated(self, inputs: Vec<InputField>) -> Self {
        *lock(&self.0.encapsulated) = Some(inputs);
        self
    }

    /// Property writes are invisible to observers, so this needs no page.
    pub fn set_property(&self, name: &str, value: impl Into<RawValue>) {
        lock(&self.0.properties).insert(name.to_string(), value.into());
    }
}

impl PartialEq for MemoryElement {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for MemoryElement {}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.tag(), self.id())
    }
}

impl PickerElement for MemoryElement {
    fn attribute(&self, name: &str) -> Option<String> {
        lock(&self.0.attributes).get(name).cloned()
    }

    fn property(&self, name: &str) -> RawValue {
        lock(&self.0.properties).get(name).cloned().unwrap_or_default()
    }

    fn encapsulated_inputs(&self) -> Option<Vec<InputField>> {
        lock(&self.0.encapsulated).clone()
    }
}

// ── Page ────────────────────────────────────────────────────────────────────

/// Which history event a navigation raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    PopState,
    HashChange,
}

/// An in-memory document with observer emulation.
#[derive(Debug, Default)]
pub struct MemoryPage {
    path: Mutex<String>,
    elements: Mutex<Vec<MemoryElement>>,
    subscriptions: Mutex<Vec<WatchSubscription<MemoryElement>>>,
}

impl MemoryPage {
    pub fn new(path: &str) -> Self {
        Self {
            path: Mutex::new(path.to_string()),
            ..Default::default()
        }
    }

    /// Create and attach a picker, raising a subtree mutation.
    pub fn insert_picker(&self, tag: &str) -> MemoryElement {
        let element = MemoryElement::new(tag);
        self.insert(element.clone());
        element
    }

    /// Attach a prepared element, raising a subtree mutation.
    pub fn insert(&self, element: MemoryElement) {
        lock(&self.elements).push(element);
        self.fire_document(SignalKind::SubtreeMutated);
    }

    /// Attach a picker without raising anything, as if an observer missed it.
    pub fn insert_picker_silently(&self, tag: &str) -> MemoryElement {
        let element = MemoryElement::new(tag);
        lock(&self.elements).push(element.clone());
        element
    }

    /// Detach an element, raising a subtree mutation.
    pub fn remove(&self, element: &MemoryElement) {
        lock(&self.elements).retain(|e| e != element);
        self.fire_document(SignalKind::SubtreeMutated);
    }

    pub fn set_attribute(&self, element: &MemoryElement, name: &str, value: &str) {
        lock(&element.0.attributes).insert(name.to_string(), value.to_string());
        self.fire_attribute(element, name);
    }

    pub fn remove_attribute(&self, element: &MemoryElement, name: &str) {
        lock(&element.0.attributes).remove(name);
        self.fire_attribute(element, name);
    }

    /// Attach an encapsulated subtree to an element. Its children land in
    /// the document, so subtree watchers are told.
    pub fn attach_encapsulated(&self, element: &MemoryElement, inputs: Vec<InputField>) {
        *lock(&element.0.encapsulated) = Some(inputs);
        self.fire_document(SignalKind::SubtreeMutated);
    }

    /// Change one encapsulated input's value and dispatch `input`, then
    /// optionally `change`, on the subtree.
    pub fn set_input_value(&self, element: &MemoryElement, index: usize, value: &str, commit: bool) {
        let updated = lock(&element.0.encapsulated)
            .as_mut()
            .and_then(|inputs| inputs.get_mut(index))
            .map(|input| input.value = value.to_string())
            .is_some();
        if !updated {
            return;
        }
        self.fire_encapsulated(element, TriggerKind::Input, SignalKind::Input);
        if commit {
            self.fire_encapsulated(element, TriggerKind::Change, SignalKind::Change);
        }
    }

    pub fn navigate(&self, path: &str, kind: NavigationKind) {
        *lock(&self.path) = path.to_string();
        let (trigger, signal) = match kind {
            NavigationKind::PopState => (TriggerKind::PopState, SignalKind::PopState),
            NavigationKind::HashChange => (TriggerKind::HashChange, SignalKind::HashChange),
        };
        self.fire_matching(
            |s| s.target == WatchTarget::Window && s.trigger == trigger,
            signal,
        );
    }

    pub fn unload(&self) {
        self.fire_matching(
            |s| s.target == WatchTarget::Window && s.trigger == TriggerKind::Unload,
            SignalKind::Unload,
        );
    }

    /// Live subscriptions as `(id, trigger)`, in install order.
    pub fn subscriptions(&self) -> Vec<(SubscriptionId, TriggerKind)> {
        lock(&self.subscriptions)
            .iter()
            .map(|s| (s.id, s.trigger.clone()))
            .collect()
    }

    /// Number of live subscriptions targeting `element` or its subtree.
    pub fn subscriptions_on(&self, element: &MemoryElement) -> usize {
        lock(&self.subscriptions)
            .iter()
            .filter(|s| match &s.target {
                WatchTarget::Element(e) | WatchTarget::Encapsulated(e) => e == element,
                WatchTarget::Document | WatchTarget::Window => false,
            })
            .count()
    }

    fn fire_document(&self, signal: SignalKind) {
        self.fire_matching(
            |s| s.target == WatchTarget::Document && s.trigger == TriggerKind::SubtreeMutation,
            signal,
        );
    }

    fn fire_attribute(&self, element: &MemoryElement, name: &str) {
        self.fire_matching(
            |s| {
                s.target == WatchTarget::Element(element.clone())
                    && matches!(&s.trigger, TriggerKind::AttributeMutation { names } if names.iter().any(|n| n == name))
            },
            SignalKind::AttributeMutated {
                name: name.to_string(),
            },
        );
    }

    fn fire_encapsulated(&self, element: &MemoryElement, trigger: TriggerKind, signal: SignalKind) {
        self.fire_matching(
            |s| s.target == WatchTarget::Encapsulated(element.clone()) && s.trigger == trigger,
            signal,
        );
    }

    fn fire_matching(
        &self,
        pred: impl Fn(&WatchSubscription<MemoryElement>) -> bool,
        signal: SignalKind,
    ) {
        let targets: Vec<_> = lock(&self.subscriptions)
            .iter()
            .filter(|s| pred(s))
            .cloned()
            .collect();
        for subscription in targets {
            subscription.fire(signal.clone());
        }
    }
}

impl PageHost for MemoryPage {
    type Element = MemoryElement;

    fn query_tag(&self, tag: &str) -> Option<MemoryElement> {
        lock(&self.elements).iter().find(|e| e.tag() == tag).cloned()
    }

    fn is_attached(&self, element: &MemoryElement) -> bool {
        lock(&self.elements).contains(element)
    }

    fn pathname(&self) -> String {
        lock(&self.path).clone()
    }

    fn install(&self, subscription: &WatchSubscription<MemoryElement>) {
        lock(&self.subscriptions).push(subscription.clone());
    }

    fn release(&self, id: SubscriptionId) {
        lock(&self.subscriptions).retain(|s| s.id != id);
    }
}

// ── Sink ────────────────────────────────────────────────────────────────────

/// Collects reports for later inspection. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<DatesReport>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<DatesReport> {
        lock(&self.reports).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.reports).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<DatesReport> {
        lock(&self.reports).last().cloned()
    }
}

impl ResultSink for RecordingSink {
    fn emit(&mut self, report: &DatesReport) {
        lock(&self.reports).push(report.clone());
    }
}
