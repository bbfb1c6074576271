//! Deciding when to extract.
//!
//! The controller is a two-state machine. **Idle** means no picker is
//! tracked: it queries once, then waits (bounded) for one to appear.
//! **Active** means a picker is tracked and watched for attribute changes,
//! edits inside its encapsulated subtree, and removal from the document.
//! Navigation and unload watches belong to the whole session.
//!
//! Every trigger runs one full cycle: locate, extract, normalize, emit.
//! Triggers that pile up while a cycle runs are folded into a single
//! follow-up cycle. Reports are never compared with earlier ones.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info, trace};

use crate::config::ScoutConfig;
use crate::dom::{
    PageHost, PageSignal, PickerElement, SignalInbox, SignalKind, SubscriptionId, TriggerKind,
    WatchSubscription, WatchTarget,
};
use crate::error::Result;
use crate::format::Formatter;
use crate::locator::SourceLocator;
use crate::report::{DatesReport, ResultSink};
use crate::resort::resort_id_from_path;
use crate::strategy::ExtractionChain;

enum State<E> {
    Idle,
    Active { element: E, encapsulated: bool },
}

/// What a batch of signals asks for. Later variants subsume earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Action {
    Nothing,
    Cycle,
    Relocate,
    Stop,
}

/// Owns every watch subscription and the tracked picker for one page.
pub struct ResyncController<H: PageHost, S> {
    host: Arc<H>,
    locator: SourceLocator<H>,
    chain: ExtractionChain,
    formatter: Formatter,
    sink: S,
    date_attributes: Vec<String>,
    wait_timeout: Duration,
    state: State<H::Element>,
    session_watches: Vec<WatchSubscription<H::Element>>,
    watches: Vec<WatchSubscription<H::Element>>,
    tx: UnboundedSender<PageSignal>,
    inbox: SignalInbox,
    next_subscription: u64,
    last_path: Option<String>,
    resort_id: Option<String>,
    cycles: u64,
}

impl<H: PageHost, S: ResultSink> ResyncController<H, S> {
    /// Build a controller. Configuration defects surface here, never later.
    pub fn new(config: &ScoutConfig, host: Arc<H>, sink: S) -> Result<Self> {
        let chain = ExtractionChain::from_config(config)?;
        let (tx, rx) = unbounded_channel();
        Ok(Self {
            locator: SourceLocator::new(host.clone(), &config.picker_tag, config.recheck_interval()),
            host,
            chain,
            formatter: config.formatter(),
            sink,
            date_attributes: vec![config.from_attribute.clone(), config.to_attribute.clone()],
            wait_timeout: config.wait_timeout(),
            state: State::Idle,
            session_watches: Vec::new(),
            watches: Vec::new(),
            tx,
            inbox: SignalInbox::new(rx),
            next_subscription: 1,
            last_path: None,
            resort_id: None,
            cycles: 0,
        })
    }

    /// Run until the page unloads, then release every subscription and hand
    /// back the sink.
    pub async fn run(mut self) -> S {
        self.install_session_watches();
        self.refresh_resort_id();
        self.relocate().await;

        while let Some(signal) = self.inbox.recv().await {
            let mut action = self.dispatch(signal);
            while let Some(more) = self.inbox.try_recv() {
                action = action.max(self.dispatch(more));
            }
            match action {
                Action::Stop => break,
                Action::Relocate => self.relocate().await,
                Action::Cycle => {
                    if !self.run_cycle() {
                        self.relocate().await;
                    }
                }
                Action::Nothing => {}
            }
        }

        self.release_watches();
        for watch in self.session_watches.drain(..) {
            self.host.release(watch.id);
        }
        info!(cycles = self.cycles, "resync controller stopped");
        self.sink
    }

    // ── Signals ─────────────────────────────────────────────────────────────

    fn dispatch(&mut self, signal: PageSignal) -> Action {
        if !self.is_live(signal.subscription) {
            trace!(subscription = %signal.subscription, "dropping signal from released watch");
            return Action::Nothing;
        }
        match signal.kind {
            SignalKind::Unload => Action::Stop,
            SignalKind::PopState | SignalKind::HashChange => {
                self.refresh_resort_id();
                match self.state {
                    State::Idle => Action::Relocate,
                    State::Active { .. } => Action::Cycle,
                }
            }
            SignalKind::AttributeMutated { name } => {
                if self.date_attributes.contains(&name) {
                    Action::Cycle
                } else {
                    Action::Nothing
                }
            }
            SignalKind::Input | SignalKind::Change => Action::Cycle,
            SignalKind::SubtreeMutated => self.on_subtree_mutated(),
        }
    }

    fn on_subtree_mutated(&mut self) -> Action {
        let State::Active {
            element,
            encapsulated,
        } = &self.state
        else {
            return Action::Relocate;
        };
        if !self.host.is_attached(element) {
            info!(element = ?element, "picker detached");
            return Action::Relocate;
        }
        if !*encapsulated && element.encapsulated_inputs().is_some() {
            let element = element.clone();
            debug!(element = ?element, "encapsulated subtree attached");
            self.watch_encapsulated(&element);
            self.state = State::Active {
                element,
                encapsulated: true,
            };
            return Action::Cycle;
        }
        Action::Nothing
    }

    fn is_live(&self, id: SubscriptionId) -> bool {
        self.session_watches
            .iter()
            .chain(self.watches.iter())
            .any(|w| w.id == id)
    }

    // ── States ──────────────────────────────────────────────────────────────

    /// Enter Idle and look for a picker, waiting if needed. Ends Active on
    /// success; on expiry emits the empty report and stays Idle unwatched.
    async fn relocate(&mut self) {
        loop {
            self.release_watches();
            self.state = State::Idle;

            let found = match self.locator.find() {
                Some(element) => Some(element),
                None => self.wait_for_picker().await,
            };
            match found {
                Some(element) => {
                    if self.activate(element) {
                        return;
                    }
                    debug!("picker vanished while activating, looking again");
                }
                None if self.inbox.has_deferred(|s| s.kind == SignalKind::Unload) => return,
                None => {
                    info!(
                        tag = %self.locator.tag(),
                        timeout_ms = self.wait_timeout.as_millis() as u64,
                        "picker not found"
                    );
                    self.emit(DatesReport::empty(self.resort_id.clone()));
                    return;
                }
            }
        }
    }

    /// Bounded wait for a picker. Navigation seen during the wait is applied
    /// here, so whatever is emitted next carries the current resort.
    async fn wait_for_picker(&mut self) -> Option<H::Element> {
        self.subscribe(WatchTarget::Document, TriggerKind::SubtreeMutation);
        let found = self
            .locator
            .wait_until_present(self.wait_timeout, &mut self.inbox)
            .await;
        self.release_watches();

        let navigations = self
            .inbox
            .take_deferred(|s| matches!(s.kind, SignalKind::PopState | SignalKind::HashChange));
        if navigations > 0 {
            debug!(navigations, "navigated while waiting");
            self.refresh_resort_id();
        }
        found
    }

    /// Bind and run the first cycle. `false` when the picker is already gone.
    fn activate(&mut self, element: H::Element) -> bool {
        self.bind(element);
        self.run_cycle()
    }

    /// Track `element`, replacing any watches on a previous one.
    fn bind(&mut self, element: H::Element) {
        self.release_watches();
        info!(element = ?element, "tracking picker");

        self.subscribe(
            WatchTarget::Element(element.clone()),
            TriggerKind::AttributeMutation {
                names: self.date_attributes.clone(),
            },
        );
        self.subscribe(WatchTarget::Document, TriggerKind::SubtreeMutation);
        let encapsulated = element.encapsulated_inputs().is_some();
        if encapsulated {
            self.watch_encapsulated(&element);
        }
        self.state = State::Active {
            element,
            encapsulated,
        };
    }

    fn watch_encapsulated(&mut self, element: &H::Element) {
        self.subscribe(WatchTarget::Encapsulated(element.clone()), TriggerKind::Input);
        self.subscribe(WatchTarget::Encapsulated(element.clone()), TriggerKind::Change);
    }

    // ── Cycle ───────────────────────────────────────────────────────────────

    /// Locate, extract, normalize, emit. Returns `false` without emitting
    /// when no picker is present.
    fn run_cycle(&mut self) -> bool {
        let Some(element) = self.locator.find() else {
            return false;
        };
        let tracked = matches!(&self.state, State::Active { element: e, .. } if *e == element);
        if !tracked {
            debug!("picker replaced, rebinding");
            self.bind(element.clone());
        }

        let result = self.chain.extract(&element);
        let report = DatesReport::new(self.resort_id.clone(), &result, &self.formatter);
        self.emit(report);
        true
    }

    fn emit(&mut self, report: DatesReport) {
        self.cycles += 1;
        debug!(
            cycle = self.cycles,
            provenance = %report.provenance,
            "emitting report"
        );
        self.sink.emit(&report);
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    fn install_session_watches(&mut self) {
        for trigger in [TriggerKind::PopState, TriggerKind::HashChange, TriggerKind::Unload] {
            let watch = self.new_watch(WatchTarget::Window, trigger);
            self.host.install(&watch);
            self.session_watches.push(watch);
        }
    }

    fn subscribe(&mut self, target: WatchTarget<H::Element>, trigger: TriggerKind) {
        let watch = self.new_watch(target, trigger);
        trace!(subscription = %watch.id, trigger = ?watch.trigger, "installing watch");
        self.host.install(&watch);
        self.watches.push(watch);
    }

    fn new_watch(
        &mut self,
        target: WatchTarget<H::Element>,
        trigger: TriggerKind,
    ) -> WatchSubscription<H::Element> {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        WatchSubscription {
            id,
            target,
            trigger,
            callback: self.tx.clone(),
        }
    }

    fn release_watches(&mut self) {
        for watch in self.watches.drain(..) {
            trace!(subscription = %watch.id, "releasing watch");
            self.host.release(watch.id);
        }
    }

    fn refresh_resort_id(&mut self) {
        let path = self.host.pathname();
        if self.last_path.as_deref() == Some(path.as_str()) {
            return;
        }
        self.resort_id = resort_id_from_path(&path);
        debug!(path = %path, resort_id = ?self.resort_id, "resort identifier derived");
        self.last_path = Some(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::InputField;
    use crate::memory::{MemoryElement, MemoryPage, NavigationKind, RecordingSink};
    use crate::strategy::Provenance;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    const TAG: &str = "wdpr-range-datepicker";
    const PATH: &str = "/resorts/grand-floridian/rates-rooms";

    fn start(page: &Arc<MemoryPage>, sink: &RecordingSink) -> JoinHandle<RecordingSink> {
        let config = ScoutConfig {
            local_timezone: Some("America/New_York".to_string()),
            wait_timeout_ms: 10_000,
            ..ScoutConfig::default()
        };
        let controller = ResyncController::new(&config, page.clone(), sink.clone()).unwrap();
        tokio::spawn(controller.run())
    }

    /// A page whose picker goes missing for exactly one query.
    struct VanishingPage {
        inner: MemoryPage,
        queries: AtomicUsize,
        hide_on: usize,
    }

    impl PageHost for VanishingPage {
        type Element = MemoryElement;

        fn query_tag(&self, tag: &str) -> Option<MemoryElement> {
            let n = self.queries.fetch_add(1, Ordering::Relaxed) + 1;
            if n == self.hide_on {
                return None;
            }
            self.inner.query_tag(tag)
        }

        fn is_attached(&self, element: &MemoryElement) -> bool {
            self.inner.is_attached(element)
        }

        fn pathname(&self) -> String {
            self.inner.pathname()
        }

        fn install(&self, subscription: &WatchSubscription<MemoryElement>) {
            self.inner.install(subscription)
        }

        fn release(&self, id: SubscriptionId) {
            self.inner.release(id)
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_cycle_when_picker_present() {
        let page = Arc::new(MemoryPage::new(PATH));
        let picker = page.insert_picker(TAG);
        page.set_attribute(&picker, "date-from", "1718000000");
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;

        assert_eq!(sink.len(), 1);
        let report = sink.last().unwrap();
        assert_eq!(report.resort_id.as_deref(), Some("grand-floridian"));
        assert_eq!(report.provenance, Provenance::Attributes);

        page.unload();
        handle.await.unwrap();
        assert!(page.subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attribute_change_triggers_cycle() {
        let page = Arc::new(MemoryPage::new(PATH));
        let picker = page.insert_picker(TAG);
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;
        assert_eq!(sink.last().unwrap().provenance, Provenance::None);

        page.set_attribute(&picker, "date-to", "1718600000");
        settle().await;
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.last().unwrap().check_out.as_deref(),
            Some("2024-06-17T04:53:20.000Z")
        );

        page.set_attribute(&picker, "aria-expanded", "true");
        settle().await;
        assert_eq!(sink.len(), 2);

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_triggers_coalesces() {
        let page = Arc::new(MemoryPage::new(PATH));
        let picker = page.insert_picker(TAG);
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;
        assert_eq!(sink.len(), 1);

        page.set_attribute(&picker, "date-from", "1718000000");
        page.set_attribute(&picker, "date-to", "1718600000");
        page.set_attribute(&picker, "date-from", "1718100000");
        settle().await;

        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.last().unwrap().check_in.as_deref(),
            Some("2024-06-11T10:00:00.000Z")
        );
        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_picker_found_by_mutation() {
        let page = Arc::new(MemoryPage::new(PATH));
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;
        assert!(sink.is_empty());

        sleep(Duration::from_secs(3)).await;
        let picker = MemoryElement::new(TAG).with_property("startDate", "06/10/2024");
        page.insert(picker);
        settle().await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.last().unwrap().provenance, Provenance::Properties);
        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_returns_to_idle_and_releases_element_watches() {
        let page = Arc::new(MemoryPage::new(PATH));
        let picker = page.insert_picker(TAG);
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;
        assert_eq!(page.subscriptions_on(&picker), 1);

        page.remove(&picker);
        settle().await;
        assert_eq!(page.subscriptions_on(&picker), 0);

        let replacement = page.insert_picker(TAG);
        page.set_attribute(&replacement, "date-from", "1718000000");
        settle().await;
        assert_eq!(page.subscriptions_on(&replacement), 1);
        assert_eq!(sink.last().unwrap().provenance, Provenance::Attributes);

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_rederives_resort_and_reruns() {
        let page = Arc::new(MemoryPage::new(PATH));
        page.insert_picker(TAG);
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;

        page.navigate("/resorts/polynesian/rates-rooms", NavigationKind::PopState);
        settle().await;
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.last().unwrap().resort_id.as_deref(), Some("polynesian"));

        page.navigate("/dining", NavigationKind::HashChange);
        settle().await;
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.last().unwrap().resort_id, None);

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_encapsulated_edits_trigger_cycles() {
        let page = Arc::new(MemoryPage::new(PATH));
        let picker = page.insert_picker(TAG);
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        settle().await;
        assert_eq!(sink.len(), 1);

        page.attach_encapsulated(
            &picker,
            vec![
                InputField::text(None, Some("Check In"), ""),
                InputField::text(None, Some("Check Out"), ""),
            ],
        );
        settle().await;
        assert_eq!(sink.len(), 2);
        assert_eq!(page.subscriptions_on(&picker), 3);

        page.set_input_value(&picker, 0, "06/10/2024", true);
        settle().await;
        assert_eq!(sink.len(), 3);
        let report = sink.last().unwrap();
        assert_eq!(report.provenance, Provenance::Encapsulated);
        assert_eq!(report.check_in.as_deref(), Some("2024-06-10T04:00:00.000Z"));
        assert_eq!(report.check_out, None);

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_after_expiry_restarts_wait() {
        let page = Arc::new(MemoryPage::new(PATH));
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.last().unwrap().provenance, Provenance::None);
        assert_eq!(page.subscriptions().len(), 3);

        page.navigate("/resorts/contemporary/rates-rooms", NavigationKind::PopState);
        settle().await;
        page.insert_picker(TAG);
        settle().await;
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.last().unwrap().resort_id.as_deref(), Some("contemporary"));

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_during_wait_applies_to_first_report() {
        let page = Arc::new(MemoryPage::new(PATH));
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        sleep(Duration::from_secs(1)).await;

        page.navigate("/resorts/polynesian/rates-rooms", NavigationKind::PopState);
        settle().await;
        page.insert(MemoryElement::new(TAG).with_attribute("date-from", "1718000000"));
        settle().await;

        assert_eq!(sink.len(), 1);
        let report = sink.last().unwrap();
        assert_eq!(report.resort_id.as_deref(), Some("polynesian"));
        assert_eq!(report.provenance, Provenance::Attributes);

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_during_wait_applies_to_expiry_report() {
        let page = Arc::new(MemoryPage::new(PATH));
        let sink = RecordingSink::new();
        let handle = start(&page, &sink);
        sleep(Duration::from_secs(1)).await;

        page.navigate("/resorts/polynesian/rates-rooms", NavigationKind::HashChange);
        sleep(Duration::from_secs(25)).await;

        assert_eq!(sink.len(), 1);
        let report = sink.last().unwrap();
        assert_eq!(report.provenance, Provenance::None);
        assert_eq!(report.resort_id.as_deref(), Some("polynesian"));
        assert_eq!(page.subscriptions().len(), 3);

        page.unload();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_picker_vanishing_during_activation_is_located_again() {
        let inner = MemoryPage::new(PATH);
        let picker = MemoryElement::new(TAG).with_attribute("date-from", "1718000000");
        inner.insert(picker.clone());
        let page = Arc::new(VanishingPage {
            inner,
            queries: AtomicUsize::new(0),
            hide_on: 2,
        });
        let config = ScoutConfig {
            local_timezone: Some("America/New_York".to_string()),
            ..ScoutConfig::default()
        };
        let sink = RecordingSink::new();
        let controller = ResyncController::new(&config, page.clone(), sink.clone()).unwrap();
        let handle = tokio::spawn(controller.run());
        settle().await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.last().unwrap().provenance, Provenance::Attributes);
        assert_eq!(page.inner.subscriptions_on(&picker), 1);

        page.inner.unload();
        handle.await.unwrap();
        assert!(page.inner.subscriptions().is_empty());
    }

    #[test]
    fn test_signals_from_released_watches_are_dropped() {
        let page = Arc::new(MemoryPage::new(PATH));
        let first = page.insert_picker(TAG);
        let mut controller =
            ResyncController::new(&ScoutConfig::default(), page.clone(), RecordingSink::new())
                .unwrap();
        controller.bind(first.clone());
        let stale = controller.watches[0].id;

        page.remove(&first);
        let second = page.insert_picker(TAG);
        controller.bind(second);
        let live = controller.watches[0].id;

        let mutated = |subscription| PageSignal {
            subscription,
            kind: SignalKind::AttributeMutated {
                name: "date-from".to_string(),
            },
        };
        assert_ne!(stale, live);
        assert_eq!(controller.dispatch(mutated(stale)), Action::Nothing);
        assert_eq!(controller.dispatch(mutated(live)), Action::Cycle);
    }
}
