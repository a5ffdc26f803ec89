//! The reconciling node.
//!
//! A [`Node`] lazily loads its children from a remote source through its
//! [`NodeKind`], caches them, and merges every later load into the cache with
//! [`reconcile`](crate::diff::reconcile). At most one fetch cycle runs per node
//! at any time; readers that need fresh data wait on the completion broadcast
//! of that single cycle instead of starting their own.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument;

use crate::diff::reconcile;
use crate::diff::Keyed;
use crate::diff::Reconciled;
use crate::error::FetchError;
use crate::events::TreeHandle;

/// Timeout applied to a fetch when the node does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// A node's ordered children. Replaced wholesale, never edited in place, so
/// pointer equality tells whether a refresh changed anything.
pub type Children<C> = Arc<[Arc<Node<C>>]>;

/// Stable identity of a node among its siblings across refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Collapsible {
    #[default]
    None,
    Collapsed,
    Expanded,
}

/// What the view shows for a node. Node kinds may rewrite it after a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    pub label: String,
    pub description: Option<String>,
    pub tooltip: Option<String>,
    /// Opened when the user activates the node.
    pub url: Option<String>,
    pub collapsible: Collapsible,
}

impl Presentation {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

/// What one fetch produced.
///
/// Besides the candidate children a fetch may carry new labels for nodes it
/// learned something about. They are applied only by the cycle that accepts
/// the result; a fetch that lost the race against its timeout changes nothing.
pub struct Fetched<C> {
    children: Vec<Arc<Node<C>>>,
    relabels: Vec<(Arc<Node<C>>, String)>,
}

impl<C> Fetched<C> {
    pub fn new(children: Vec<Arc<Node<C>>>) -> Self {
        Self {
            children,
            relabels: Vec::new(),
        }
    }

    /// Set `node`'s label once this result is accepted.
    #[must_use]
    pub fn relabel(mut self, node: &Arc<Node<C>>, label: impl Into<String>) -> Self {
        self.relabels.push((Arc::clone(node), label.into()));
        self
    }
}

impl<C> From<Vec<Arc<Node<C>>>> for Fetched<C> {
    fn from(children: Vec<Arc<Node<C>>>) -> Self {
        Self::new(children)
    }
}

/// The per-variant behaviour of a node.
#[async_trait]
pub trait NodeKind<C>: Send + Sync + 'static {
    /// Load the node's current children from the remote source.
    ///
    /// The returned nodes are candidates: children whose id is already cached
    /// are discarded in favour of the cached instance.
    async fn fetch_children(
        &self,
        node: &Arc<Node<C>>,
        context: &C,
    ) -> Result<Fetched<C>, FetchError>;

    /// Adjust the node's own presentation once a fetch cycle has finished,
    /// successfully or not. `children` is the cache after the cycle.
    fn after_fetch(&self, presentation: &mut Presentation, children: &[Arc<Node<C>>]) {
        let _ = (presentation, children);
    }
}

/// A node kind that never has children.
#[derive(Debug, Clone, Copy, Default)]
pub struct Leaf;

#[async_trait]
impl<C> NodeKind<C> for Leaf
where
    C: Send + Sync + 'static,
{
    async fn fetch_children(
        &self,
        _node: &Arc<Node<C>>,
        _context: &C,
    ) -> Result<Fetched<C>, FetchError> {
        Ok(Fetched::new(Vec::new()))
    }
}

/// Who started the cycle that is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOrigin {
    /// First read of an eager node; readers do not wait for it.
    EagerRead,
    /// First read of a non-eager node, or an explicit reload; readers wait.
    Blocking,
}

struct NodeState<C> {
    presentation: Presentation,
    children: Children<C>,
    populated: bool,
    in_flight: Option<CycleOrigin>,
    cycles: u64,
}

pub struct Node<C> {
    id: NodeId,
    eager_expand: bool,
    timeout: Duration,
    kind: Box<dyn NodeKind<C>>,
    tree: TreeHandle<C>,
    state: Mutex<NodeState<C>>,
    /// Bumped once per completed cycle; waiters subscribe before releasing
    /// the state lock so no completion can slip past them.
    completed: watch::Sender<u64>,
}

impl<C> Node<C> {
    pub fn builder(id: impl Into<NodeId>, label: impl Into<String>) -> NodeBuilder<C> {
        NodeBuilder {
            id: id.into(),
            presentation: Presentation::new(label),
            eager_expand: false,
            timeout: DEFAULT_TIMEOUT,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn eager_expand(&self) -> bool {
        self.eager_expand
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The tree this node publishes its events to.
    #[must_use]
    pub fn tree(&self) -> &TreeHandle<C> {
        &self.tree
    }

    /// Whether any fetch cycle has ever completed.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.lock().populated
    }

    /// Whether a fetch cycle is in flight.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    #[must_use]
    pub fn presentation(&self) -> Presentation {
        self.lock().presentation.clone()
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.lock().presentation.label.clone()
    }

    #[must_use]
    pub fn description(&self) -> Option<String> {
        self.lock().presentation.description.clone()
    }

    /// The cached children, without triggering or waiting for a fetch.
    #[must_use]
    pub fn cached_children(&self) -> Children<C> {
        Arc::clone(&self.lock().children)
    }

    fn lock(&self) -> MutexGuard<'_, NodeState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> Node<C>
where
    C: Send + Sync + 'static,
{
    /// Return the node's children.
    ///
    /// A node that was never populated starts its first fetch here. Eager
    /// nodes answer with the (empty) cache right away and announce the result
    /// later through a change event; other nodes wait for that first fetch.
    /// While a reload is in flight every reader waits for it to finish.
    pub async fn get_children(self: &Arc<Self>) -> Children<C> {
        let waiter = {
            let mut state = self.lock();
            if !state.populated && state.in_flight.is_none() {
                let origin = if self.eager_expand {
                    CycleOrigin::EagerRead
                } else {
                    CycleOrigin::Blocking
                };
                self.start_cycle(&mut state, origin);
            }
            let in_flight = state.in_flight;
            match in_flight {
                Some(CycleOrigin::Blocking) => Some(self.completed.subscribe()),
                Some(CycleOrigin::EagerRead) | None => None,
            }
        };

        if let Some(mut waiter) = waiter {
            // The sender lives as long as `self`, so this only fails if the
            // node is being torn down; the cache is still the right answer.
            let _ = waiter.changed().await;
        }

        self.cached_children()
    }

    /// Refresh the node in the background.
    ///
    /// With `user_initiated` a change event is published immediately so the
    /// view can show the node as busy. If a cycle is already in flight it
    /// serves this request too and no second fetch is started.
    pub fn reload(self: &Arc<Self>, user_initiated: bool) {
        {
            let mut state = self.lock();
            match state.in_flight {
                None => self.start_cycle(&mut state, CycleOrigin::Blocking),
                Some(CycleOrigin::EagerRead) => {
                    tracing::debug!(node = %self.id, "Reload joins the in-flight eager fetch");
                    state.in_flight = Some(CycleOrigin::Blocking);
                }
                Some(CycleOrigin::Blocking) => {
                    tracing::debug!(node = %self.id, "Reload skipped, fetch already in flight");
                }
            }
        }

        if user_initiated {
            self.tree.node_changed(self);
        }
    }

    fn start_cycle(self: &Arc<Self>, state: &mut NodeState<C>, origin: CycleOrigin) {
        state.in_flight = Some(origin);
        state.cycles += 1;
        let cycle = state.cycles;

        tracing::debug!(node = %self.id, cycle, ?origin, "Starting fetch cycle");
        tokio::spawn(Arc::clone(self).run_cycle(cycle).in_current_span());
    }

    async fn run_cycle(self: Arc<Self>, cycle: u64) {
        let (outcome, relabels) = match self.fetch_with_timeout().await {
            Ok(fetched) => (Ok(fetched.children), fetched.relabels),
            Err(error) => (Err(error), Vec::new()),
        };

        let (first_population, failure) = {
            let mut state = self.lock();
            let failure = match outcome {
                Ok(fresh) => {
                    let reconciled = reconcile(&state.children[..], fresh);
                    if let Reconciled::Changed(merged) = reconciled {
                        state.children = merged.into();
                    }
                    None
                }
                Err(error) => Some(error),
            };
            let first_population = !state.populated;
            state.populated = true;
            state.in_flight = None;
            (first_population, failure)
        };

        if let Some(error) = failure {
            tracing::warn!(node = %self.id, cycle, %error, "Fetch cycle failed");
            self.tree
                .show_error(format!("Error refreshing '{}': {error}", self.label()));
        } else {
            tracing::debug!(node = %self.id, cycle, "Fetch cycle completed");
        }

        for (node, label) in relabels {
            node.lock().presentation.label = label;
        }

        self.completed.send_modify(|completed| *completed += 1);

        {
            let mut state = self.lock();
            let children = Arc::clone(&state.children);
            self.kind.after_fetch(&mut state.presentation, &children);
        }

        // The reader that triggered a first non-eager load receives the
        // children directly; an event on top of that would render twice.
        if self.eager_expand || !first_population {
            self.tree.node_changed(&self);
        }
    }

    /// Race the node kind's fetch against the node's timeout.
    ///
    /// The fetch runs as its own task. When the timer wins, that task is left
    /// running and its result is dropped with the join handle.
    async fn fetch_with_timeout(self: &Arc<Self>) -> Result<Fetched<C>, FetchError> {
        let Some(context) = self.tree.context() else {
            return Err(FetchError::NotConfigured);
        };

        let node = Arc::clone(self);
        let started = Instant::now();
        let task = tokio::spawn(
            async move { node.kind.fetch_children(&node, &context).await }.in_current_span(),
        );

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(FetchError::Aborted(join_error.to_string())),
            Err(_) => Err(FetchError::Timeout {
                elapsed: started.elapsed(),
            }),
        }
    }
}

impl<C> Keyed for Node<C> {
    type Key = str;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl<C> fmt::Debug for Node<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &state.presentation.label)
            .field("populated", &state.populated)
            .field("updating", &state.in_flight.is_some())
            .field("children", &state.children.len())
            .finish_non_exhaustive()
    }
}

pub struct NodeBuilder<C> {
    id: NodeId,
    presentation: Presentation,
    eager_expand: bool,
    timeout: Duration,
    children: Vec<Arc<Node<C>>>,
}

impl<C> NodeBuilder<C> {
    /// Show the cached (possibly empty) children on first read instead of
    /// waiting for the first fetch.
    #[must_use]
    pub fn eager(mut self, eager_expand: bool) -> Self {
        self.eager_expand = eager_expand;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.presentation.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.presentation.tooltip = Some(tooltip.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.presentation.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn collapsible(mut self, collapsible: Collapsible) -> Self {
        self.presentation.collapsible = collapsible;
        self
    }

    /// Seed the cache. The node still counts as unpopulated until its first
    /// fetch completes.
    #[must_use]
    pub fn children(mut self, children: Vec<Arc<Node<C>>>) -> Self {
        self.children = children;
        self
    }

    pub fn build(self, kind: impl NodeKind<C>, tree: &TreeHandle<C>) -> Arc<Node<C>> {
        let (completed, _) = watch::channel(0);
        Arc::new(Node {
            id: self.id,
            eager_expand: self.eager_expand,
            timeout: self.timeout,
            kind: Box::new(kind),
            tree: tree.clone(),
            state: Mutex::new(NodeState {
                presentation: self.presentation,
                children: self.children.into(),
                populated: false,
                in_flight: None,
                cycles: 0,
            }),
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use tokio::sync::broadcast;
    use tokio::sync::oneshot;

    use super::*;
    use crate::events::TreeEvent;

    type Ctx = ();

    /// Serves scripted answers, one per fetch, and counts fetches.
    #[derive(Clone)]
    struct Scripted {
        calls: Arc<AtomicUsize>,
        answers: Arc<Mutex<Vec<Answer>>>,
    }

    enum Answer {
        Keys(Vec<&'static str>),
        Fail(&'static str),
        Hang,
        Gate(oneshot::Receiver<()>, Vec<&'static str>),
        /// Renames the node once the gate opens, if there is one.
        Rename(Option<oneshot::Receiver<()>>, &'static str),
    }

    impl Scripted {
        fn new(answers: Vec<Answer>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                answers: Arc::new(Mutex::new(answers.into_iter().rev().collect())),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeKind<Ctx> for Scripted {
        async fn fetch_children(
            &self,
            node: &Arc<Node<Ctx>>,
            _context: &Ctx,
        ) -> Result<Fetched<Ctx>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answers.lock().unwrap().pop().expect("unscripted fetch");
            let keys = match answer {
                Answer::Keys(keys) => keys,
                Answer::Fail(message) => {
                    return Err(FetchError::remote(std::io::Error::other(message)));
                }
                Answer::Hang => std::future::pending::<Vec<&'static str>>().await,
                Answer::Gate(gate, keys) => {
                    let _ = gate.await;
                    keys
                }
                Answer::Rename(gate, label) => {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    return Ok(Fetched::new(Vec::new()).relabel(node, label));
                }
            };
            Ok(keys
                .into_iter()
                .map(|key| Node::builder(key, key).build(Leaf, node.tree()))
                .collect::<Vec<_>>()
                .into())
        }

        fn after_fetch(&self, presentation: &mut Presentation, children: &[Arc<Node<Ctx>>]) {
            presentation.description = Some(format!("{} items", children.len()));
        }
    }

    fn configured_tree() -> TreeHandle<Ctx> {
        let tree = TreeHandle::new();
        tree.set_context(Some(Arc::new(())));
        tree
    }

    fn ids(children: &Children<Ctx>) -> Vec<&str> {
        children.iter().map(|child| child.id().as_str()).collect()
    }

    fn drain(events: &mut broadcast::Receiver<TreeEvent<Ctx>>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(format!("{event:?}"));
        }
        seen
    }

    async fn settle(node: &Arc<Node<Ctx>>) {
        while node.is_updating() {
            tokio::task::yield_now().await;
        }
        // Let the post-completion bookkeeping of the cycle task finish too.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_non_eager_first_read_waits_for_fetch() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![Answer::Keys(vec!["n1", "n2"])]);
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);

        let children = node.get_children().await;

        assert_eq!(ids(&children), vec!["n1", "n2"]);
        assert!(node.is_populated());
        assert_eq!(kind.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_reads_share_one_fetch() {
        let tree = configured_tree();
        let (release, gate) = oneshot::channel();
        let kind = Scripted::new(vec![Answer::Gate(gate, vec!["a", "b"])]);
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);

        let first = tokio::spawn({
            let node = Arc::clone(&node);
            async move { node.get_children().await }
        });
        let second = tokio::spawn({
            let node = Arc::clone(&node);
            async move { node.get_children().await }
        });
        tokio::task::yield_now().await;
        release.send(()).unwrap();

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        assert_eq!(kind.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ids(&first), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_eager_first_read_returns_immediately() {
        let tree = configured_tree();
        let mut events = tree.subscribe();
        let (release, gate) = oneshot::channel();
        let kind = Scripted::new(vec![Answer::Gate(gate, vec!["x"])]);
        let node = Node::builder("root", "Root").eager(true).build(kind.clone(), &tree);

        assert!(node.get_children().await.is_empty());
        assert!(node.get_children().await.is_empty());
        assert!(node.is_updating());

        release.send(()).unwrap();
        settle(&node).await;

        assert_eq!(kind.calls(), 1);
        assert_eq!(ids(&node.get_children().await), vec!["x"]);
        assert_eq!(drain(&mut events), vec!["Changed(root)"]);
    }

    #[tokio::test]
    async fn test_first_non_eager_population_emits_no_event() {
        let tree = configured_tree();
        let mut events = tree.subscribe();
        let kind = Scripted::new(vec![Answer::Keys(vec!["a"])]);
        let node = Node::builder("root", "Root").build(kind, &tree);

        node.get_children().await;
        settle(&node).await;

        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_populated_read_does_not_fetch() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![Answer::Keys(vec!["a"])]);
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);

        let first = node.get_children().await;
        settle(&node).await;
        let second = node.get_children().await;

        assert_eq!(kind.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_user_reload_signals_busy_then_done() {
        let tree = configured_tree();
        let mut events = tree.subscribe();
        let (release, gate) = oneshot::channel();
        let kind = Scripted::new(vec![
            Answer::Keys(vec!["a"]),
            Answer::Gate(gate, vec!["a", "b"]),
        ]);
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);
        node.get_children().await;
        settle(&node).await;

        node.reload(true);
        assert!(node.is_updating());
        assert_eq!(drain(&mut events), vec!["Changed(root)"]);

        let reader = tokio::spawn({
            let node = Arc::clone(&node);
            async move { node.get_children().await }
        });
        tokio::task::yield_now().await;
        assert!(!reader.is_finished());

        release.send(()).unwrap();
        let children = reader.await.unwrap();
        settle(&node).await;

        assert_eq!(ids(&children), vec!["a", "b"]);
        assert_eq!(drain(&mut events), vec!["Changed(root)"]);
        assert_eq!(node.description().as_deref(), Some("2 items"));
    }

    #[tokio::test]
    async fn test_reload_while_in_flight_does_not_fetch_again() {
        let tree = configured_tree();
        let (release, gate) = oneshot::channel();
        let kind = Scripted::new(vec![Answer::Gate(gate, vec!["a"])]);
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);

        node.reload(false);
        node.reload(false);
        node.reload(true);
        tokio::task::yield_now().await;
        release.send(()).unwrap();
        settle(&node).await;

        assert_eq!(kind.calls(), 1);
        assert_eq!(ids(&node.cached_children()), vec!["a"]);
    }

    #[tokio::test]
    async fn test_unchanged_refresh_keeps_sequence_instance() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![
            Answer::Keys(vec!["a", "b"]),
            Answer::Keys(vec!["b", "a"]),
        ]);
        let node = Node::builder("root", "Root").build(kind, &tree);

        let before = node.get_children().await;
        node.reload(false);
        let after = node.get_children().await;

        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_changed_refresh_keeps_surviving_instances() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![
            Answer::Keys(vec!["a", "b"]),
            Answer::Keys(vec!["b", "c"]),
        ]);
        let node = Node::builder("root", "Root").build(kind, &tree);

        let before = node.get_children().await;
        node.reload(false);
        let after = node.get_children().await;

        assert_eq!(ids(&after), vec!["b", "c"]);
        assert!(Arc::ptr_eq(&before[1], &after[0]));
    }

    #[tokio::test]
    async fn test_failure_preserves_children() {
        let tree = configured_tree();
        let mut events = tree.subscribe();
        let kind = Scripted::new(vec![Answer::Keys(vec!["x", "y"]), Answer::Fail("boom")]);
        let node = Node::builder("root", "Root").build(kind, &tree);

        let before = node.get_children().await;
        node.reload(false);
        let after = node.get_children().await;
        settle(&node).await;

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(ids(&after), vec!["x", "y"]);
        assert!(node.is_populated());
        assert!(drain(&mut events)
            .iter()
            .any(|event| event.contains("Error refreshing 'Root': boom")));
    }

    #[tokio::test]
    async fn test_failed_first_fetch_still_populates() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![Answer::Fail("down")]);
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);

        assert!(node.get_children().await.is_empty());
        assert!(node.is_populated());
        assert!(!node.is_updating());

        node.get_children().await;
        assert_eq!(kind.calls(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_tree_fails_the_cycle() {
        let tree: TreeHandle<Ctx> = TreeHandle::new();
        let mut events = tree.subscribe();
        let kind = Scripted::new(Vec::new());
        let node = Node::builder("root", "Root").build(kind.clone(), &tree);

        assert!(node.get_children().await.is_empty());
        assert_eq!(kind.calls(), 0);
        assert!(node.is_populated());
        assert!(drain(&mut events)
            .iter()
            .any(|event| event.contains("not been configured")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_at_configured_duration() {
        let tree = configured_tree();
        let mut events = tree.subscribe();
        let kind = Scripted::new(vec![Answer::Hang]);
        let node = Node::builder("root", "Root")
            .timeout(Duration::from_millis(500))
            .build(kind, &tree);

        let started = Instant::now();
        let children = node.get_children().await;
        let waited = started.elapsed();

        assert!(children.is_empty());
        assert!(waited >= Duration::from_millis(500), "waited {waited:?}");
        assert!(waited < Duration::from_millis(600), "waited {waited:?}");
        settle(&node).await;
        assert!(drain(&mut events)
            .iter()
            .any(|event| event.contains("Request timed out after 500 ms.")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_after_timeout_is_discarded() {
        let tree = configured_tree();
        let (release, gate) = oneshot::channel();
        let kind = Scripted::new(vec![
            Answer::Gate(gate, vec!["late"]),
            Answer::Keys(vec!["fresh"]),
        ]);
        let node = Node::builder("root", "Root")
            .timeout(Duration::from_millis(100))
            .build(kind.clone(), &tree);

        assert!(node.get_children().await.is_empty());

        node.reload(false);
        assert_eq!(ids(&node.get_children().await), vec!["fresh"]);

        // The timed-out fetch finishes now; nothing may change.
        release.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        settle(&node).await;

        assert_eq!(kind.calls(), 2);
        assert_eq!(ids(&node.cached_children()), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_relabel_applies_with_the_result() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![Answer::Rename(None, "Compiler regressions")]);
        let node = Node::builder("root", "Filter 42").build(kind, &tree);

        node.get_children().await;

        assert_eq!(node.label(), "Compiler regressions");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_relabel_after_timeout_is_discarded() {
        let tree = configured_tree();
        let (release, gate) = oneshot::channel();
        let kind = Scripted::new(vec![Answer::Rename(Some(gate), "Late")]);
        let node = Node::builder("root", "Root")
            .timeout(Duration::from_millis(100))
            .build(kind, &tree);

        node.get_children().await;
        settle(&node).await;
        assert_eq!(node.label(), "Root");

        release.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        settle(&node).await;

        assert_eq!(node.label(), "Root");
    }

    #[tokio::test]
    async fn test_after_fetch_runs_on_failure_too() {
        let tree = configured_tree();
        let kind = Scripted::new(vec![Answer::Fail("nope")]);
        let node = Node::builder("root", "Root")
            .description("...")
            .build(kind, &tree);

        node.get_children().await;
        settle(&node).await;

        assert_eq!(node.description().as_deref(), Some("0 items"));
    }

    #[tokio::test]
    async fn test_seeded_children_survive_matching_fetch() {
        let tree = configured_tree();
        let seeded = Node::builder("a", "A").build(Leaf, &tree);
        let kind = Scripted::new(vec![Answer::Keys(vec!["a"])]);
        let node = Node::builder("root", "Root")
            .children(vec![Arc::clone(&seeded)])
            .build(kind, &tree);

        let children = node.get_children().await;

        assert!(Arc::ptr_eq(&children[0], &seeded));
    }
}
