use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::node::Node;

/// Default capacity of the event channel shared by a tree.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something the view layer should react to.
pub enum TreeEvent<C> {
    /// `None`: the whole tree may have changed. `Some(node)`: only that
    /// node's subtree (including its own presentation) changed.
    Changed(Option<Arc<Node<C>>>),
    /// A transient, user-visible error message.
    Error(String),
}

impl<C> Clone for TreeEvent<C> {
    fn clone(&self) -> Self {
        match self {
            TreeEvent::Changed(node) => TreeEvent::Changed(node.clone()),
            TreeEvent::Error(message) => TreeEvent::Error(message.clone()),
        }
    }
}

impl<C> fmt::Debug for TreeEvent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeEvent::Changed(None) => f.write_str("Changed(<tree>)"),
            TreeEvent::Changed(Some(node)) => write!(f, "Changed({})", node.id()),
            TreeEvent::Error(message) => f.debug_tuple("Error").field(message).finish(),
        }
    }
}

/// State shared by every node of one tree: the event channel and the fetch
/// context resolved by the most recent refresh.
pub struct TreeHandle<C> {
    inner: Arc<TreeShared<C>>,
}

struct TreeShared<C> {
    events: broadcast::Sender<TreeEvent<C>>,
    context: RwLock<Option<Arc<C>>>,
}

impl<C> TreeHandle<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(TreeShared {
                events,
                context: RwLock::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent<C>> {
        self.inner.events.subscribe()
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn publish(&self, event: TreeEvent<C>) {
        if self.inner.events.send(event).is_err() {
            tracing::trace!("Tree event dropped, no subscribers");
        }
    }

    pub fn node_changed(&self, node: &Arc<Node<C>>) {
        self.publish(TreeEvent::Changed(Some(Arc::clone(node))));
    }

    pub fn tree_changed(&self) {
        self.publish(TreeEvent::Changed(None));
    }

    pub fn show_error(&self, message: impl Into<String>) {
        self.publish(TreeEvent::Error(message.into()));
    }

    /// The context fetch cycles started from now on will use.
    pub fn context(&self) -> Option<Arc<C>> {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_context(&self, context: Option<Arc<C>>) {
        *self
            .inner
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = context;
    }
}

impl<C> Clone for TreeHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for TreeHandle<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for TreeHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeHandle")
            .field("subscribers", &self.inner.events.receiver_count())
            .field("configured", &self.context().is_some())
            .finish()
    }
}
