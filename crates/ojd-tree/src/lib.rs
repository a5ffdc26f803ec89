//! Asynchronous, incrementally reconciled tree cache.
//!
//! Each [`Node`] lazily loads its children from a remote source, keeps the
//! last good result, and merges later loads into it by stable id so that
//! unchanged children keep their identity (and their own cached subtrees).
//! A [`TreeCache`] owns the root nodes and decides when the whole tree is
//! rebuilt versus refreshed in place. Views learn about changes through the
//! [`TreeEvent`] channel.

mod diff;
mod error;
mod events;
mod node;
mod root;

pub use crate::diff::reconcile;
pub use crate::diff::Keyed;
pub use crate::diff::Reconciled;
pub use crate::error::FetchError;
pub use crate::events::TreeEvent;
pub use crate::events::TreeHandle;
pub use crate::events::DEFAULT_EVENT_CAPACITY;
pub use crate::node::Children;
pub use crate::node::Collapsible;
pub use crate::node::Fetched;
pub use crate::node::Leaf;
pub use crate::node::Node;
pub use crate::node::NodeBuilder;
pub use crate::node::NodeId;
pub use crate::node::NodeKind;
pub use crate::node::Presentation;
pub use crate::node::DEFAULT_TIMEOUT;
pub use crate::root::TreeCache;
pub use crate::root::TreeSource;
