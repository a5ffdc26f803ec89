use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::sync::broadcast;
use tracing::instrument;

use crate::events::TreeEvent;
use crate::events::TreeHandle;
use crate::node::Children;
use crate::node::Node;

/// The collaborator that knows what a concrete tree looks like.
pub trait TreeSource: Send + Sync + 'static {
    /// Per-refresh state handed to every fetch (credentials, HTTP client, ...).
    type Context: Send + Sync + 'static;

    /// Whether the configuration needed to query the remote side is present.
    fn verify_settings(&self) -> bool;

    /// Resolve the context fetches should use from now on. Only called after
    /// [`verify_settings`](TreeSource::verify_settings) returned true.
    fn context(&self) -> Self::Context;

    /// Build the root nodes of a fresh tree.
    fn setup_tree(&self, tree: &TreeHandle<Self::Context>) -> Vec<Arc<Node<Self::Context>>>;
}

/// Owner of a tree's root nodes and of its rebuild policy.
///
/// Roots are refreshed in place; they are only thrown away and rebuilt when
/// the configuration became invalid or a forced reload is requested.
pub struct TreeCache<S: TreeSource> {
    source: S,
    tree: TreeHandle<S::Context>,
    roots: Mutex<Children<S::Context>>,
}

impl<S: TreeSource> TreeCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_handle(source, TreeHandle::new())
    }

    /// Like [`TreeCache::new`], with a caller-provided handle (e.g. a custom
    /// event channel capacity).
    pub fn with_handle(source: S, tree: TreeHandle<S::Context>) -> Self {
        let cache = Self {
            source,
            tree,
            roots: Mutex::new(Arc::from(Vec::new())),
        };

        // An empty root set is what makes the view show its onboarding state.
        if cache.source.verify_settings() {
            cache.tree.set_context(Some(Arc::new(cache.source.context())));
            *cache.lock_roots() = cache.source.setup_tree(&cache.tree).into();
        }

        cache
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn handle(&self) -> &TreeHandle<S::Context> {
        &self.tree
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent<S::Context>> {
        self.tree.subscribe()
    }

    /// The current root nodes, possibly none.
    #[must_use]
    pub fn roots(&self) -> Children<S::Context> {
        Arc::clone(&*self.lock_roots())
    }

    /// Children of `node`, or the roots when no node is given.
    pub async fn get_children(&self, node: Option<&Arc<Node<S::Context>>>) -> Children<S::Context> {
        match node {
            None => self.roots(),
            Some(node) => node.get_children().await,
        }
    }

    /// Bring the whole tree up to date.
    ///
    /// Invalid configuration empties the tree. Otherwise a fresh context is
    /// resolved, the roots are rebuilt if `force_reload` is set (or there are
    /// none yet), and every root reloads in the background.
    #[instrument(skip(self))]
    pub fn refresh(&self, force_reload: bool) {
        if !self.source.verify_settings() {
            tracing::info!("Configuration incomplete, clearing tree");
            self.tree.set_context(None);
            *self.lock_roots() = Arc::from(Vec::new());
            self.tree.tree_changed();
            return;
        }

        self.tree.set_context(Some(Arc::new(self.source.context())));

        let roots = {
            let mut roots = self.lock_roots();
            if force_reload {
                *roots = Arc::from(Vec::new());
            }
            if roots.is_empty() {
                tracing::info!(force_reload, "Building tree");
                *roots = self.source.setup_tree(&self.tree).into();
            }
            Arc::clone(&*roots)
        };

        for root in roots.iter() {
            root.reload(true);
        }
        self.tree.tree_changed();
    }

    fn lock_roots(&self) -> MutexGuard<'_, Children<S::Context>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: TreeSource + std::fmt::Debug> std::fmt::Debug for TreeCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeCache")
            .field("source", &self.source)
            .field("roots", &self.lock_roots().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::error::FetchError;
    use crate::node::Fetched;
    use crate::node::Leaf;
    use crate::node::NodeKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Ctx {
        generation: usize,
    }

    struct Listing(Vec<&'static str>);

    #[async_trait]
    impl NodeKind<Ctx> for Listing {
        async fn fetch_children(
            &self,
            node: &Arc<Node<Ctx>>,
            _context: &Ctx,
        ) -> Result<Fetched<Ctx>, FetchError> {
            Ok(self
                .0
                .iter()
                .map(|key| Node::builder(*key, *key).build(Leaf, node.tree()))
                .collect::<Vec<_>>()
                .into())
        }
    }

    #[derive(Debug, Default)]
    struct Source {
        valid: AtomicBool,
        builds: AtomicUsize,
        contexts: AtomicUsize,
    }

    impl TreeSource for Arc<Source> {
        type Context = Ctx;

        fn verify_settings(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        fn context(&self) -> Ctx {
            Ctx {
                generation: self.contexts.fetch_add(1, Ordering::SeqCst) + 1,
            }
        }

        fn setup_tree(&self, tree: &TreeHandle<Ctx>) -> Vec<Arc<Node<Ctx>>> {
            let build = self.builds.fetch_add(1, Ordering::SeqCst);
            vec![
                Node::builder(format!("root-{build}"), "Root")
                    .eager(true)
                    .build(Listing(vec!["n1", "n2"]), tree),
            ]
        }
    }

    fn source(valid: bool) -> Arc<Source> {
        let source = Arc::new(Source::default());
        source.valid.store(valid, Ordering::SeqCst);
        source
    }

    #[tokio::test]
    async fn test_invalid_configuration_starts_empty() {
        let cache = TreeCache::new(source(false));
        assert!(cache.roots().is_empty());
        assert!(cache.get_children(None).await.is_empty());
        assert!(cache.handle().context().is_none());
    }

    #[tokio::test]
    async fn test_valid_configuration_builds_immediately() {
        let cache = TreeCache::new(source(true));
        assert_eq!(cache.roots().len(), 1);
        assert_eq!(cache.handle().context().unwrap().generation, 1);
    }

    #[tokio::test]
    async fn test_refresh_after_becoming_valid() {
        let source = source(false);
        let cache = TreeCache::new(Arc::clone(&source));
        let mut events = cache.subscribe();

        source.valid.store(true, Ordering::SeqCst);
        cache.refresh(false);

        let roots = cache.roots();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_updating());

        let children = cache.get_children(Some(&roots[0])).await;
        let ids: Vec<&str> = children.iter().map(|c| c.id().as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);

        let first = events.recv().await.unwrap();
        assert!(matches!(first, TreeEvent::Changed(Some(ref node)) if Arc::ptr_eq(node, &roots[0])));
        assert!(matches!(events.recv().await.unwrap(), TreeEvent::Changed(None)));
    }

    #[tokio::test]
    async fn test_refresh_keeps_roots_without_force() {
        let cache = TreeCache::new(source(true));
        let before = cache.roots();

        cache.refresh(false);

        assert!(Arc::ptr_eq(&before, &cache.roots()));
        assert_eq!(cache.source().builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forced_refresh_discards_roots() {
        let cache = TreeCache::new(source(true));
        let before = cache.roots();
        let before_children = cache.get_children(Some(&before[0])).await;
        assert!(before_children.is_empty(), "eager root answers immediately");

        cache.refresh(true);
        let after = cache.roots();

        assert_eq!(after.len(), 1);
        assert!(!Arc::ptr_eq(&before[0], &after[0]));
        assert_eq!(after[0].id().as_str(), "root-1");
    }

    #[tokio::test]
    async fn test_refresh_resolves_context_once_per_call() {
        let cache = TreeCache::new(source(true));
        cache.refresh(false);
        cache.refresh(false);

        assert_eq!(cache.source().contexts.load(Ordering::SeqCst), 3);
        assert_eq!(cache.handle().context().unwrap().generation, 3);
    }

    #[tokio::test]
    async fn test_refresh_with_invalid_configuration_clears_tree() {
        let source = source(true);
        let cache = TreeCache::new(Arc::clone(&source));
        let mut events = cache.subscribe();

        source.valid.store(false, Ordering::SeqCst);
        cache.refresh(false);

        assert!(cache.roots().is_empty());
        assert!(cache.handle().context().is_none());
        assert!(matches!(events.recv().await.unwrap(), TreeEvent::Changed(None)));
    }
}
