//! Key-based reconciliation of child sequences.
//!
//! A refresh produces a brand new list of children, but most of those children
//! usually already exist in the cached list: same issue, same pull request,
//! same notification. Replacing them wholesale would throw away whatever the
//! cached instances have accumulated (their own populated children, an
//! in-flight fetch) and make the view flicker. Instead the new list is merged
//! into the old one by stable key.
//!
//! Only membership is compared. An entry whose key is unchanged but whose
//! fields differ is treated as unchanged and keeps its old instance.

use std::hash::Hash;
use std::sync::Arc;

use rustc_hash::FxHashSet;

/// Something that carries a stable identity key.
pub trait Keyed {
    type Key: Eq + Hash + ?Sized;

    fn key(&self) -> &Self::Key;
}

impl<T: Keyed + ?Sized> Keyed for Arc<T> {
    type Key = T::Key;

    fn key(&self) -> &Self::Key {
        (**self).key()
    }
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled<T> {
    /// Key membership is identical; the caller keeps its existing sequence.
    Unchanged,
    /// Something was removed or added; this is the merged sequence.
    Changed(Vec<T>),
}

impl<T> Reconciled<T> {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Reconciled::Changed(_))
    }

    #[must_use]
    pub fn into_changed(self) -> Option<Vec<T>> {
        match self {
            Reconciled::Unchanged => None,
            Reconciled::Changed(merged) => Some(merged),
        }
    }
}

/// Merge `fresh` into `current` by key.
///
/// Entries of `current` whose key also appears in `fresh` are kept, in
/// `current` order and as the same instances. Entries of `fresh` whose key is
/// absent from `current` are appended in `fresh` order. When nothing was
/// dropped and nothing was appended the result is [`Reconciled::Unchanged`]
/// and `fresh` is discarded.
///
/// Reordering alone is not a change.
pub fn reconcile<T>(current: &[T], fresh: Vec<T>) -> Reconciled<T>
where
    T: Keyed + Clone,
{
    let current_keys: FxHashSet<&T::Key> = current.iter().map(Keyed::key).collect();

    let mut merged: Vec<T> = {
        let fresh_keys: FxHashSet<&T::Key> = fresh.iter().map(Keyed::key).collect();
        current
            .iter()
            .filter(|old| fresh_keys.contains(old.key()))
            .cloned()
            .collect()
    };
    let removed = merged.len() != current.len();
    let added = fresh.iter().any(|new| !current_keys.contains(new.key()));

    if !removed && !added {
        return Reconciled::Unchanged;
    }

    merged.extend(
        fresh
            .into_iter()
            .filter(|new| !current_keys.contains(new.key())),
    );

    Reconciled::Changed(merged)
}
