//! Plain-text rendering of a tree.
//!
//! Loading and printing are separate: [`load`] walks the tree asynchronously
//! so every node down to the requested depth is fetched, [`settle`] waits for
//! the follow-up events to die down, and [`render`] prints whatever is cached.

use std::sync::Arc;
use std::time::Duration;

use ojd_tree::Node;
use ojd_tree::TreeEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;

const INDENT: &str = "  ";

/// Make sure every node above `depth` has been loaded, one level at a time.
/// Nodes of the same level load concurrently.
pub async fn load<C>(roots: &[Arc<Node<C>>], depth: usize)
where
    C: Send + Sync + 'static,
{
    let mut level = roots.to_vec();

    for _ in 0..depth {
        if level.is_empty() {
            break;
        }

        let mut loads = JoinSet::new();
        for node in level {
            loads.spawn(async move { node.get_children().await });
        }

        let mut next = Vec::new();
        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok(children) => next.extend(children.iter().cloned()),
                Err(error) => tracing::warn!(%error, "Loading children panicked"),
            }
        }
        level = next;
    }
}

/// Consume tree events until none arrives for `quiet`, returning the error
/// messages seen on the way.
pub async fn settle<C>(
    events: &mut broadcast::Receiver<TreeEvent<C>>,
    quiet: Duration,
) -> Vec<String> {
    let mut errors = Vec::new();

    loop {
        match tokio::time::timeout(quiet, events.recv()).await {
            Ok(Ok(TreeEvent::Error(message))) => errors.push(message),
            Ok(Ok(TreeEvent::Changed(_))) => {}
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::debug!(skipped, "Tree events lagged, treating as a full change");
            }
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }

    errors
}

/// One line per node, children indented below their parent, nothing below
/// `depth`.
pub fn render<C>(roots: &[Arc<Node<C>>], depth: usize) -> String {
    let mut lines = Vec::new();
    for root in roots {
        render_node(root, 0, depth, &mut lines);
    }
    lines.join("\n")
}

fn render_node<C>(node: &Node<C>, level: usize, depth: usize, lines: &mut Vec<String>) {
    let presentation = node.presentation();
    let indent = INDENT.repeat(level);
    let line = match presentation.description {
        Some(description) => format!("{indent}{} ({description})", presentation.label),
        None => format!("{indent}{}", presentation.label),
    };
    lines.push(line);

    if level < depth {
        for child in node.cached_children().iter() {
            render_node(child, level + 1, depth, lines);
        }
    }
}
