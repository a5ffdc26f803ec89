//! The GitHub and JBS trees.
//!
//! Each tracker is a [`TreeSource`](ojd_tree::TreeSource) whose node kinds
//! query the tracker's REST API through an [`ApiClient`]. Credentials and
//! endpoints are read from [`SharedSettings`] each time a tree is refreshed.

mod client;
mod date;
mod error;
pub mod github;
pub mod jbs;
mod text;

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use ojd_conf::Settings;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use ojd_tree::Node;
use ojd_tree::NodeBuilder;
use ojd_tree::NodeId;

pub use crate::client::http_client;
pub use crate::client::ApiClient;
pub use crate::client::Service;
pub use crate::client::USER_AGENT;
pub use crate::date::format_timestamp;
pub use crate::date::DateStyle;
pub use crate::error::RemoteError;
pub use crate::github::GithubContext;
pub use crate::github::GithubSource;
pub use crate::jbs::JbsContext;
pub use crate::jbs::JbsSource;

/// Settings shared between whoever reloads them and the tree sources.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings(Arc<RwLock<Settings>>);

impl SharedSettings {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn read<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        f(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, settings: Settings) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

/// Left as is inside a query value or path segment: the unreserved characters.
const URL_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a user-provided value before it goes into a URL.
fn encode(value: &str) -> String {
    utf8_percent_encode(value, URL_VALUE).to_string()
}

/// A childless node that opens `url` when activated.
fn leaf<C>(id: impl Into<NodeId>, label: impl Into<String>, url: &str) -> NodeBuilder<C> {
    Node::builder(id, label).url(url)
}

fn with_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaced_settings_are_seen_by_clones() {
        let shared = SharedSettings::default();
        let clone = shared.clone();

        let mut settings = Settings::default();
        settings.jbs.username = "duke".to_string();
        shared.replace(settings);

        assert_eq!(clone.read(|s| s.jbs.username.clone()), "duke");
    }

    #[test]
    fn test_encode_escapes_query_syntax() {
        assert_eq!(encode("core-libs"), "core-libs");
        assert_eq!(encode("jdk21u"), "jdk21u");
        assert_eq!(encode("a&b c#d"), "a%26b%20c%23d");
        assert_eq!(encode("12345+x=y"), "12345%2Bx%3Dy");
    }

    #[test]
    fn test_with_trailing_slash() {
        assert_eq!(with_trailing_slash("http://x/api"), "http://x/api/");
        assert_eq!(with_trailing_slash("http://x/api/"), "http://x/api/");
    }
}
