//! The JBS tree: the user's open issues and saved filters.

use std::sync::Arc;

use async_trait::async_trait;
use ojd_tree::Collapsible;
use ojd_tree::FetchError;
use ojd_tree::Fetched;
use ojd_tree::Leaf;
use ojd_tree::Node;
use ojd_tree::NodeKind;
use ojd_tree::Presentation;
use ojd_tree::TreeHandle;
use ojd_tree::TreeSource;
use serde::Deserialize;

use crate::client::ApiClient;
use crate::client::Service;
use crate::date::format_timestamp;
use crate::date::DateStyle;
use crate::encode;
use crate::leaf;
use crate::text::collapse_whitespace;
use crate::text::review_summary;
use crate::with_trailing_slash;
use crate::SharedSettings;

/// Remote links with this title point at a code review.
const REVIEW_LINK_TITLE: &str = "Review";

type JbsNode = Node<JbsContext>;

#[derive(Debug, Clone)]
pub struct JbsContext {
    client: ApiClient,
    api_base: String,
    browse_base: String,
    dates: DateStyle,
}

impl JbsContext {
    pub fn new(client: ApiClient, api_base: &str, dates: DateStyle) -> Self {
        let api_base = with_trailing_slash(api_base);
        let browse_base = browse_base(&api_base);
        Self {
            client,
            api_base,
            browse_base,
            dates,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}{key}", self.browse_base)
    }
}

/// `https://host/rest/api/2/` browses issues at `https://host/browse/`.
fn browse_base(api_base: &str) -> String {
    match api_base.find("rest/api/") {
        Some(rest) => format!("{}browse/", &api_base[..rest]),
        None => format!("{api_base}browse/"),
    }
}

pub struct JbsSource {
    settings: SharedSettings,
    http: reqwest::Client,
}

impl JbsSource {
    pub fn new(settings: SharedSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }
}

impl TreeSource for JbsSource {
    type Context = JbsContext;

    fn verify_settings(&self) -> bool {
        self.settings.read(ojd_conf::Settings::jbs_ready)
    }

    fn context(&self) -> JbsContext {
        self.settings.read(|settings| {
            JbsContext::new(
                ApiClient::new(self.http.clone(), Service::Jbs, settings.jbs.api_token.clone()),
                &settings.jbs.api_base,
                DateStyle::from_locale(&settings.locale),
            )
        })
    }

    fn setup_tree(&self, tree: &TreeHandle<JbsContext>) -> Vec<Arc<JbsNode>> {
        self.settings.read(|settings| {
            let root = |id: String, label: String, search: IssueSearch| {
                Node::builder(id, label)
                    .eager(true)
                    .collapsible(Collapsible::Expanded)
                    .description("...")
                    .timeout(settings.timeout())
                    .build(search, tree)
            };

            let mut roots = vec![root(
                "issues-mine".to_string(),
                "My open issues".to_string(),
                IssueSearch {
                    query: format!(
                        "jql=assignee%3D{}%20and%20resolution%3Dunresolved%20order%20by%20updated%20desc",
                        encode(&settings.jbs.username)
                    ),
                    filter_id: None,
                },
            )];

            for filter_id in &settings.jbs.filters {
                roots.push(root(
                    format!("issue-filter-{filter_id}"),
                    format!("Issues for filter {filter_id}"),
                    IssueSearch {
                        query: format!("jql=filter={}", encode(filter_id)),
                        filter_id: Some(filter_id.clone()),
                    },
                ));
            }

            roots
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchJson {
    issues: Vec<IssueJson>,
}

#[derive(Debug, Deserialize)]
struct IssueJson {
    id: String,
    key: String,
    #[serde(rename = "self")]
    api_url: String,
    fields: FieldsJson,
}

#[derive(Debug, Deserialize)]
struct FieldsJson {
    summary: String,
    status: NamedJson,
    issuetype: NamedJson,
    priority: Option<NamedJson>,
    #[serde(default)]
    components: Vec<NamedJson>,
    /// Subcomponent, a site-specific custom field.
    #[serde(default)]
    customfield_10008: Option<NamedJson>,
    #[serde(default)]
    description: Option<String>,
    updated: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignee: Option<UserJson>,
    #[serde(default, rename = "fixVersions")]
    fix_versions: Vec<NamedJson>,
}

#[derive(Debug, Deserialize)]
struct NamedJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserJson {
    name: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct FilterJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CommentsJson {
    comments: Vec<CommentJson>,
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    id: String,
    body: String,
    author: NamedJson,
}

#[derive(Debug, Deserialize)]
struct RemoteLinkJson {
    object: RemoteObjectJson,
}

#[derive(Debug, Deserialize)]
struct RemoteObjectJson {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    summary: Option<String>,
}

/// Root listing the result of one issue search, optionally a saved filter
/// whose server-side name becomes the root's label.
struct IssueSearch {
    query: String,
    filter_id: Option<String>,
}

#[async_trait]
impl NodeKind<JbsContext> for IssueSearch {
    async fn fetch_children(
        &self,
        node: &Arc<JbsNode>,
        context: &JbsContext,
    ) -> Result<Fetched<JbsContext>, FetchError> {
        let search_url = context.url(&format!("search?{}", self.query));
        let search = context.client.get_json::<SearchJson>(&search_url);

        let (results, filter_name) = match &self.filter_id {
            Some(filter_id) => {
                let filter_url = context.url(&format!("filter/{}", encode(filter_id)));
                let (filter, results) =
                    tokio::join!(context.client.get_json::<FilterJson>(&filter_url), search);
                let filter_name = match filter {
                    Ok(filter) => Some(filter.name),
                    Err(error) => {
                        tracing::warn!(filter = %filter_id, %error, "Could not look up filter name");
                        None
                    }
                };
                (results?, filter_name)
            }
            None => (search.await?, None),
        };

        let fetched = Fetched::new(issue_nodes(results, node, context));
        Ok(match filter_name {
            Some(name) => fetched.relabel(node, name),
            None => fetched,
        })
    }

    fn after_fetch(&self, presentation: &mut Presentation, children: &[Arc<JbsNode>]) {
        presentation.description = Some(format!("{} issues", children.len()));
    }
}

fn issue_nodes(results: SearchJson, parent: &JbsNode, context: &JbsContext) -> Vec<Arc<JbsNode>> {
    results
        .issues
        .into_iter()
        .map(|issue| {
            let label = format!("{}: {}", issue.key, issue.fields.summary);
            let web_url = context.browse_url(&issue.key);
            Node::builder(format!("issue-{}-{}", parent.id(), issue.id), label)
                .url(web_url.clone())
                .collapsible(Collapsible::Collapsed)
                .timeout(parent.timeout())
                .build(Issue::new(issue, web_url), parent.tree())
        })
        .collect()
}

/// One issue. Most details come with the search result; the latest comment
/// and the review links are fetched per issue.
struct Issue {
    api_url: String,
    web_url: String,
    status: String,
    issue_type: String,
    priority: Option<String>,
    component: Option<String>,
    subcomponent: Option<String>,
    description: Option<String>,
    updated: String,
    labels: Vec<String>,
    assignee: Option<(String, String)>,
    fix_version: Option<String>,
}

impl Issue {
    fn new(issue: IssueJson, web_url: String) -> Self {
        let fields = issue.fields;
        Self {
            api_url: issue.api_url,
            web_url,
            status: fields.status.name,
            issue_type: fields.issuetype.name,
            priority: fields.priority.map(|p| p.name),
            component: fields.components.into_iter().next().map(|c| c.name),
            subcomponent: fields.customfield_10008.map(|c| c.name),
            description: fields.description.filter(|d| !d.trim().is_empty()),
            updated: fields.updated,
            labels: fields.labels,
            assignee: fields.assignee.map(|a| (a.name, a.display_name)),
            fix_version: fields.fix_versions.into_iter().next().map(|v| v.name),
        }
    }

    /// The children built from the search result alone, in display order.
    fn details(
        &self,
        id: &str,
        tree: &TreeHandle<JbsContext>,
        dates: DateStyle,
    ) -> Vec<Arc<JbsNode>> {
        let url = self.web_url.as_str();
        let mut details = Vec::new();

        let info = match &self.priority {
            Some(priority) => format!("{priority} {} - {}", self.issue_type, self.status),
            None => format!("{} - {}", self.issue_type, self.status),
        };
        details.push(leaf(format!("{id}+info"), info, url).build(Leaf, tree));

        if let Some(description) = &self.description {
            details.push(
                leaf(format!("{id}+desc"), collapse_whitespace(description), url)
                    .tooltip(description.clone())
                    .build(Leaf, tree),
            );
        }

        if let Some(component) = &self.component {
            let label = match &self.subcomponent {
                Some(subcomponent) => format!("{component}/{subcomponent}"),
                None => component.clone(),
            };
            details.push(leaf(format!("{id}+component"), label, url).build(Leaf, tree));
        }

        if !self.labels.is_empty() {
            details.push(leaf(format!("{id}+tags"), self.labels.join(" "), url).build(Leaf, tree));
        }

        if let Some((name, display_name)) = &self.assignee {
            details.push(
                leaf(format!("{id}+assignee"), format!("@{name} ({display_name})"), url)
                    .build(Leaf, tree),
            );
        }

        if let Some(fix_version) = &self.fix_version {
            details.push(leaf(format!("{id}+fixVersion"), fix_version.clone(), url).build(Leaf, tree));
        }

        details.push(
            leaf(format!("{id}+date"), format_timestamp(&self.updated, dates), url)
                .build(Leaf, tree),
        );

        details
    }

    fn comment_node(
        &self,
        id: &str,
        comment: CommentJson,
        tree: &TreeHandle<JbsContext>,
    ) -> Arc<JbsNode> {
        let url = format!(
            "{}?focusedId={cid}&page=com.atlassian.jira.plugin.system.issuetabpanels%3Acomment-tabpanel#comment-{cid}",
            self.web_url,
            cid = comment.id
        );
        let label = format!("@{}: {}", comment.author.name, collapse_whitespace(&comment.body));
        leaf(format!("{id}+comment"), label, &url)
            .tooltip(comment.body)
            .build(Leaf, tree)
    }

    fn review_nodes<'a>(
        id: &'a str,
        links: Vec<RemoteLinkJson>,
        tree: &'a TreeHandle<JbsContext>,
    ) -> impl Iterator<Item = Arc<JbsNode>> + 'a {
        links
            .into_iter()
            .filter(|link| link.object.title.as_deref() == Some(REVIEW_LINK_TITLE))
            .map(move |link| {
                let summary = review_summary(link.object.summary.as_deref().unwrap_or_default());
                leaf(format!("{id}+review-{summary}"), summary, &link.object.url).build(Leaf, tree)
            })
    }
}

#[async_trait]
impl NodeKind<JbsContext> for Issue {
    async fn fetch_children(
        &self,
        node: &Arc<JbsNode>,
        context: &JbsContext,
    ) -> Result<Fetched<JbsContext>, FetchError> {
        let id = node.id().as_str();
        let tree = node.tree();

        let comments_url = format!("{}/comment?orderBy=-created&maxResults=1", self.api_url);
        let links_url = format!("{}/remotelink", self.api_url);
        let (comments, links) = tokio::try_join!(
            context.client.get_json::<CommentsJson>(&comments_url),
            context.client.get_json::<Vec<RemoteLinkJson>>(&links_url),
        )?;

        let mut children = self.details(id, tree, context.dates);
        if let Some(comment) = comments.comments.into_iter().next() {
            children.push(self.comment_node(id, comment, tree));
        }
        children.extend(Self::review_nodes(id, links, tree));
        Ok(children.into())
    }
}
