//! The GitHub tree: unread notifications and open pull request searches.

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
use crate::text::clean_comment;
use crate::text::collapse_whitespace;
use crate::text::jbs_issues;
use crate::text::nice_title;
use crate::text::pr_description;
use crate::text::pr_web_url;
use crate::text::repo_from_api_url;
use crate::with_trailing_slash;
use crate::SharedSettings;

/// Only notifications from repositories of this owner are shown.
const ORGANIZATION: &str = "openjdk";
const GITHUB_WEB: &str = "https://github.com/";
const JBS_BROWSE: &str = "https://bugs.openjdk.org/browse/";

type GithubNode = Node<GithubContext>;

/// Everything a GitHub fetch needs, resolved once per refresh.
#[derive(Debug, Clone)]
pub struct GithubContext {
    client: ApiClient,
    api_base: String,
    dates: DateStyle,
}

impl GithubContext {
    pub fn new(client: ApiClient, api_base: &str, dates: DateStyle) -> Self {
        Self {
            client,
            api_base: with_trailing_slash(api_base),
            dates,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }
}

pub struct GithubSource {
    settings: SharedSettings,
    http: reqwest::Client,
}

impl GithubSource {
    pub fn new(settings: SharedSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }
}

impl TreeSource for GithubSource {
    type Context = GithubContext;

    fn verify_settings(&self) -> bool {
        self.settings.read(ojd_conf::Settings::github_ready)
    }

    fn context(&self) -> GithubContext {
        self.settings.read(|settings| {
            GithubContext::new(
                ApiClient::new(
                    self.http.clone(),
                    Service::GitHub,
                    settings.github.api_token.clone(),
                ),
                &settings.github.api_base,
                DateStyle::from_locale(&settings.locale),
            )
        })
    }

    fn setup_tree(&self, tree: &TreeHandle<GithubContext>) -> Vec<Arc<GithubNode>> {
        self.settings.read(|settings| {
            let github = &settings.github;
            let root = |id: String, label: String| {
                Node::builder(id, label)
                    .eager(true)
                    .collapsible(Collapsible::Expanded)
                    .description("...")
                    .timeout(settings.timeout())
            };

            let mut roots = vec![root("id".to_string(), "Notifications".to_string())
                .build(Notifications, tree)];

            roots.push(
                root("id-my-prs".to_string(), "My PRs".to_string()).build(
                    PullRequestSearch::new(format!(
                        "is:open+is:pr+archived:false+org:{ORGANIZATION}+author:{}",
                        encode(&github.username)
                    )),
                    tree,
                ),
            );

            if !github.label_filter.is_empty() {
                roots.push(
                    root(
                        "id-open-prs-labels".to_string(),
                        format!("PRs for {}", github.label_filter),
                    )
                    .build(
                        PullRequestSearch::new(format!(
                            "is:open+is:pr+archived:false+label:rfr+org:{ORGANIZATION}+label:{}",
                            encode(&github.label_filter)
                        )),
                        tree,
                    ),
                );
            }

            for repo in &github.repo_filter {
                roots.push(
                    root(format!("id-open-prs-repo-{repo}"), format!("PRs for {repo}")).build(
                        PullRequestSearch::new(format!(
                            "is:open+is:pr+archived:false+label:rfr+repo:{ORGANIZATION}/{}",
                            encode(repo)
                        )),
                        tree,
                    ),
                );
            }

            roots
        })
    }
}

#[derive(Debug, Deserialize)]
struct NotificationJson {
    id: String,
    unread: bool,
    updated_at: String,
    subject: SubjectJson,
    repository: RepositoryJson,
}

#[derive(Debug, Deserialize)]
struct SubjectJson {
    title: String,
    url: Option<String>,
    latest_comment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryJson {
    full_name: String,
    owner: UserJson,
}

#[derive(Debug, Deserialize)]
struct UserJson {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CommentJson {
    #[serde(default)]
    body: Option<String>,
    user: UserJson,
}

#[derive(Debug, Deserialize)]
struct SearchJson {
    items: Vec<SearchItemJson>,
}

#[derive(Debug, Deserialize)]
struct SearchItemJson {
    id: u64,
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    repository_url: String,
    #[serde(default)]
    labels: Vec<LabelJson>,
    user: UserJson,
    pull_request: Option<PullRequestRefJson>,
}

#[derive(Debug, Deserialize)]
struct LabelJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestRefJson {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestStatsJson {
    additions: u64,
    deletions: u64,
    changed_files: u64,
}

/// Root listing unread notifications.
struct Notifications;

#[async_trait]
impl NodeKind<GithubContext> for Notifications {
    async fn fetch_children(
        &self,
        node: &Arc<GithubNode>,
        context: &GithubContext,
    ) -> Result<Fetched<GithubContext>, FetchError> {
        let notifications: Vec<NotificationJson> =
            context.client.get_json(&context.url("notifications")).await?;
        Ok(notification_nodes(notifications, node).into())
    }

    fn after_fetch(&self, presentation: &mut Presentation, children: &[Arc<GithubNode>]) {
        presentation.description = Some(format!("{} unread notifications", children.len()));
    }
}

fn notification_nodes(
    notifications: Vec<NotificationJson>,
    parent: &GithubNode,
) -> Vec<Arc<GithubNode>> {
    notifications
        .into_iter()
        .filter(|n| n.unread && n.repository.owner.login == ORGANIZATION)
        .map(|n| {
            let pr_web_url = n.subject.url.as_deref().map(pr_web_url);
            let kind = Notification {
                comment_url: n.subject.latest_comment_url,
                pr_url: n.subject.url,
                pr_web_url,
                updated_at: n.updated_at,
                repository: n.repository.full_name,
            };
            Node::builder(format!("alert-{}", n.id), n.subject.title)
                .collapsible(Collapsible::Collapsed)
                .timeout(parent.timeout())
                .build(kind, parent.tree())
        })
        .collect()
}

/// One notification: its latest comment, when it happened, and where.
struct Notification {
    comment_url: Option<String>,
    pr_url: Option<String>,
    pr_web_url: Option<String>,
    updated_at: String,
    repository: String,
}

impl Notification {
    /// Prefix of the child ids, stable across refreshes of the same comment.
    fn child_key<'a>(&'a self, node: &'a GithubNode) -> &'a str {
        self.comment_url
            .as_deref()
            .or(self.pr_url.as_deref())
            .unwrap_or(node.id().as_str())
    }

    fn target(&self) -> &str {
        self.pr_web_url.as_deref().unwrap_or(GITHUB_WEB)
    }
}

#[async_trait]
impl NodeKind<GithubContext> for Notification {
    async fn fetch_children(
        &self,
        node: &Arc<GithubNode>,
        context: &GithubContext,
    ) -> Result<Fetched<GithubContext>, FetchError> {
        let key = self.child_key(node);
        let tree = node.tree();
        let mut children = Vec::new();

        if let Some(comment_url) = &self.comment_url {
            let comment: CommentJson = context.client.get_json(comment_url).await?;
            let body = comment.body.unwrap_or_default();
            children.push(
                leaf(format!("{key}+comment"), clean_comment(&body), self.target())
                    .tooltip(body)
                    .build(Leaf, tree),
            );
            children.push(
                leaf(format!("{key}+username"), comment.user.login, self.target())
                    .build(Leaf, tree),
            );
        }

        children.push(
            leaf(
                format!("{key}+date"),
                format_timestamp(&self.updated_at, context.dates),
                self.target(),
            )
            .build(Leaf, tree),
        );

        let number = self
            .pr_url
            .as_deref()
            .and_then(|url| url.rsplit('/').next())
            .unwrap_or_default();
        children.push(
            leaf(
                format!("{key}+pr"),
                format!("{}#{number}", self.repository),
                self.target(),
            )
            .build(Leaf, tree),
        );

        Ok(children.into())
    }
}

/// Root listing the results of one pull request search.
struct PullRequestSearch {
    query: String,
}

impl PullRequestSearch {
    fn new(query: String) -> Self {
        Self { query }
    }
}

#[async_trait]
impl NodeKind<GithubContext> for PullRequestSearch {
    async fn fetch_children(
        &self,
        node: &Arc<GithubNode>,
        context: &GithubContext,
    ) -> Result<Fetched<GithubContext>, FetchError> {
        let url = context.url(&format!("search/issues?q={}", self.query));
        let results: SearchJson = context.client.get_json(&url).await?;
        Ok(pull_request_nodes(results, node).into())
    }

    fn after_fetch(&self, presentation: &mut Presentation, children: &[Arc<GithubNode>]) {
        presentation.description = Some(format!("{} open pull requests", children.len()));
    }
}

fn pull_request_nodes(results: SearchJson, parent: &GithubNode) -> Vec<Arc<GithubNode>> {
    results
        .items
        .into_iter()
        .filter_map(|mut item| {
            let Some(pull_request) = item.pull_request.take() else {
                tracing::debug!(number = item.number, "Search hit is not a pull request");
                return None;
            };
            Some(pull_request_node(item_fields(item), pull_request.url, parent))
        })
        .collect()
}

struct PullRequestFields {
    id: u64,
    number: u64,
    title: String,
    body: String,
    html_url: String,
    repo: String,
    labels: Vec<String>,
    author: String,
}

fn item_fields(item: SearchItemJson) -> PullRequestFields {
    PullRequestFields {
        id: item.id,
        number: item.number,
        title: item.title,
        body: item.body.unwrap_or_default(),
        html_url: item.html_url,
        repo: repo_from_api_url(&item.repository_url).to_string(),
        labels: item.labels.into_iter().map(|label| label.name).collect(),
        author: item.user.login,
    }
}

fn pull_request_node(
    fields: PullRequestFields,
    api_url: String,
    parent: &GithubNode,
) -> Arc<GithubNode> {
    let id = format!("{}-{}", parent.id(), fields.id);
    let label = nice_title(&fields.title);
    let kind = PullRequest::new(&id, &fields, api_url, parent.tree());

    Node::builder(id, label.clone())
        .tooltip(format!("{label}\n{}", overview(&fields)))
        .url(fields.html_url)
        .collapsible(Collapsible::Collapsed)
        .timeout(parent.timeout())
        .build(kind, parent.tree())
}

fn overview(fields: &PullRequestFields) -> String {
    format!("{}#{} by @{}", fields.repo, fields.number, fields.author)
}

/// One pull request. Its children are known up front except for the diff
/// statistics, which need the pull request API.
struct PullRequest {
    api_url: String,
    diff: Arc<GithubNode>,
    generated: Vec<Arc<GithubNode>>,
}

impl PullRequest {
    fn new(
        id: &str,
        fields: &PullRequestFields,
        api_url: String,
        tree: &TreeHandle<GithubContext>,
    ) -> Self {
        let web_url = format!("{GITHUB_WEB}{}/pull/{}", fields.repo, fields.number);

        let mut generated = vec![leaf(format!("goto{id}"), overview(fields), &web_url).build(Leaf, tree)];

        let description = pr_description(&fields.body);
        if !description.is_empty() {
            generated.push(
                leaf(format!("desc{id}"), collapse_whitespace(description), &web_url)
                    .tooltip(description)
                    .build(Leaf, tree),
            );
        }

        for issue in jbs_issues(&fields.body) {
            let browse = format!("{JBS_BROWSE}{issue}");
            generated.push(leaf(format!("jbs{id}-{issue}"), issue, &browse).build(Leaf, tree));
        }

        // Relabelled with the diff statistics by every accepted fetch.
        let diff = leaf(format!("diff{id}"), "Diff", &format!("{web_url}/files")).build(Leaf, tree);
        generated.push(Arc::clone(&diff));

        if !fields.labels.is_empty() {
            generated.push(
                leaf(format!("tags{id}"), fields.labels.join(" "), &web_url).build(Leaf, tree),
            );
        }

        Self {
            api_url,
            diff,
            generated,
        }
    }
}

#[async_trait]
impl NodeKind<GithubContext> for PullRequest {
    async fn fetch_children(
        &self,
        _node: &Arc<GithubNode>,
        context: &GithubContext,
    ) -> Result<Fetched<GithubContext>, FetchError> {
        let stats: PullRequestStatsJson = context.client.get_json(&self.api_url).await?;
        let diff_label = format!(
            "+{} -{}, {} changed files",
            stats.additions, stats.deletions, stats.changed_files
        );
        Ok(Fetched::new(self.generated.clone()).relabel(&self.diff, diff_label))
    }
}
