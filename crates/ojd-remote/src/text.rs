//! Small rewrites applied to text coming back from the trackers.

/// Marker the PR template puts above its generated sections.
const PR_TEMPLATE_MARKER: &str = "<!-- Anything below this marker will be";

const GITHUB_API_REPOS: &str = "https://api.github.com/repos/";
const GITHUB_WEB: &str = "https://github.com/";

/// Remove anything that looks like an HTML tag.
///
/// Not a parser: the comment bodies are already rendered by GitHub, this only
/// drops the markup left in them. An unterminated tag runs to the end.
pub fn strip_html_tags(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('<') {
        stripped.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('>') {
            // `<>` is not a tag
            Some(0) => {
                stripped.push('<');
                rest = after;
            }
            Some(end) => rest = &after[end + 1..],
            None if after.is_empty() => {
                stripped.push('<');
                rest = after;
            }
            None => rest = "",
        }
    }
    stripped.push_str(rest);
    stripped
}

/// Replace every run of whitespace with a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Single-line rendering of an HTML comment body.
pub fn clean_comment(body: &str) -> String {
    collapse_whitespace(&strip_html_tags(body))
}

/// Rewrite titles like `JDK-8123456 Fix the thing` to `8123456: Fix the thing`.
///
/// Applies when the title starts with at least one non-digit followed by an
/// issue number of two digits or more. Anything else is only trimmed.
pub fn nice_title(title: &str) -> String {
    let Some(digits_start) = title.find(|c: char| c.is_ascii_digit()) else {
        return title.trim().to_string();
    };
    if digits_start == 0 || title.contains('\n') {
        return title.trim().to_string();
    }

    let from_digits = &title[digits_start..];
    let digits_len = from_digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(from_digits.len());
    if digits_len < 2 {
        return title.trim().to_string();
    }

    let (number, rest) = from_digits.split_at(digits_len);
    let rest = rest.strip_prefix(':').unwrap_or(rest).trim_start_matches(' ');
    format!("{number}: {rest}").trim().to_string()
}

/// The author-written part of a PR body, above the template marker.
pub fn pr_description(body: &str) -> &str {
    match body.rfind(PR_TEMPLATE_MARKER) {
        Some(marker) => body[..marker].trim(),
        None => body.trim(),
    }
}

/// JBS issue keys listed in the `### Issue` section of a PR body.
pub fn jbs_issues(body: &str) -> Vec<String> {
    let Some(section) = issues_section(body) else {
        return Vec::new();
    };

    section
        .lines()
        .filter_map(|line| {
            let entry = &line[line.find("* [")? + 3..];
            let (key, link) = entry.split_once("](")?;
            let bugs = link.find("bugs.openjdk")?;
            link[bugs..].contains("):").then_some(key)
        })
        .filter(|key| is_issue_key(key))
        .map(str::to_string)
        .collect()
}

fn issues_section(body: &str) -> Option<&str> {
    let start = body.find("### Issue")?;
    let heading = &body[start + "### Issue".len()..];
    let list = heading.strip_prefix('s').unwrap_or(heading);
    if !list.starts_with("\n * ") {
        return None;
    }
    let end = body.rfind("\n### Review")?;
    (end > start).then(|| &body[start..end])
}

/// `PROJECT-123`: upper-case letters, a dash, digits.
fn is_issue_key(key: &str) -> bool {
    let Some((project, number)) = key.split_once('-') else {
        return false;
    };
    !project.is_empty()
        && project.chars().all(|c| c.is_ascii_uppercase())
        && !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit())
}

/// Map a pull request API URL to its web page. Other URLs pass through.
pub fn pr_web_url(api_url: &str) -> String {
    let Some(path) = api_url.strip_prefix(GITHUB_API_REPOS) else {
        return api_url.to_string();
    };
    match path.split_once("/pulls/") {
        Some((repo, number)) if repo.contains('/') => {
            format!("{GITHUB_WEB}{repo}/pull/{number}")
        }
        _ => api_url.to_string(),
    }
}

/// `owner/repo` part of a repository API URL.
pub fn repo_from_api_url(repository_url: &str) -> &str {
    repository_url
        .strip_prefix(GITHUB_API_REPOS)
        .unwrap_or(repository_url)
}

/// `openjdk/jdk/4711` becomes `openjdk/jdk#4711`.
pub fn review_summary(summary: &str) -> String {
    match summary.rsplit_once('/') {
        Some((head, tail)) if !tail.is_empty() => format!("{head}#{tail}"),
        _ => summary.to_string(),
    }
}
