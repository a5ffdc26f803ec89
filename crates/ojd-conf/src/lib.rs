use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError as ExternalConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com/";
pub const DEFAULT_JBS_API_BASE: &str = "https://bugs.openjdk.org/rest/api/2/";

const ENV_PREFIX: &str = "OJD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Failed to serialize settings as TOML")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Locale used for timestamps, e.g. `en-US`. Empty means ISO-8601.
    pub locale: String,
    pub timeout_ms: u64,
    pub github: GithubSettings,
    pub jbs: JbsSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            github: GithubSettings::default(),
            jbs: JbsSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubSettings {
    #[serde(serialize_with = "redact")]
    pub api_token: String,
    pub username: String,
    pub label_filter: String,
    #[serde(deserialize_with = "comma_list")]
    pub repo_filter: Vec<String>,
    pub api_base: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            username: String::new(),
            label_filter: String::new(),
            repo_filter: Vec::new(),
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct JbsSettings {
    #[serde(serialize_with = "redact")]
    pub api_token: String,
    pub username: String,
    /// Ids of saved server-side filters, one tree root each.
    #[serde(deserialize_with = "comma_list")]
    pub filters: Vec<String>,
    pub api_base: String,
}

impl Default for JbsSettings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            username: String::new(),
            filters: Vec::new(),
            api_base: DEFAULT_JBS_API_BASE.to_string(),
        }
    }
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load_from_paths(project_root, user_config_file().as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        Self::load(project_root, user_config_path, environment())
    }

    fn load(
        project_root: &Path,
        user_config_path: Option<&Path>,
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".ojd.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("ojd.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(environment);

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        tracing::debug!(
            github_ready = settings.github_ready(),
            jbs_ready = settings.jbs_ready(),
            "Loaded settings"
        );
        Ok(settings)
    }

    /// The GitHub panel needs credentials and at least one PR filter.
    #[must_use]
    pub fn github_ready(&self) -> bool {
        let github = &self.github;
        !github.api_token.is_empty()
            && !github.username.is_empty()
            && (!github.label_filter.is_empty() || !github.repo_filter.is_empty())
    }

    #[must_use]
    pub fn jbs_ready(&self) -> bool {
        !self.jbs.api_token.is_empty() && !self.jbs.username.is_empty()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The effective settings as TOML, with tokens redacted.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

#[must_use]
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "openjdk", "ojd")
}

/// Location of the per-user settings file, if the platform has one.
#[must_use]
pub fn user_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("ojd.toml"))
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrString {
    List(Vec<String>),
    String(String),
}

/// Accept either a list or a single comma-separated string.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match ListOrString::deserialize(deserializer)? {
        ListOrString::List(entries) => entries,
        ListOrString::String(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect())
}

fn redact<S>(token: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if token.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str("<redacted>")
    }
}
