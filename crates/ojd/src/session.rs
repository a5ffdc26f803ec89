use std::env;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use ojd_conf::Settings;
use ojd_remote::SharedSettings;

use crate::args::GlobalArgs;

/// The project a command runs against and the settings loaded for it.
pub struct Session {
    project_root: PathBuf,
    settings: SharedSettings,
}

impl Session {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let project_root = match &args.project {
            Some(project) => project.clone(),
            None => env::current_dir().context("Failed to get current directory")?,
        };
        let settings = Settings::new(&project_root).context("Failed to load settings")?;
        tracing::debug!(project = %project_root.display(), "Loaded settings");

        Ok(Self {
            project_root,
            settings: SharedSettings::new(settings),
        })
    }

    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }

    /// Re-read the configuration files, keeping the current settings when
    /// they no longer parse. Returns whether the settings changed.
    pub fn reload(&self) -> bool {
        match Settings::new(&self.project_root) {
            Ok(settings) => {
                if self.settings.read(|current| *current == settings) {
                    return false;
                }
                tracing::info!(project = %self.project_root.display(), "Settings changed");
                self.settings.replace(settings);
                true
            }
            Err(error) => {
                tracing::warn!(%error, "Could not reload settings, keeping the previous ones");
                false
            }
        }
    }
}
