use crate::error::{ProxZoomError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info};

pub const DEFAULT_ZOOM_MAX: f64 = 2.5;

/// User-adjustable settings, read on every reading without a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Ceiling for zoom-in when the face moves away
    #[serde(default = "default_zoom_max")]
    pub zoom_max: f64,

    /// Sites that never have their zoom changed
    #[serde(default)]
    pub excluded_sites: BTreeSet<String>,
}

impl Settings {
    pub fn is_excluded(&self, site: &str) -> bool {
        self.excluded_sites.contains(site)
    }

    fn sanitized(mut self) -> Self {
        self.zoom_max = sanitize_zoom_max(self.zoom_max);
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom_max: DEFAULT_ZOOM_MAX,
            excluded_sites: BTreeSet::new(),
        }
    }
}

fn default_zoom_max() -> f64 {
    DEFAULT_ZOOM_MAX
}

fn sanitize_zoom_max(value: f64) -> f64 {
    if value.is_finite() {
        value.max(1.0)
    } else {
        DEFAULT_ZOOM_MAX
    }
}

/// Owner of the settings; every change is broadcast to its handles
pub struct SettingsStore {
    sender: watch::Sender<Settings>,
    path: Option<PathBuf>,
}

/// Read-through view of the settings store
#[derive(Clone)]
pub struct SettingsHandle {
    receiver: watch::Receiver<Settings>,
}

impl SettingsHandle {
    /// Latest settings
    pub fn snapshot(&self) -> Settings {
        self.receiver.borrow().clone()
    }

    pub fn zoom_max(&self) -> f64 {
        self.receiver.borrow().zoom_max
    }

    pub fn is_excluded(&self, site: &str) -> bool {
        self.receiver.borrow().is_excluded(site)
    }

    /// Wait for the next change
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

impl SettingsStore {
    /// In-memory store
    pub fn new(settings: Settings) -> Self {
        let (sender, _) = watch::channel(settings.sanitized());
        Self { sender, path: None }
    }

    /// Store backed by a TOML file. A missing file yields defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let settings: Settings = toml::from_str(&contents)?;
            info!("Loaded settings from {}", path.display());
            settings
        } else {
            info!(
                "Settings file {} not found, using defaults",
                path.display()
            );
            Settings::default()
        };

        let (sender, _) = watch::channel(settings.sanitized());
        Ok(Self {
            sender,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn handle(&self) -> SettingsHandle {
        SettingsHandle {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn current(&self) -> Settings {
        self.sender.borrow().clone()
    }

    pub fn set_zoom_max(&self, zoom_max: f64) {
        let zoom_max = sanitize_zoom_max(zoom_max);
        self.sender.send_modify(|settings| settings.zoom_max = zoom_max);
        debug!("Maximum zoom set to {:.2}", zoom_max);
    }

    /// Returns false if the site was already excluded
    pub fn exclude_site(&self, site: &str) -> bool {
        self.sender
            .send_if_modified(|settings| settings.excluded_sites.insert(site.to_string()))
    }

    /// Returns false if the site was not excluded
    pub fn include_site(&self, site: &str) -> bool {
        self.sender
            .send_if_modified(|settings| settings.excluded_sites.remove(site))
    }

    /// Flip the exclusion of `site` and return whether it is now excluded
    pub fn toggle_exclusion(&self, site: &str) -> bool {
        let mut excluded = false;
        self.sender.send_modify(|settings| {
            if !settings.excluded_sites.remove(site) {
                settings.excluded_sites.insert(site.to_string());
                excluded = true;
            }
        });
        info!(
            "Site '{}' {}",
            site,
            if excluded { "excluded" } else { "included" }
        );
        excluded
    }

    /// Persist to the backing file, if there is one
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Err(ProxZoomError::system("Settings store has no backing file"));
        };

        let contents = toml::to_string_pretty(&self.current())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
