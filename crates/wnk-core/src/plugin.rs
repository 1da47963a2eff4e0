use crate::panel::{ActionItem, PanelOutput};
use crate::protocol::{ActionContext, HostContext, ResultItem};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PluginCapability {
    Results,
    Panel,
    Actions,
    Commands,
}

impl PluginCapability {
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Results => "results",
            Self::Panel => "panel",
            Self::Actions => "actions",
            Self::Commands => "commands",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "results" => Some(Self::Results),
            "panel" => Some(Self::Panel),
            "actions" => Some(Self::Actions),
            "commands" => Some(Self::Commands),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            entry: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("capability not supported: {}", .0.as_tag())]
    Unsupported(PluginCapability),
    #[error("plugin call failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A result/panel/action provider. Only `get_results` is required; the other
/// calls answer `Unsupported` unless the plugin lists the capability.
#[async_trait(?Send)]
pub trait Plugin {
    fn manifest(&self) -> &PluginManifest;

    fn capabilities(&self) -> &[PluginCapability] {
        &[PluginCapability::Results]
    }

    fn supports(&self, capability: PluginCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    async fn get_results(&self, query: &str, context: &HostContext) -> Result<Vec<ResultItem>, PluginError>;

    async fn get_panel(&self, _item_id: &str) -> Result<Option<PanelOutput>, PluginError> {
        Err(PluginError::Unsupported(PluginCapability::Panel))
    }

    async fn get_actions(&self, _context: &ActionContext) -> Result<Vec<ActionItem>, PluginError> {
        Err(PluginError::Unsupported(PluginCapability::Actions))
    }

    async fn on_command(&self, _name: &str, _text: &str) -> Result<Option<PanelOutput>, PluginError> {
        Err(PluginError::Unsupported(PluginCapability::Commands))
    }
}

/// Loaded once at startup and immutable afterwards. Iteration order is by id.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Rc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Rc<dyn Plugin>) -> Result<(), String> {
        validate_manifest(plugin.manifest())?;
        let id = plugin.manifest().id.clone();
        if self.plugins.contains_key(&id) {
            return Err(format!("plugin id already registered: {id}"));
        }
        debug!(plugin = %id, "registered plugin");
        self.plugins.insert(id, plugin);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Rc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Rc<dyn Plugin>> {
        self.plugins.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.ids())
            .finish()
    }
}

pub fn validate_manifest(manifest: &PluginManifest) -> Result<(), String> {
    let id = manifest.id.trim();
    if id.is_empty() {
        return Err("plugin id is required".to_string());
    }
    if id.contains('.') {
        return Err(format!("plugin id must not contain '.': {id}"));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(format!("plugin id must not contain whitespace: {id}"));
    }
    if manifest.name.trim().is_empty() {
        return Err("plugin name is required".to_string());
    }
    Ok(())
}

/// Reads `<dir>/<plugin>/manifest.json` for every sub-directory. Entries that
/// are missing, unreadable or invalid are skipped.
pub fn discover_manifests(dir: &Path) -> anyhow::Result<Vec<PluginManifest>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read plugins dir: {}", dir.display()))?;

    let mut manifests = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path().join(MANIFEST_FILE_NAME);
        if !entry.path().is_dir() || !path.is_file() {
            continue;
        }
        match read_manifest(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping plugin manifest"),
        }
    }
    manifests.sort_by(|a, b| a.id.cmp(&b.id));
    manifests.dedup_by(|a, b| a.id == b.id);
    Ok(manifests)
}

fn read_manifest(path: &Path) -> anyhow::Result<PluginManifest> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let manifest: PluginManifest =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    validate_manifest(&manifest).map_err(anyhow::Error::msg)?;
    Ok(manifest)
}
