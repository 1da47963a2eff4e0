use anyhow::anyhow;
use async_trait::async_trait;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wnk_core::plugin::{Plugin, PluginError, PluginManifest};
use wnk_core::protocol::{HostContext, ResultItem};

pub const ID: &str = "files";
pub const ROOTS_ENV: &str = "WNK_FILE_ROOTS";

const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    ".idea",
    ".vscode",
    "target",
];
const HOME_SUBDIRS: &[&str] = &["Desktop", "Documents", "Downloads"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub roots: Vec<PathBuf>,
    pub max_results: usize,
    pub max_depth: usize,
    pub max_dirs_visited: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            max_results: 30,
            max_depth: 6,
            max_dirs_visited: 2500,
        }
    }
}

/// `file <term>` or `f <term>`; the keyword is case-insensitive.
pub fn parse_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    let lower = trimmed.to_lowercase();
    let rest = if lower.starts_with("file ") {
        trimmed.get(5..)?
    } else if lower.starts_with("f ") {
        trimmed.get(2..)?
    } else {
        return None;
    };
    let term = rest.trim().to_lowercase();
    (!term.is_empty()).then_some(term)
}

pub fn split_roots(raw: &str) -> Vec<PathBuf> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Configured roots plus `WNK_FILE_ROOTS`; when none of those exist, the
/// usual folders under the home directory.
pub fn resolve_roots(config: &FilesConfig, env_roots: Option<&str>, home: Option<&Path>) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = config
        .roots
        .iter()
        .cloned()
        .chain(env_roots.map(split_roots).unwrap_or_default())
        .filter(|root| root.is_dir())
        .collect();
    roots.dedup();
    if !roots.is_empty() {
        return roots;
    }
    let Some(home) = home else {
        return roots;
    };
    HOME_SUBDIRS
        .iter()
        .map(|sub| home.join(sub))
        .filter(|dir| dir.is_dir())
        .collect()
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Case-insensitive substring match on file names below `roots`.
pub fn search(roots: &[PathBuf], term: &str, config: &FilesConfig) -> Vec<ResultItem> {
    let Some((first, rest)) = roots.split_first() else {
        return Vec::new();
    };

    let mut builder = WalkBuilder::new(first);
    for root in rest {
        builder.add(root);
    }
    builder
        .standard_filters(false)
        .follow_links(false)
        .max_depth(Some(config.max_depth + 1))
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && IGNORED_DIRS.iter().any(|name| entry.file_name() == *name))
        });

    let mut results = Vec::new();
    let mut dirs_visited = 0usize;
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            dirs_visited += 1;
            if dirs_visited > config.max_dirs_visited {
                break;
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !name.to_lowercase().contains(term) {
            continue;
        }
        let full = entry.path().display().to_string();
        results.push(
            ResultItem::new(name.into_owned())
                .id(format!("file:{full}"))
                .subtitle(full)
                .icon("F"),
        );
        if results.len() >= config.max_results {
            break;
        }
    }
    results
}

#[derive(Debug)]
pub struct Files {
    manifest: PluginManifest,
    config: FilesConfig,
}

impl Files {
    pub fn new(config: FilesConfig) -> Self {
        Self::with_manifest(PluginManifest::new(ID, "Files").with_icon("F"), config)
    }

    pub fn with_manifest(manifest: PluginManifest, config: FilesConfig) -> Self {
        Self { manifest, config }
    }
}

#[async_trait(?Send)]
impl Plugin for Files {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn get_results(&self, query: &str, _context: &HostContext) -> Result<Vec<ResultItem>, PluginError> {
        let Some(term) = parse_query(query) else {
            return Ok(Vec::new());
        };
        let env_roots = std::env::var(ROOTS_ENV).ok();
        let roots = resolve_roots(&self.config, env_roots.as_deref(), home_dir().as_deref());
        if roots.is_empty() {
            warn!("no file search roots available");
            return Ok(Vec::new());
        }

        let config = self.config.clone();
        let items = tokio::task::spawn_blocking(move || search(&roots, &term, &config))
            .await
            .map_err(|err| anyhow!("file search task failed: {err}"))?;
        Ok(items)
    }
}
