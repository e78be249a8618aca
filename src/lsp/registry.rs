//! Language detection, workspace-root discovery, and per-`(language,
//! workspace_root)` client pooling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::LanguageTable;
use crate::error::LspError;
use crate::lsp::client::LspClient;

pub type WorkspaceKey = String;

pub fn workspace_key(language_id: &str, workspace_root: Option<&Path>) -> WorkspaceKey {
    match workspace_root {
        Some(root) => format!("{language_id}@{}", root.display()),
        None => format!("{language_id}@-"),
    }
}

pub struct LspRegistry {
    table: LanguageTable,
    clients: HashMap<WorkspaceKey, LspClient>,
    /// Languages whose spawn has already failed once, so the editor is
    /// notified a single time instead of on every request.
    spawn_failed: HashMap<String, ()>,
}

impl LspRegistry {
    pub fn new(table: LanguageTable) -> Self {
        Self {
            table,
            clients: HashMap::new(),
            spawn_failed: HashMap::new(),
        }
    }

    pub fn detect_language(&self, path: &Path) -> Option<&crate::config::LanguageEntry> {
        self.table.detect_by_extension(path)
    }

    /// Walk parent directories from `file_dir` looking for any marker file;
    /// the first directory containing one is the root. Falls back to
    /// `file_dir` itself when no marker is found anywhere above it.
    pub fn discover_workspace_root(file_dir: &Path, markers: &[String]) -> PathBuf {
        let mut dir = Some(file_dir);
        while let Some(current) = dir {
            if markers.iter().any(|m| current.join(m).exists()) {
                return current.to_path_buf();
            }
            dir = current.parent();
        }
        file_dir.to_path_buf()
    }

    pub fn get(&self, key: &WorkspaceKey) -> Option<&LspClient> {
        self.clients.get(key)
    }

    pub fn get_mut(&mut self, key: &WorkspaceKey) -> Option<&mut LspClient> {
        self.clients.get_mut(key)
    }

    pub fn remove(&mut self, key: &WorkspaceKey) -> Option<LspClient> {
        self.clients.remove(key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&WorkspaceKey, &mut LspClient)> {
        self.clients.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Atomically return an existing client for `(language, root)` or spawn
    /// a new one and register it. Returns `None` (after memoizing the
    /// failure) when the spawn itself failed, so the caller can notify the
    /// editor once and otherwise degrade to `empty` results silently.
    pub async fn get_or_create(
        &mut self,
        file_path: &Path,
    ) -> Result<Option<(WorkspaceKey, bool)>, LspError> {
        let Some(entry) = self.table.detect_by_extension(file_path).cloned() else {
            return Ok(None);
        };
        if self.spawn_failed.contains_key(&entry.language_id) {
            return Ok(None);
        }

        let file_dir = file_path.parent().unwrap_or(file_path);
        let root = Self::discover_workspace_root(file_dir, &entry.workspace_markers);
        let key = workspace_key(&entry.language_id, Some(&root));

        if self.clients.contains_key(&key) {
            return Ok(Some((key, false)));
        }

        match LspClient::spawn(&entry, Some(root.clone())).await {
            Ok(client) => {
                info!(language = %entry.language_id, root = %root.display(), "spawned language server");
                self.clients.insert(key.clone(), client);
                Ok(Some((key, true)))
            }
            Err(e) => {
                warn!(language = %entry.language_id, error = %e, "failed to spawn language server");
                self.spawn_failed.insert(entry.language_id.clone(), ());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_workspace_root_by_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        let src = project.join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(project.join("Cargo.toml"), "").unwrap();

        let root = LspRegistry::discover_workspace_root(&src, &["Cargo.toml".to_string()]);
        assert_eq!(root, project);
    }

    #[test]
    fn falls_back_to_file_dir_when_no_marker_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = LspRegistry::discover_workspace_root(dir.path(), &["Cargo.toml".to_string()]);
        assert_eq!(root, dir.path());
    }

    #[test]
    fn workspace_key_distinguishes_roots() {
        let a = workspace_key("rust", Some(Path::new("/p1")));
        let b = workspace_key("rust", Some(Path::new("/p2")));
        assert_ne!(a, b);
    }
}
