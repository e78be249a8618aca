//! Static language table, optional TOML overrides, and path resolution.
//!
//! The baseline table is compiled in; an optional `yac.toml` under the
//! platform config directory can add entries or override the command/args
//! of an existing one. Absence of the file is not an error.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{DaemonError, Result};

#[derive(Debug, Clone)]
pub struct LanguageEntry {
    pub language_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub extensions: Vec<String>,
    pub workspace_markers: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub language: Vec<LanguageOverride>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageOverride {
    pub language_id: String,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
    pub workspace_markers: Option<Vec<String>>,
}

fn baseline_table() -> Vec<LanguageEntry> {
    vec![
        LanguageEntry {
            language_id: "rust".into(),
            command: "rust-analyzer".into(),
            args: vec![],
            extensions: vec!["rs".into()],
            workspace_markers: vec!["Cargo.toml".into()],
        },
        LanguageEntry {
            language_id: "python".into(),
            command: "pyright-langserver".into(),
            args: vec!["--stdio".into()],
            extensions: vec!["py".into(), "pyi".into()],
            workspace_markers: vec![
                "pyproject.toml".into(),
                "setup.py".into(),
                ".git".into(),
            ],
        },
        LanguageEntry {
            language_id: "typescript".into(),
            command: "typescript-language-server".into(),
            args: vec!["--stdio".into()],
            extensions: vec!["ts".into(), "tsx".into(), "js".into(), "jsx".into()],
            workspace_markers: vec!["package.json".into(), "tsconfig.json".into()],
        },
        LanguageEntry {
            language_id: "go".into(),
            command: "gopls".into(),
            args: vec![],
            extensions: vec!["go".into()],
            workspace_markers: vec!["go.mod".into()],
        },
        LanguageEntry {
            language_id: "zig".into(),
            command: "zls".into(),
            args: vec![],
            extensions: vec!["zig".into()],
            workspace_markers: vec!["build.zig".into()],
        },
        LanguageEntry {
            language_id: "c".into(),
            command: "clangd".into(),
            args: vec![],
            extensions: vec!["c".into(), "h".into()],
            workspace_markers: vec!["compile_commands.json".into(), ".git".into()],
        },
        LanguageEntry {
            language_id: "cpp".into(),
            command: "clangd".into(),
            args: vec![],
            extensions: vec!["cc".into(), "cpp".into(), "cxx".into(), "hpp".into()],
            workspace_markers: vec!["compile_commands.json".into(), ".git".into()],
        },
    ]
}

pub struct LanguageTable {
    by_language: HashMap<String, LanguageEntry>,
    by_extension: HashMap<String, String>,
}

impl LanguageTable {
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self> {
        let mut by_language: HashMap<String, LanguageEntry> = baseline_table()
            .into_iter()
            .map(|e| (e.language_id.clone(), e))
            .collect();

        if let Some(path) = config_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)?;
                let file_config: FileConfig = toml::from_str(&text)
                    .map_err(|e| DaemonError::Configuration(format!("{}: {e}", path.display())))?;
                for ovr in file_config.language {
                    apply_override(&mut by_language, ovr);
                }
            }
        }

        let mut by_extension = HashMap::new();
        for entry in by_language.values() {
            for ext in &entry.extensions {
                by_extension.insert(ext.clone(), entry.language_id.clone());
            }
        }

        Ok(Self {
            by_language,
            by_extension,
        })
    }

    pub fn detect_by_extension(&self, path: &std::path::Path) -> Option<&LanguageEntry> {
        let ext = path.extension()?.to_str()?;
        let language_id = self.by_extension.get(ext)?;
        self.by_language.get(language_id)
    }

    pub fn get(&self, language_id: &str) -> Option<&LanguageEntry> {
        self.by_language.get(language_id)
    }
}

fn apply_override(table: &mut HashMap<String, LanguageEntry>, ovr: LanguageOverride) {
    let entry = table
        .entry(ovr.language_id.clone())
        .or_insert_with(|| LanguageEntry {
            language_id: ovr.language_id.clone(),
            command: String::new(),
            args: vec![],
            extensions: vec![],
            workspace_markers: vec![],
        });
    if let Some(command) = ovr.command {
        entry.command = command;
    }
    if let Some(args) = ovr.args {
        entry.args = args;
    }
    if let Some(extensions) = ovr.extensions {
        entry.extensions = extensions;
    }
    if let Some(workspace_markers) = ovr.workspace_markers {
        entry.workspace_markers = workspace_markers;
    }
}

/// Resolve the default config file path (`<config-dir>/yac/yac.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "yac")
        .map(|dirs| dirs.config_dir().join("yac.toml"))
}

/// Resolve the Unix socket path: `$XDG_RUNTIME_DIR/yac/<name>.sock`, falling
/// back to `/tmp/yac-<uid>.sock` when no runtime dir is configured.
pub fn default_socket_path() -> PathBuf {
    if let Some(dirs) = directories::BaseDirs::new() {
        if let Some(runtime_dir) = dirs.runtime_dir() {
            return runtime_dir.join("yac").join("daemon.sock");
        }
    }
    // SAFETY: getuid has no preconditions.
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/yac-{uid}.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_baseline_without_config_file() {
        let table = LanguageTable::load(None).unwrap();
        let entry = table.get("rust").unwrap();
        assert_eq!(entry.command, "rust-analyzer");
        assert_eq!(entry.extensions, vec!["rs"]);
    }

    #[test]
    fn detects_language_by_extension() {
        let table = LanguageTable::load(None).unwrap();
        let entry = table
            .detect_by_extension(std::path::Path::new("/p/src/main.rs"))
            .unwrap();
        assert_eq!(entry.language_id, "rust");
    }

    #[test]
    fn override_replaces_command_but_keeps_extensions_when_unspecified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yac.toml");
        std::fs::write(
            &path,
            r#"
            [[language]]
            language_id = "rust"
            command = "/custom/rust-analyzer"
            "#,
        )
        .unwrap();
        let table = LanguageTable::load(Some(&path)).unwrap();
        let entry = table.get("rust").unwrap();
        assert_eq!(entry.command, "/custom/rust-analyzer");
        assert_eq!(entry.extensions, vec!["rs"]);
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let table = LanguageTable::load(Some(std::path::Path::new("/nonexistent/yac.toml")));
        assert!(table.is_ok());
    }
}
