//! File-index scanning and the fuzzy path scorer used by `picker_query`.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

const MAX_INDEXED_PATHS: usize = 50_000;
const MAX_RESULTS: usize = 50;

/// Deterministic subsequence scorer. Higher is better; `0` means no match.
///
/// Tiers, first match wins: exact case-sensitive basename (10000), a
/// case-sensitive basename prefix (`5000 + min(len, 999)`), a
/// case-insensitive basename prefix (`2000 + min(len, 999)`), then a
/// case-insensitive subsequence match over the full path starting at 100
/// with positional bonuses.
pub fn score(text: &str, pattern: &str) -> u32 {
    if pattern.is_empty() {
        return 1000;
    }

    let basename = text.rsplit('/').next().unwrap_or(text);

    if basename == pattern {
        return 10_000;
    }
    if basename.starts_with(pattern) {
        return 5_000 + basename.len().min(999) as u32;
    }

    let basename_lower = basename.to_lowercase();
    let pattern_lower = pattern.to_lowercase();
    if basename_lower.starts_with(&pattern_lower) {
        return 2_000 + basename.len().min(999) as u32;
    }

    subsequence_score(text, &pattern_lower)
}

fn subsequence_score(text: &str, pattern_lower: &str) -> u32 {
    let text_chars: Vec<char> = text.chars().collect();
    let pattern_chars: Vec<char> = pattern_lower.chars().collect();
    let basename_start = text.rfind('/').map_or(0, |i| i + 1);

    let mut score: i64 = 100;
    let mut pi = 0usize;
    let mut last_match: Option<usize> = None;

    for (ti, &c) in text_chars.iter().enumerate() {
        if pi >= pattern_chars.len() {
            break;
        }
        if c.to_ascii_lowercase() != pattern_chars[pi] {
            continue;
        }

        if let Some(last) = last_match {
            if ti == last + 1 {
                score += 100;
            }
        }
        if ti > 0 {
            let prev = text_chars[ti - 1];
            if matches!(prev, '/' | '_' | '-' | '.') {
                score += 80;
            } else if prev.is_lowercase() && c.is_uppercase() {
                score += 60;
            }
        }
        if ti == basename_start {
            score += 150;
        }
        score -= (ti as i64).min(50);

        last_match = Some(ti);
        pi += 1;
    }

    if pi < pattern_chars.len() {
        return 0;
    }

    score.max(1) as u32
}

#[derive(Debug, Default)]
pub struct FileIndex {
    paths: Vec<String>,
    recent: Vec<String>,
    scanner: Option<Child>,
    carry: Vec<u8>,
}

impl FileIndex {
    pub fn new(recent: Vec<String>) -> Self {
        Self {
            paths: Vec::new(),
            recent,
            scanner: None,
            carry: Vec::new(),
        }
    }

    /// Spawn the path-enumeration child: prefer `fd`, fall back to `find`.
    pub fn spawn_scanner(&mut self, cwd: &std::path::Path) {
        let spawned = spawn_with(cwd, "fd", &["--type", "f", "--color", "never"])
            .or_else(|| spawn_with(cwd, "find", &[".", "-type", "f", "-not", "-path", "*/.git/*"]));
        match spawned {
            Some(child) => self.scanner = Some(child),
            None => warn!("no file scanner (fd/find) available on PATH"),
        }
    }

    pub fn scanner_stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        self.scanner.as_mut().and_then(|c| c.stdout.take())
    }

    /// Feed a chunk read from the scanner's stdout; complete lines are added
    /// to the index, up to the cap. Excess lines are dropped (logged once by
    /// the caller) rather than silently truncated without record.
    pub fn ingest(&mut self, chunk: &[u8]) {
        self.carry.extend_from_slice(chunk);
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).trim().to_string();
            if !line.is_empty() && self.paths.len() < MAX_INDEXED_PATHS {
                self.paths.push(line);
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(child) = self.scanner.take() {
            if let Some(id) = child.id() {
                // SAFETY: id is a valid pid owned by this process until reaped.
                unsafe {
                    libc::kill(id as libc::pid_t, libc::SIGKILL);
                }
            }
            debug!("picker scanner stopped");
        }
    }

    pub fn query(&self, query: &str) -> Vec<String> {
        if query.is_empty() {
            return self.recent.clone();
        }
        let mut scored: Vec<(u32, &String)> = self
            .paths
            .iter()
            .filter_map(|p| {
                let s = score(p, query);
                (s > 0).then_some((s, p))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_RESULTS)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn spawn_with(cwd: &std::path::Path, command: &str, args: &[&str]) -> Option<Child> {
    if which::which(command).is_err() {
        return None;
    }
    Command::new(command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_matches_everything() {
        assert_eq!(score("src/main.rs", ""), 1000);
    }

    #[test]
    fn exact_basename_outranks_prefix() {
        let exact = score("src/lib.rs", "lib.rs");
        let prefix = score("src/lib_helpers.rs", "lib");
        assert!(exact > prefix);
    }

    #[test]
    fn prefix_outranks_subsequence_only() {
        let prefix = score("src/libfoo.rs", "lib");
        let subsequence = score("src/a_l_i_b.rs", "lib");
        assert!(prefix > subsequence);
    }

    #[test]
    fn case_sensitive_prefix_outranks_case_insensitive() {
        let cs = score("src/Lib.rs", "Lib");
        let ci = score("src/lib.rs", "Lib");
        assert!(cs > ci);
    }

    #[test]
    fn no_match_returns_zero() {
        assert_eq!(score("src/main.rs", "xyz"), 0);
    }

    #[test]
    fn ranks_lib_over_main_for_lib_query() {
        let lib = score("src/lib.rs", "lib");
        let main = score("src/main.rs", "lib");
        assert!(lib > main);
    }

    #[test]
    fn query_with_empty_string_returns_recent_files() {
        let index = FileIndex::new(vec!["/p/x.rs".into()]);
        assert_eq!(index.query(""), vec!["/p/x.rs".to_string()]);
    }

    #[test]
    fn ingest_splits_on_newlines_and_caps_size() {
        let mut index = FileIndex::new(vec![]);
        index.ingest(b"a.rs\nb.rs\n");
        index.ingest(b"c.r");
        index.ingest(b"s\n");
        assert_eq!(index.len(), 3);
    }
}
