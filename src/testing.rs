//! Test doubles for the external collaborators

use crate::cache::CacheEntry;
use crate::error::{DepcacheError, DepcacheResult};
use crate::installer::PackageInstaller;
use crate::manifest::{DependencyManifest, DependencySpec, Variant};
use crate::repository::RepositoryClient;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct RepoState {
    files: BTreeMap<String, Vec<u8>>,
    pending: BTreeMap<PathBuf, Vec<String>>,
    race_on_commit: Vec<(String, Vec<u8>)>,
    race_on_remove: Vec<String>,
    checkouts: usize,
    updates: usize,
    commits: usize,
    removes: usize,
    last_message: Option<String>,
}

/// In-memory repository with svn-like commit semantics
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
    unreachable: AtomicBool,
    commit_conflicts: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state.lock().unwrap()
    }

    fn reachable(&self, op: &str) -> DepcacheResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(DepcacheError::external_tool(
                format!("svn {op}"),
                Some(1),
                "svn: E170013: Unable to connect to a repository",
            ))
        } else {
            Ok(())
        }
    }

    pub fn seed_file(&self, name: &str, contents: &[u8]) {
        self.state().files.insert(name.to_string(), contents.to_vec());
    }

    /// Store placeholder blobs for every root of `entry`
    pub fn seed_entry(&self, entry: &CacheEntry) {
        for name in entry.blob_names() {
            self.seed_file(&name, entry.fingerprint().as_str().as_bytes());
        }
    }

    /// Another agent commits `entry` just before our next commit lands
    pub fn race_before_commit(&self, entry: &CacheEntry) {
        let blobs = entry
            .blob_names()
            .into_iter()
            .map(|name| (name, b"other agent".to_vec()))
            .collect();
        self.state().race_on_commit = blobs;
    }

    /// Another agent deletes `entry` just before our next removal lands
    pub fn race_before_remove(&self, entry: &CacheEntry) {
        self.state().race_on_remove = entry.blob_names();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reject every commit as conflicting without anything landing
    pub fn set_commit_conflicts(&self, conflicts: bool) {
        self.commit_conflicts.store(conflicts, Ordering::SeqCst);
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.state().files.keys().cloned().collect()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state().files.get(name).cloned()
    }

    pub fn checkouts(&self) -> usize {
        self.state().checkouts
    }

    pub fn updates(&self) -> usize {
        self.state().updates
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    pub fn removes(&self) -> usize {
        self.state().removes
    }

    pub fn last_message(&self) -> Option<String> {
        self.state().last_message.clone()
    }
}

#[async_trait]
impl RepositoryClient for MemoryRepository {
    fn location(&self) -> &str {
        "memory://cache"
    }

    async fn checkout_metadata(&self, wc: &Path) -> DepcacheResult<()> {
        self.reachable("checkout")?;
        std::fs::create_dir_all(wc).unwrap();
        self.state().checkouts += 1;
        Ok(())
    }

    async fn list(&self, _wc: &Path) -> DepcacheResult<Vec<String>> {
        self.reachable("list")?;
        Ok(self.names().into_iter().collect())
    }

    async fn update(&self, wc: &Path, names: &[String]) -> DepcacheResult<()> {
        self.reachable("update")?;
        let mut state = self.state();
        state.updates += 1;
        for name in names {
            let contents = state.files.get(name).cloned().ok_or_else(|| {
                let stderr = format!("svn: E155010: '{name}' not found");
                DepcacheError::external_tool("svn update", Some(1), stderr)
            })?;
            std::fs::write(wc.join(name), contents).unwrap();
        }
        Ok(())
    }

    async fn add(&self, wc: &Path, names: &[String]) -> DepcacheResult<()> {
        self.reachable("add")?;
        for name in names {
            if !wc.join(name).is_file() {
                return Err(DepcacheError::external_tool(
                    "svn add",
                    Some(1),
                    format!("svn: E155010: '{name}' not found"),
                ));
            }
        }
        self.state()
            .pending
            .entry(wc.to_path_buf())
            .or_default()
            .extend(names.iter().cloned());
        Ok(())
    }

    async fn commit(&self, wc: &Path, message: &str) -> DepcacheResult<()> {
        self.reachable("commit")?;
        let mut state = self.state();
        let raced = std::mem::take(&mut state.race_on_commit);
        state.files.extend(raced);

        let pending = state.pending.remove(wc).unwrap_or_default();
        let conflicted = self.commit_conflicts.load(Ordering::SeqCst)
            || pending.iter().any(|name| state.files.contains_key(name));
        if conflicted {
            return Err(DepcacheError::RepositoryConflict {
                command: "svn commit".to_string(),
                stderr: "svn: E160020: File already exists".to_string(),
            });
        }

        for name in pending {
            let contents = std::fs::read(wc.join(&name)).unwrap();
            state.files.insert(name, contents);
        }
        state.commits += 1;
        state.last_message = Some(message.to_string());
        Ok(())
    }

    async fn remove(&self, names: &[String], message: &str) -> DepcacheResult<()> {
        self.reachable("delete")?;
        let mut state = self.state();
        for name in std::mem::take(&mut state.race_on_remove) {
            state.files.remove(&name);
        }

        if let Some(missing) = names.iter().find(|name| !state.files.contains_key(*name)) {
            return Err(DepcacheError::external_tool(
                "svn delete",
                Some(1),
                format!("svn: E160013: path '{missing}' not found"),
            ));
        }

        for name in names {
            state.files.remove(name);
        }
        state.removes += 1;
        state.last_message = Some(message.to_string());
        Ok(())
    }
}

/// How a [`CountingInstaller`] behaves when called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerMode {
    Succeed,
    Fail,
    TimeOut,
}

/// Installer that writes a fixed set of files and counts its invocations
pub struct CountingInstaller {
    files: Vec<(PathBuf, String)>,
    mode: InstallerMode,
    calls: AtomicUsize,
    seen_manifests: Mutex<Vec<String>>,
}

impl CountingInstaller {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(path, contents)| (PathBuf::from(path), contents.to_string()))
                .collect(),
            mode: InstallerMode::Succeed,
            calls: AtomicUsize::new(0),
            seen_manifests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mode(mut self, mode: InstallerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Generated manifest files present in the working directory during
    /// the most recent install
    pub fn seen_manifests(&self) -> Vec<String> {
        self.seen_manifests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageInstaller for CountingInstaller {
    async fn install(&self, work_dir: &Path) -> DepcacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let seen = crate::manifest::ecosystem::GENERATED_FILES
            .iter()
            .filter(|name| work_dir.join(name).exists())
            .map(|name| name.to_string())
            .collect();
        *self.seen_manifests.lock().unwrap() = seen;

        match self.mode {
            InstallerMode::Succeed => {}
            InstallerMode::Fail => {
                return Err(DepcacheError::external_tool("npm install", Some(1), "npm ERR! 404"));
            }
            InstallerMode::TimeOut => {
                return Err(DepcacheError::Timeout {
                    command: "npm install".to_string(),
                    timeout: Duration::from_millis(10),
                });
            }
        }

        for (path, contents) in &self.files {
            let path = work_dir.join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        Ok(())
    }
}

/// `{a: registry 1.0.0, b: vcs repo#c1}`
pub fn scenario_manifest() -> DependencyManifest {
    DependencyManifest::new(
        Variant::Production,
        vec![
            DependencySpec::registry("a", "1.0.0"),
            DependencySpec::vcs("b", "https://example.com/b.git", "c1"),
        ],
        BTreeMap::new(),
    )
    .unwrap()
}

/// Installer that materializes [`scenario_manifest`]
pub fn scenario_installer() -> CountingInstaller {
    CountingInstaller::new(&[
        ("node_modules/a/package.json", r#"{"name":"a","version":"1.0.0"}"#),
        ("node_modules/a/index.js", "module.exports = 'a';"),
        ("libs/b/b.js", "window.b = true;"),
    ])
}
