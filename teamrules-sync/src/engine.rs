//! Registry engine: the per-workspace facade collaborators hold on to.
//!
//! One engine is constructed per workspace with an injected
//! [`ProcessRunner`] and [`StateStore`]. Mutating operations (add, remove,
//! restore, commit, push, pull, fetch-rebase-push) are serialised behind a
//! single operation lock: git is not safe to run concurrently against one
//! working tree. Status reads only take the descriptor read lock and never
//! fail; they degrade to `unmodified` / `no-remote`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::broadcast;

use teamrules_core::types::CHECKOUT_DIR;
use teamrules_core::{
    config, state, DetailedFileStatus, EngineConfig, FileStateStore, FileStatus,
    FileStatusEntry, RegistryDescriptor, RegistryEvent, RegistryStatus, StateStore,
    WorkspaceKey,
};

use crate::enumerate::{enumerate, to_slash_path};
use crate::error::{io_err, SyncError};
use crate::fetcher::clone_sparse;
use crate::ignore_file;
use crate::process::{Git, ProcessRunner, SystemRunner};
use crate::projector::{ProjectionReport, Projector};
use crate::status;

const EVENT_CAPACITY: usize = 16;

/// Outcome of [`RegistryEngine::restore`].
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub descriptor: RegistryDescriptor,
    /// What the link repair pass did for each file.
    pub projection: ProjectionReport,
}

/// Outcome of [`RegistryEngine::add_registry`].
#[derive(Debug, Clone)]
pub struct AddResult {
    pub descriptor: RegistryDescriptor,
    /// Branch the checkout was materialised from.
    pub branch: String,
    pub projection: ProjectionReport,
}

/// Synchronisation engine for the single team registry of one workspace.
pub struct RegistryEngine {
    workspace_root: PathBuf,
    config: EngineConfig,
    subtree: String,
    key: WorkspaceKey,
    storage_root: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    store: Arc<dyn StateStore>,
    projector: Projector,
    active: RwLock<Option<RegistryDescriptor>>,
    op_lock: Mutex<()>,
    events: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for RegistryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEngine")
            .field("workspace_root", &self.workspace_root)
            .field("key", &self.key)
            .field("subtree", &self.subtree)
            .finish_non_exhaustive()
    }
}

impl RegistryEngine {
    /// Build an engine for `workspace_root` (expected to be absolute).
    ///
    /// Checkouts are created under `{storage_root}/{key}`. No state is
    /// loaded; call [`restore`](Self::restore) on startup.
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        config: EngineConfig,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn StateStore>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let key = WorkspaceKey::for_workspace(&workspace_root);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            projector: Projector::new(workspace_root.clone(), &config.normalized_subtree()),
            subtree: config.normalized_subtree(),
            workspace_root,
            config,
            key,
            storage_root: storage_root.into(),
            runner,
            store,
            active: RwLock::new(None),
            op_lock: Mutex::new(()),
            events,
        }
    }

    /// Production wiring rooted at `home`: config from
    /// `~/.teamrules/config.yaml`, JSON state store, system git.
    /// `git_binary` overrides the configured binary.
    pub fn open_at(
        home: &Path,
        workspace_root: &Path,
        git_binary: Option<&str>,
    ) -> Result<Self, SyncError> {
        let mut config = config::load_at(home)?;
        if let Some(git_binary) = git_binary {
            config.git_binary = git_binary.to_string();
        }
        Ok(Self::new(
            workspace_root,
            config,
            Arc::new(SystemRunner),
            Arc::new(FileStateStore::at(home)),
            state::storage_root_at(home),
        ))
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn key(&self) -> &WorkspaceKey {
        &self.key
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `{storage_root}/{key}`: where this workspace's checkout lives.
    pub fn storage_location(&self) -> PathBuf {
        self.storage_root.join(&self.key.0)
    }

    /// Receive an event whenever the active registry is added, removed or
    /// restored. Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the active descriptor.
    pub fn active_registry(&self) -> Option<RegistryDescriptor> {
        self.read_active().clone()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Startup recovery: reload the persisted descriptor, drop it when its
    /// checkout vanished, otherwise repair the projected links.
    pub fn restore(&self) -> Result<Option<RestoreResult>, SyncError> {
        let _guard = self.lock_ops();

        let Some(descriptor) = self.store.load(&self.key)? else {
            *self.write_active() = None;
            return Ok(None);
        };

        if !descriptor.storage_location.exists() {
            tracing::info!(
                key = %self.key,
                storage = %descriptor.storage_location.display(),
                "checkout missing; clearing stale registry state"
            );
            self.store.clear(&self.key)?;
            *self.write_active() = None;
            return Ok(None);
        }

        let projection = self
            .projector
            .verify_and_repair(&descriptor.storage_location, &descriptor.files)?;
        *self.write_active() = Some(descriptor.clone());
        self.emit(RegistryEvent::Restored(descriptor.clone()));
        tracing::info!(
            remote = %descriptor.remote_url,
            files = descriptor.files.len(),
            repaired = projection.changed(),
            "registry restored"
        );
        Ok(Some(RestoreResult {
            descriptor,
            projection,
        }))
    }

    /// Clone `remote_url`, link its rule files into the workspace and make it
    /// the active registry. Any previous registry is torn down first.
    pub fn add_registry(&self, remote_url: &str) -> Result<AddResult, SyncError> {
        let remote_url = remote_url.trim();
        if remote_url.is_empty() {
            return Err(SyncError::EmptyRemoteUrl);
        }
        let _guard = self.lock_ops();

        let previous = match self.active_registry() {
            Some(descriptor) => Some(descriptor),
            None => self.store.load(&self.key)?,
        };
        let replacing = previous.is_some();
        if let Some(previous) = previous {
            tracing::info!(remote = %previous.remote_url, "replacing active registry");
            self.teardown(&previous)?;
            *self.write_active() = None;
        }

        let storage_location = self.storage_location();
        let result = self.build_registry(remote_url, &storage_location);
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                remove_dir_if_exists(&storage_location).unwrap_or_else(|cleanup| {
                    tracing::warn!(error = %cleanup, "failed to clean up after add");
                });
                if replacing {
                    self.update_ignore_file(false);
                }
                return Err(err);
            }
        };

        self.update_ignore_file(true);
        *self.write_active() = Some(result.descriptor.clone());
        self.emit(RegistryEvent::Added(result.descriptor.clone()));
        tracing::info!(
            remote = remote_url,
            files = result.descriptor.files.len(),
            linked = result.projection.linked(),
            skipped = result.projection.skipped(),
            "registry added"
        );
        Ok(result)
    }

    fn build_registry(
        &self,
        remote_url: &str,
        storage_location: &Path,
    ) -> Result<AddResult, SyncError> {
        let branch = clone_sparse(&self.git(), remote_url, storage_location, &self.subtree)?;
        let descriptor = RegistryDescriptor::new(
            remote_url,
            storage_location.to_path_buf(),
            enumerate(
                &storage_location.join(CHECKOUT_DIR),
                &self.subtree,
                &self.config.extensions,
            )?,
        );

        let projection = match self.projector.project(storage_location, &descriptor.files) {
            Ok(projection) => projection,
            Err(err) => {
                self.rollback_links(&descriptor.files);
                return Err(err);
            }
        };
        if let Err(err) = self.store.save(&self.key, &descriptor) {
            self.rollback_links(&descriptor.files);
            return Err(err.into());
        }
        Ok(AddResult {
            descriptor,
            branch,
            projection,
        })
    }

    fn rollback_links(&self, files: &[String]) {
        if let Err(err) = self.projector.unproject(files) {
            tracing::warn!(error = %err, "failed to roll back projected links");
        }
    }

    /// Tear down the active registry. Returns `false` when none was active.
    pub fn remove_registry(&self) -> Result<bool, SyncError> {
        let _guard = self.lock_ops();

        let descriptor = match self.active_registry() {
            Some(descriptor) => descriptor,
            None => match self.store.load(&self.key)? {
                Some(descriptor) => descriptor,
                None => return Ok(false),
            },
        };

        self.teardown(&descriptor)?;
        self.update_ignore_file(false);
        *self.write_active() = None;
        self.emit(RegistryEvent::Removed);
        tracing::info!(remote = %descriptor.remote_url, "registry removed");
        Ok(true)
    }

    fn teardown(&self, descriptor: &RegistryDescriptor) -> Result<(), SyncError> {
        let report = self.projector.unproject(&descriptor.files)?;
        tracing::debug!(removed = report.changed(), "links removed");
        remove_dir_if_exists(&descriptor.storage_location)?;
        self.store.clear(&self.key)?;
        Ok(())
    }

    fn update_ignore_file(&self, add: bool) {
        if !self.config.manage_gitignore {
            return;
        }
        if !ignore_file::is_git_work_tree(&self.git(), &self.workspace_root) {
            return;
        }
        let entry = self.config.ignore_entry();
        let result = if add {
            ignore_file::add_entry(&self.workspace_root, &entry)
        } else {
            ignore_file::remove_entry(&self.workspace_root, &entry)
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "could not update workspace .gitignore");
        }
    }

    // -----------------------------------------------------------------------
    // Status reads
    // -----------------------------------------------------------------------

    /// Map a workspace path onto its repository-relative form.
    ///
    /// Accepts `\` separators, a leading `./`, and absolute paths inside the
    /// workspace. The result must lie under the tracked subtree.
    pub fn repo_path(&self, path: &str) -> Result<String, SyncError> {
        let outside = || SyncError::PathOutsideSubtree {
            path: path.to_string(),
            subtree: self.subtree.clone(),
        };

        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            let stripped = candidate
                .strip_prefix(&self.workspace_root)
                .map_err(|_| outside())?;
            to_slash_path(stripped)
        } else {
            path.replace('\\', "/")
        };
        let relative = relative.trim_start_matches("./");

        let escapes = relative.split('/').any(|part| part == "..");
        let prefix = format!("{}/", self.subtree);
        if escapes || !relative.starts_with(&prefix) {
            return Err(outside());
        }
        Ok(relative.to_string())
    }

    /// Coarse local status; `unmodified` when it cannot be determined.
    pub fn file_status(&self, path: &str) -> FileStatus {
        let Some((checkout, relative)) = self.resolve_read(path) else {
            return FileStatus::default();
        };
        status::file_status(&self.git(), &checkout, &relative).unwrap_or_else(|err| {
            tracing::warn!(path, error = %err, "file status unavailable");
            FileStatus::default()
        })
    }

    /// Local and remote status of one file; conservative defaults on failure.
    pub fn detailed_file_status(&self, path: &str) -> DetailedFileStatus {
        match self.resolve_read(path) {
            Some((checkout, relative)) => {
                status::detailed_file_status(&self.git(), &checkout, &relative)
            }
            None => DetailedFileStatus::default(),
        }
    }

    /// Status of every registry file plus the branch relationship.
    pub fn registry_status(&self) -> RegistryStatus {
        let Some(descriptor) = self.active_registry() else {
            return RegistryStatus::default();
        };
        let git = self.git();
        let checkout = descriptor.checkout_dir();
        let tracking = status::tracking(&git, &checkout);
        let files = descriptor
            .files
            .iter()
            .map(|file| FileStatusEntry {
                path: file.clone(),
                status: status::detailed_with_tracking(&git, &checkout, file, &tracking),
            })
            .collect();
        RegistryStatus {
            branch: tracking.branch,
            remote_status: tracking.remote_status,
            ahead: tracking.ahead,
            behind: tracking.behind,
            files,
        }
    }

    fn resolve_read(&self, path: &str) -> Option<(PathBuf, String)> {
        let descriptor = self.read_active();
        let descriptor = descriptor.as_ref()?;
        match self.repo_path(path) {
            Ok(relative) => Some((descriptor.checkout_dir(), relative)),
            Err(err) => {
                tracing::debug!(error = %err, "status query outside registry");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Stage exactly one file and commit it.
    pub fn stage_and_commit_file(&self, path: &str, message: &str) -> Result<(), SyncError> {
        let relative = self.repo_path(path)?;
        self.with_checkout(|git, checkout| {
            status::stage_and_commit(git, checkout, &relative, message)
        })
    }

    pub fn push_changes(&self) -> Result<(), SyncError> {
        self.with_checkout(status::push)
    }

    /// Pull, then re-enumerate so files added upstream get linked and files
    /// deleted upstream lose their links.
    pub fn pull_changes(&self) -> Result<ProjectionReport, SyncError> {
        let _guard = self.lock_ops();
        let descriptor = self.active_registry().ok_or(SyncError::NoActiveRegistry)?;
        let checkout = descriptor.checkout_dir();
        status::pull(&self.git(), &checkout)?;
        self.refresh_files(descriptor)
    }

    /// `fetch`, `rebase`, `push`; resolves a diverged branch when there are
    /// no conflicts. On failure the checkout is left for manual resolution.
    pub fn fetch_and_rebase_then_push(&self) -> Result<(), SyncError> {
        self.with_checkout(status::fetch_rebase_push)
    }

    fn refresh_files(
        &self,
        mut descriptor: RegistryDescriptor,
    ) -> Result<ProjectionReport, SyncError> {
        let files = enumerate(
            &descriptor.checkout_dir(),
            &self.subtree,
            &self.config.extensions,
        )?;
        let dropped: Vec<String> = descriptor
            .files
            .iter()
            .filter(|file| !files.contains(file))
            .cloned()
            .collect();

        let mut report = self.projector.unproject(&dropped)?;
        let projection = self
            .projector
            .verify_and_repair(&descriptor.storage_location, &files)?;
        report.outcomes.extend(projection.outcomes);

        if files != descriptor.files {
            tracing::info!(
                before = descriptor.files.len(),
                after = files.len(),
                "registry file list changed"
            );
            descriptor.files = files;
            self.store.save(&self.key, &descriptor)?;
            *self.write_active() = Some(descriptor);
        }
        Ok(report)
    }

    fn with_checkout<T>(
        &self,
        op: impl FnOnce(&Git<'_>, &Path) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let _guard = self.lock_ops();
        let checkout = self
            .read_active()
            .as_ref()
            .map(|d| d.checkout_dir())
            .ok_or(SyncError::NoActiveRegistry)?;
        op(&self.git(), &checkout)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn git(&self) -> Git<'_> {
        Git::new(self.runner.as_ref(), &self.config.git_binary)
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_ops(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_active(&self) -> std::sync::RwLockReadGuard<'_, Option<RegistryDescriptor>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_active(&self) -> std::sync::RwLockWriteGuard<'_, Option<RegistryDescriptor>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::fake::ScriptedRunner;
    use crate::process::ProcessError;
    use crate::projector::LinkOutcome;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use teamrules_core::types::join_slash_path;
    use teamrules_core::RemoteStatus;
    use tempfile::TempDir;

    /// Stands in for a remote: `clone` and `pull` materialise the published
    /// file set inside the checkout. Records whether two git invocations
    /// ever overlapped.
    struct FakeRemote {
        inner: ScriptedRunner,
        published: Mutex<Vec<String>>,
        reject_clones: AtomicBool,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
    }

    impl FakeRemote {
        fn new(inner: ScriptedRunner, files: &[&str]) -> Self {
            Self {
                inner,
                published: Mutex::new(files.iter().map(|f| f.to_string()).collect()),
                reject_clones: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
            }
        }

        fn publish(&self, files: &[&str]) {
            *self.published.lock().unwrap() = files.iter().map(|f| f.to_string()).collect();
        }

        fn materialise(&self, repo: &Path) {
            let rules = repo.join("rules");
            if rules.exists() {
                fs::remove_dir_all(&rules).unwrap();
            }
            fs::create_dir_all(&rules).unwrap();
            for file in self.published.lock().unwrap().iter() {
                let path = join_slash_path(repo, file);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, format!("content of {file}")).unwrap();
            }
        }
    }

    impl ProcessRunner for FakeRemote {
        fn run(&self, cwd: &Path, binary: &str, args: &[&str]) -> Result<String, ProcessError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            if args.first() == Some(&"push") {
                std::thread::sleep(Duration::from_millis(20));
            }
            let result = if args.first() == Some(&"clone") && self.reject_clones.load(Ordering::SeqCst)
            {
                Err(ProcessError::Failed {
                    binary: binary.to_string(),
                    args: args.iter().map(|a| a.to_string()).collect(),
                    exit_code: Some(128),
                    stderr: "fatal: repository not found".into(),
                })
            } else {
                self.inner.run(cwd, binary, args)
            };
            if result.is_ok() {
                match args.first() {
                    Some(&"clone") => self.materialise(Path::new(args[args.len() - 1])),
                    Some(&"pull") => self.materialise(cwd),
                    _ => {}
                }
            }
            self.in_flight.store(false, Ordering::SeqCst);
            result
        }
    }

    struct Harness {
        home: TempDir,
        workspace: TempDir,
        remote: Arc<FakeRemote>,
        store: Arc<FileStateStore>,
    }

    impl Harness {
        fn new(inner: ScriptedRunner, files: &[&str]) -> Self {
            let home = TempDir::new().unwrap();
            Self {
                store: Arc::new(FileStateStore::at(home.path())),
                home,
                workspace: TempDir::new().unwrap(),
                remote: Arc::new(FakeRemote::new(inner, files)),
            }
        }

        fn engine(&self) -> RegistryEngine {
            let config = EngineConfig {
                subtree: "rules".into(),
                ..EngineConfig::default()
            };
            RegistryEngine::new(
                self.workspace.path(),
                config,
                self.remote.clone(),
                self.store.clone(),
                self.home.path().join("storage"),
            )
        }

        fn link(&self, file: &str) -> PathBuf {
            join_slash_path(self.workspace.path(), file)
        }

        fn is_link(&self, file: &str) -> bool {
            fs::symlink_metadata(self.link(file))
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
        }
    }

    #[test]
    fn add_registry_links_files_and_persists_descriptor() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc", "rules/b.mdc", "rules/notes.txt"]);
        let engine = h.engine();
        let mut events = engine.subscribe();

        let added = engine.add_registry("https://git.example.com/team/rules.git").unwrap();

        assert_eq!(added.descriptor.files, vec!["rules/a.mdc", "rules/b.mdc"]);
        assert_eq!(added.branch, "main");
        assert_eq!(added.descriptor.storage_location, engine.storage_location());
        assert!(h.is_link("rules/a.mdc"));
        assert!(h.is_link("rules/b.mdc"));
        assert!(!h.link("rules/notes.txt").exists());
        assert_eq!(engine.file_status("rules/a.mdc"), FileStatus::Unmodified);
        assert_eq!(engine.file_status("rules/b.mdc"), FileStatus::Unmodified);

        let stored = h.store.load(engine.key()).unwrap().unwrap();
        assert_eq!(stored, added.descriptor);
        assert_eq!(engine.active_registry(), Some(added.descriptor.clone()));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Added(added.descriptor));
    }

    #[test]
    fn add_registry_keeps_local_files() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc", "rules/b.mdc"]);
        let local = h.link("rules/a.mdc");
        fs::create_dir_all(local.parent().unwrap()).unwrap();
        fs::write(&local, "local override").unwrap();

        let added = h.engine().add_registry("u").unwrap();
        assert_eq!(added.projection.skipped(), 1);
        assert_eq!(fs::read_to_string(&local).unwrap(), "local override");
        assert!(!h.is_link("rules/a.mdc"));
        assert!(h.is_link("rules/b.mdc"));
    }

    #[test]
    fn add_registry_replaces_previous_registry() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/old.mdc"]);
        let engine = h.engine();
        engine.add_registry("https://example.com/old.git").unwrap();

        h.remote.publish(&["rules/new.mdc"]);
        let added = engine.add_registry("https://example.com/new.git").unwrap();

        assert_eq!(added.descriptor.remote_url, "https://example.com/new.git");
        assert!(!h.is_link("rules/old.mdc"));
        assert!(h.is_link("rules/new.mdc"));
        let stored = h.store.load(engine.key()).unwrap().unwrap();
        assert_eq!(stored.files, vec!["rules/new.mdc"]);
    }

    #[test]
    fn failed_add_leaves_no_state_behind() {
        let inner = ScriptedRunner::new().fail(&["clone"], 128, "fatal: repository not found");
        let h = Harness::new(inner, &["rules/a.mdc"]);
        let engine = h.engine();

        let err = engine.add_registry("https://example.com/missing.git").unwrap_err();
        assert!(err.to_string().contains("repository not found"));
        assert!(engine.active_registry().is_none());
        assert!(h.store.load(engine.key()).unwrap().is_none());
        assert!(!engine.storage_location().join("repo").exists());
    }

    #[test]
    fn empty_remote_url_is_rejected() {
        let h = Harness::new(ScriptedRunner::new(), &[]);
        let err = h.engine().add_registry("   ").unwrap_err();
        assert!(matches!(err, SyncError::EmptyRemoteUrl));
        assert!(h.remote.inner.calls().is_empty());
    }

    #[test]
    fn remove_registry_tears_down_links_state_and_checkout() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc", "rules/b.mdc"]);
        let engine = h.engine();
        engine.add_registry("u").unwrap();

        // A user replaced one link with a real file in the meantime.
        let local = h.link("rules/b.mdc");
        fs::remove_file(&local).unwrap();
        fs::write(&local, "mine").unwrap();

        let mut events = engine.subscribe();
        assert!(engine.remove_registry().unwrap());

        assert!(!h.is_link("rules/a.mdc"));
        assert_eq!(fs::read_to_string(&local).unwrap(), "mine");
        assert!(!engine.storage_location().exists());
        assert!(h.store.load(engine.key()).unwrap().is_none());
        assert!(engine.active_registry().is_none());
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Removed);

        assert!(!engine.remove_registry().unwrap(), "second remove is a no-op");
    }

    #[test]
    fn restore_recreates_missing_links() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc", "rules/b.mdc"]);
        h.engine().add_registry("u").unwrap();
        fs::remove_file(h.link("rules/a.mdc")).unwrap();
        let kept_mtime = fs::symlink_metadata(h.link("rules/b.mdc"))
            .unwrap()
            .modified()
            .unwrap();

        let restarted = h.engine();
        let mut events = restarted.subscribe();
        let restored = restarted.restore().unwrap().expect("registry restored");
        assert_eq!(restored.projection.changed(), 1);
        assert!(matches!(
            &restored.projection.outcomes[0],
            LinkOutcome::Created { path } if *path == h.link("rules/a.mdc")
        ));
        assert!(matches!(restored.projection.outcomes[1], LinkOutcome::Unchanged { .. }));
        let restored = restored.descriptor;

        assert_eq!(restored.files, vec!["rules/a.mdc", "rules/b.mdc"]);
        assert!(h.is_link("rules/a.mdc"));
        let mtime = fs::symlink_metadata(h.link("rules/b.mdc"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(mtime, kept_mtime, "healthy link must not be recreated");
        assert_eq!(restarted.active_registry(), Some(restored.clone()));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Restored(restored));
    }

    #[test]
    fn restore_clears_state_when_checkout_vanished() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc"]);
        let engine = h.engine();
        engine.add_registry("u").unwrap();
        fs::remove_dir_all(engine.storage_location()).unwrap();

        let restarted = h.engine();
        assert!(restarted.restore().unwrap().is_none());
        assert!(restarted.active_registry().is_none());
        assert!(h.store.load(restarted.key()).unwrap().is_none());
    }

    #[test]
    fn restore_without_state_is_inactive() {
        let h = Harness::new(ScriptedRunner::new(), &[]);
        assert!(h.engine().restore().unwrap().is_none());
    }

    #[test]
    fn reads_degrade_without_registry() {
        let h = Harness::new(ScriptedRunner::new(), &[]);
        let engine = h.engine();
        assert_eq!(engine.file_status("rules/a.mdc"), FileStatus::Unmodified);
        let detailed = engine.detailed_file_status("rules/a.mdc");
        assert_eq!(detailed.remote_status, RemoteStatus::NoRemote);
        assert!(engine.registry_status().files.is_empty());
        assert!(h.remote.inner.calls().is_empty());
    }

    #[test]
    fn reads_degrade_on_tool_failure() {
        let inner = ScriptedRunner::new().fail(&["status"], 128, "fatal: index file corrupt");
        let h = Harness::new(inner, &["rules/a.mdc"]);
        let engine = h.engine();
        engine.add_registry("u").unwrap();
        assert_eq!(engine.file_status("rules/a.mdc"), FileStatus::Unmodified);
    }

    #[test]
    fn mutations_require_active_registry() {
        let h = Harness::new(ScriptedRunner::new(), &[]);
        let engine = h.engine();
        assert!(matches!(engine.push_changes(), Err(SyncError::NoActiveRegistry)));
        assert!(matches!(engine.pull_changes(), Err(SyncError::NoActiveRegistry)));
        assert!(matches!(
            engine.fetch_and_rebase_then_push(),
            Err(SyncError::NoActiveRegistry)
        ));
        assert!(matches!(
            engine.stage_and_commit_file("rules/a.mdc", "msg"),
            Err(SyncError::NoActiveRegistry)
        ));
    }

    #[test]
    fn repo_path_normalisation() {
        let h = Harness::new(ScriptedRunner::new(), &[]);
        let engine = h.engine();
        assert_eq!(engine.repo_path("rules/a.mdc").unwrap(), "rules/a.mdc");
        assert_eq!(engine.repo_path("./rules/a.mdc").unwrap(), "rules/a.mdc");
        assert_eq!(engine.repo_path("rules\\nested\\a.mdc").unwrap(), "rules/nested/a.mdc");
        let absolute = h.workspace.path().join("rules").join("a.mdc");
        assert_eq!(
            engine.repo_path(&absolute.to_string_lossy()).unwrap(),
            "rules/a.mdc"
        );

        for outside in ["src/main.rs", "rules", "rules/../secrets.mdc", "/etc/passwd"] {
            assert!(
                matches!(engine.repo_path(outside), Err(SyncError::PathOutsideSubtree { .. })),
                "{outside} must be rejected"
            );
        }
    }

    #[test]
    fn commit_runs_in_checkout_with_repo_relative_path() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc"]);
        let engine = h.engine();
        engine.add_registry("u").unwrap();
        engine.stage_and_commit_file("./rules/a.mdc", "Update a").unwrap();

        let calls = h.remote.inner.calls();
        let n = calls.len();
        assert_eq!(calls[n - 2], vec!["add", "--", "rules/a.mdc"]);
        assert_eq!(calls[n - 1], vec!["commit", "-m", "Update a"]);
        assert_eq!(
            h.remote.inner.cwds()[n - 1],
            engine.storage_location().join("repo")
        );
    }

    #[test]
    fn pull_links_new_files_and_unlinks_deleted_ones() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc", "rules/b.mdc"]);
        let engine = h.engine();
        engine.add_registry("u").unwrap();

        h.remote.publish(&["rules/b.mdc", "rules/c.mdc"]);
        engine.pull_changes().unwrap();

        assert!(!h.is_link("rules/a.mdc"));
        assert!(h.is_link("rules/b.mdc"));
        assert!(h.is_link("rules/c.mdc"));
        let active = engine.active_registry().unwrap();
        assert_eq!(active.files, vec!["rules/b.mdc", "rules/c.mdc"]);
        assert_eq!(h.store.load(engine.key()).unwrap().unwrap().files, active.files);
    }

    #[test]
    fn pull_failure_surfaces_stderr() {
        let inner = ScriptedRunner::new().fail(
            &["pull"],
            1,
            "fatal: Not possible to fast-forward, aborting.",
        );
        let h = Harness::new(inner, &["rules/a.mdc"]);
        let engine = h.engine();
        engine.add_registry("u").unwrap();
        let err = engine.pull_changes().unwrap_err();
        assert!(err.to_string().contains("Not possible to fast-forward"));
    }

    #[test]
    fn gitignore_entry_follows_registry_in_git_workspaces() {
        let inner = ScriptedRunner::new().ok(&["rev-parse", "--is-inside-work-tree"], "true\n");
        let h = Harness::new(inner, &["rules/a.mdc"]);
        let engine = h.engine();
        let gitignore = h.workspace.path().join(".gitignore");

        engine.add_registry("u").unwrap();
        assert_eq!(fs::read_to_string(&gitignore).unwrap(), "rules/\n");

        engine.remove_registry().unwrap();
        assert_eq!(fs::read_to_string(&gitignore).unwrap(), "");
    }

    #[test]
    fn failed_replacement_drops_gitignore_entry() {
        let inner = ScriptedRunner::new().ok(&["rev-parse", "--is-inside-work-tree"], "true\n");
        let h = Harness::new(inner, &["rules/a.mdc"]);
        let engine = h.engine();
        let gitignore = h.workspace.path().join(".gitignore");
        fs::write(&gitignore, "target/\n").unwrap();

        engine.add_registry("https://example.com/old.git").unwrap();
        assert_eq!(fs::read_to_string(&gitignore).unwrap(), "target/\nrules/\n");

        h.remote.reject_clones.store(true, Ordering::SeqCst);
        engine.add_registry("https://example.com/new.git").unwrap_err();

        assert!(engine.active_registry().is_none());
        assert!(!h.is_link("rules/a.mdc"));
        assert_eq!(fs::read_to_string(&gitignore).unwrap(), "target/\n");
    }

    #[test]
    fn gitignore_untouched_outside_git() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc"]);
        h.engine().add_registry("u").unwrap();
        assert!(!h.workspace.path().join(".gitignore").exists());
    }

    #[test]
    fn concurrent_mutations_are_serialised() {
        let h = Harness::new(ScriptedRunner::new(), &["rules/a.mdc"]);
        let engine = Arc::new(h.engine());
        engine.add_registry("u").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.push_changes())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(!h.remote.overlapped.load(Ordering::SeqCst));
    }
}
