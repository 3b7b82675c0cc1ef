use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::debug;

use provx_domain::ProfileLoader;

use crate::config::Config;
use crate::index::codec::{save_index, SaveOutcome};
use crate::index::ProfileIndex;
use crate::reconcile::{ReconcileKind, Reconciled, Reconciler};

static PATH_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
static SHARED_HANDLES: OnceLock<Mutex<HashMap<PathBuf, Arc<IndexHandle>>>> = OnceLock::new();

/// Owns the last known good index for one cache file.
///
/// Every handle on the same cache path serializes its reconcile passes
/// through one process-wide lock. Snapshots handed out are immutable, so
/// queries run without holding it.
#[derive(Debug)]
pub struct IndexHandle {
    directories: Vec<PathBuf>,
    cache_path: PathBuf,
    loader: ProfileLoader,
    path_lock: Arc<Mutex<()>>,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    current: Option<Arc<ProfileIndex>>,
    unsaved: bool,
}

impl IndexHandle {
    pub fn open(config: &Config) -> Self {
        Self::with_loader(
            config.directory_paths(),
            config.index_path().to_path_buf(),
            ProfileLoader::default(),
        )
    }

    pub fn with_loader(
        directories: Vec<PathBuf>,
        cache_path: PathBuf,
        loader: ProfileLoader,
    ) -> Self {
        let path_lock = path_lock(&cache_path);
        Self {
            directories,
            cache_path,
            loader,
            path_lock,
            state: Mutex::new(State::default()),
        }
    }

    /// The process-wide handle for `config`'s cache path, created on first use.
    pub fn shared(config: &Config) -> Arc<Self> {
        let registry = SHARED_HANDLES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut handles = lock(registry);
        handles
            .entry(config.index_path().to_path_buf())
            .or_insert_with(|| Arc::new(Self::open(config)))
            .clone()
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn loader(&self) -> &ProfileLoader {
        &self.loader
    }

    /// An index consistent with the directories as of this call.
    pub fn snapshot(&self) -> Arc<ProfileIndex> {
        self.refresh().index
    }

    /// Like [`IndexHandle::snapshot`], also reporting what the pass did.
    pub fn refresh(&self) -> Reconciled {
        let _guard = lock(&self.path_lock);
        let previous = lock(&self.state).current.clone();
        let reconciled = self.reconciler().reconcile(previous);
        self.store(reconciled)
    }

    /// Re-parses every profile regardless of the cached state.
    pub fn rebuild(&self) -> Reconciled {
        let _guard = lock(&self.path_lock);
        let reconciled = self.reconciler().rebuild();
        self.store(reconciled)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.directories, &self.cache_path, &self.loader)
    }

    fn store(&self, mut reconciled: Reconciled) -> Reconciled {
        let mut state = lock(&self.state);
        if reconciled.report.kind == ReconcileKind::Fresh
            && (state.unsaved || !self.cache_path.is_file())
        {
            debug!(
                path = %self.cache_path.display(),
                unsaved = state.unsaved,
                "rewriting profile index"
            );
            reconciled.report.save = Some(save_index(&reconciled.index, &self.cache_path));
        }
        if let Some(outcome) = reconciled.report.save {
            state.unsaved = outcome == SaveOutcome::Failed;
        }
        state.current = Some(Arc::clone(&reconciled.index));
        reconciled
    }
}

fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let registry = PATH_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = lock(registry);
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_on_one_path_share_a_lock() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = temp.path().join("shared.index");
        let first = IndexHandle::with_loader(Vec::new(), cache.clone(), ProfileLoader::default());
        let second = IndexHandle::with_loader(Vec::new(), cache, ProfileLoader::default());
        assert!(Arc::ptr_eq(&first.path_lock, &second.path_lock));

        let other = IndexHandle::with_loader(
            Vec::new(),
            temp.path().join("other.index"),
            ProfileLoader::default(),
        );
        assert!(!Arc::ptr_eq(&first.path_lock, &other.path_lock));
    }

    #[test]
    fn shared_returns_one_handle_per_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = Config::new(Vec::new(), temp.path().join("profiles.index"));
        let first = IndexHandle::shared(&config);
        let second = IndexHandle::shared(&config);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_directories_yield_an_empty_saved_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = temp.path().join("profiles.index");
        let handle = IndexHandle::with_loader(
            vec![temp.path().join("missing")],
            cache.clone(),
            ProfileLoader::default(),
        );
        let reconciled = handle.refresh();
        assert_eq!(reconciled.report.kind, ReconcileKind::Rebuilt);
        assert!(reconciled.index.is_empty());
        assert!(cache.is_file());

        let again = handle.refresh();
        assert_eq!(again.report.kind, ReconcileKind::Fresh);
        assert!(Arc::ptr_eq(&reconciled.index, &again.index));
    }
}
