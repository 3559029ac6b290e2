//! Per-path write serialisation.
//!
//! Two writers targeting the same file take the same mutex; writers to
//! different files never contend. Keys are canonicalised so `./a.db` and
//! `/abs/a.db` share a lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

static PATH_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn lock_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    // Target may not exist yet; canonicalise the directory instead.
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// The mutex guarding writes to `path`.
pub fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let registry = PATH_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    // The registry only holds Arcs; a poisoned guard leaves it consistent.
    let mut map = registry.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(map.entry(lock_key(path)).or_default())
}

/// Run `f` while holding the write lock for `path`.
pub fn with_path_lock<T>(path: &Path, f: impl FnOnce() -> T) -> T {
    let lock = lock_for(path);
    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn same_file_shares_a_lock() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("notes.db");
        let b = dir.path().join(".").join("notes.db");
        assert!(Arc::ptr_eq(&lock_for(&a), &lock_for(&b)));
        assert!(!Arc::ptr_eq(&lock_for(&a), &lock_for(&dir.path().join("other.db"))));
    }

    #[test]
    fn writers_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("serial.json");
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    with_path_lock(&path, || {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
