use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::types::UserId;

/// Local mirror of who this session considers banned. When a path is
/// configured the set is persisted as a JSON array so bans survive a
/// restart; persistence failures are logged and otherwise ignored.
#[derive(Debug, Default)]
pub struct BanCache {
    users: Mutex<HashSet<UserId>>,
    path: Option<PathBuf>,
}

impl BanCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache backed by a file; an existing file is loaded immediately.
    pub fn persistent(path: PathBuf) -> Self {
        let users = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<UserId>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    log::warn!("ignoring unreadable ban file {}: {e}", path.display());
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };
        BanCache {
            users: Mutex::new(users),
            path: Some(path),
        }
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.lock().map(|u| u.contains(&id)).unwrap_or(false)
    }

    pub fn insert(&self, id: UserId) {
        if let Ok(mut users) = self.users.lock() {
            if users.insert(id) {
                self.save(&users);
            }
        }
    }

    pub fn remove(&self, id: UserId) {
        if let Ok(mut users) = self.users.lock() {
            if users.remove(&id) {
                self.save(&users);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<UserId> {
        self.users
            .lock()
            .map(|u| u.iter().copied().collect())
            .unwrap_or_default()
    }

    fn save(&self, users: &HashSet<UserId>) {
        let Some(path) = &self.path else {
            return;
        };
        let ids: Vec<UserId> = users.iter().copied().collect();
        match serde_json::to_string(&ids) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("could not persist bans to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("could not serialize ban list: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_set_semantics() {
        let cache = BanCache::in_memory();
        assert!(!cache.contains(1));
        cache.insert(1);
        cache.insert(1);
        assert!(cache.contains(1));
        assert_eq!(cache.snapshot(), vec![1]);
        cache.remove(1);
        assert!(!cache.contains(1));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!("bans-test-{}.json", std::process::id()));
        let _ = fs::remove_file(&path);

        let cache = BanCache::persistent(path.clone());
        cache.insert(42);
        cache.insert(99);
        drop(cache);

        let reloaded = BanCache::persistent(path.clone());
        assert!(reloaded.contains(42));
        assert!(reloaded.contains(99));
        assert!(!reloaded.contains(7));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_ignored() {
        let path = std::env::temp_dir().join(format!("bans-corrupt-{}.json", std::process::id()));
        fs::write(&path, "not json").unwrap();
        let cache = BanCache::persistent(path.clone());
        assert!(cache.snapshot().is_empty());
        let _ = fs::remove_file(&path);
    }
}
