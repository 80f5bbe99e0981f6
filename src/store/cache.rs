//! Process-local cache of live token sources, keyed by identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::identity::Identity;
use crate::lock::LockExt;
use crate::source::TokenSource;

/// A live token source and the last refresh token seen from it.
#[derive(Clone)]
pub struct CachedEntry {
    pub source: Arc<dyn TokenSource>,
    /// Compared against every token the source returns to detect rotation.
    pub refresh_token: String,
}

impl fmt::Debug for CachedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedEntry").finish_non_exhaustive()
    }
}

/// Mapping semantics only: no expiry, no I/O. Entries leave on `unset`.
pub trait TokenCache: Send + Sync {
    fn get(&self, identity: &Identity) -> Option<CachedEntry>;

    /// Insert or replace; a replaced source is dropped.
    fn set(&self, identity: &Identity, entry: CachedEntry);

    fn unset(&self, identity: &Identity);
}

#[derive(Default)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<Identity, CachedEntry>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, identity: &Identity) -> Option<CachedEntry> {
        self.entries.locked().get(identity).cloned()
    }

    fn set(&self, identity: &Identity, entry: CachedEntry) {
        self.entries
            .locked()
            .insert(identity.clone(), entry);
    }

    fn unset(&self, identity: &Identity) {
        self.entries.locked().remove(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use crate::token::Token;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl TokenSource for Fixed {
        async fn token(&self) -> Result<Token, ExchangeError> {
            Ok(Token::expired("r0"))
        }
    }

    fn entry(refresh_token: &str) -> CachedEntry {
        CachedEntry {
            source: Arc::new(Fixed),
            refresh_token: refresh_token.into(),
        }
    }

    #[test]
    fn test_get_set_unset() {
        let cache = MemoryTokenCache::new();
        let id = Identity::new("196");
        assert!(cache.get(&id).is_none());

        cache.set(&id, entry("r0"));
        assert_eq!(cache.get(&id).unwrap().refresh_token, "r0");

        cache.unset(&id);
        assert!(cache.get(&id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_replaces_entry() {
        let cache = MemoryTokenCache::new();
        let id = Identity::new("196");
        cache.set(&id, entry("r0"));
        cache.set(&id, entry("r0b"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&id).unwrap().refresh_token, "r0b");
    }

    #[test]
    fn test_concurrent_identities() {
        let cache = Arc::new(MemoryTokenCache::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let id = Identity::new(i.to_string());
                    for n in 0..100 {
                        cache.set(&id, entry(&format!("r{n}")));
                        assert!(cache.get(&id).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
