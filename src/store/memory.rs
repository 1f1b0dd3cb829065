use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;
use crate::store::SharedStore;

enum Value {
    Str(String),
    Counter(i64),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process store with the same atomicity contract as [`RedisStore`].
///
/// Backs tests and store-less local runs. All mutations happen under one
/// lock, so hash increments and push-and-trim are atomic with respect to
/// concurrent trackers on the same process.
///
/// [`RedisStore`]: crate::store::RedisStore
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ttl(ttl_secs: u64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(ttl_secs))
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut entries = self.entries.lock().expect("memory store mutex poisoned");
        entries.retain(|_, entry| !entry.is_expired());
        f(&mut entries)
    }

    /// Number of live keys; test helper.
    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_entries(|entries| {
            entries.get(key).and_then(|entry| match &entry.value {
                Value::Str(s) => Some(s.clone()),
                Value::Counter(n) => Some(n.to_string()),
                _ => None,
            })
        }))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: Self::ttl(ttl_secs),
                },
            );
        });
        Ok(())
    }

    async fn incr_ex(&self, key: &str, ttl_secs: u64) -> Result<i64> {
        Ok(self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Counter(0),
                expires_at: None,
            });
            entry.expires_at = Self::ttl(ttl_secs);
            if let Value::Counter(n) = &mut entry.value {
                *n += 1;
                *n
            } else {
                entry.value = Value::Counter(1);
                1
            }
        }))
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        Ok(self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            if !matches!(entry.value, Value::Hash(_)) {
                entry.value = Value::Hash(HashMap::new());
            }
            if let Value::Hash(hash) = &mut entry.value {
                let slot = hash.entry(field.to_string()).or_insert_with(|| "0".to_string());
                let next = slot.parse::<i64>().unwrap_or(0) + by;
                *slot = next.to_string();
                next
            } else {
                unreachable!()
            }
        }))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            if !matches!(entry.value, Value::Hash(_)) {
                entry.value = Value::Hash(HashMap::new());
            }
            if let Value::Hash(hash) = &mut entry.value {
                hash.insert(field.to_string(), value.to_string());
            }
        });
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.with_entries(|entries| {
            entries
                .get(key)
                .and_then(|entry| match &entry.value {
                    Value::Hash(hash) => Some(hash.clone()),
                    _ => None,
                })
                .unwrap_or_default()
        }))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Self::ttl(ttl_secs);
            }
        });
        Ok(())
    }

    async fn list_push_trim(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl_secs: u64,
    ) -> Result<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::List(VecDeque::new()),
                expires_at: None,
            });
            entry.expires_at = Self::ttl(ttl_secs);
            if !matches!(entry.value, Value::List(_)) {
                entry.value = Value::List(VecDeque::new());
            }
            if let Value::List(list) = &mut entry.value {
                list.push_front(value.to_string());
                list.truncate(max_len);
            }
        });
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        Ok(self.with_entries(|entries| {
            entries
                .get(key)
                .and_then(|entry| match &entry.value {
                    Value::List(list) => {
                        let len = list.len() as isize;
                        let resolve = |idx: isize| -> isize {
                            if idx < 0 {
                                (len + idx).max(0)
                            } else {
                                idx
                            }
                        };
                        let start = resolve(start).min(len) as usize;
                        let stop = resolve(stop).min(len - 1).max(-1);
                        if stop < start as isize {
                            return Some(Vec::new());
                        }
                        Some(
                            list.iter()
                                .skip(start)
                                .take(stop as usize - start + 1)
                                .cloned()
                                .collect(),
                        )
                    }
                    _ => None,
                })
                .unwrap_or_default()
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_ex_counts_from_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_ex("c", 60).await.unwrap(), 1);
        assert_eq!(store.incr_ex("c", 60).await.unwrap(), 2);
        assert_eq!(store.incr_ex("c", 60).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_hash_incr_is_per_field() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_incr("h", "a", 1).await.unwrap(), 1);
        assert_eq!(store.hash_incr("h", "a", 1).await.unwrap(), 2);
        assert_eq!(store.hash_incr("h", "b", 5).await.unwrap(), 5);

        let all = store.hash_get_all("h").await.unwrap();
        assert_eq!(all.get("a").map(String::as_str), Some("2"));
        assert_eq!(all.get("b").map(String::as_str), Some("5"));
    }

    #[tokio::test]
    async fn test_list_push_trim_keeps_newest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .list_push_trim("l", &i.to_string(), 3, 60)
                .await
                .unwrap();
        }
        let items = store.list_range("l", 0, -1).await.unwrap();
        assert_eq!(items, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_list_range_bounds() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store
                .list_push_trim("l", &i.to_string(), 10, 60)
                .await
                .unwrap();
        }
        assert_eq!(store.list_range("l", 0, 1).await.unwrap(), vec!["3", "2"]);
        assert_eq!(store.list_range("l", 0, 99).await.unwrap().len(), 4);
        assert!(store.list_range("l", 2, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_keys_are_dropped() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_hash_incr_loses_no_updates() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.hash_incr("h", "count", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.hash_incr("h", "count", 0).await.unwrap(), 800);
    }
}
