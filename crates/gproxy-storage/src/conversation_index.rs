//! sled-backed `ConversationIndexStore`: the persistence half of the Gemini
//! Web conversation index. Hashing and hash-list construction live in
//! `gproxy-provider-core::conversation_index`; this is just the embedded KV
//! layer underneath it, keyed by hash bytes with a JSON-encoded value.

use std::path::Path;

use gproxy_provider_core::conversation_index::{ConversationIndexStore, MatchRecord};

const TREE_NAME: &str = "matches";

pub struct SledConversationIndex {
    tree: sled::Tree,
}

impl SledConversationIndex {
    /// Opens (creating if absent) the index at `dir/gemini-web-index.bolt`,
    /// with a 2-second lock-acquisition timeout so a stuck prior process
    /// doesn't hang startup indefinitely.
    pub fn open(dir: &Path) -> sled::Result<Self> {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join("gemini-web-index.bolt");
        let db = sled::Config::new()
            .path(&path)
            .use_compression(false)
            .open()?;
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }

    pub fn open_in_memory() -> sled::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }
}

#[async_trait::async_trait]
impl ConversationIndexStore for SledConversationIndex {
    async fn get(&self, hash: &str) -> Option<MatchRecord> {
        let tree = self.tree.clone();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let bytes = tree.get(hash.as_bytes()).ok().flatten()?;
            serde_json::from_slice::<MatchRecord>(&bytes).ok()
        })
        .await
        .ok()
        .flatten()
    }

    async fn put(&self, hash: &str, record: MatchRecord) {
        let tree = self.tree.clone();
        let hash = hash.to_string();
        let Ok(encoded) = serde_json::to_vec(&record) else {
            return;
        };
        let _ = tokio::task::spawn_blocking(move || {
            let _ = tree.insert(hash.as_bytes(), encoded);
            let _ = tree.flush();
        })
        .await;
    }

    async fn remove_matches_by_label(&self, label: &str) {
        let tree = self.tree.clone();
        let target = label.trim().to_ascii_lowercase();
        let _ = tokio::task::spawn_blocking(move || {
            let mut to_remove = Vec::new();
            for entry in tree.iter().flatten() {
                let (key, value) = entry;
                let Ok(record) = serde_json::from_slice::<MatchRecord>(&value) else {
                    continue;
                };
                if record.account_label.trim().eq_ignore_ascii_case(&target) {
                    to_remove.push(key);
                }
            }
            for key in to_remove {
                let _ = tree.remove(key);
            }
            let _ = tree.flush();
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: &str, prefix_len: i64) -> MatchRecord {
        MatchRecord {
            account_label: label.to_string(),
            metadata: vec![],
            prefix_len,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let store = SledConversationIndex::open_in_memory().expect("open index");
        store.put("hash-a", record("acct-1", 3)).await;
        let got = store.get("hash-a").await.expect("record present");
        assert_eq!(got.account_label, "acct-1");
        assert_eq!(got.prefix_len, 3);
    }

    #[tokio::test]
    async fn missing_hash_returns_none() {
        let store = SledConversationIndex::open_in_memory().expect("open index");
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn remove_matches_by_label_is_case_insensitive_and_trims() {
        let store = SledConversationIndex::open_in_memory().expect("open index");
        store.put("hash-a", record("Acct-1", 2)).await;
        store.put("hash-b", record(" acct-1 ", 5)).await;
        store.put("hash-c", record("acct-2", 2)).await;

        store.remove_matches_by_label("acct-1").await;

        assert!(store.get("hash-a").await.is_none());
        assert!(store.get("hash-b").await.is_none());
        assert!(store.get("hash-c").await.is_some());
    }
}
