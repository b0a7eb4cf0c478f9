//! Content-addressed hash → bound-credential-label map used to keep a
//! multi-turn Gemini Web conversation pinned to the same scraped account.
//!
//! Hashing and hash-list construction are pure and live here; the persisted
//! store is a trait (`ConversationIndexStore`) so the sled-backed
//! implementation can live in `gproxy-storage`, which depends on this crate
//! and not the other way around.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MatchRecord {
    pub account_label: String,
    #[serde(default)]
    pub metadata: Vec<String>,
    pub prefix_len: i64,
    pub updated_at: i64,
}

impl MatchRecord {
    /// Reads that find an empty label or a non-positive prefix length are
    /// treated as absent records (stale writes, or a record cleared in place).
    pub fn is_present(&self) -> bool {
        !self.account_label.trim().is_empty() && self.prefix_len > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationRole {
    User,
    Assistant,
    System,
    Tool,
}

impl ConversationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationRole::User => "user",
            ConversationRole::Assistant => "assistant",
            ConversationRole::System => "system",
            ConversationRole::Tool => "tool",
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "assistant" | "model" => ConversationRole::Assistant,
            "system" => ConversationRole::System,
            "tool" => ConversationRole::Tool,
            _ => ConversationRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub text: String,
}

impl ConversationMessage {
    pub fn new(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::parse(role),
            text: text.into(),
        }
    }
}

const GLOBAL_PREFIX: &str = "global";

/// Strips `<think>...</think>` blocks from assistant text before hashing, so
/// a model that changes its internal narration doesn't break stickiness.
pub fn sanitize_assistant_text(role: ConversationRole, text: &str) -> String {
    if role != ConversationRole::Assistant {
        return text.to_string();
    }
    strip_think_blocks(text)
}

fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = find_ci(rest, "<think>") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + "<think>".len()..];
        match find_ci(after_open, "</think>") {
            Some(end) => {
                rest = &after_open[end + "</think>".len()..];
            }
            None => break,
        }
    }
    out
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let haystack_lower = haystack.to_ascii_lowercase();
    let needle_lower = needle.to_ascii_lowercase();
    haystack_lower.find(&needle_lower)
}

/// Strips an optional `-web` suffix or maps known Gemini Web aliases onto
/// their canonical API model name.
pub fn normalize_model(model: &str) -> String {
    let trimmed = model.trim();
    let stripped = trimmed.strip_suffix("-web").unwrap_or(trimmed);
    match stripped {
        "gemini-2.5-flash-image-preview" => "gemini-2.5-flash".to_string(),
        other => other.to_string(),
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn message_json(role: ConversationRole, content: &str) -> String {
    // Matches `{"content":%q,"role":%q}` Go-style quoting via serde_json's
    // standard string escaping, which produces the same shape.
    serde_json::json!({"content": content, "role": role.as_str()}).to_string()
}

/// `H = sha256(lower(trim(prefix)) "|" lower(trim(model)) "|" sha256(per-message-json) "|" …)`
pub fn hash_conversation(prefix: &str, model: &str, messages: &[ConversationMessage]) -> String {
    let mut parts = vec![
        prefix.trim().to_ascii_lowercase(),
        normalize_model(model).trim().to_ascii_lowercase(),
    ];
    for message in messages {
        let sanitized = sanitize_assistant_text(message.role, &message.text);
        let json = message_json(message.role, &sanitized);
        parts.push(sha256_hex(&json));
    }
    sha256_hex(&parts.join("|"))
}

pub fn hash_conversation_global(model: &str, messages: &[ConversationMessage]) -> String {
    hash_conversation(GLOBAL_PREFIX, model, messages)
}

/// Selector-side: hashes for every contiguous suffix of length >= 2 ending in
/// an assistant or system role, longest first, deduplicated.
pub fn build_lookup_hashes(model: &str, messages: &[ConversationMessage]) -> Vec<String> {
    let mut hashes = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for end in (2..=messages.len()).rev() {
        let slice = &messages[..end];
        let Some(last) = slice.last() else { continue };
        if !matches!(last.role, ConversationRole::Assistant | ConversationRole::System) {
            continue;
        }
        let hash = hash_conversation_global(model, slice);
        if seen.insert(hash.clone()) {
            hashes.push(hash);
        }
    }
    hashes
}

/// Persistence-side: every contiguous suffix starting at every offset,
/// deduplicated, falling back to the full message list if nothing qualifies.
pub fn build_storage_hashes(model: &str, messages: &[ConversationMessage]) -> Vec<String> {
    let mut hashes = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for start in 0..messages.len() {
        let slice = &messages[start..];
        if slice.len() < 2 {
            continue;
        }
        let hash = hash_conversation_global(model, slice);
        if seen.insert(hash.clone()) {
            hashes.push(hash);
        }
    }
    if hashes.is_empty() && !messages.is_empty() {
        hashes.push(hash_conversation_global(model, messages));
    }
    hashes
}

#[async_trait::async_trait]
pub trait ConversationIndexStore: Send + Sync {
    async fn get(&self, hash: &str) -> Option<MatchRecord>;
    async fn put(&self, hash: &str, record: MatchRecord);
    /// Scans and deletes all records whose label equals `label`
    /// (case-insensitive, trimmed).
    async fn remove_matches_by_label(&self, label: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(pairs: &[(&str, &str)]) -> Vec<ConversationMessage> {
        pairs
            .iter()
            .map(|(role, text)| ConversationMessage::new(role, *text))
            .collect()
    }

    #[test]
    fn hash_is_deterministic_and_order_sensitive() {
        let a = msgs(&[("user", "hi"), ("assistant", "hello")]);
        let b = msgs(&[("assistant", "hello"), ("user", "hi")]);
        assert_eq!(
            hash_conversation_global("gemini-2.5-pro", &a),
            hash_conversation_global("gemini-2.5-pro", &a)
        );
        assert_ne!(
            hash_conversation_global("gemini-2.5-pro", &a),
            hash_conversation_global("gemini-2.5-pro", &b)
        );
    }

    #[test]
    fn hash_depends_only_on_normalized_model_and_sanitized_roles() {
        let a = msgs(&[("user", "hi"), ("assistant", "<think>scratch</think>answer")]);
        let b = msgs(&[("user", "hi"), ("assistant", "answer")]);
        assert_eq!(
            hash_conversation_global("gemini-2.5-flash-image-preview", &a),
            hash_conversation_global("gemini-2.5-flash-image-preview", &b)
        );
        assert_eq!(
            hash_conversation_global("gemini-2.5-flash-image-preview", &a),
            hash_conversation_global("gemini-2.5-flash", &a)
        );
    }

    #[test]
    fn strips_think_blocks_case_insensitively() {
        let out = strip_think_blocks("before<THINK>hidden</THINK>after");
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn normalize_model_strips_web_suffix() {
        assert_eq!(normalize_model("gemini-2.5-pro-web"), "gemini-2.5-pro");
        assert_eq!(normalize_model("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[test]
    fn lookup_hashes_only_end_in_assistant_or_system_and_are_longest_first() {
        let messages = msgs(&[
            ("user", "u1"),
            ("assistant", "a1"),
            ("user", "u2"),
            ("assistant", "a2"),
        ]);
        let hashes = build_lookup_hashes("gemini-2.5-pro", &messages);
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], hash_conversation_global("gemini-2.5-pro", &messages));
        assert_eq!(
            hashes[1],
            hash_conversation_global("gemini-2.5-pro", &messages[..2])
        );
    }

    #[test]
    fn lookup_hashes_empty_for_single_message() {
        let messages = msgs(&[("user", "u1")]);
        assert!(build_lookup_hashes("gemini-2.5-pro", &messages).is_empty());
    }

    #[test]
    fn storage_hashes_cover_every_offset_and_dedup() {
        let messages = msgs(&[("user", "u1"), ("assistant", "a1"), ("user", "u2")]);
        let hashes = build_storage_hashes("gemini-2.5-pro", &messages);
        assert_eq!(hashes.len(), 2);
    }

    #[test]
    fn storage_hashes_fall_back_to_full_list_when_too_short() {
        let messages = msgs(&[("user", "u1")]);
        let hashes = build_storage_hashes("gemini-2.5-pro", &messages);
        assert_eq!(hashes, vec![hash_conversation_global("gemini-2.5-pro", &messages)]);
    }

    #[test]
    fn match_record_absent_when_label_empty_or_prefix_non_positive() {
        let empty_label = MatchRecord {
            account_label: "  ".to_string(),
            metadata: vec![],
            prefix_len: 3,
            updated_at: 0,
        };
        assert!(!empty_label.is_present());

        let zero_prefix = MatchRecord {
            account_label: "acct-a".to_string(),
            metadata: vec![],
            prefix_len: 0,
            updated_at: 0,
        };
        assert!(!zero_prefix.is_present());

        let present = MatchRecord {
            account_label: "acct-a".to_string(),
            metadata: vec![],
            prefix_len: 2,
            updated_at: 0,
        };
        assert!(present.is_present());
    }
}
