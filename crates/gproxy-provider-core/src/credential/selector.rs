//! Selection policies over an already-filtered candidate list: fill-first,
//! round-robin, and session affinity (consistent hashing with TTL-backed
//! sticky binding). See `pool.rs` for the availability filtering and
//! priority bucketing that produces the candidate list these policies pick
//! from.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::CredentialId;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: CredentialId,
    pub priority: i32,
}

/// Bits of the inbound request a selector needs to extract a session id or
/// build a conversation hash from. Kept provider-agnostic: providers and the
/// conductor populate this from whichever typed request they are holding.
#[derive(Debug, Clone, Default)]
pub struct PickOptions {
    pub headers: Vec<(String, String)>,
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, String>,
}

impl PickOptions {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ModelCooldownError {
    pub model: String,
    pub provider: Option<String>,
    pub reset_seconds: u64,
}

impl ModelCooldownError {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": "model_cooldown",
                "message": format!("model '{}' is in cooldown, retry after {}s", self.model, self.reset_seconds),
                "model": self.model,
                "reset_time": format!("{}s", self.reset_seconds),
                "reset_seconds": self.reset_seconds,
                "provider": self.provider.clone().unwrap_or_default(),
            }
        })
    }

    pub fn retry_after_header(&self) -> String {
        self.reset_seconds.to_string()
    }

    pub const HTTP_STATUS: u16 = 429;
}

#[derive(Debug, Clone)]
pub enum PickError {
    AuthNotFound,
    AuthUnavailable,
    ModelCooldown(ModelCooldownError),
}

pub trait SelectionPolicy: Send + Sync {
    /// Picks one candidate out of an already-priority-filtered, available list.
    /// Candidates are pre-sorted by `id` for FillFirst stability.
    fn pick(&self, provider: &str, model: &str, options: &PickOptions, candidates: &[Candidate]) -> Option<CredentialId>;
}

#[derive(Debug, Default)]
pub struct FillFirstSelector;

impl SelectionPolicy for FillFirstSelector {
    fn pick(&self, _provider: &str, _model: &str, _options: &PickOptions, candidates: &[Candidate]) -> Option<CredentialId> {
        candidates.first().map(|c| c.id)
    }
}

#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursors: StdMutex<HashMap<String, usize>>,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RoundRobinSelector {
    fn pick(&self, provider: &str, model: &str, _options: &PickOptions, candidates: &[Candidate]) -> Option<CredentialId> {
        if candidates.is_empty() {
            return None;
        }
        let key = format!("{provider}:{model}");
        let mut cursors = self.cursors.lock().expect("round robin cursor lock poisoned");
        let cursor = cursors.entry(key).or_insert(0);
        let idx = *cursor % candidates.len();
        *cursor = (*cursor + 1) % candidates.len();
        Some(candidates[idx].id)
    }
}

/// `sessionID → authID` with TTL; key is `provider "::" sessionID "::" model`.
pub struct SessionCache {
    entries: RwLock<HashMap<String, (CredentialId, Instant)>>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get_and_refresh(&self, key: &str) -> Option<CredentialId> {
        let mut guard = self.entries.write().await;
        let (id, expires_at) = guard.get(key).copied()?;
        if expires_at <= Instant::now() {
            guard.remove(key);
            return None;
        }
        guard.insert(key.to_string(), (id, Instant::now() + self.ttl));
        Some(id)
    }

    pub async fn bind(&self, key: &str, id: CredentialId) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (id, Instant::now() + self.ttl));
    }

    pub async fn invalidate_auth(&self, id: CredentialId) {
        self.entries.write().await.retain(|_, (bound, _)| *bound != id);
    }

    pub async fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

pub struct SessionAffinitySelector<F: SelectionPolicy> {
    fallback: F,
    cache: Arc<SessionCache>,
}

impl<F: SelectionPolicy> SessionAffinitySelector<F> {
    pub fn new(fallback: F, cache: Arc<SessionCache>) -> Self {
        Self { fallback, cache }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Async pick: session affinity needs cache lookups, so it cannot satisfy
    /// the synchronous `SelectionPolicy` trait directly. Callers (the pool)
    /// invoke this entry point and fall back to `fallback` only when no
    /// session id is present.
    pub async fn pick_async(
        &self,
        provider: &str,
        model: &str,
        options: &PickOptions,
        candidates: &[Candidate],
    ) -> Option<CredentialId> {
        if candidates.is_empty() {
            return None;
        }
        let (primary, fallback_id) = extract_session_ids(options);
        let Some(primary) = primary else {
            return self.fallback.pick(provider, model, options, candidates);
        };

        let cache_key = format!("{provider}::{primary}::{model}");
        if let Some(bound) = self.cache.get_and_refresh(&cache_key).await
            && candidates.iter().any(|c| c.id == bound)
        {
            return Some(bound);
        }

        if let Some(fallback_id) = fallback_id {
            let fallback_key = format!("{provider}::{fallback_id}::{model}");
            if let Some(bound) = self.cache.get_and_refresh(&fallback_key).await
                && candidates.iter().any(|c| c.id == bound)
            {
                self.cache.bind(&cache_key, bound).await;
                return Some(bound);
            }
        }

        let chosen = consistent_hash_pick(&cache_key, candidates)?;
        self.cache.bind(&cache_key, chosen).await;
        Some(chosen)
    }
}

fn consistent_hash_pick(key: &str, candidates: &[Candidate]) -> Option<CredentialId> {
    if candidates.is_empty() {
        return None;
    }
    let hash = fnv32a(key.as_bytes());
    let idx = (hash as usize) % candidates.len();
    Some(candidates[idx].id)
}

pub fn fnv32a(data: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x01000193;
    let mut hash = OFFSET_BASIS;
    for byte in data {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub fn fnv64a(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// `extractSessionIDs` (spec §4.5.1): returns `(primary, fallback)` in priority order.
pub fn extract_session_ids(options: &PickOptions) -> (Option<String>, Option<String>) {
    if let Some(user_id) = json_str(&options.payload, &["metadata", "user_id"])
        && let Some(uuid) = session_suffix_uuid(&user_id)
    {
        return (Some(format!("claude:{uuid}")), None);
    }

    if let Some(header) = options.header("x-session-id").filter(|v| !v.is_empty()) {
        return (Some(format!("header:{header}")), None);
    }

    if let Some(idem) = options
        .metadata
        .get("idempotency_key")
        .filter(|v| !v.is_empty())
    {
        return (Some(format!("idem:{idem}")), None);
    }

    if let Some(user_id) = json_str(&options.payload, &["metadata", "user_id"]).filter(|v| !v.is_empty()) {
        return (Some(format!("user:{user_id}")), None);
    }

    if let Some(conv) = json_str(&options.payload, &["conversation_id"]).filter(|v| !v.is_empty()) {
        return (Some(format!("conv:{conv}")), None);
    }

    message_hash_fallback(&options.payload)
}

/// Matches the trailing `_session_<uuid>` suffix (equivalent to `_session_([a-f0-9-]+)$`)
/// without pulling in a regex engine for one fixed-shape pattern.
fn session_suffix_uuid(value: &str) -> Option<&str> {
    let idx = value.rfind("_session_")?;
    let candidate = &value[idx + "_session_".len()..];
    if !candidate.is_empty()
        && candidate
            .bytes()
            .all(|b| b.is_ascii_hexdigit() || b == b'-')
    {
        Some(candidate)
    } else {
        None
    }
}

fn json_str(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(segment)?;
    }
    cur.as_str().map(str::to_string)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Extracts `(system, first_user, first_assistant)` text across the dialects
/// the spec enumerates: OpenAI chat `messages[]`, Claude `system`+`messages`,
/// Gemini `systemInstruction`+`contents`, OpenAI Responses `instructions`+`input`.
fn extract_message_triplet(payload: &serde_json::Value) -> (String, String, String) {
    // Claude / OpenAI chat: top-level `system` (string) or `messages[].role`.
    let mut system = String::new();
    let mut user = String::new();
    let mut assistant = String::new();

    if let Some(s) = payload.get("system").and_then(|v| v.as_str()) {
        system = s.to_string();
    }
    if let Some(s) = payload
        .get("systemInstruction")
        .and_then(|v| v.get("parts"))
        .and_then(|v| v.as_array())
        .and_then(|parts| parts.first())
        .and_then(|p| p.get("text"))
        .and_then(|v| v.as_str())
    {
        system = s.to_string();
    }
    if let Some(s) = payload.get("instructions").and_then(|v| v.as_str()) {
        system = s.to_string();
    }

    let messages = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .or_else(|| payload.get("contents").and_then(|v| v.as_array()))
        .or_else(|| payload.get("input").and_then(|v| v.as_array()));

    if let Some(messages) = messages {
        for message in messages {
            let role = message
                .get("role")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if role == "reasoning" || message.get("type").and_then(|v| v.as_str()) == Some("reasoning") {
                continue;
            }
            let text = message_text(message);
            if text.is_empty() {
                continue;
            }
            match role {
                "user" => {
                    if user.is_empty() {
                        user = text;
                    }
                }
                "assistant" | "model" => {
                    if assistant.is_empty() {
                        assistant = text;
                    }
                }
                "system" => {
                    if system.is_empty() {
                        system = text;
                    }
                }
                _ => {}
            }
        }
    }

    (
        truncate_chars(&system, 100),
        truncate_chars(&user, 100),
        truncate_chars(&assistant, 100),
    )
}

fn message_text(message: &serde_json::Value) -> String {
    if let Some(s) = message.get("content").and_then(|v| v.as_str()) {
        return s.to_string();
    }
    if let Some(parts) = message.get("content").and_then(|v| v.as_array()) {
        return parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("");
    }
    if let Some(parts) = message.get("parts").and_then(|v| v.as_array()) {
        return parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("");
    }
    String::new()
}

fn message_hash_fallback(payload: &serde_json::Value) -> (Option<String>, Option<String>) {
    let (system, user, assistant) = extract_message_triplet(payload);
    if system.is_empty() && user.is_empty() && assistant.is_empty() {
        return (None, None);
    }
    let short = format!("sys:{system}\nusr:{user}\nast:\n");
    let short_hash = format!("msg:{:016x}", fnv64a(short.as_bytes()));
    if assistant.is_empty() {
        return (Some(short_hash), None);
    }
    let long = format!("sys:{system}\nusr:{user}\nast:{assistant}\n");
    let long_hash = format!("msg:{:016x}", fnv64a(long.as_bytes()));
    (Some(long_hash), Some(short_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(ids: &[CredentialId]) -> Vec<Candidate> {
        ids.iter().map(|&id| Candidate { id, priority: 0 }).collect()
    }

    #[test]
    fn fill_first_picks_lowest_sorted_id() {
        let selector = FillFirstSelector;
        let opts = PickOptions::default();
        let chosen = selector.pick("gemini", "gemini-2.5-pro", &opts, &candidates(&[2, 5, 9]));
        assert_eq!(chosen, Some(2));
    }

    #[test]
    fn round_robin_wraps() {
        let selector = RoundRobinSelector::new();
        let opts = PickOptions::default();
        let cands = candidates(&[10, 20, 30]);
        let picks: Vec<_> = (0..4)
            .map(|_| selector.pick("p", "m", &opts, &cands).unwrap())
            .collect();
        assert_eq!(picks, vec![10, 20, 30, 10]);
    }

    #[test]
    fn extracts_claude_session_suffix() {
        let opts = PickOptions {
            payload: serde_json::json!({
                "metadata": {"user_id": "user_a_account__session_ac980658-63bd-4fb3-97ba-8da64cb1e344"}
            }),
            ..Default::default()
        };
        let (primary, fallback) = extract_session_ids(&opts);
        assert_eq!(
            primary.as_deref(),
            Some("claude:ac980658-63bd-4fb3-97ba-8da64cb1e344")
        );
        assert!(fallback.is_none());
    }

    #[test]
    fn extracts_header_session_id() {
        let opts = PickOptions {
            headers: vec![("X-Session-ID".to_string(), "abc123".to_string())],
            ..Default::default()
        };
        let (primary, _) = extract_session_ids(&opts);
        assert_eq!(primary.as_deref(), Some("header:abc123"));
    }

    #[test]
    fn message_hash_fallback_has_short_and_long_forms() {
        let opts = PickOptions {
            payload: serde_json::json!({
                "system": "sys prompt",
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi there"}
                ]
            }),
            ..Default::default()
        };
        let (primary, fallback) = extract_session_ids(&opts);
        assert!(primary.unwrap().starts_with("msg:"));
        assert!(fallback.unwrap().starts_with("msg:"));
    }

    #[test]
    fn first_turn_has_no_fallback() {
        let opts = PickOptions {
            payload: serde_json::json!({
                "messages": [{"role": "user", "content": "hello"}]
            }),
            ..Default::default()
        };
        let (primary, fallback) = extract_session_ids(&opts);
        assert!(primary.is_some());
        assert!(fallback.is_none());
    }

    #[tokio::test]
    async fn session_cache_refreshes_ttl_on_hit() {
        let cache = SessionCache::new(Duration::from_millis(50));
        cache.bind("k", 7).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get_and_refresh("k").await, Some(7));
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Refreshed at t=30ms with ttl 50ms, so still alive at t=60ms.
        assert_eq!(cache.get_and_refresh("k").await, Some(7));
    }

    #[tokio::test]
    async fn session_cache_evicts_after_ttl() {
        let cache = SessionCache::new(Duration::from_millis(20));
        cache.bind("k", 7).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get_and_refresh("k").await, None);
    }

    #[tokio::test]
    async fn session_affinity_sticks_across_calls() {
        let cache = Arc::new(SessionCache::new(Duration::from_secs(60)));
        let selector = SessionAffinitySelector::new(FillFirstSelector, cache);
        let opts = PickOptions {
            payload: serde_json::json!({"conversation_id": "abc"}),
            ..Default::default()
        };
        let cands = candidates(&[1, 2, 3]);
        let first = selector.pick_async("claude", "claude-3", &opts, &cands).await;
        for _ in 0..10 {
            let next = selector.pick_async("claude", "claude-3", &opts, &cands).await;
            assert_eq!(next, first);
        }
    }

    #[tokio::test]
    async fn session_affinity_rebinds_when_bound_auth_unavailable() {
        let cache = Arc::new(SessionCache::new(Duration::from_secs(60)));
        let selector = SessionAffinitySelector::new(FillFirstSelector, cache);
        let opts = PickOptions {
            payload: serde_json::json!({"conversation_id": "abc"}),
            ..Default::default()
        };
        let full = candidates(&[1, 2, 3]);
        let bound = selector.pick_async("claude", "claude-3", &opts, &full).await.unwrap();
        let reduced: Vec<_> = full.into_iter().filter(|c| c.id != bound).collect();
        let rebound = selector.pick_async("claude", "claude-3", &opts, &reduced).await.unwrap();
        assert_ne!(rebound, bound);
        for _ in 0..5 {
            let next = selector.pick_async("claude", "claude-3", &opts, &reduced).await;
            assert_eq!(next, Some(rebound));
        }
    }
}
