use std::sync::Arc;

use bytes::Bytes;

use gproxy_provider_core::conversation_index::{
    ConversationIndexStore, ConversationMessage, MatchRecord, build_lookup_hashes, normalize_model,
};
use gproxy_provider_core::{
    Credential, DispatchRule, DispatchTable, HttpMethod, Proto, ProviderConfig, ProviderError,
    ProviderResult, UpstreamCtx, UpstreamHttpRequest, UpstreamProvider, credential::GeminiWebCredential,
};

use crate::auth_extractor;

const PROVIDER_NAME: &str = "gemini_web";
const DEFAULT_BASE_URL: &str = "https://gemini.google.com";
const BATCHEXECUTE_PATH: &str = "/_/BardChatUi/data/batchexecute";
const RPC_ID: &str = "hNvQHb";

// Gemini Web speaks its own scrape protocol, not the public generateContent
// wire shape, but the dispatch surface still hangs off Gemini ops: callers
// translate into the same typed request/response the AIStudio/Vertex
// providers consume, and this provider re-shapes it into the batchexecute body.
const DISPATCH_TABLE: DispatchTable = DispatchTable::new([
    // Claude
    DispatchRule::Transform {
        target: Proto::Gemini,
    },
    DispatchRule::Transform {
        target: Proto::Gemini,
    },
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    // Gemini
    DispatchRule::Native,
    DispatchRule::Native,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    // OpenAI chat completions
    DispatchRule::Transform {
        target: Proto::Gemini,
    },
    DispatchRule::Transform {
        target: Proto::Gemini,
    },
    // OpenAI Responses
    DispatchRule::Transform {
        target: Proto::Gemini,
    },
    DispatchRule::Transform {
        target: Proto::Gemini,
    },
    // OpenAI basic ops
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    // OAuth / usage
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
]);

/// Wraps a `ConversationIndexStore` so multi-turn Gemini Web chats land back
/// on the same scraped Google conversation thread.
///
/// Lookup happens here, when the provider shapes the outbound request; the
/// write-back of a fresh `MatchRecord` after a turn completes needs the
/// response body (conversation/response/choice ids Google hands back), which
/// this provider never sees — only the conductor does, after streaming
/// finishes. `record_turn` is exposed for that integration and is not yet
/// called from the conductor; see DESIGN.md.
pub struct GeminiWebProvider {
    index: Option<Arc<dyn ConversationIndexStore>>,
}

impl std::fmt::Debug for GeminiWebProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiWebProvider")
            .field("index", &self.index.is_some())
            .finish()
    }
}

impl Default for GeminiWebProvider {
    fn default() -> Self {
        Self { index: None }
    }
}

impl GeminiWebProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(index: Arc<dyn ConversationIndexStore>) -> Self {
        Self { index: Some(index) }
    }

    /// Persists a fresh binding after a successful turn; `metadata` carries
    /// the Google-side continuation ids (conversation id, response id,
    /// choice id) needed to resume the thread next turn.
    pub async fn record_turn(
        &self,
        hash: &str,
        account_label: &str,
        metadata: Vec<String>,
        prefix_len: i64,
    ) {
        let Some(index) = &self.index else { return };
        index
            .put(
                hash,
                MatchRecord {
                    account_label: account_label.to_string(),
                    metadata,
                    prefix_len,
                    updated_at: unix_now(),
                },
            )
            .await;
    }

    async fn lookup_continuation(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Option<MatchRecord> {
        let index = self.index.as_ref()?;
        for hash in build_lookup_hashes(model, messages) {
            if let Some(record) = index.get(&hash).await
                && record.is_present()
            {
                return Some(record);
            }
        }
        None
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait::async_trait]
impl UpstreamProvider for GeminiWebProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn dispatch_table(&self, _config: &ProviderConfig) -> DispatchTable {
        DISPATCH_TABLE
    }

    async fn build_gemini_generate(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &gproxy_protocol::gemini::generate_content::request::GenerateContentRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        self.build_request(config, credential, &req.path.model, &req.body, false)
            .await
    }

    async fn build_gemini_generate_stream(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &gproxy_protocol::gemini::stream_content::request::StreamGenerateContentRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        self.build_request(config, credential, &req.path.model, &req.body, true)
            .await
    }
}

impl GeminiWebProvider {
    async fn build_request(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        model: &str,
        body: &gproxy_protocol::gemini::generate_content::request::GenerateContentRequestBody,
        is_stream: bool,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base_url = gemini_web_base_url(config)?;
        let cred = gemini_web_credential(credential)?;
        let model = normalize_model(model);

        let messages = to_conversation_messages(body);
        let continuation = self.lookup_continuation(&model, &messages).await;
        let prompt = last_user_text(body);

        let (cid, rid, rcid) = continuation
            .as_ref()
            .map(|record| {
                let mut it = record.metadata.iter();
                (
                    it.next().cloned().unwrap_or_default(),
                    it.next().cloned().unwrap_or_default(),
                    it.next().cloned().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        let f_req = serde_json::json!([
            [prompt, 0, null_if_empty(&cid), null_if_empty(&rid), null_if_empty(&rcid)],
            [serde_json::Value::Null],
            [cid, rid, rcid],
        ])
        .to_string();

        let path = format!(
            "{BATCHEXECUTE_PATH}?rpcids={RPC_ID}&source-path=%2Fapp&bl=boq_assistant-bard-web-server"
        );
        let url = build_url(Some(base_url), DEFAULT_BASE_URL, &path);

        let form_body = format!("f.req={}&at=", urlencoding::encode(&f_req));

        let mut headers = Vec::new();
        auth_extractor::set_header(&mut headers, "content-type", "application/x-www-form-urlencoded;charset=UTF-8");
        auth_extractor::set_header(&mut headers, "user-agent", "Mozilla/5.0");
        let cookie = match &cred.secure_1psidts {
            Some(ts) => format!("__Secure-1PSID={}; __Secure-1PSIDTS={}", cred.secure_1psid, ts),
            None => format!("__Secure-1PSID={}", cred.secure_1psid),
        };
        auth_extractor::set_header(&mut headers, "cookie", &cookie);

        Ok(UpstreamHttpRequest {
            method: HttpMethod::Post,
            url,
            headers,
            body: Some(Bytes::from(form_body)),
            is_stream,
        })
    }
}

fn null_if_empty(value: &str) -> serde_json::Value {
    if value.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(value.to_string())
    }
}

fn to_conversation_messages(
    body: &gproxy_protocol::gemini::generate_content::request::GenerateContentRequestBody,
) -> Vec<ConversationMessage> {
    use gproxy_protocol::gemini::count_tokens::types::ContentRole;

    let mut messages = Vec::new();
    if let Some(system) = &body.system_instruction {
        let text = content_text(system);
        if !text.is_empty() {
            messages.push(ConversationMessage::new("system", text));
        }
    }
    for content in &body.contents {
        let role = match content.role {
            Some(ContentRole::Model) => "assistant",
            _ => "user",
        };
        let text = content_text(content);
        if !text.is_empty() {
            messages.push(ConversationMessage::new(role, text));
        }
    }
    messages
}

fn content_text(content: &gproxy_protocol::gemini::count_tokens::types::Content) -> String {
    content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

fn last_user_text(
    body: &gproxy_protocol::gemini::generate_content::request::GenerateContentRequestBody,
) -> String {
    use gproxy_protocol::gemini::count_tokens::types::ContentRole;
    body.contents
        .iter()
        .rev()
        .find(|c| !matches!(c.role, Some(ContentRole::Model)))
        .map(content_text)
        .unwrap_or_default()
}

fn gemini_web_base_url(config: &ProviderConfig) -> ProviderResult<&str> {
    match config {
        ProviderConfig::GeminiWeb(cfg) => Ok(cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        _ => Err(ProviderError::InvalidConfig(
            "expected ProviderConfig::GeminiWeb".to_string(),
        )),
    }
}

fn gemini_web_credential(credential: &Credential) -> ProviderResult<&GeminiWebCredential> {
    match credential {
        Credential::GeminiWeb(cred) => Ok(cred),
        _ => Err(ProviderError::InvalidConfig(
            "expected Credential::GeminiWeb".to_string(),
        )),
    }
}

fn build_url(base_url: Option<&str>, default_base: &str, path: &str) -> String {
    let base = base_url.unwrap_or(default_base).trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gproxy_provider_core::ConversationIndexStore;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MemoryIndex {
        inner: Mutex<HashMap<String, MatchRecord>>,
    }

    impl MemoryIndex {
        fn new() -> Self {
            Self {
                inner: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ConversationIndexStore for MemoryIndex {
        async fn get(&self, hash: &str) -> Option<MatchRecord> {
            self.inner.lock().await.get(hash).cloned()
        }
        async fn put(&self, hash: &str, record: MatchRecord) {
            self.inner.lock().await.insert(hash.to_string(), record);
        }
        async fn remove_matches_by_label(&self, label: &str) {
            self.inner
                .lock()
                .await
                .retain(|_, r| !r.account_label.eq_ignore_ascii_case(label));
        }
    }

    fn body_with(messages: &[(&str, &str)]) -> gproxy_protocol::gemini::generate_content::request::GenerateContentRequestBody {
        use gproxy_protocol::gemini::count_tokens::types::{Content, ContentRole, Part};
        use gproxy_protocol::gemini::generate_content::request::GenerateContentRequestBody;

        let contents = messages
            .iter()
            .map(|(role, text)| Content {
                role: Some(if *role == "assistant" { ContentRole::Model } else { ContentRole::User }),
                parts: vec![Part {
                    text: Some(text.to_string()),
                    inline_data: None,
                    function_call: None,
                    function_response: None,
                    file_data: None,
                    executable_code: None,
                    code_execution_result: None,
                    thought: None,
                    thought_signature: None,
                    part_metadata: None,
                    video_metadata: None,
                }],
            })
            .collect();

        GenerateContentRequestBody {
            contents,
            model: None,
            tools: None,
            tool_config: None,
            safety_settings: None,
            system_instruction: None,
            generation_config: None,
            cached_content: None,
        }
    }

    #[test]
    fn extracts_last_user_text_skipping_trailing_model_turn() {
        let body = body_with(&[("user", "hi"), ("assistant", "hello"), ("user", "how are you")]);
        assert_eq!(last_user_text(&body), "how are you");
    }

    #[tokio::test]
    async fn builds_request_with_continuation_ids_when_bound() {
        let index: Arc<dyn ConversationIndexStore> = Arc::new(MemoryIndex::new());
        let messages = to_conversation_messages(&body_with(&[("user", "hi"), ("assistant", "hello")]));
        let hash = build_lookup_hashes("gemini-2.5-pro", &messages)
            .into_iter()
            .next()
            .unwrap();
        index
            .put(
                &hash,
                MatchRecord {
                    account_label: "acct-1".to_string(),
                    metadata: vec!["c_1".to_string(), "r_1".to_string(), "rc_1".to_string()],
                    prefix_len: 2,
                    updated_at: 0,
                },
            )
            .await;

        let provider = GeminiWebProvider::with_index(index);
        let config = ProviderConfig::GeminiWeb(gproxy_provider_core::config::GeminiWebConfig::default());
        let credential = Credential::GeminiWeb(GeminiWebCredential {
            secure_1psid: "psid".to_string(),
            secure_1psidts: Some("psidts".to_string()),
        });
        let body = body_with(&[("user", "hi"), ("assistant", "hello"), ("user", "continue")]);
        let request = provider
            .build_request(&config, &credential, "gemini-2.5-pro", &body, false)
            .await
            .expect("request built");

        let decoded = urlencoding::decode(
            std::str::from_utf8(&request.body.expect("body present"))
                .unwrap()
                .trim_start_matches("f.req=")
                .split('&')
                .next()
                .unwrap(),
        )
        .unwrap();
        assert!(decoded.contains("c_1"));
    }

    #[tokio::test]
    async fn builds_request_without_index_configured() {
        let provider = GeminiWebProvider::new();
        let config = ProviderConfig::GeminiWeb(gproxy_provider_core::config::GeminiWebConfig::default());
        let credential = Credential::GeminiWeb(GeminiWebCredential {
            secure_1psid: "psid".to_string(),
            secure_1psidts: None,
        });
        let body = body_with(&[("user", "hi")]);
        let request = provider
            .build_request(&config, &credential, "gemini-2.5-pro", &body, false)
            .await
            .expect("request built");
        assert_eq!(request.method, HttpMethod::Post);
    }
}
