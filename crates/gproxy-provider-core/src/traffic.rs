//! Plain data carried over `gproxy-storage`'s traffic channels. Defined here (rather
//! than in `gproxy-storage`) so provider implementations can shape these records
//! directly from whatever dialect they dispatched through.

#[derive(Debug, Clone, Default)]
pub struct DownstreamTrafficEvent {
    pub trace_id: Option<String>,
    pub provider: String,
    pub provider_id: Option<i64>,
    pub operation: String,
    pub model: Option<String>,
    pub user_id: Option<i64>,
    pub key_id: Option<i64>,

    pub request_method: String,
    pub request_path: String,
    pub request_query: Option<String>,
    pub request_headers: String,
    pub request_body: String,

    pub response_status: i32,
    pub response_headers: String,
    pub response_body: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamTrafficEvent {
    pub trace_id: Option<String>,
    pub provider: String,
    pub provider_id: Option<i64>,
    pub operation: String,
    pub model: Option<String>,
    pub credential_id: Option<i64>,

    pub request_method: String,
    pub request_path: String,
    pub request_query: Option<String>,
    pub request_headers: String,
    pub request_body: String,

    pub response_status: i32,
    pub response_headers: String,
    pub response_body: String,

    pub claude_input_tokens: Option<i64>,
    pub claude_output_tokens: Option<i64>,
    pub claude_total_tokens: Option<i64>,
    pub claude_cache_creation_input_tokens: Option<i64>,
    pub claude_cache_read_input_tokens: Option<i64>,

    pub gemini_prompt_tokens: Option<i64>,
    pub gemini_candidates_tokens: Option<i64>,
    pub gemini_total_tokens: Option<i64>,
    pub gemini_cached_tokens: Option<i64>,

    pub openai_chat_prompt_tokens: Option<i64>,
    pub openai_chat_completion_tokens: Option<i64>,
    pub openai_chat_total_tokens: Option<i64>,

    pub openai_responses_input_tokens: Option<i64>,
    pub openai_responses_output_tokens: Option<i64>,
    pub openai_responses_total_tokens: Option<i64>,
    pub openai_responses_input_cached_tokens: Option<i64>,
    pub openai_responses_output_reasoning_tokens: Option<i64>,
}

/// Maps a normalized usage detail into whichever dialect-prefixed columns apply,
/// leaving the other dialects' columns untouched (`None`).
pub fn apply_usage_detail(
    event: &mut UpstreamTrafficEvent,
    proto: crate::Proto,
    detail: &crate::UsageDetail,
) {
    let input = detail.input_tokens.map(i64::from);
    let output = detail.output_tokens.map(i64::from);
    let total = detail.total_tokens.map(i64::from);
    let cached = detail.cached_tokens.map(i64::from);
    match proto {
        crate::Proto::Claude => {
            event.claude_input_tokens = input;
            event.claude_output_tokens = output;
            event.claude_total_tokens = total;
            event.claude_cache_read_input_tokens = cached;
        }
        crate::Proto::Gemini => {
            event.gemini_prompt_tokens = input;
            event.gemini_candidates_tokens = output;
            event.gemini_total_tokens = total;
            event.gemini_cached_tokens = cached;
        }
        crate::Proto::OpenAIChat => {
            event.openai_chat_prompt_tokens = input;
            event.openai_chat_completion_tokens = output;
            event.openai_chat_total_tokens = total;
        }
        crate::Proto::OpenAIResponse | crate::Proto::OpenAI => {
            event.openai_responses_input_tokens = input;
            event.openai_responses_output_tokens = output;
            event.openai_responses_total_tokens = total;
            event.openai_responses_input_cached_tokens = cached;
            event.openai_responses_output_reasoning_tokens =
                detail.reasoning_tokens.map(i64::from);
        }
    }
}
