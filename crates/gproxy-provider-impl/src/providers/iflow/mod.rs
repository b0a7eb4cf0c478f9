use bytes::Bytes;

use gproxy_provider_core::{
    Credential, DispatchRule, DispatchTable, HttpMethod, Proto, ProviderConfig, ProviderError,
    ProviderResult, UpstreamCtx, UpstreamHttpRequest, UpstreamProvider,
    credential::ApiKeyCredential,
};

use crate::auth_extractor;

const PROVIDER_NAME: &str = "iflow";
const DEFAULT_BASE_URL: &str = "https://apis.iflow.cn";

// OpenAI-compatible gateway: native on chat completions, translated everywhere else.
const DISPATCH_TABLE: DispatchTable = DispatchTable::new([
    // Claude
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    // Gemini
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    DispatchRule::Transform {
        target: Proto::OpenAI,
    },
    // OpenAI chat completions
    DispatchRule::Native,
    DispatchRule::Native,
    // OpenAI Responses (map to chat completions)
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    DispatchRule::Transform {
        target: Proto::OpenAIChat,
    },
    // OpenAI basic ops
    DispatchRule::Native,
    DispatchRule::Native,
    DispatchRule::Native,
    // OAuth / usage (not implemented)
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
]);

#[derive(Debug, Default)]
pub struct IFlowProvider;

impl IFlowProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl UpstreamProvider for IFlowProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn dispatch_table(&self, _config: &ProviderConfig) -> DispatchTable {
        DISPATCH_TABLE
    }

    async fn build_openai_chat(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &gproxy_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base_url = iflow_base_url(config)?;
        let api_key = iflow_api_key(credential)?;
        let url = build_url(Some(base_url), DEFAULT_BASE_URL, "/v1/chat/completions");
        let is_stream = req.body.stream.unwrap_or(false);

        let mut value =
            serde_json::to_value(&req.body).map_err(|err| ProviderError::Other(err.to_string()))?;
        stabilize_empty_tools(&mut value);
        let body =
            serde_json::to_vec(&value).map_err(|err| ProviderError::Other(err.to_string()))?;
        let support = gproxy_transform::thinking::default_support_for("iflow", &req.body.model);
        let body = gproxy_transform::thinking::apply_thinking(
            &body,
            &req.body.model,
            "iflow",
            support.as_ref(),
        );

        let mut headers = Vec::new();
        auth_extractor::set_bearer(&mut headers, api_key);
        auth_extractor::set_accept_json(&mut headers);
        auth_extractor::set_content_type_json(&mut headers);
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Post,
            url,
            headers,
            body: Some(Bytes::from(body)),
            is_stream,
        })
    }

    async fn build_openai_models_list(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        _req: &gproxy_protocol::openai::list_models::request::ListModelsRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base_url = iflow_base_url(config)?;
        let api_key = iflow_api_key(credential)?;
        let url = build_url(Some(base_url), DEFAULT_BASE_URL, "/v1/models");
        let mut headers = Vec::new();
        auth_extractor::set_bearer(&mut headers, api_key);
        auth_extractor::set_accept_json(&mut headers);
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Get,
            url,
            headers,
            body: None,
            is_stream: false,
        })
    }

    async fn build_openai_models_get(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        credential: &Credential,
        req: &gproxy_protocol::openai::get_model::request::GetModelRequest,
    ) -> ProviderResult<UpstreamHttpRequest> {
        let base_url = iflow_base_url(config)?;
        let api_key = iflow_api_key(credential)?;
        let url = build_url(
            Some(base_url),
            DEFAULT_BASE_URL,
            &format!("/v1/models/{}", req.path.model),
        );
        let mut headers = Vec::new();
        auth_extractor::set_bearer(&mut headers, api_key);
        auth_extractor::set_accept_json(&mut headers);
        Ok(UpstreamHttpRequest {
            method: HttpMethod::Get,
            url,
            headers,
            body: None,
            is_stream: false,
        })
    }
}

/// iFlow's router drops the connection on some models when `tools` is present but empty;
/// swap `[]` for a harmless no-op tool so streaming stays stable.
fn stabilize_empty_tools(value: &mut serde_json::Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    let is_empty_array = matches!(obj.get("tools"), Some(serde_json::Value::Array(a)) if a.is_empty());
    if !is_empty_array {
        return;
    }
    obj.insert(
        "tools".to_string(),
        serde_json::json!([{
            "type": "function",
            "function": {
                "name": "noop",
                "description": "No-op placeholder tool; do not call.",
                "parameters": {"type": "object", "properties": {}},
            }
        }]),
    );
}

fn iflow_base_url(config: &ProviderConfig) -> ProviderResult<&str> {
    match config {
        ProviderConfig::IFlow(cfg) => Ok(cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        _ => Err(ProviderError::InvalidConfig(
            "expected ProviderConfig::IFlow".to_string(),
        )),
    }
}

fn iflow_api_key(credential: &Credential) -> ProviderResult<&str> {
    match credential {
        Credential::IFlow(ApiKeyCredential { api_key }) => Ok(api_key.as_str()),
        _ => Err(ProviderError::InvalidConfig(
            "expected Credential::IFlow".to_string(),
        )),
    }
}

fn build_url(base_url: Option<&str>, default_base: &str, path: &str) -> String {
    let base = base_url.unwrap_or(default_base).trim_end_matches('/');
    let mut path = path.trim_start_matches('/');
    if base.ends_with("/v1") && (path == "v1" || path.starts_with("v1/")) {
        path = path.trim_start_matches("v1/").trim_start_matches("v1");
    }
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tools_array_gets_replaced() {
        let mut value = serde_json::json!({"model": "x", "tools": []});
        stabilize_empty_tools(&mut value);
        assert_eq!(value["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn non_empty_tools_untouched() {
        let mut value = serde_json::json!({"tools": [{"type": "function"}]});
        stabilize_empty_tools(&mut value);
        assert_eq!(value["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn glm_model_gets_chat_template_kwargs_from_reasoning_effort() {
        let body = serde_json::to_vec(&serde_json::json!({
            "model": "glm-4.6",
            "reasoning_effort": "high",
        }))
        .unwrap();
        let support = gproxy_transform::thinking::default_support_for("iflow", "glm-4.6");
        let out = gproxy_transform::thinking::apply_thinking(&body, "glm-4.6", "iflow", support.as_ref());
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["chat_template_kwargs"]["enable_thinking"], true);
        assert!(value.get("reasoning_effort").is_none());
    }

    #[test]
    fn minimax_model_disables_reasoning_split_on_none() {
        let body = serde_json::to_vec(&serde_json::json!({
            "model": "MiniMax-M1",
            "reasoning_effort": "none",
        }))
        .unwrap();
        let support = gproxy_transform::thinking::default_support_for("iflow", "MiniMax-M1");
        let out =
            gproxy_transform::thinking::apply_thinking(&body, "MiniMax-M1", "iflow", support.as_ref());
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["reasoning_split"], false);
    }

    #[test]
    fn other_model_family_is_left_unshaped() {
        let body = serde_json::to_vec(&serde_json::json!({
            "model": "qwen3-max",
            "reasoning_effort": "high",
        }))
        .unwrap();
        let support = gproxy_transform::thinking::default_support_for("iflow", "qwen3-max");
        let out =
            gproxy_transform::thinking::apply_thinking(&body, "qwen3-max", "iflow", support.as_ref());
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value.get("chat_template_kwargs").is_none());
        assert!(value.get("reasoning_split").is_none());
    }
}
