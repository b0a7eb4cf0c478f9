use std::sync::Arc;

use gproxy_provider_core::ProviderRegistry;

use crate::providers::{
    aistudio::AIStudioProvider, antigravity::AntigravityProvider, claude::ClaudeProvider,
    claudecode::ClaudeCodeProvider, codex::CodexProvider, custom::CustomProvider,
    deepseek::DeepSeekProvider, gemini_web::GeminiWebProvider, geminicli::GeminiCliProvider,
    iflow::IFlowProvider, nvidia::NvidiaProvider, openai::OpenAIProvider, vertex::VertexProvider,
    vertexexpress::VertexExpressProvider,
};

/// Registers every statically known provider implementation.
///
/// `custom` and `iflow` are OpenAI-compatible gateways configured per credential pool;
/// the registry only needs one stateless instance since all per-tenant detail lives in
/// `ProviderConfig`, read at dispatch time from the stored config, not from this struct.
pub fn register_builtin_providers(registry: &mut ProviderRegistry) {
    registry.register(Arc::new(OpenAIProvider::new()));
    registry.register(Arc::new(ClaudeProvider::new()));
    registry.register(Arc::new(AIStudioProvider::new()));
    registry.register(Arc::new(VertexExpressProvider::new()));
    registry.register(Arc::new(VertexProvider::new()));
    registry.register(Arc::new(GeminiCliProvider::new()));
    registry.register(Arc::new(ClaudeCodeProvider::new()));
    registry.register(Arc::new(CodexProvider::new()));
    registry.register(Arc::new(AntigravityProvider::new()));
    registry.register(Arc::new(NvidiaProvider::new()));
    registry.register(Arc::new(DeepSeekProvider::new()));
    registry.register(Arc::new(CustomProvider::new()));
    registry.register(Arc::new(IFlowProvider::new()));
    registry.register(Arc::new(GeminiWebProvider::new()));
}
