use gproxy_provider_core::config::{
    AIStudioConfig, AntigravityConfig, ClaudeCodeConfig, ClaudeConfig, CodexConfig, DeepSeekConfig,
    GeminiCliConfig, GeminiWebConfig, IFlowConfig, NvidiaConfig, OpenAIConfig, ProviderConfig,
    VertexConfig, VertexExpressConfig,
};

/// A provider row to seed into storage the first time a fresh database boots.
pub struct BuiltinProviderSeed {
    pub name: &'static str,
    pub config_json: serde_json::Value,
    pub enabled: bool,
}

/// The builtin provider list, seeded once at bootstrap so the admin surface always
/// has a row per known provider even before any credentials are added.
pub fn builtin_provider_seeds() -> Vec<BuiltinProviderSeed> {
    vec![
        seed("openai", ProviderConfig::OpenAI(OpenAIConfig::default())),
        seed("claude", ProviderConfig::Claude(ClaudeConfig::default())),
        seed(
            "aistudio",
            ProviderConfig::AIStudio(AIStudioConfig::default()),
        ),
        seed(
            "vertexexpress",
            ProviderConfig::VertexExpress(VertexExpressConfig::default()),
        ),
        seed("vertex", ProviderConfig::Vertex(VertexConfig::default())),
        seed(
            "geminicli",
            ProviderConfig::GeminiCli(GeminiCliConfig::default()),
        ),
        seed(
            "claudecode",
            ProviderConfig::ClaudeCode(ClaudeCodeConfig::default()),
        ),
        seed("codex", ProviderConfig::Codex(CodexConfig::default())),
        seed(
            "antigravity",
            ProviderConfig::Antigravity(AntigravityConfig::default()),
        ),
        seed("nvidia", ProviderConfig::Nvidia(NvidiaConfig::default())),
        seed(
            "deepseek",
            ProviderConfig::DeepSeek(DeepSeekConfig::default()),
        ),
        seed("iflow", ProviderConfig::IFlow(IFlowConfig::default())),
        seed(
            "gemini_web",
            ProviderConfig::GeminiWeb(GeminiWebConfig::default()),
        ),
    ]
}

fn seed(name: &'static str, config: ProviderConfig) -> BuiltinProviderSeed {
    BuiltinProviderSeed {
        name,
        config_json: serde_json::to_value(config).expect("provider config serializes"),
        enabled: false,
    }
}
