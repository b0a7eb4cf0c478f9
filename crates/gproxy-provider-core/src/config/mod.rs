mod dispatch;
mod model_alias;
mod model_table;
mod provider_config;

pub use dispatch::{DispatchRule, DispatchTable, OperationKind};
pub use model_alias::{ModelAlias, ModelAliasTable, ResolvedModelAlias, resolve_model_alias};
pub use model_table::{ModelRecord, ModelTable};
pub use provider_config::{
    AIStudioConfig, AntigravityConfig, ClaudeCodeConfig, ClaudeCodePreludeText, ClaudeConfig,
    CodexConfig, CountTokensMode, CustomProviderConfig, DeepSeekConfig, GeminiCliConfig,
    GeminiWebConfig, IFlowConfig, NvidiaConfig, OpenAIConfig, ProviderConfig, VertexConfig,
    VertexExpressConfig,
};
