pub mod bootstrap;
pub mod proxy_engine;
pub mod state;
pub mod upstream_client;

pub use bootstrap::{Bootstrap, CliArgs, bootstrap, bootstrap_from_env};
pub use proxy_engine::{ProxyAuth, ProxyCall, ProxyEngine};
pub use state::{AppState, CredentialInsertInput, ProviderRuntime};
pub use upstream_client::{UpstreamClient, UpstreamClientConfig, WreqUpstreamClient};
