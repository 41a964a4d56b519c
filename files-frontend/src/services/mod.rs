pub mod capability_resolver;
pub mod directory_client;
pub mod error;
pub mod files_client;
pub mod flow;
pub mod identity_client;
pub mod metrics;
pub mod state_store;
pub mod token_broker;
pub mod token_cache;

pub use capability_resolver::{CapabilityResolver, DiscoveryApi, HttpDiscoveryClient, MockDiscovery};
pub use directory_client::{DirectoryApi, DirectoryClient, HttpDirectoryClient, MockDirectory};
pub use error::BrokerError;
pub use files_client::{FilesApi, FilesClient, HttpFilesClient, MockFilesApi};
pub use flow::{FilesPage, FlowOutcome, FlowSettings, RedirectFlowController, RedirectInstruction};
pub use identity_client::{
    HttpIdentityProvider, IdentityProvider, IssuedToken, MockIdentityProvider, ProviderFailure,
};
pub use state_store::{MockStateStore, PostgresStateStore, StateStore};
pub use token_broker::{BrokerTokenProvider, SilentOutcome, TokenBroker, TokenProvider};
pub use token_cache::{MockTokenCache, PostgresTokenCache, TokenCache};
