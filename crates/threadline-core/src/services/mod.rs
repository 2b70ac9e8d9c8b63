pub mod agent_backend;
pub mod agent_registry;
pub mod event_source;
pub mod http_backend;
pub mod logging;

pub use agent_backend::{
    AgentBackend, BackendError, BackendResult, CreateSessionRequest, OutboundRequest,
    RestoreSessionRequest,
};
pub use agent_registry::{AgentConfig, AgentConfigRegistry, SharedAgentConfigRegistry};
pub use event_source::{BroadcastEventSource, EventSource};
pub use http_backend::HttpAgentBackend;
pub use logging::{ErrorCollectorLayer, init_logging};
