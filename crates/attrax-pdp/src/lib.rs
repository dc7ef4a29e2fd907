pub mod adapter;
pub mod config;
pub mod error;
pub mod logging;
pub mod policy;
pub mod service;

pub use adapter::{GraphVersionReader, StoreEntityReader};
pub use config::{AppConfig, ConfigError, LogConfig, LogFormat};
pub use error::PdpError;
pub use logging::init_logging;
pub use policy::{
    DecisionEngine, EvaluationContext, InMemoryPolicyStore, PolicyError, PolicySetHandle,
    PolicyStore,
};
pub use service::{Decision, EvaluationRequest, PdpService};
