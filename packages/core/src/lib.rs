pub mod engine;
pub mod models;
pub mod executors;
pub mod http;
pub mod config;
pub mod workspace;
pub mod janitor;
pub mod artifact;
pub mod traits;

// Re-export commonly used types
pub use engine::RecognitionEngine;
pub use models::{ArtifactSet, EngineError, EngineInvocation, EngineVariant, ErrorKind, Workspace};
pub use config::{EngineSpec, GatewayConfig};
pub use executors::{Executor, LocalExecutor};
pub use workspace::WorkspaceRegistry;
pub use janitor::{Janitor, SweepReport};
pub use artifact::ArtifactHandle;
pub use traits::WorkspaceManager;
pub use http::{build_router, AppState};
