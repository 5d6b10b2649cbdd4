//! Scenegraft Library
//!
//! Rebuilds an exported scene collection into a live object graph inside a
//! host application. Construction runs in two phases so containers may
//! reference members listed after them, and a failed build destroys
//! everything it created.

pub mod active;
pub mod builder;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod factory;
pub mod graph;
pub mod host;
pub mod install;
pub mod namer;
pub mod registry;
pub mod source;
pub mod tokens;
pub mod types;

// Re-export main types for convenience
pub use active::{ActiveGuard, ActiveSelection, register_active};
pub use builder::{BuildPolicy, BuildReport, Built, Diagnostic, GraphBuilder, ListRole};
pub use config::EngineConfig;
pub use coordinator::{
    CoordinatorState, ReloadCoordinator, ReloadOutcome, SelectOutcome, SourceSettings,
    UpdateReport,
};
pub use document::{Placement, SceneDocument, SerializedObject};
pub use error::{Result, SceneGraftError};
pub use graph::{BuiltGraph, CommittedGraph, ObjectId, ObjectKind};
pub use host::memory::MemoryHost;
pub use host::{CollectionEvent, CollectionHost, HostError, HostHandle, ItemHandle, ObjectHost, Scope};
pub use install::{InstallContext, InstallReceipt, InstallRequest, InstallStage, Installer};
pub use namer::{NamingRules, SuffixStyle, unique_backing_id, unique_container_name};
pub use registry::{DuplicatePolicy, NameRegistry};
pub use source::{DocumentSource, FixedIdentity, IdentityProvider, JsonFileSource};
pub use tokens::TokenSet;
