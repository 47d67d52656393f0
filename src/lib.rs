//! psmodget library
//!
//! Core engine for installing PowerShell-style modules through an ordered
//! fallback chain of package clients, with a manual stage-and-copy last
//! resort. The resolver tries each candidate strategy in turn against a
//! probed environment snapshot, records one outcome per candidate, and
//! returns a single aggregate result.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod layout;
pub mod probe;
pub mod resolution;
pub mod resolver;
pub mod source;
pub mod strategy;

// Re-export main types for convenience
pub use cancel::CancelToken;
pub use config::{InstallRequest, InstallScope, ResolverConfig};
pub use error::InstallError;
pub use events::{EventSink, MemorySink, NullSink, ResolverEvent, TracingSink};
pub use probe::{ElevationLevel, EnvironmentProbe, ModulePath, NetworkState, PackageClient};
pub use resolution::{
    AttemptStatus, ResolutionPhase, ResolutionResult, ResolutionState, ResolutionStatus,
    StrategyAttempt, TransitionError,
};
pub use resolver::Resolver;
pub use source::{PackageSource, ProcessPackageSource};
pub use strategy::{
    ClassicClientInstall, InstallStrategy, InstalledModule, ModernClientInstall, Precondition,
    StagedCopyInstall, default_chain,
};
