//! Execution environments: disposable isolated contexts for dynamic tests.
//!
//! # Modules
//!
//! - [`host`]   : `ExecutionHost` substrate trait and the in-process `LocalHost`
//! - [`fixture`]: `FixtureLoader` (HTTP, filesystem, in-memory)
//! - [`handle`] : `EnvironmentHandle`, one acquired context
//! - [`factory`]: `EnvironmentFactory`, the per-run scope that releases everything

pub mod factory;
pub mod fixture;
pub mod handle;
pub mod host;

pub use factory::EnvironmentFactory;
pub use fixture::{DefaultFixtureLoader, FixtureLoader, StaticFixtures};
pub use handle::EnvironmentHandle;
pub use host::{ContextFrame, ContextId, ExecutionHost, HostStats, LocalHost, UncaughtHandler};
