//! Platform lifecycle: start, readiness polling and teardown.
//!
//! The [`LifecycleController`] is the only owner of [`LifecycleStatus`].
//! Container operations go through the [`ContainerRuntime`] trait so the
//! state machine can be driven by a scripted runtime in tests.

pub mod controller;
pub mod runtime;

pub use controller::{LifecycleController, LifecycleStatus};
pub use runtime::{ComposeRuntime, ContainerRuntime};
