//! Seeding of generated data into the platform.
//!
//! [`SeedPlan`] fixes the creation order once, [`SeedStore`] holds the
//! durable per-entity state, and [`Seeder`] walks the plan against the
//! platform client. Re-running a seed is always safe: created entities are
//! never submitted again.

pub mod orchestrator;
pub mod plan;
pub mod store;

pub use orchestrator::{SeedSummary, Seeder};
pub use plan::{NodePayload, SeedNode, SeedPlan};
pub use store::{EntryStatus, SeedEntry, SeedStore, StateCounts};
