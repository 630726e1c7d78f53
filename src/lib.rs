//! Schema reconciliation engine
//!
//! Brings a PostgreSQL or SQLite database up to the application's expected
//! schema at startup. Corrective migrations are additive only: missing
//! tables are created and missing columns are added, nothing is dropped.
//! Baseline tenant and staff records are seeded afterwards and a
//! consistency report summarises the result.

pub mod config;
pub mod db;
pub mod drift;
pub mod error;
pub mod introspection;
pub mod migration;
pub mod report;
pub mod schema;
pub mod seed;
pub mod startup;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use db::{Backend, Database};
pub use drift::{DriftAction, DriftDetector, DriftPlan, MigrationUnit};
pub use error::{EngineError, EngineResult};
pub use introspection::SchemaIntrospector;
pub use migration::{ExecutionResult, MigrationExecutor};
pub use report::{ConsistencyReport, ConsistencyReporter};
pub use schema::ExpectedSchema;
pub use seed::{SeedCoordinator, UpsertPolicy};
pub use startup::{ReadySignal, StartupOrchestrator, StartupOutcome, StartupPhase};
