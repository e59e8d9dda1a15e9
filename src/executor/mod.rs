//! Test execution engine
//!
//! Runs the assembly → collection → class → method → case → test hierarchy,
//! publishing lifecycle messages at every level.

mod assembly_runner;
mod case_runner;
mod class_runner;
mod collection_runner;
mod context;
mod invoker;
mod lifecycle;
mod method_runner;
mod ordering;
mod parallel;
mod test_context;
mod test_runner;

pub use assembly_runner::AssemblyRunner;
pub use context::{CancellationSignal, DiagnosticSink};
pub use lifecycle::{NoHooks, RunnerHooks, Scope};
pub use ordering::{ByDisplayName, DiscoveryOrder, TestCaseOrderer, TestCollectionOrderer};
pub use parallel::SchedulingMode;
pub use test_context::{TestContext, TestOutputHelper};
