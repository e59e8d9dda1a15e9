//! trellis - execution core of an xUnit-style test engine
//!
//! Given already-discovered test descriptors, runs them through a six-level
//! hierarchy (assembly, collection, class, method, case, test), publishing
//! Starting/Finished/CleanupFailure messages at every level and rolling
//! results up into [`models::RunSummary`] values.
//!
//! ## Features
//!
//! - Synchronous and background message buses with stop-on-false semantics
//! - Error aggregation per level, flattened into [`error::ErrorMetadata`]
//! - Data-driven (theory) cases with per-row argument disposal
//! - Assembly/collection/class fixtures with dependency injection
//! - Conservative and aggressive parallel scheduling of collections
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis::config::RunOptions;
//! use trellis::executor::AssemblyRunner;
//! use trellis::messages::{CollectingSink, MessageSink};
//! use trellis::models::{TestAssembly, TestBody, TestCase, TestClass, TestCollection, TestMethod};
//!
//! # async fn demo() {
//! let assembly = Arc::new(TestAssembly::new("suite"));
//! let collection = Arc::new(TestCollection::new(&assembly, "default"));
//! let class = Arc::new(TestClass::new(&collection, "MathTests"));
//! let method = Arc::new(TestMethod::new(&class, "adds", TestBody::sync(|_, _| Ok(()))));
//!
//! let sink = Arc::new(CollectingSink::new());
//! let summary = AssemblyRunner::new(RunOptions::default())
//!     .run(assembly, vec![Arc::new(TestCase::new(&method))], vec![sink.clone() as Arc<dyn MessageSink>])
//!     .await;
//! assert_eq!(summary.total, 1);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod fixtures;
pub mod messages;
pub mod models;
pub mod output;
pub mod utils;
