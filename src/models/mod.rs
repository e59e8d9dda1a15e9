//! Data models
//!
//! Descriptors for the test tree, bound arguments and run summaries.

mod arguments;
mod descriptors;
mod summary;
mod unique_id;

pub use arguments::{ArgDisposal, DataRow, TestArg, TestArgs};
pub use descriptors::{
    BeforeAfterHook, Identified, RowIter, RowSource, Test, TestAssembly, TestBody, TestCase, TestClass,
    TestCollection, TestData, TestMethod, TestResult, Traits,
};
pub use summary::RunSummary;
pub use unique_id::UniqueIdGenerator;
