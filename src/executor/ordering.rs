//! Ordering and grouping of test cases

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

use super::context::RunContext;
use crate::error::CapturedError;
use crate::models::{Identified, TestCase, TestCollection};

/// Orders the cases of one test class before they are grouped by method
pub trait TestCaseOrderer: Send + Sync {
    fn order_cases(&self, cases: Vec<Arc<TestCase>>) -> Vec<Arc<TestCase>>;
}

/// Orders the collections of an assembly
pub trait TestCollectionOrderer: Send + Sync {
    fn order_collections(&self, collections: Vec<Arc<TestCollection>>) -> Vec<Arc<TestCollection>>;
}

/// Keeps discovery order
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscoveryOrder;

impl TestCaseOrderer for DiscoveryOrder {
    fn order_cases(&self, cases: Vec<Arc<TestCase>>) -> Vec<Arc<TestCase>> {
        cases
    }
}

impl TestCollectionOrderer for DiscoveryOrder {
    fn order_collections(&self, collections: Vec<Arc<TestCollection>>) -> Vec<Arc<TestCollection>> {
        collections
    }
}

/// Sorts by display name (stable)
#[derive(Clone, Copy, Debug, Default)]
pub struct ByDisplayName;

impl TestCaseOrderer for ByDisplayName {
    fn order_cases(&self, mut cases: Vec<Arc<TestCase>>) -> Vec<Arc<TestCase>> {
        cases.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        cases
    }
}

impl TestCollectionOrderer for ByDisplayName {
    fn order_collections(&self, mut collections: Vec<Arc<TestCollection>>) -> Vec<Arc<TestCollection>> {
        collections.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        collections
    }
}

/// Group cases by a parent descriptor, keeping first-seen order of parents and cases
pub(crate) fn group_by<P, F>(cases: &[Arc<TestCase>], parent: F) -> Vec<(Arc<P>, Vec<Arc<TestCase>>)>
where
    P: Identified,
    F: Fn(&TestCase) -> &Arc<P>,
{
    let mut groups: Vec<(Arc<P>, Vec<Arc<TestCase>>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for case in cases {
        let owner = parent(case);
        match positions.get(owner.unique_id()) {
            Some(&index) => groups[index].1.push(Arc::clone(case)),
            None => {
                positions.insert(owner.unique_id().to_string(), groups.len());
                groups.push((Arc::clone(owner), vec![Arc::clone(case)]));
            }
        }
    }
    groups
}

/// Apply the run's case orderer; a panicking orderer leaves discovery order
pub(crate) fn order_cases(ctx: &RunContext, cases: Vec<Arc<TestCase>>) -> Vec<Arc<TestCase>> {
    let orderer = Arc::clone(&ctx.settings.case_orderer);
    let fallback = cases.clone();
    match std::panic::catch_unwind(AssertUnwindSafe(|| orderer.order_cases(cases))) {
        Ok(ordered) => ordered,
        Err(payload) => {
            let error = CapturedError::from_panic(payload);
            warn!("Test case orderer failed: {}", error);
            ctx.aggregator.add(error);
            fallback
        }
    }
}

/// Apply the run's collection orderer to grouped cases.
///
/// Groups the orderer drops are appended in their original order so no case
/// is lost.
pub(crate) fn order_collections(
    ctx: &RunContext,
    groups: Vec<(Arc<TestCollection>, Vec<Arc<TestCase>>)>,
) -> Vec<(Arc<TestCollection>, Vec<Arc<TestCase>>)> {
    let orderer = Arc::clone(&ctx.settings.collection_orderer);
    let collections: Vec<Arc<TestCollection>> = groups.iter().map(|(c, _)| Arc::clone(c)).collect();

    let ordered = match std::panic::catch_unwind(AssertUnwindSafe(|| orderer.order_collections(collections))) {
        Ok(ordered) => ordered,
        Err(payload) => {
            let error = CapturedError::from_panic(payload);
            warn!("Test collection orderer failed: {}", error);
            ctx.aggregator.add(error);
            return groups;
        }
    };

    let mut remaining: Vec<Option<(Arc<TestCollection>, Vec<Arc<TestCase>>)>> =
        groups.into_iter().map(Some).collect();
    let mut result = Vec::with_capacity(remaining.len());

    for collection in ordered {
        let slot = remaining.iter_mut().find(|slot| {
            slot.as_ref()
                .map_or(false, |(c, _)| c.unique_id == collection.unique_id)
        });
        if let Some(group) = slot.and_then(Option::take) {
            result.push(group);
        }
    }
    result.extend(remaining.into_iter().flatten());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestAssembly, TestBody, TestClass, TestMethod};

    fn cases() -> Vec<Arc<TestCase>> {
        let assembly = Arc::new(TestAssembly::new("suite"));
        let collection = Arc::new(TestCollection::new(&assembly, "c"));
        let class = Arc::new(TestClass::new(&collection, "K"));
        let beta = Arc::new(TestMethod::new(&class, "beta", TestBody::sync(|_, _| Ok(()))));
        let alpha = Arc::new(TestMethod::new(&class, "alpha", TestBody::sync(|_, _| Ok(()))));

        vec![
            Arc::new(TestCase::new(&beta).named("b1")),
            Arc::new(TestCase::new(&alpha).named("a1")),
            Arc::new(TestCase::new(&beta).named("b2")),
        ]
    }

    #[test]
    fn test_group_by_keeps_first_seen_order() {
        let groups = group_by(&cases(), |c| &c.method);
        let names: Vec<(&str, Vec<&str>)> = groups
            .iter()
            .map(|(m, cs)| (m.name.as_str(), cs.iter().map(|c| c.display_name.as_str()).collect()))
            .collect();

        assert_eq!(names, vec![("beta", vec!["b1", "b2"]), ("alpha", vec!["a1"])]);
    }

    #[test]
    fn test_by_display_name() {
        let ordered = ByDisplayName.order_cases(cases());
        let names: Vec<&str> = ordered.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["a1", "b1", "b2"]);
    }

    #[test]
    fn test_discovery_order_is_identity() {
        let original = cases();
        let ordered = DiscoveryOrder.order_cases(original.clone());
        assert!(original.iter().zip(&ordered).all(|(a, b)| Arc::ptr_eq(a, b)));
    }
}
