//! Deterministic unique ids for descriptors and tests

use sha2::{Digest, Sha256};

/// Builds stable ids by hashing a parent id together with local names.
pub struct UniqueIdGenerator {
    hasher: Sha256,
}

impl UniqueIdGenerator {
    fn new(parent: &str) -> Self {
        let mut generator = Self {
            hasher: Sha256::new(),
        };
        generator.add(parent);
        generator
    }

    fn add(&mut self, value: &str) {
        self.hasher.update(value.as_bytes());
        // Separator so ("ab", "c") and ("a", "bc") hash differently.
        self.hasher.update([0u8]);
    }

    fn compute(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    pub fn for_assembly(name: &str) -> String {
        Self::new(name).compute()
    }

    pub fn for_collection(assembly_id: &str, collection_name: &str) -> String {
        let mut generator = Self::new(assembly_id);
        generator.add(collection_name);
        generator.compute()
    }

    pub fn for_class(collection_id: &str, class_name: &str) -> String {
        let mut generator = Self::new(collection_id);
        generator.add(class_name);
        generator.compute()
    }

    pub fn for_method(class_id: &str, method_name: &str) -> String {
        let mut generator = Self::new(class_id);
        generator.add(method_name);
        generator.compute()
    }

    pub fn for_case(method_id: &str, case_name: &str) -> String {
        let mut generator = Self::new(method_id);
        generator.add(case_name);
        generator.compute()
    }

    /// Index -1 is reserved for synthetic tests standing in for a whole case
    pub fn for_test(case_id: &str, index: i32) -> String {
        let mut generator = Self::new(case_id);
        generator.add(&index.to_string());
        generator.compute()
    }
}
