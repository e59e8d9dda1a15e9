//! Flattened error representation
//!
//! Pre-order traversal of an error and its causes into parallel arrays, with
//! `parent_indices[i] == -1` marking a root.

use serde::{Deserialize, Serialize};

use super::{CapturedError, FailureCause};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub types: Vec<String>,
    pub messages: Vec<String>,
    pub stack_traces: Vec<Option<String>>,
    pub parent_indices: Vec<i32>,
    pub cause: FailureCause,
}

impl ErrorMetadata {
    pub fn extract(error: &CapturedError) -> Self {
        let mut metadata = ErrorMetadata {
            cause: error.cause(),
            ..Default::default()
        };
        metadata.push(error, -1);
        metadata
    }

    fn push(&mut self, error: &CapturedError, parent: i32) {
        if error.is_aggregate() {
            for inner in error.inner() {
                self.push(inner, parent);
            }
            return;
        }

        let index = self.types.len() as i32;
        self.types.push(error.type_name().to_string());
        self.messages.push(error.message().to_string());
        self.stack_traces.push(error.stack_trace().map(str::to_string));
        self.parent_indices.push(parent);

        for inner in error.inner() {
            self.push(inner, index);
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Indices of the root errors
    pub fn roots(&self) -> Vec<usize> {
        self.parent_indices
            .iter()
            .enumerate()
            .filter(|(_, parent)| **parent == -1)
            .map(|(i, _)| i)
            .collect()
    }

    /// Multi-line message with nested causes indented by depth
    pub fn combined_message(&self) -> String {
        self.roots()
            .into_iter()
            .map(|root| self.message_at(root, 0))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn message_at(&self, index: usize, depth: usize) -> String {
        let mut result = String::new();
        if depth > 0 {
            result.push_str(&"----".repeat(depth));
            result.push(' ');
        }
        result.push_str(&format!("{} : {}", self.types[index], self.messages[index]));

        for child in (index + 1)..self.len() {
            if self.parent_indices[child] == index as i32 {
                result.push('\n');
                result.push_str(&self.message_at(child, depth + 1));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_order_with_parent_links() {
        let error = CapturedError::new("Root", "top")
            .with_inner(CapturedError::new("Left", "l").with_inner(CapturedError::new("LeftLeaf", "ll")))
            .with_inner(CapturedError::new("Right", "r"));

        let metadata = error.metadata();
        assert_eq!(metadata.types, vec!["Root", "Left", "LeftLeaf", "Right"]);
        assert_eq!(metadata.parent_indices, vec![-1, 0, 1, 0]);
        assert_eq!(metadata.roots(), vec![0]);
    }

    #[test]
    fn test_nested_aggregate_is_transparent() {
        let nested = CapturedError::aggregate(vec![
            CapturedError::new("A", "a"),
            CapturedError::new("B", "b"),
        ]);
        let error = CapturedError::new("Wrapper", "w").with_inner(nested);

        let metadata = error.metadata();
        assert_eq!(metadata.types, vec!["Wrapper", "A", "B"]);
        assert_eq!(metadata.parent_indices, vec![-1, 0, 0]);
    }

    #[test]
    fn test_combined_message() {
        let error = CapturedError::new("Outer", "outer").with_inner(CapturedError::new("Inner", "inner"));
        assert_eq!(
            error.metadata().combined_message(),
            "Outer : outer\n---- Inner : inner"
        );
    }
}
