//! Shared run state handed down the runner hierarchy

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::lifecycle::RunnerHooks;
use super::ordering::{TestCaseOrderer, TestCollectionOrderer};
use crate::config::ExplicitMode;
use crate::error::{CapturedError, ExceptionAggregator};
use crate::messages::{DiagnosticMessage, Message, MessageBus};

/// Run-wide stop request.
///
/// Once set it is never cleared. Linking to a caller's token lets an external
/// abort stop the run without the run's own stop cancelling the caller.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked_to(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancellation requested");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled with this signal but cancellable on its own (per-test scope)
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Settings fixed for the whole run
pub(crate) struct ExecutionSettings {
    pub(crate) explicit_mode: ExplicitMode,
    pub(crate) case_orderer: Arc<dyn TestCaseOrderer>,
    pub(crate) collection_orderer: Arc<dyn TestCollectionOrderer>,
}

/// Per-level execution context.
///
/// The bus, signal, hooks and settings are shared by every level; each level
/// gets its own aggregator.
pub(crate) struct RunContext {
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) aggregator: ExceptionAggregator,
    pub(crate) cancellation: CancellationSignal,
    pub(crate) hooks: Arc<dyn RunnerHooks>,
    pub(crate) settings: Arc<ExecutionSettings>,
}

impl RunContext {
    pub(crate) fn new(
        bus: Arc<dyn MessageBus>,
        cancellation: CancellationSignal,
        hooks: Arc<dyn RunnerHooks>,
        settings: Arc<ExecutionSettings>,
    ) -> Self {
        Self {
            bus,
            aggregator: ExceptionAggregator::new(),
            cancellation,
            hooks,
            settings,
        }
    }

    /// Context for a child level whose aggregator starts out holding `seed`
    pub(crate) fn child(&self, seed: Option<&CapturedError>) -> Self {
        let aggregator = ExceptionAggregator::new();
        if let Some(error) = seed {
            aggregator.add(error.clone());
        }

        Self {
            bus: Arc::clone(&self.bus),
            aggregator,
            cancellation: self.cancellation.clone(),
            hooks: Arc::clone(&self.hooks),
            settings: Arc::clone(&self.settings),
        }
    }

    /// Publish, cancelling the run when the bus asks to stop
    pub(crate) fn publish(&self, message: Message) -> bool {
        let keep_going = self.bus.publish(message);
        if !keep_going {
            self.cancellation.cancel();
        }
        keep_going
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }
}

/// Lets fixtures report diagnostics; available to every fixture as a dependency
pub struct DiagnosticSink {
    bus: Arc<dyn MessageBus>,
    assembly_id: String,
}

impl DiagnosticSink {
    pub(crate) fn new(bus: Arc<dyn MessageBus>, assembly_id: impl Into<String>) -> Self {
        Self {
            bus,
            assembly_id: assembly_id.into(),
        }
    }

    pub fn send(&self, message: impl Into<String>) {
        self.bus.publish(Message::Diagnostic(DiagnosticMessage {
            assembly_id: self.assembly_id.clone(),
            message: message.into(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linked_signal_does_not_cancel_parent() {
        let external = CancellationToken::new();
        let signal = CancellationSignal::linked_to(&external);

        signal.cancel();
        assert!(signal.is_cancelled());
        assert!(!external.is_cancelled());
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let external = CancellationToken::new();
        let signal = CancellationSignal::linked_to(&external);
        let per_test = signal.child_token();

        external.cancel();
        assert!(signal.is_cancelled());
        assert!(per_test.is_cancelled());
    }

    #[test]
    fn test_child_token_is_independent() {
        let signal = CancellationSignal::new();
        let per_test = signal.child_token();

        per_test.cancel();
        assert!(!signal.is_cancelled());
    }
}
