//! Message sinks

use std::sync::{Mutex, MutexGuard};

use super::Message;

/// Receives every message published on a bus
pub trait MessageSink: Send + Sync {
    /// Handle a message; `false` requests that the run stop
    fn on_message(&self, message: &Message) -> bool;
}

impl<F> MessageSink for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn on_message(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Records everything it receives
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<Message>>,
    stop_on: Option<String>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `false` whenever a message with this name arrives
    pub fn stop_on(mut self, name: impl Into<String>) -> Self {
        self.stop_on = Some(name.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Message names in arrival order
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(Message::name).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Messages with the given name
    pub fn of_kind(&self, name: &str) -> Vec<Message> {
        self.lock()
            .iter()
            .filter(|m| m.name() == name)
            .cloned()
            .collect()
    }
}

impl MessageSink for CollectingSink {
    fn on_message(&self, message: &Message) -> bool {
        self.lock().push(message.clone());
        self.stop_on
            .as_deref()
            .map_or(true, |name| message.name() != name)
    }
}
