//! Message buses
//!
//! A bus fans each message out to every registered sink and reports whether the
//! run should continue.

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Message, MessageSink};

pub trait MessageBus: Send + Sync {
    /// Deliver a message; `false` asks the engine to stop
    fn publish(&self, message: Message) -> bool;

    /// Wait until every queued message has been delivered
    fn shutdown(&self) -> BoxFuture<'_, ()> {
        future::ready(()).boxed()
    }
}

/// Deliver to one sink, treating a panicking sink as "keep going"
fn deliver(sink: &Arc<dyn MessageSink>, message: &Message) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(|| sink.on_message(message))) {
        Ok(keep_going) => keep_going,
        Err(_) => {
            warn!("Message sink panicked while handling {}", message.name());
            true
        }
    }
}

/// Delivers inline on the publishing task
pub struct SynchronousMessageBus {
    sinks: Vec<Arc<dyn MessageSink>>,
}

impl SynchronousMessageBus {
    pub fn new(sinks: Vec<Arc<dyn MessageSink>>) -> Self {
        Self { sinks }
    }
}

impl MessageBus for SynchronousMessageBus {
    fn publish(&self, message: Message) -> bool {
        // Every sink sees the message even after one asks to stop.
        self.sinks
            .iter()
            .fold(true, |keep_going, sink| deliver(sink, &message) && keep_going)
    }
}

/// Queues messages and delivers them in order from a dedicated worker task.
///
/// `publish` never blocks; it reports the latest continuation decision made by
/// the sinks, so a stop request is observed on a later publish.
pub struct AsyncMessageBus {
    sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    keep_going: Arc<AtomicBool>,
}

impl AsyncMessageBus {
    /// Must be called from within a Tokio runtime
    pub fn new(sinks: Vec<Arc<dyn MessageSink>>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();
        let keep_going = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&keep_going);

        let worker = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let mut continue_run = true;
                for sink in &sinks {
                    continue_run &= deliver(sink, &message);
                }
                if !continue_run {
                    flag.store(false, Ordering::SeqCst);
                }
            }
            debug!("Message bus worker drained");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            keep_going,
        }
    }
}

impl MessageBus for AsyncMessageBus {
    fn publish(&self, message: Message) -> bool {
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(message).is_err() {
                    warn!("Message bus worker is gone; dropping message");
                }
            }
            None => warn!("Publish after message bus shutdown: {}", message.name()),
        }
        self.keep_going.load(Ordering::SeqCst)
    }

    fn shutdown(&self) -> BoxFuture<'_, ()> {
        async move {
            // Dropping the sender lets the worker finish the queue and exit.
            drop(self.sender.lock().unwrap_or_else(|p| p.into_inner()).take());
            let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
            if let Some(worker) = worker {
                if let Err(e) = worker.await {
                    warn!("Message bus worker failed: {}", e);
                }
            }
        }
        .boxed()
    }
}

/// Pick the bus implementation for a run
pub fn create_message_bus(synchronous: bool, sinks: Vec<Arc<dyn MessageSink>>) -> Arc<dyn MessageBus> {
    if synchronous {
        Arc::new(SynchronousMessageBus::new(sinks))
    } else {
        Arc::new(AsyncMessageBus::new(sinks))
    }
}
