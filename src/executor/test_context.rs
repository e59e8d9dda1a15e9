//! Context passed to every test body

use chrono::Utc;
use std::any::Any;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::CapturedError;
use crate::fixtures::{FixtureInstance, FixtureMappingManager};
use crate::messages::{Message, MessageBus, TestOutput, UniqueIds};

struct OutputState {
    buffer: Mutex<String>,
    bus: Arc<dyn MessageBus>,
    ids: UniqueIds,
}

/// Captures a test's output and streams each line as it is written
#[derive(Clone)]
pub struct TestOutputHelper {
    state: Arc<OutputState>,
}

impl TestOutputHelper {
    pub(crate) fn new(bus: Arc<dyn MessageBus>, ids: UniqueIds) -> Self {
        Self {
            state: Arc::new(OutputState {
                buffer: Mutex::new(String::new()),
                bus,
                ids,
            }),
        }
    }

    pub fn write_line(&self, line: impl AsRef<str>) {
        let text = format!("{}\n", line.as_ref());
        self.state
            .buffer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_str(&text);

        self.state.bus.publish(Message::TestOutput(TestOutput {
            ids: self.state.ids.clone(),
            output: text,
        }));
    }

    /// Everything written so far
    pub fn output(&self) -> String {
        self.state
            .buffer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Everything a running test can reach
#[derive(Clone)]
pub struct TestContext {
    display_name: String,
    unique_id: String,
    token: CancellationToken,
    output: TestOutputHelper,
    instance: Option<FixtureInstance>,
    fixtures: Arc<FixtureMappingManager>,
    started: chrono::DateTime<Utc>,
}

impl TestContext {
    pub(crate) fn new(
        display_name: impl Into<String>,
        unique_id: impl Into<String>,
        token: CancellationToken,
        output: TestOutputHelper,
        instance: Option<FixtureInstance>,
        fixtures: Arc<FixtureMappingManager>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            unique_id: unique_id.into(),
            token,
            output,
            instance,
            fixtures,
            started: Utc::now(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Cancelled on run cancellation or when this test times out
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn output(&self) -> &TestOutputHelper {
        &self.output
    }

    pub fn write_line(&self, line: impl AsRef<str>) {
        self.output.write_line(line);
    }

    pub fn started(&self) -> chrono::DateTime<Utc> {
        self.started
    }

    /// The per-test class instance, if the class declares a constructor
    pub fn instance<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance
            .as_ref()
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Look up a fixture through the class, collection and assembly scopes
    pub async fn fixture<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>, CapturedError> {
        self.fixtures.get::<T>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CollectingSink, MessageSink, SynchronousMessageBus};

    #[test]
    fn test_output_accumulates_and_streams() {
        let sink = Arc::new(CollectingSink::new());
        let bus: Arc<dyn MessageBus> =
            Arc::new(SynchronousMessageBus::new(vec![sink.clone() as Arc<dyn MessageSink>]));
        let helper = TestOutputHelper::new(bus, UniqueIds::default());

        helper.write_line("first");
        helper.write_line("second");

        assert_eq!(helper.output(), "first\nsecond\n");
        assert_eq!(sink.names(), vec!["TestOutput", "TestOutput"]);
    }

    #[tokio::test]
    async fn test_instance_and_fixture_access() {
        let bus: Arc<dyn MessageBus> = Arc::new(SynchronousMessageBus::new(vec![]));
        let fixtures = Arc::new(
            FixtureMappingManager::new("Class", vec![], None).with_capability(Arc::new(5u64)),
        );
        let ctx = TestContext::new(
            "T",
            "id",
            CancellationToken::new(),
            TestOutputHelper::new(bus, UniqueIds::default()),
            Some(Arc::new(String::from("instance"))),
            fixtures,
        );

        assert_eq!(ctx.instance::<String>().as_deref().map(String::as_str), Some("instance"));
        assert!(ctx.instance::<u8>().is_none());
        assert_eq!(*ctx.fixture::<u64>().await.unwrap().unwrap(), 5);
    }
}
