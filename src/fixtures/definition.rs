//! Fixture definitions
//!
//! A definition is the type-erased recipe for one shared fixture: its
//! constructors, their dependencies, and optional async init / dispose steps.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::CapturedError;

/// A live fixture value
pub type FixtureInstance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Dependencies) -> Result<FixtureInstance, CapturedError> + Send + Sync>;
type AsyncStep = Arc<dyn Fn(FixtureInstance) -> BoxFuture<'static, Result<(), CapturedError>> + Send + Sync>;
type SyncStep = Arc<dyn Fn(&FixtureInstance) -> Result<(), CapturedError> + Send + Sync>;

/// Identifies a fixture by its Rust type
#[derive(Clone, Copy, Debug)]
pub struct FixtureKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl FixtureKey {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for FixtureKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for FixtureKey {}

impl Hash for FixtureKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Resolved constructor arguments, looked up by type
pub struct Dependencies {
    values: HashMap<FixtureKey, FixtureInstance>,
}

impl Dependencies {
    pub(crate) fn new(values: HashMap<FixtureKey, FixtureInstance>) -> Self {
        Self { values }
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CapturedError> {
        let key = FixtureKey::of::<T>();
        self.values
            .get(&key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or_else(|| {
                CapturedError::new(
                    "trellis::MissingDependency",
                    format!("Dependency '{}' was not declared by this constructor", key),
                )
            })
    }
}

#[derive(Clone)]
pub(crate) struct FixtureConstructor {
    pub(crate) dependencies: Vec<FixtureKey>,
    pub(crate) factory: Factory,
}

/// Recipe for building, initializing and disposing one fixture type
#[derive(Clone)]
pub struct FixtureDefinition {
    key: FixtureKey,
    pub(crate) constructors: Vec<FixtureConstructor>,
    pub(crate) initialize: Option<AsyncStep>,
    pub(crate) dispose: Option<SyncStep>,
    pub(crate) dispose_async: Option<AsyncStep>,
}

impl FixtureDefinition {
    pub fn builder<T: Any + Send + Sync>() -> FixtureBuilder<T> {
        FixtureBuilder {
            definition: FixtureDefinition {
                key: FixtureKey::of::<T>(),
                constructors: Vec::new(),
                initialize: None,
                dispose: None,
                dispose_async: None,
            },
            _marker: PhantomData,
        }
    }

    /// Fixture with a single dependency-free constructor
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, CapturedError> + Send + Sync + 'static,
    {
        Self::builder::<T>()
            .constructor(Vec::new(), move |_| factory())
            .build()
    }

    pub fn key(&self) -> FixtureKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.type_name()
    }

    pub fn has_dispose(&self) -> bool {
        self.dispose.is_some() || self.dispose_async.is_some()
    }
}

impl fmt::Debug for FixtureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDefinition")
            .field("type", &self.key.type_name)
            .field("constructors", &self.constructors.len())
            .field("initialize", &self.initialize.is_some())
            .field("dispose", &self.has_dispose())
            .finish()
    }
}

/// Typed builder for a [`FixtureDefinition`]
pub struct FixtureBuilder<T> {
    definition: FixtureDefinition,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> FixtureBuilder<T> {
    /// Add a constructor taking the listed fixture types
    pub fn constructor<F>(mut self, dependencies: Vec<FixtureKey>, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<T, CapturedError> + Send + Sync + 'static,
    {
        self.definition.constructors.push(FixtureConstructor {
            dependencies,
            factory: Arc::new(move |deps: &Dependencies| {
                factory(deps).map(|value| Arc::new(value) as FixtureInstance)
            }),
        });
        self
    }

    /// Async initialization awaited right after construction
    pub fn initialize_with<F, Fut>(mut self, init: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CapturedError>> + Send + 'static,
    {
        self.definition.initialize = Some(typed_async_step(init));
        self
    }

    pub fn dispose_with<F>(mut self, dispose: F) -> Self
    where
        F: Fn(&T) -> Result<(), CapturedError> + Send + Sync + 'static,
    {
        self.definition.dispose = Some(Arc::new(move |value: &FixtureInstance| {
            match value.downcast_ref::<T>() {
                Some(typed) => dispose(typed),
                None => Ok(()),
            }
        }));
        self
    }

    /// Async disposal; preferred over `dispose_with` when both are set
    pub fn dispose_async_with<F, Fut>(mut self, dispose: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CapturedError>> + Send + 'static,
    {
        self.definition.dispose_async = Some(typed_async_step(dispose));
        self
    }

    pub fn build(self) -> FixtureDefinition {
        self.definition
    }
}

fn typed_async_step<T, F, Fut>(step: F) -> AsyncStep
where
    T: Any + Send + Sync,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CapturedError>> + Send + 'static,
{
    Arc::new(move |value: FixtureInstance| match value.downcast::<T>() {
        Ok(typed) => step(typed).boxed(),
        Err(_) => futures::future::ready(Ok(())).boxed(),
    })
}
