//! Scoped fixture registry
//!
//! One manager per assembly, collection and class. Lookups consult ancestor
//! scopes first; fixtures are built once per scope and disposed in reverse
//! construction order.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::definition::{Dependencies, FixtureDefinition, FixtureInstance, FixtureKey};
use crate::error::{CapturedError, EngineError, FixturePhase};

#[derive(Default)]
struct ScopeState {
    instances: HashMap<FixtureKey, FixtureInstance>,
    /// Construction order, used for reverse-order disposal
    created: Vec<(FixtureDefinition, FixtureInstance)>,
    disposed: bool,
}

pub struct FixtureMappingManager {
    category: String,
    parent: Option<Arc<FixtureMappingManager>>,
    definitions: Vec<FixtureDefinition>,
    capabilities: HashMap<FixtureKey, FixtureInstance>,
    state: Mutex<ScopeState>,
}

impl FixtureMappingManager {
    pub fn new(
        category: impl Into<String>,
        definitions: Vec<FixtureDefinition>,
        parent: Option<Arc<FixtureMappingManager>>,
    ) -> Self {
        Self {
            category: category.into(),
            parent,
            definitions,
            capabilities: HashMap::new(),
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// Register a pre-built value that fixtures in this scope may depend on
    pub fn with_capability<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.capabilities.insert(FixtureKey::of::<T>(), value);
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Build every fixture declared for this scope.
    ///
    /// Failures do not stop the remaining fixtures from being built; they are
    /// returned together.
    pub async fn initialize(&self) -> Result<(), CapturedError> {
        let mut errors = Vec::new();
        for definition in &self.definitions {
            if let Err(e) = self.get_or_create(definition.key()).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CapturedError::aggregate(errors))
        }
    }

    /// Typed lookup
    pub async fn get<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>, CapturedError> {
        let instance = self.get_or_create(FixtureKey::of::<T>()).await?;
        Ok(instance.and_then(|value| value.downcast::<T>().ok()))
    }

    /// Find or build the fixture for `key`; `Ok(None)` when no scope knows it
    pub fn get_or_create(&self, key: FixtureKey) -> BoxFuture<'_, Result<Option<FixtureInstance>, CapturedError>> {
        async move {
            let mut state = self.state.lock().await;
            if state.disposed {
                return Err(EngineError::FixtureManagerDisposed {
                    category: self.category.clone(),
                }
                .into());
            }
            let mut chain = Vec::new();
            self.resolve(&mut state, key, &mut chain).await
        }
        .boxed()
    }

    fn resolve<'a>(
        &'a self,
        state: &'a mut ScopeState,
        key: FixtureKey,
        chain: &'a mut Vec<FixtureKey>,
    ) -> BoxFuture<'a, Result<Option<FixtureInstance>, CapturedError>> {
        async move {
            if let Some(existing) = state.instances.get(&key) {
                return Ok(Some(Arc::clone(existing)));
            }
            if let Some(capability) = self.capabilities.get(&key) {
                return Ok(Some(Arc::clone(capability)));
            }
            if let Some(parent) = &self.parent {
                if let Some(found) = parent.get_or_create(key).await? {
                    return Ok(Some(found));
                }
            }

            let Some(definition) = self.definitions.iter().find(|d| d.key() == key).cloned() else {
                return Ok(None);
            };

            if chain.contains(&key) {
                let mut names: Vec<String> = chain.iter().map(|k| k.to_string()).collect();
                names.push(key.to_string());
                return Err(EngineError::DependencyCycle {
                    category: self.category.clone(),
                    type_name: key.to_string(),
                    chain: names.join(" -> "),
                }
                .into());
            }

            chain.push(key);
            let built = self.build(state, &definition, chain).await;
            chain.pop();

            let instance = built?;
            debug!("{} fixture {} created", self.category, key);
            state.instances.insert(key, Arc::clone(&instance));
            state.created.push((definition.clone(), Arc::clone(&instance)));

            if let Some(init) = &definition.initialize {
                run_step(init(Arc::clone(&instance)))
                    .await
                    .map_err(|e| self.lifecycle_error(&definition, FixturePhase::InitializeAsync, e))?;
            }

            Ok(Some(instance))
        }
        .boxed()
    }

    /// Resolve dependencies (within this scope's lock) and call the constructor
    fn build<'a>(
        &'a self,
        state: &'a mut ScopeState,
        definition: &'a FixtureDefinition,
        chain: &'a mut Vec<FixtureKey>,
    ) -> BoxFuture<'a, Result<FixtureInstance, CapturedError>> {
        async move {
            let constructor = self.single_constructor(definition)?;

            let mut values = HashMap::new();
            let mut missing = Vec::new();
            for dependency in &constructor.dependencies {
                match self.resolve(state, *dependency, chain).await? {
                    Some(value) => {
                        values.insert(*dependency, value);
                    }
                    None => missing.push(dependency.to_string()),
                }
            }
            if !missing.is_empty() {
                return Err(EngineError::UnresolvedDependencies {
                    category: self.category.clone(),
                    type_name: definition.type_name().to_string(),
                    missing: missing.join(", "),
                }
                .into());
            }

            self.invoke_constructor(definition, constructor, Dependencies::new(values))
        }
        .boxed()
    }

    /// Build a value that is not cached in this scope (e.g. a test class instance)
    pub async fn construct_transient(&self, definition: &FixtureDefinition) -> Result<FixtureInstance, CapturedError> {
        let constructor = self.single_constructor(definition)?;

        let mut values = HashMap::new();
        let mut missing = Vec::new();
        for dependency in &constructor.dependencies {
            match self.get_or_create(*dependency).await? {
                Some(value) => {
                    values.insert(*dependency, value);
                }
                None => missing.push(dependency.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::UnresolvedDependencies {
                category: self.category.clone(),
                type_name: definition.type_name().to_string(),
                missing: missing.join(", "),
            }
            .into());
        }

        let instance = self.invoke_constructor(definition, constructor, Dependencies::new(values))?;
        if let Some(init) = &definition.initialize {
            run_step(init(Arc::clone(&instance)))
                .await
                .map_err(|e| self.lifecycle_error(definition, FixturePhase::InitializeAsync, e))?;
        }
        Ok(instance)
    }

    /// Dispose a value built by `construct_transient`
    pub async fn dispose_transient(
        &self,
        definition: &FixtureDefinition,
        instance: FixtureInstance,
    ) -> Result<(), CapturedError> {
        self.dispose_one(definition, instance).await
    }

    /// Dispose every fixture built in this scope, newest first.
    ///
    /// Every fixture is attempted even if an earlier one fails.
    pub async fn dispose(&self) -> Result<(), CapturedError> {
        let created = {
            let mut state = self.state.lock().await;
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
            state.instances.clear();
            std::mem::take(&mut state.created)
        };

        let mut errors = Vec::new();
        for (definition, instance) in created.into_iter().rev() {
            if let Err(e) = self.dispose_one(&definition, instance).await {
                warn!("{}", e);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CapturedError::aggregate(errors))
        }
    }

    async fn dispose_one(&self, definition: &FixtureDefinition, instance: FixtureInstance) -> Result<(), CapturedError> {
        if let Some(dispose_async) = &definition.dispose_async {
            run_step(dispose_async(instance))
                .await
                .map_err(|e| self.lifecycle_error(definition, FixturePhase::DisposeAsync, e))
        } else if let Some(dispose) = &definition.dispose {
            catch(|| dispose(&instance)).map_err(|e| self.lifecycle_error(definition, FixturePhase::Dispose, e))
        } else {
            Ok(())
        }
    }

    fn single_constructor<'d>(
        &self,
        definition: &'d FixtureDefinition,
    ) -> Result<&'d super::definition::FixtureConstructor, CapturedError> {
        match definition.constructors.as_slice() {
            [only] => Ok(only),
            _ => Err(EngineError::MultipleConstructors {
                category: self.category.clone(),
                type_name: definition.type_name().to_string(),
            }
            .into()),
        }
    }

    fn invoke_constructor(
        &self,
        definition: &FixtureDefinition,
        constructor: &super::definition::FixtureConstructor,
        dependencies: Dependencies,
    ) -> Result<FixtureInstance, CapturedError> {
        catch(|| (constructor.factory)(&dependencies))
            .map_err(|e| self.lifecycle_error(definition, FixturePhase::Constructor, e))
    }

    fn lifecycle_error(&self, definition: &FixtureDefinition, phase: FixturePhase, cause: CapturedError) -> CapturedError {
        CapturedError::from(EngineError::FixtureLifecycle {
            category: self.category.clone(),
            type_name: definition.type_name().to_string(),
            phase,
        })
        .with_inner(cause)
    }
}

fn catch<T>(f: impl FnOnce() -> Result<T, CapturedError>) -> Result<T, CapturedError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(CapturedError::from_panic(payload)))
}

async fn run_step(step: BoxFuture<'static, Result<(), CapturedError>>) -> Result<(), CapturedError> {
    AssertUnwindSafe(step)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(CapturedError::from_panic(payload)))
}
