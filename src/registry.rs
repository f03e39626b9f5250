//! The object registry: lazy, memoized resolution of named objects.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;

use crate::config::RegistryConfig;
use crate::error::{DeclarationError, LoadError, ResolveError};
use crate::inject::{Factory, Instance};
use crate::loader::{AffixLocator, FileLoader, LocatorPolicy, RemoteLoader};
use crate::resolve::{FactoryDeclaration, WaitGraph};
use crate::script::{ModuleScript, NativeCatalog, SourceExecutor};
use crate::slot::{DeclarationFuture, DeclarationSlot, SlotSender};

/// Eventual instance of an object, shared by every caller of [ObjectRegistry::get]
pub type InstanceFuture = Shared<BoxFuture<'static, Result<Instance, ResolveError>>>;

struct RegistryInner {
    objects: Mutex<HashMap<String, InstanceFuture>>,
    declarations: Mutex<HashMap<String, DeclarationSlot>>,
    waits: WaitGraph,
    loader: Arc<dyn RemoteLoader>,
    executor: Arc<dyn SourceExecutor>,
    locator: Arc<dyn LocatorPolicy>,
    load_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of lazily created singletons.
///
/// Each name maps to at most one declaration slot and at most one instance future.
/// Both are created on first use and live as long as the registry.
/// An object is created once all its dependencies are available; a name that was never
/// declared is loaded on demand through the remote loader.
///
/// Cloning a registry is cheap: clones share the same objects and declarations.
#[derive(Clone)]
pub struct ObjectRegistry {
    inner: Arc<RegistryInner>,
}

impl ObjectRegistry {
    /// Registry with the default configuration, loading sources from the current directory
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Locator from which the declaration of `name` is loaded
    pub fn resolve_url(&self, name: &str) -> String {
        self.inner.locator.resolve_url(name)
    }

    /// Declare an object with an explicit list of dependencies
    pub fn define<I, S>(
        &self,
        name: impl Into<String>,
        deps: I,
        factory: Factory,
    ) -> Result<(), DeclarationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declare(Declare::new(factory).named(name).with_deps(deps), None)
    }

    /// Declare an object whose dependencies are the declared parameter names of its factory
    pub fn define_inferred(
        &self,
        name: impl Into<String>,
        factory: Factory,
    ) -> Result<(), DeclarationError> {
        self.declare(Declare::new(factory).named(name), None)
    }

    /// Validate and register a declaration.
    ///
    /// Without a name, the declaration targets the object being loaded in `context`.
    /// Failures are logged and returned, they do not affect any other name.
    pub fn declare(
        &self,
        declare: Declare,
        context: Option<&LoadContext>,
    ) -> Result<(), DeclarationError> {
        match declare.check(context) {
            Ok(declaration) => {
                self.define_internal(declaration);
                Ok(())
            }
            Err(e) => {
                let locator = context.map_or("unknown", |c| c.locator());
                tracing::error!(error = %e, locator, "invalid declaration");
                Err(e)
            }
        }
    }

    fn define_internal(&self, declaration: FactoryDeclaration) {
        let declaration = Arc::new(declaration);
        let name = declaration.name().to_string();
        let mut slots = lock(&self.inner.declarations);

        if let Some(slot) = slots.get(&name) {
            if slot.settle(Ok(declaration.clone())) {
                tracing::debug!(name, "declared");
                return;
            }
            // objects already created from the previous declaration keep it
            tracing::warn!(name, "overriding factory");
        } else {
            tracing::debug!(name, "declared");
        }
        slots.insert(name, DeclarationSlot::fulfilled(declaration));
    }

    /// Register an existing instance, replacing any previous instance future for `name`
    pub fn put<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) {
        self.put_instance(name, Arc::new(value));
    }

    pub fn put_instance(&self, name: impl Into<String>, instance: Instance) {
        let name = name.into();
        tracing::debug!(name, "instance registered");
        let ready = future::ready(Ok(instance)).boxed().shared();
        lock(&self.inner.objects).insert(name, ready);
    }

    /// Obtain the instance future of an object.
    ///
    /// The first call for a name creates the future: it waits for the declaration
    /// (loading it if needed), then for the dependencies, then invokes the factory.
    /// Every later call returns the same future, even while it is still pending.
    pub fn get(&self, name: &str) -> InstanceFuture {
        if let Some(instance) = lock(&self.inner.objects).get(name) {
            return instance.clone();
        }

        // the declaration is obtained without holding the lock: locators may use the registry
        let declaration = self.get_factory(name);
        let registry = Arc::downgrade(&self.inner);
        let owner = name.to_string();
        let instance = async move {
            let declaration = declaration.await?;
            let registry = ObjectRegistry::upgrade(&registry, &owner)?;
            declaration.create(&registry).await
        }
        .boxed()
        .shared();

        lock(&self.inner.objects)
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(name, "new instance future");
                instance
            })
            .clone()
    }

    /// Obtain an object and downcast it to its concrete type
    pub async fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ResolveError> {
        let instance = self.get(name).await?;
        instance.downcast::<T>().map_err(|_| ResolveError::WrongType {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Whether an instance future exists for `name`. Never triggers a load.
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner.objects).contains_key(name)
    }

    /// Obtain the declaration future of an object, starting its load if it has no slot yet.
    ///
    /// The load runs once, when the returned future is first polled.
    pub fn get_factory(&self, name: &str) -> DeclarationFuture {
        if let Some(slot) = lock(&self.inner.declarations).get(name) {
            return slot.future();
        }

        let locator = self.resolve_url(name);
        let registry = Arc::downgrade(&self.inner);
        lock(&self.inner.declarations)
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(name, locator, "declaration slot created");
                DeclarationSlot::pending(name, move |sender| load(registry, sender, locator))
            })
            .future()
    }

    pub(crate) fn wait_graph(&self) -> &WaitGraph {
        &self.inner.waits
    }

    fn upgrade(inner: &Weak<RegistryInner>, name: &str) -> Result<Self, ResolveError> {
        inner
            .upgrade()
            .map(|inner| Self { inner })
            .ok_or_else(|| ResolveError::Abandoned {
                name: name.to_string(),
            })
    }
}

/// Fetch and execute the source expected to declare the object of a pending slot
async fn load(registry: Weak<RegistryInner>, sender: SlotSender, locator: String) {
    let name = sender.name().to_string();
    let registry = match ObjectRegistry::upgrade(&registry, &name) {
        Ok(registry) => registry,
        Err(e) => {
            sender.settle(Err(e));
            return;
        }
    };

    if sender.is_settled() {
        tracing::debug!(name, "declared before loading");
        return;
    }

    tracing::debug!(name, locator, "loading");
    let timeout = registry.inner.load_timeout;
    let fetched = tokio::time::timeout(timeout, registry.inner.loader.fetch(&locator))
        .await
        .unwrap_or(Err(LoadError::Timeout { after: timeout }));

    let failure = match fetched {
        Ok(_) if sender.is_settled() => return,
        Ok(source) => {
            let scope = LoadScope::new(registry.clone(), LoadContext::new(&name, &locator));
            match registry.inner.executor.execute(&source, &scope) {
                Ok(()) if sender.is_settled() => return,
                Ok(()) => ResolveError::DefinitionMissing {
                    name: name.clone(),
                    locator: locator.clone(),
                },
                Err(e) => ResolveError::Load {
                    name: name.clone(),
                    locator: locator.clone(),
                    source: LoadError::Execution(e.to_string()),
                },
            }
        }
        Err(source) => ResolveError::Load {
            name: name.clone(),
            locator: locator.clone(),
            source,
        },
    };

    if sender.settle(Err(failure.clone())) {
        tracing::error!(name, locator, error = %failure, "declaration failed");
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("objects", &lock(&self.inner.objects).len())
            .field("declarations", &lock(&self.inner.declarations).len())
            .field("load_timeout", &self.inner.load_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder of [ObjectRegistry]
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    load_timeout: Option<Duration>,
    loader: Option<Arc<dyn RemoteLoader>>,
    executor: Option<Arc<dyn SourceExecutor>>,
    locator: Option<Arc<dyn LocatorPolicy>>,
}

impl RegistryBuilder {
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn loader(mut self, loader: impl RemoteLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn executor(mut self, executor: impl SourceExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Execute loaded sources as module scripts referring to the given factories
    pub fn catalog(self, catalog: NativeCatalog) -> Self {
        self.executor(ModuleScript::new(catalog))
    }

    /// Override the mapping of names to locators
    pub fn locator(mut self, locator: impl LocatorPolicy + 'static) -> Self {
        self.locator = Some(Arc::new(locator));
        self
    }

    pub fn build(self) -> ObjectRegistry {
        let config = self.config;
        let inner = RegistryInner {
            objects: Mutex::default(),
            declarations: Mutex::default(),
            waits: WaitGraph::default(),
            loader: self
                .loader
                .unwrap_or_else(|| Arc::new(FileLoader::new(config.base_dir.clone()))),
            executor: self
                .executor
                .unwrap_or_else(|| Arc::new(ModuleScript::default())),
            locator: self
                .locator
                .unwrap_or_else(|| Arc::new(AffixLocator::from(&config.locator))),
            load_timeout: self.load_timeout.unwrap_or_else(|| config.load_timeout()),
        };
        ObjectRegistry {
            inner: Arc::new(inner),
        }
    }
}

/// Arguments of a declaration, checked when registered.
///
/// A declaration without name targets the object being loaded.
/// A declaration without dependencies takes the declared parameter names of its factory.
#[derive(Debug, Clone, Default)]
pub struct Declare {
    pub name: Option<String>,
    pub deps: Option<Vec<String>>,
    pub factory: Option<Factory>,
    /// Where the factory was looked up, for diagnostics
    pub origin: Option<String>,
}

impl Declare {
    pub fn new(factory: Factory) -> Self {
        Self {
            factory: Some(factory),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    fn check(self, context: Option<&LoadContext>) -> Result<FactoryDeclaration, DeclarationError> {
        let Declare {
            name,
            deps,
            factory,
            origin,
        } = self;

        let name = match (name, &deps) {
            (Some(name), _) => name,
            // an explicit dependency list comes with an explicit name
            (None, Some(_)) => return Err(DeclarationError::InvalidName),
            (None, None) => context
                .map(|c| c.expected_name().to_string())
                .ok_or(DeclarationError::CannotInferName)?,
        };
        if name.trim().is_empty() {
            return Err(DeclarationError::InvalidName);
        }

        if let Some(deps) = &deps {
            if deps.iter().any(|dep| dep.trim().is_empty()) {
                return Err(DeclarationError::InvalidDependencies(format!("{deps:?}")));
            }
        }

        let factory = factory.ok_or_else(|| {
            DeclarationError::NotCallable(origin.unwrap_or_else(|| "no factory given".to_string()))
        })?;

        let deps = match deps {
            Some(deps) => deps,
            None => factory.inferred_deps(&name)?,
        };
        factory.check_arity(&name, deps.len())?;

        Ok(FactoryDeclaration::new(name, deps, factory))
    }
}

/// The object a source is loaded for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    expected_name: String,
    locator: String,
}

impl LoadContext {
    pub fn new(expected_name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            expected_name: expected_name.into(),
            locator: locator.into(),
        }
    }

    pub fn expected_name(&self) -> &str {
        &self.expected_name
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// The registry as seen by a source while it is executed
#[derive(Debug, Clone)]
pub struct LoadScope {
    registry: ObjectRegistry,
    context: LoadContext,
}

impl LoadScope {
    pub fn new(registry: ObjectRegistry, context: LoadContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn context(&self) -> &LoadContext {
        &self.context
    }

    pub fn declare(&self, declare: Declare) -> Result<(), DeclarationError> {
        self.registry.declare(declare, Some(&self.context))
    }

    pub fn define<I, S>(
        &self,
        name: impl Into<String>,
        deps: I,
        factory: Factory,
    ) -> Result<(), DeclarationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declare(Declare::new(factory).named(name).with_deps(deps))
    }

    pub fn define_inferred(
        &self,
        name: impl Into<String>,
        factory: Factory,
    ) -> Result<(), DeclarationError> {
        self.declare(Declare::new(factory).named(name))
    }

    /// Declare the object this source is loaded for
    pub fn define_anonymous(&self, factory: Factory) -> Result<(), DeclarationError> {
        self.declare(Declare::new(factory))
    }

    pub fn put<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) {
        self.registry.put(name, value);
    }

    pub fn get(&self, name: &str) -> InstanceFuture {
        self.registry.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Factory {
        Factory::from_fn(|| ())
    }

    #[test]
    fn anonymous_declaration_needs_a_load_context() {
        let declare = Declare::new(unit());
        assert_eq!(
            declare.clone().check(None).err(),
            Some(DeclarationError::CannotInferName)
        );

        let context = LoadContext::new("Foo", "Foo.mod");
        let declaration = declare.check(Some(&context)).unwrap();
        assert_eq!(declaration.name(), "Foo");
        assert!(declaration.deps().is_empty());
    }

    #[test]
    fn malformed_declarations_are_rejected() {
        assert_eq!(
            Declare::new(unit()).named("").check(None).err(),
            Some(DeclarationError::InvalidName)
        );
        assert_eq!(
            Declare::new(unit()).with_deps(["a"]).check(None).err(),
            Some(DeclarationError::InvalidName)
        );
        assert!(matches!(
            Declare::new(Factory::from_fn(|_: Arc<u8>| ()))
                .named("n")
                .with_deps(["a", " "])
                .check(None),
            Err(DeclarationError::InvalidDependencies(_))
        ));

        let missing = Declare {
            name: Some("n".into()),
            origin: Some("nowhere".into()),
            ..Declare::default()
        };
        assert_eq!(
            missing.check(None).err(),
            Some(DeclarationError::NotCallable("nowhere".into()))
        );
    }

    #[test]
    fn registry_reports_declaration_errors_to_the_caller() {
        let registry = ObjectRegistry::new();
        let typed = Factory::from_fn(|a: Arc<i32>| *a);
        assert!(matches!(
            registry.define_inferred("n", typed.clone()),
            Err(DeclarationError::MissingSignature(_))
        ));
        assert!(matches!(
            registry.define("n", ["a", "b"], typed),
            Err(DeclarationError::ArityMismatch { .. })
        ));
        assert!(registry.define("ok", Vec::<String>::new(), unit()).is_ok());
    }

    #[test]
    fn put_registers_without_declaration() {
        let registry = ObjectRegistry::new();
        assert!(!registry.contains("x"));
        registry.put("x", 1u8);
        assert!(registry.contains("x"));
        assert!(lock(&registry.inner.declarations).is_empty());
    }

    #[test]
    fn default_locator_appends_suffix() {
        assert_eq!(ObjectRegistry::new().resolve_url("Foo"), "Foo.mod");
    }
}
