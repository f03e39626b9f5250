//! Lazy, future-based dependency injection with on-demand loading of declarations.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use lazy_registry::*;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ObjectRegistry::new();
//!
//! // Register existing instances and declare objects built from them
//! registry.put("a", 1i32);
//! registry.put("b", 2i32);
//! registry.define("sum", ["a", "b"], Factory::from_fn(|a: Arc<i32>, b: Arc<i32>| *a + *b))?;
//!
//! // Objects are created on first request, then shared
//! let sum: Arc<i32> = registry.get_as("sum").await?;
//! assert_eq!(*sum, 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! The [ObjectRegistry] maps each name to at most one declaration slot and one instance future.
//!
//! * A [FactoryDeclaration] associates a name to the ordered names of its dependencies and to a
//!   [Factory], the creation function invoked once with the resolved dependencies.
//! * A [DeclarationSlot] is a single-assignment future of the declaration of a name. It is
//!   fulfilled by `define`, or rejected when the load that should have provided it fails.
//! * Asking for a name that was never declared creates its slot and loads its source through the
//!   [RemoteLoader], from the locator computed by the [LocatorPolicy]. The source is executed by
//!   a [SourceExecutor] in a [LoadScope] that knows which name it is expected to declare.
//! * An [InstanceFuture] waits for the declaration, then concurrently for all dependencies,
//!   then invokes the factory. Every caller of `get` shares the same future, and any failure
//!   propagates to every object depending on the failed name.

pub mod config;
pub mod error;
mod inject;
pub mod loader;
pub mod logging;
mod registry;
mod resolve;
pub mod script;
pub mod signature;
mod slot;

pub use config::{ConfigLoader, RegistryConfig};
pub use error::{ConfigError, DeclarationError, FactoryError, LoadError, ResolveError};
pub use inject::{Callable, Dependencies, Factory, Instance};
pub use loader::{AffixLocator, FileLoader, LocatorPolicy, RemoteLoader, StaticLoader};
#[cfg(feature = "http")]
pub use loader::HttpLoader;
pub use registry::{
    Declare, InstanceFuture, LoadContext, LoadScope, ObjectRegistry, RegistryBuilder,
};
pub use resolve::FactoryDeclaration;
pub use script::{ModuleScript, NativeCatalog, ScriptError, SourceExecutor};
pub use slot::{DeclarationFuture, DeclarationSlot};
