use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::error::{DeclarationError, FactoryError, ResolveError};
use crate::registry::ObjectRegistry;
use crate::signature::{parse_params, SignatureError};

/// A shared, type-erased object instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Resolved dependencies handed to a creation function, in declaration order.
pub struct Dependencies {
    owner: String,
    names: Arc<[String]>,
    values: Vec<Instance>,
}

impl Dependencies {
    pub(crate) fn new(owner: &str, names: Arc<[String]>, values: Vec<Instance>) -> Self {
        Self {
            owner: owner.to_string(),
            names,
            values,
        }
    }

    /// Name of the object being created
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw access to the instance at the given position
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.values.get(index)
    }

    /// Downcast the dependency at the given position.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, ResolveError> {
        let Some(value) = self.values.get(index) else {
            return Err(ResolveError::MissingArgument {
                name: self.owner.clone(),
                index,
            });
        };
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| ResolveError::TypeMismatch {
                name: self.owner.clone(),
                dependency: self.names[index].clone(),
                expected: type_name::<T>(),
            })
    }

    /// Downcast the dependency declared under the given name.
    pub fn by_name<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ResolveError> {
        match self.names.iter().position(|n| n == name) {
            Some(index) => self.get(index),
            None => Err(ResolveError::MissingArgument {
                name: self.owner.clone(),
                index: self.names.len(),
            }),
        }
    }
}

type CreateFn = dyn Fn(&ObjectRegistry, &Dependencies) -> Result<Instance, ResolveError> + Send + Sync;

/// Creation function of an object.
///
/// A factory is invoked at most once per declaration, with the registry as context and
/// the resolved dependencies bound positionally.
/// It can carry the names of its parameters, used to infer the dependency list
/// when an object is declared without one.
#[derive(Clone)]
pub struct Factory {
    create: Arc<CreateFn>,
    arity: Option<usize>,
    params: Option<Vec<String>>,
}

impl Factory {
    /// Wrap a raw creation function receiving the registry and all resolved dependencies.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&ObjectRegistry, &Dependencies) -> Result<R, FactoryError> + Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        let create = move |registry: &ObjectRegistry, deps: &Dependencies| {
            f(registry, deps)
                .map(|value| Arc::new(value) as Instance)
                .map_err(|e| ResolveError::Factory {
                    name: deps.owner().to_string(),
                    source: Arc::from(e),
                })
        };
        Self {
            create: Arc::new(create),
            arity: None,
            params: None,
        }
    }

    /// Wrap a plain function taking each dependency as an `Arc` of its concrete type.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use lazy_registry::Factory;
    /// let sum = Factory::from_fn(|a: Arc<i32>, b: Arc<i32>| *a + *b);
    /// assert_eq!(sum.arity(), Some(2));
    /// ```
    pub fn from_fn<F, Args, R>(f: F) -> Self
    where
        F: Callable<Args, R> + Send + Sync + 'static,
        Args: 'static,
        R: Send + Sync + 'static,
    {
        let create = move |_: &ObjectRegistry, deps: &Dependencies| {
            f.call(deps).map(|value| Arc::new(value) as Instance)
        };
        Self {
            create: Arc::new(create),
            arity: Some(F::arity()),
            params: None,
        }
    }

    /// Declare the parameter names of this factory
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Declare the parameter names of this factory from a textual signature like `fn(a, b)`
    pub fn with_signature(self, signature: &str) -> Result<Self, SignatureError> {
        let params = parse_params(signature)?;
        Ok(self.with_params(params))
    }

    /// Number of positional arguments, when known at compile time
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn params(&self) -> Option<&[String]> {
        self.params.as_deref()
    }

    /// Infer the dependency list of `name` from the declared parameter names
    pub(crate) fn inferred_deps(&self, name: &str) -> Result<Vec<String>, DeclarationError> {
        match (&self.params, self.arity) {
            (Some(params), _) => Ok(params.clone()),
            (None, Some(0)) | (None, None) => Ok(Vec::new()),
            (None, Some(_)) => Err(DeclarationError::MissingSignature(name.to_string())),
        }
    }

    pub(crate) fn check_arity(&self, name: &str, declared: usize) -> Result<(), DeclarationError> {
        match self.arity {
            Some(arity) if arity != declared => Err(DeclarationError::ArityMismatch {
                name: name.to_string(),
                arity,
                declared,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn invoke(
        &self,
        registry: &ObjectRegistry,
        deps: &Dependencies,
    ) -> Result<Instance, ResolveError> {
        (self.create)(registry, deps)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("arity", &self.arity)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/*
 * Positional injection into plain functions of up to 10 parameters,
 * each parameter being an `Arc` of the concrete type of a dependency.
 */

/// A Callable can be invoked with resolved dependencies bound to its positional arguments.
///
/// This trait is implemented for all functions with up to 10 arguments, the argument types
/// being collected in a single tuple type.
pub trait Callable<Args, Ret> {
    fn arity() -> usize;

    fn call(&self, deps: &Dependencies) -> Result<Ret, ResolveError>;
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Callable<($($param,)*), Ret> for Func
    where
        Func: Fn($(Arc<$param>),*) -> Ret,
        $($param: Any + Send + Sync,)*
    {
        #[inline]
        fn arity() -> usize {
            0 $(+ { let _ = stringify!($param); 1 })*
        }

        #[inline]
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        fn call(&self, deps: &Dependencies) -> Result<Ret, ResolveError> {
            let mut index = 0;
            $(
                let $param = deps.get::<$param>(index)?;
                index += 1;
            )*
            Ok((self)($($param),*))
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(values: Vec<Instance>) -> Dependencies {
        let names: Vec<String> = (0..values.len()).map(|i| format!("d{i}")).collect();
        Dependencies::new("owner", names.into(), values)
    }

    fn arity_of<F: Callable<Args, R>, Args, R>(_: &F) -> usize {
        F::arity()
    }

    #[test]
    fn typed_functions_bind_positionally() {
        let f = |a: Arc<i32>, b: Arc<String>| format!("{b}{a}");
        assert_eq!(arity_of(&f), 2);
        let out = Callable::call(&f, &deps(vec![Arc::new(7i32), Arc::new("x".to_string())]));
        assert_eq!(out.unwrap(), "x7");
    }

    #[test]
    fn wrong_type_is_reported_with_dependency_name() {
        let f = |a: Arc<i32>| *a;
        let err = Callable::call(&f, &deps(vec![Arc::new("nope")])).unwrap_err();
        match err {
            ResolveError::TypeMismatch {
                name, dependency, ..
            } => {
                assert_eq!(name, "owner");
                assert_eq!(dependency, "d0");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn inference_needs_names_for_typed_parameters() {
        let typed = Factory::from_fn(|a: Arc<i32>| *a);
        assert_eq!(
            typed.inferred_deps("n"),
            Err(DeclarationError::MissingSignature("n".into()))
        );

        let named = typed.with_params(["a"]);
        assert_eq!(named.inferred_deps("n").unwrap(), ["a"]);

        let nullary = Factory::from_fn(|| 1u8);
        assert!(nullary.inferred_deps("n").unwrap().is_empty());
    }

    #[test]
    fn arity_is_checked_against_declared_dependencies() {
        let f = Factory::from_fn(|a: Arc<i32>, b: Arc<i32>| *a + *b);
        assert!(f.check_arity("sum", 2).is_ok());
        assert!(matches!(
            f.check_arity("sum", 1),
            Err(DeclarationError::ArityMismatch { arity: 2, declared: 1, .. })
        ));
    }
}
