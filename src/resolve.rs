//! Declarations and the instantiation of objects from their resolved dependencies.
//!
//! Instantiating an object waits for all the instance futures of its dependencies, obtained
//! from the registry in declaration order and awaited concurrently.
//! The creation function is invoked once all of them are ready, with the resolved values bound
//! in declaration order whatever the order in which they completed.
//! The first failing dependency rejects the object: no partial instance is ever created.
//!
//! The registry keeps a waits-for graph of the objects currently waiting for their dependencies,
//! which turns a dependency cycle into an immediate [ResolveError::Cycle] instead of a deadlock.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;

use crate::error::ResolveError;
use crate::inject::{Dependencies, Factory, Instance};
use crate::registry::ObjectRegistry;

/// Recipe of an object: its name, the ordered names of its dependencies and its creation function.
pub struct FactoryDeclaration {
    name: String,
    deps: Arc<[String]>,
    factory: Factory,
}

impl FactoryDeclaration {
    pub fn new(name: impl Into<String>, deps: Vec<String>, factory: Factory) -> Self {
        Self {
            name: name.into(),
            deps: deps.into(),
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Build a new instance once all dependencies are available in the registry.
    pub async fn create(&self, registry: &ObjectRegistry) -> Result<Instance, ResolveError> {
        let values = {
            let _waiting = registry.wait_graph().enter(&self.name, &self.deps)?;
            let pending: Vec<_> = self.deps.iter().map(|dep| registry.get(dep)).collect();
            try_join_all(pending).await?
        };

        tracing::debug!(name = %self.name, deps = ?self.deps, "creating object");
        let deps = Dependencies::new(&self.name, self.deps.clone(), values);
        self.factory.invoke(registry, &deps)
    }
}

impl fmt::Debug for FactoryDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDeclaration")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Edges from objects waiting for their dependencies to these dependencies
#[derive(Default)]
pub(crate) struct WaitGraph {
    edges: Mutex<HashMap<String, (u64, Vec<String>)>>,
    next_ticket: AtomicU64,
}

impl WaitGraph {
    /// Record that `name` waits for `deps`.
    ///
    /// Fails if one of the dependencies is already (transitively) waiting for `name`.
    pub(crate) fn enter<'a>(
        &'a self,
        name: &str,
        deps: &[String],
    ) -> Result<WaitGuard<'a>, ResolveError> {
        let mut edges = self.edges.lock().unwrap_or_else(|p| p.into_inner());

        for dep in deps {
            if let Some(back) = find_path(&edges, dep, name) {
                let mut path = Vec::with_capacity(back.len() + 1);
                path.push(name.to_string());
                path.extend(back);
                tracing::error!(name, path = ?path, "dependency cycle");
                return Err(ResolveError::Cycle { path });
            }
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        edges.insert(name.to_string(), (ticket, deps.to_vec()));
        Ok(WaitGuard {
            graph: self,
            name: name.to_string(),
            ticket,
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.edges.lock().unwrap().len()
    }
}

/// Depth-first search for a chain of waiting objects going from `from` to `to`
fn find_path(
    edges: &HashMap<String, (u64, Vec<String>)>,
    from: &str,
    to: &str,
) -> Option<Vec<String>> {
    let mut stack = vec![vec![from.to_string()]];
    let mut seen = HashSet::new();

    while let Some(path) = stack.pop() {
        let node = path.last()?;
        if node == to {
            return Some(path);
        }
        if !seen.insert(node.clone()) {
            continue;
        }
        if let Some((_, next)) = edges.get(node) {
            for dep in next {
                let mut longer = path.clone();
                longer.push(dep.clone());
                stack.push(longer);
            }
        }
    }
    None
}

/// Removes the edges of a waiting object when dropped
pub(crate) struct WaitGuard<'a> {
    graph: &'a WaitGraph,
    name: String,
    ticket: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut edges = self.graph.edges.lock().unwrap_or_else(|p| p.into_inner());
        if edges.get(&self.name).is_some_and(|(t, _)| *t == self.ticket) {
            edges.remove(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = WaitGraph::default();
        let err = graph.enter("a", &names(&["a"])).err().unwrap();
        assert_eq!(err.to_string(), "cyclic dependencies: a -> a");
    }

    #[test]
    fn transitive_cycle_is_reported_with_its_path() {
        let graph = WaitGraph::default();
        let _a = graph.enter("a", &names(&["b"])).unwrap();
        let _b = graph.enter("b", &names(&["c", "x"])).unwrap();
        let err = graph.enter("c", &names(&["a"])).err().unwrap();
        match err {
            ResolveError::Cycle { path } => assert_eq!(path, ["c", "a", "b", "c"]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = WaitGraph::default();
        let _top = graph.enter("top", &names(&["left", "right"])).unwrap();
        let _left = graph.enter("left", &names(&["base"])).unwrap();
        let _right = graph.enter("right", &names(&["base"])).unwrap();
        assert!(graph.enter("base", &[]).is_ok());
    }

    #[test]
    fn guards_remove_their_edges() {
        let graph = WaitGraph::default();
        {
            let _a = graph.enter("a", &names(&["b"])).unwrap();
            assert_eq!(graph.len(), 1);
        }
        assert_eq!(graph.len(), 0);
        assert!(graph.enter("b", &names(&["a"])).is_ok());
    }
}
