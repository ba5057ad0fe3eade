//! Type-keyed dependency registry.
//!
//! Application code provides shared instances (database pools, API clients,
//! configuration) once at startup and handlers resolve them by type:
//!
//! ```rust,ignore
//! let deps = Dependencies::new();
//! deps.provide(Greeter::new("hello"));
//!
//! let greeter: Arc<Greeter> = deps.resolve::<Greeter>().unwrap();
//! ```
//!
//! Trait objects are supported through [`Dependencies::provide_arc`]:
//!
//! ```rust,ignore
//! deps.provide_arc::<dyn Clock>(Arc::new(SystemClock));
//! let clock = deps.require::<dyn Clock>()?;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{DependencyError, DependencyResult};

/// Stored entry: an `Arc<Arc<T>>` erased to `Any`, so unsized `T` works too.
type ServiceEntry = Arc<dyn Any + Send + Sync>;

/// A registry mapping a type to one shared instance of it.
///
/// Providing the same type twice replaces the earlier instance. The lock is
/// held only for the map access.
#[derive(Default)]
pub struct Dependencies {
    services: RwLock<HashMap<TypeId, ServiceEntry>>,
}

impl Dependencies {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `instance` under its type, replacing any earlier instance.
    pub fn provide<T: Send + Sync + 'static>(&self, instance: T) {
        self.provide_arc(Arc::new(instance));
    }

    /// Stores an already shared instance under `T`.
    ///
    /// `T` may be a trait object such as `dyn Clock`.
    pub fn provide_arc<T: ?Sized + Send + Sync + 'static>(&self, instance: Arc<T>) {
        let entry: ServiceEntry = Arc::new(instance);
        let replaced = self
            .services
            .write()
            .insert(TypeId::of::<T>(), entry)
            .is_some();
        debug!(
            type_name = std::any::type_name::<T>(),
            replaced, "Dependency provided"
        );
    }

    /// Returns the instance stored under `T`, if any.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<T>>().map(Arc::clone))
    }

    /// Like [`resolve`](Self::resolve) but reports a missing type as an error.
    pub fn require<T: ?Sized + Send + Sync + 'static>(&self) -> DependencyResult<Arc<T>> {
        self.resolve::<T>()
            .ok_or(DependencyError::NotFound(std::any::type_name::<T>()))
    }

    /// Returns `true` if an instance is stored under `T`.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the instance stored under `T`.
    pub fn remove<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .write()
            .remove(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<T>>().map(Arc::clone))
    }

    /// Returns the number of stored instances.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns `true` if nothing has been provided.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Greeter(&'static str);

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_provide_then_resolve_returns_same_instance() {
        let deps = Dependencies::new();
        deps.provide(Greeter("hello"));

        let a = deps.resolve::<Greeter>().unwrap();
        let b = deps.resolve::<Greeter>().unwrap();
        assert_eq!(*a, Greeter("hello"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_missing_type_is_none() {
        let deps = Dependencies::new();
        assert!(deps.resolve::<Greeter>().is_none());
        assert!(matches!(
            deps.require::<Greeter>(),
            Err(DependencyError::NotFound(name)) if name.ends_with("Greeter")
        ));
    }

    #[test]
    fn test_last_provide_wins() {
        let deps = Dependencies::new();
        deps.provide(Greeter("first"));
        deps.provide(Greeter("second"));

        assert_eq!(deps.len(), 1);
        assert_eq!(*deps.resolve::<Greeter>().unwrap(), Greeter("second"));
    }

    #[test]
    fn test_trait_object_dependency() {
        let deps = Dependencies::new();
        deps.provide_arc::<dyn Clock>(Arc::new(FixedClock(42)));

        assert!(deps.contains::<dyn Clock>());
        assert!(!deps.contains::<FixedClock>());
        assert_eq!(deps.require::<dyn Clock>().unwrap().now(), 42);
    }

    #[test]
    fn test_remove() {
        let deps = Dependencies::new();
        deps.provide(7u32);
        assert_eq!(deps.remove::<u32>().as_deref(), Some(&7));
        assert!(deps.is_empty());
    }
}
