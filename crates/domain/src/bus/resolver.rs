use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Source of handler instances.
///
/// The bus asks for a fresh instance of a handler type on every publish.
/// Returning `None` means the type is not registered; returning a value of
/// another type is reported as a wiring error by the bus.
pub trait ServiceResolver: Send + Sync {
    fn resolve(&self, service: TypeId) -> Option<Box<dyn Any + Send + Sync>>;
}

type Factory = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Factory-based [`ServiceResolver`].
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    factories: HashMap<TypeId, Factory>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` as the way to build a `T`. Replaces any earlier
    /// factory for `T`.
    pub fn register<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let erased: Factory = Arc::new(move || -> Box<dyn Any + Send + Sync> { Box::new(factory()) });
        self.factories.insert(TypeId::of::<T>(), erased);
        self
    }

    pub fn register_default<T>(&mut self) -> &mut Self
    where
        T: Default + Any + Send + Sync,
    {
        self.register(T::default)
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl ServiceResolver for ServiceRegistry {
    fn resolve(&self, service: TypeId) -> Option<Box<dyn Any + Send + Sync>> {
        self.factories.get(&service).map(|factory| factory())
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.factories.len())
            .finish()
    }
}
