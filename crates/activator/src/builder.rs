//! Builder pattern для настройки registry
//!
//! Fluent API для регистрации сервисов на старте приложения.

use anyhow::Result;
use std::any::Any;

use crate::{
    config::ActivatorConfig,
    registry::{Lifetime, ServiceRegistry},
    type_key::ServiceKind,
};

pub struct ServiceRegistryBuilder {
    registry: ServiceRegistry,
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: ServiceRegistry::new(),
        }
    }

    /// Builder с конфигурацией. Регистрации до вызова не переносятся,
    /// поэтому вызывать первым в цепочке.
    pub fn with_config(config: &ActivatorConfig) -> Self {
        Self {
            registry: ServiceRegistry::with_config(config),
        }
    }

    pub fn add_instance<T>(self, instance: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.registry.register_instance(instance);
        self
    }

    pub fn add_named_instance<T>(self, name: impl Into<String>, instance: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.registry.register_instance_named(name, instance);
        self
    }

    pub fn add_singleton<T, F>(self, producer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        self.registry.register_singleton(producer);
        self
    }

    pub fn add_transient<T, F>(self, producer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        self.registry.register_transient(producer);
        self
    }

    pub fn add<T, F>(self, kind: ServiceKind, producer: F, lifetime: Lifetime) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        self.registry.register(kind, producer, lifetime);
        self
    }

    /// Сервис без зависимостей как lazy singleton
    pub fn add_default_singleton<T>(self) -> Self
    where
        T: Any + Send + Sync + Default,
    {
        self.add_singleton(|_| Ok(T::default()))
    }

    pub fn build(self) -> ServiceRegistry {
        self.registry
    }
}

impl Default for ServiceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Clock {
        ticks: u64,
    }

    struct Scheduler {
        clock: Arc<Clock>,
    }

    #[test]
    fn test_builder_pattern() {
        let registry = ServiceRegistryBuilder::new()
            .add_default_singleton::<Clock>()
            .add_singleton(|r| {
                Ok(Scheduler {
                    clock: r.resolve::<Clock>()?,
                })
            })
            .add_named_instance("region", String::from("eu-west"))
            .build();

        let scheduler = registry.resolve::<Scheduler>().unwrap();
        assert_eq!(scheduler.clock.ticks, 0);
        assert!(Arc::ptr_eq(&scheduler.clock, &registry.resolve::<Clock>().unwrap()));
        assert_eq!(*registry.resolve_named::<String>("region").unwrap(), "eu-west");
        assert_eq!(registry.service_count(), 3);
    }
}
