//! Activator - три способа получить экземпляр:
//!
//! - `create_instance` - анализ contract'а на каждый вызов
//! - `create_factory` - собрать фабрику без мемоизации
//! - `Activator::activate` - фабрика из кэша, анализ один раз на форму аргументов

use std::sync::Arc;
use tracing::debug;

use crate::{
    arguments::{RuntimeArguments, RuntimeShape},
    config::ActivatorConfig,
    contract::Activatable,
    errors::ActivationResult,
    factory::CachedFactory,
    factory_cache::{FactoryCache, FactoryCacheStats},
    registry::ServiceRegistry,
    type_key::TypeKey,
};

/// Создать экземпляр `T` одноразово. Форма берется из типов переданных аргументов.
pub fn create_instance<T: Activatable>(
    registry: &ServiceRegistry,
    arguments: RuntimeArguments,
) -> ActivationResult<T> {
    let factory = CachedFactory::<T>::analyze(&arguments.type_keys())?;
    factory.invoke(registry, arguments)
}

/// Собрать новую фабрику, не кладя ее ни в какой кэш
pub fn create_factory<T: Activatable>(
    runtime_types: &[TypeKey],
) -> ActivationResult<CachedFactory<T>> {
    CachedFactory::<T>::analyze(runtime_types)
}

/// Registry + кэш фабрик в одном владельце
#[derive(Debug)]
pub struct Activator {
    registry: Arc<ServiceRegistry>,
    factories: FactoryCache,
    config: ActivatorConfig,
}

impl Activator {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self::with_config(registry, ActivatorConfig::default())
    }

    pub fn with_config(registry: Arc<ServiceRegistry>, config: ActivatorConfig) -> Self {
        debug!(
            "Activator created over {} registered services",
            registry.service_count()
        );
        Self {
            factories: FactoryCache::with_config(&config),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn factories(&self) -> &FactoryCache {
        &self.factories
    }

    pub fn config(&self) -> &ActivatorConfig {
        &self.config
    }

    /// Мемоизированная фабрика для формы `A`
    pub fn factory<T, A>(&self) -> ActivationResult<CachedFactory<T>>
    where
        T: Activatable,
        A: RuntimeShape,
    {
        self.factories.factory_for::<T, A>()
    }

    /// Создать экземпляр через кэшированную фабрику
    pub fn activate<T, A>(&self, arguments: A) -> ActivationResult<T>
    where
        T: Activatable,
        A: RuntimeShape,
    {
        self.factory::<T, A>()?.invoke_with(&self.registry, arguments)
    }

    /// Как `activate`, но форма вычисляется из самих аргументов
    pub fn activate_dynamic<T: Activatable>(
        &self,
        arguments: RuntimeArguments,
    ) -> ActivationResult<T> {
        self.factories
            .get_or_build_factory::<T>(&arguments.type_keys())?
            .invoke(&self.registry, arguments)
    }

    pub fn stats(&self) -> FactoryCacheStats {
        self.factories.stats()
    }
}
