//! Factory Cache - мемоизация `CachedFactory` по `FactoryKey`
//!
//! ЕДИНСТВЕННАЯ ОТВЕТСТВЕННОСТЬ: хранить по одному опубликованному плану на ключ.
//! Анализ contract'а идет вне lock'а, публикация под write lock:
//! первый записавший побеждает, остальные получают его фабрику.

use common::OperationTimer;
use parking_lot::RwLock;
use std::{
    any::Any,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, warn};

use crate::{
    arguments::RuntimeShape,
    config::ActivatorConfig,
    contract::Activatable,
    errors::{ActivationError, ActivationResult},
    factory::{CachedFactory, FactoryKey},
    type_key::TypeKey,
};

type AnyFactory = Arc<dyn Any + Send + Sync>;

/// Статистика кэша фабрик
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryCacheStats {
    pub cached_factories: usize,
    pub hits: u64,
    pub analyses: u64,
    pub failed_analyses: u64,
}

impl FactoryCacheStats {
    /// Процент запросов, обслуженных без анализа
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.analyses + self.failed_analyses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    analyses: AtomicU64,
    failed_analyses: AtomicU64,
}

pub struct FactoryCache {
    factories: RwLock<HashMap<FactoryKey, AnyFactory>>,
    warn_threshold: usize,
    counters: CacheCounters,
}

impl FactoryCache {
    pub fn new() -> Self {
        Self::with_config(&ActivatorConfig::default())
    }

    pub fn with_config(config: &ActivatorConfig) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            warn_threshold: config.factory_cache_warn_threshold,
            counters: CacheCounters::default(),
        }
    }

    /// Вернуть мемоизированную фабрику для `(T, runtime_types)` или собрать новую.
    ///
    /// Ошибки анализа не кэшируются: следующий вызов проанализирует заново.
    pub fn get_or_build_factory<T: Activatable>(
        &self,
        runtime_types: &[TypeKey],
    ) -> ActivationResult<CachedFactory<T>> {
        let key = FactoryKey::of::<T>(runtime_types);

        if let Some(existing) = self.factories.read().get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Factory cache hit for {}", key);
            return downcast_factory::<T>(existing);
        }

        debug!("Factory cache miss for {}", key);
        let mut timer = OperationTimer::new("factory_analysis");
        timer.add_field("factory", key.to_string());

        let analyzed = CachedFactory::<T>::analyze(runtime_types);
        timer.finish_with_result(&analyzed);

        let built = match analyzed {
            Ok(factory) => factory,
            Err(err) => {
                self.counters.failed_analyses.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };
        self.counters.analyses.fetch_add(1, Ordering::Relaxed);

        let mut factories = self.factories.write();
        let len_before = factories.len();
        let published = factories
            .entry(key)
            .or_insert_with(|| Arc::new(built) as AnyFactory)
            .clone();

        let len_after = factories.len();
        drop(factories);

        if len_after == len_before {
            // кто-то опубликовал план раньше нас, наш результат отбрасывается
            debug!("Concurrent analysis lost the race, reusing published factory");
        } else if len_before == self.warn_threshold {
            warn!(
                "Factory cache holds {} factories, above the configured threshold of {}",
                len_after, self.warn_threshold
            );
        }

        downcast_factory::<T>(&published)
    }

    /// Typed вариант: форма runtime аргументов задается кортежем
    pub fn factory_for<T, A>(&self) -> ActivationResult<CachedFactory<T>>
    where
        T: Activatable,
        A: RuntimeShape,
    {
        self.get_or_build_factory::<T>(&A::type_keys())
    }

    pub fn contains<T: Activatable>(&self, runtime_types: &[TypeKey]) -> bool {
        self.factories
            .read()
            .contains_key(&FactoryKey::of::<T>(runtime_types))
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }

    /// Забыть все фабрики. Уже выданные фабрики продолжают работать.
    pub fn clear(&self) {
        self.factories.write().clear();
        debug!("Factory cache cleared");
    }

    pub fn stats(&self) -> FactoryCacheStats {
        FactoryCacheStats {
            cached_factories: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            analyses: self.counters.analyses.load(Ordering::Relaxed),
            failed_analyses: self.counters.failed_analyses.load(Ordering::Relaxed),
        }
    }
}

impl Default for FactoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FactoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryCache")
            .field("factories", &self.len())
            .field("warn_threshold", &self.warn_threshold)
            .finish()
    }
}

fn downcast_factory<T: Activatable>(factory: &AnyFactory) -> ActivationResult<CachedFactory<T>> {
    factory
        .downcast_ref::<CachedFactory<T>>()
        .cloned()
        .ok_or_else(|| ActivationError::type_mismatch(TypeKey::of::<CachedFactory<T>>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ConstructionContract, Constructor};
    use std::sync::atomic::AtomicUsize;

    struct Counted(String);

    impl Activatable for Counted {
        fn contract() -> ConstructionContract<Self> {
            ConstructionContract::single(
                Constructor::builder()
                    .runtime::<String>()
                    .build(|args| Ok(Counted(args.runtime()?))),
            )
        }
    }

    // отдельный тип, чтобы параллельные тесты не трогали счетчик
    static MEMOIZED_CONTRACT_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Memoized(String);

    impl Activatable for Memoized {
        fn contract() -> ConstructionContract<Self> {
            MEMOIZED_CONTRACT_CALLS.fetch_add(1, Ordering::SeqCst);
            ConstructionContract::single(
                Constructor::builder()
                    .runtime::<String>()
                    .build(|args| Ok(Memoized(args.runtime()?))),
            )
        }
    }

    #[test]
    fn test_factory_memoized_per_key() {
        let cache = FactoryCache::new();

        let first = cache.factory_for::<Memoized, (String,)>().unwrap();
        let second = cache.factory_for::<Memoized, (String,)>().unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(MEMOIZED_CONTRACT_CALLS.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.cached_factories, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.analyses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_failed_analysis_not_cached() {
        let cache = FactoryCache::new();

        assert!(cache.factory_for::<Counted, (u8,)>().is_err());
        assert!(cache.factory_for::<Counted, (u8,)>().is_err());

        assert!(cache.is_empty());
        assert_eq!(cache.stats().failed_analyses, 2);
    }

    #[test]
    fn test_clear_keeps_issued_factories_usable() {
        let cache = FactoryCache::new();
        let registry = crate::ServiceRegistry::new();

        let issued = cache.factory_for::<Counted, (String,)>().unwrap();
        cache.clear();
        assert!(!cache.contains::<Counted>(&[TypeKey::of::<String>()]));

        let value = issued.invoke_with(&registry, ("still works".to_string(),)).unwrap();
        assert_eq!(value.0, "still works");

        let rebuilt = cache.factory_for::<Counted, (String,)>().unwrap();
        assert!(!rebuilt.ptr_eq(&issued));
    }

    #[test]
    fn test_unbounded_warn_threshold() {
        let config = ActivatorConfig {
            factory_cache_warn_threshold: usize::MAX,
            ..ActivatorConfig::default()
        };
        assert!(config.validate().is_ok());

        let cache = FactoryCache::with_config(&config);
        assert!(cache.factory_for::<Counted, (String,)>().is_ok());
        assert_eq!(cache.len(), 1);
    }
}
