//! Service Registry - хранилище сервисов по `ServiceKind`
//!
//! АРХИТЕКТУРНЫЕ РЕШЕНИЯ:
//! - `Arc<dyn Any + Send + Sync>` для type-erased хранения
//! - HashMap<ServiceKind, Arc<ServiceEntry>> для O(1) поиска
//! - Lazy singleton через `OnceCell` на каждую запись: не больше одного
//!   экземпляра на kind даже при конкурентном первом resolve
//! - Lock на карте отпускается до вызова producer'а, поэтому producer
//!   может сам резолвить свои зависимости из того же registry

use anyhow::Result;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::{
    any::Any,
    cell::RefCell,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, trace, warn};

use crate::{
    config::ActivatorConfig,
    errors::{ActivationError, ActivationResult},
    type_key::{ServiceKind, TypeKey},
};

pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

type Producer = Arc<dyn Fn(&ServiceRegistry) -> Result<AnyService> + Send + Sync>;

/// Жизненный цикл зарегистрированного producer'а
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Один экземпляр на registry, создается при первом resolve
    #[default]
    Singleton,
    /// Новый экземпляр на каждый resolve
    Transient,
}

enum ServiceEntry {
    Instance(AnyService),
    Singleton {
        producer: Producer,
        instance: OnceCell<AnyService>,
    },
    Transient {
        producer: Producer,
    },
}

impl ServiceEntry {
    fn describe(&self) -> &'static str {
        match self {
            ServiceEntry::Instance(_) => "instance",
            ServiceEntry::Singleton { .. } => "singleton",
            ServiceEntry::Transient { .. } => "transient",
        }
    }
}

#[derive(Debug, Default)]
struct RegistryCounters {
    total_resolutions: AtomicU64,
    failed_resolutions: AtomicU64,
    singletons_created: AtomicU64,
}

/// Статистика registry для диагностики
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub registered_services: usize,
    pub total_resolutions: u64,
    pub failed_resolutions: u64,
    pub singletons_created: u64,
}

pub struct ServiceRegistry {
    id: u64,
    services: RwLock<HashMap<ServiceKind, Arc<ServiceEntry>>>,
    max_resolution_depth: usize,
    log_resolutions: bool,
    counters: RegistryCounters,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_config(&ActivatorConfig::default())
    }

    pub fn with_config(config: &ActivatorConfig) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            services: RwLock::new(HashMap::new()),
            max_resolution_depth: config.max_resolution_depth,
            log_resolutions: config.log_resolutions,
            counters: RegistryCounters::default(),
        }
    }

    pub fn builder() -> crate::builder::ServiceRegistryBuilder {
        crate::builder::ServiceRegistryBuilder::new()
    }

    /// Зарегистрировать готовый экземпляр
    pub fn register_instance<T>(&self, instance: T)
    where
        T: Any + Send + Sync,
    {
        self.insert(
            ServiceKind::of::<T>(),
            ServiceEntry::Instance(Arc::new(instance)),
        );
    }

    pub fn register_instance_named<T>(&self, name: impl Into<String>, instance: T)
    where
        T: Any + Send + Sync,
    {
        self.insert(
            ServiceKind::named::<T>(name),
            ServiceEntry::Instance(Arc::new(instance)),
        );
    }

    /// Зарегистрировать lazy singleton
    pub fn register_singleton<T, F>(&self, producer: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        self.register(ServiceKind::of::<T>(), producer, Lifetime::Singleton);
    }

    pub fn register_transient<T, F>(&self, producer: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        self.register(ServiceKind::of::<T>(), producer, Lifetime::Transient);
    }

    /// Зарегистрировать producer под явным kind с указанным lifetime.
    ///
    /// `kind` должен описывать тип `T`, иначе resolve вернет `TypeMismatch`.
    pub fn register<T, F>(&self, kind: ServiceKind, producer: F, lifetime: Lifetime)
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        let producer: Producer =
            Arc::new(move |registry| Ok(Arc::new(producer(registry)?) as AnyService));

        let entry = match lifetime {
            Lifetime::Singleton => ServiceEntry::Singleton {
                producer,
                instance: OnceCell::new(),
            },
            Lifetime::Transient => ServiceEntry::Transient { producer },
        };

        self.insert(kind, entry);
    }

    fn insert(&self, kind: ServiceKind, entry: ServiceEntry) {
        let describe = entry.describe();
        let mut services = self.services.write();

        if services.insert(kind.clone(), Arc::new(entry)).is_some() {
            warn!("Registration of {} replaced an existing entry", kind);
        } else {
            debug!("Registered {} service: {}", describe, kind);
        }
    }

    /// Разрешить сервис по типу
    pub fn resolve<T>(&self) -> ActivationResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve_typed(&ServiceKind::of::<T>())
    }

    pub fn resolve_named<T>(&self, name: &str) -> ActivationResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve_typed(&ServiceKind::named::<T>(name))
    }

    /// Попытаться разрешить сервис (None если не зарегистрирован или упал)
    pub fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve::<T>().ok()
    }

    fn resolve_typed<T>(&self, kind: &ServiceKind) -> ActivationResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve_kind(kind)?
            .downcast::<T>()
            .map_err(|_| ActivationError::type_mismatch(TypeKey::of::<T>()))
    }

    /// Type-erased resolve, используется планами фабрик
    pub fn resolve_kind(&self, kind: &ServiceKind) -> ActivationResult<AnyService> {
        self.counters.total_resolutions.fetch_add(1, Ordering::Relaxed);

        let result = self.resolve_entry(kind);
        if let Err(err) = &result {
            self.counters.failed_resolutions.fetch_add(1, Ordering::Relaxed);
            debug!("Resolution of {} failed: {}", kind, err);
        } else if self.log_resolutions {
            debug!("Resolved {}", kind);
        }

        result
    }

    fn resolve_entry(&self, kind: &ServiceKind) -> ActivationResult<AnyService> {
        // Клонируем Arc записи и сразу отпускаем read lock
        let entry = self
            .services
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| ActivationError::not_registered(kind))?;

        match entry.as_ref() {
            ServiceEntry::Instance(instance) => Ok(instance.clone()),
            ServiceEntry::Singleton { producer, instance } => {
                if let Some(cached) = instance.get() {
                    trace!("Singleton cache hit for {}", kind);
                    return Ok(cached.clone());
                }

                let _guard = ResolutionGuard::enter(self.id, kind, self.max_resolution_depth)?;
                instance
                    .get_or_try_init(|| {
                        let created = self.run_producer(kind, producer)?;
                        self.counters.singletons_created.fetch_add(1, Ordering::Relaxed);
                        debug!("Created singleton {}", kind);
                        Ok(created)
                    })
                    .cloned()
            }
            ServiceEntry::Transient { producer } => {
                let _guard = ResolutionGuard::enter(self.id, kind, self.max_resolution_depth)?;
                self.run_producer(kind, producer)
            }
        }
    }

    fn run_producer(&self, kind: &ServiceKind, producer: &Producer) -> ActivationResult<AnyService> {
        producer(self).map_err(|err| match err.downcast::<ActivationError>() {
            // вложенные ошибки активации пробрасываем как есть
            Ok(activation) => activation,
            Err(other) => ActivationError::construction(kind.to_string(), &other),
        })
    }

    pub fn is_registered<T: Any>(&self) -> bool {
        self.contains_kind(&ServiceKind::of::<T>())
    }

    pub fn contains_kind(&self, kind: &ServiceKind) -> bool {
        self.services.read().contains_key(kind)
    }

    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Список зарегистрированных kind'ов (для отладки)
    pub fn registered_kinds(&self) -> Vec<ServiceKind> {
        self.services.read().keys().cloned().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            registered_services: self.service_count(),
            total_resolutions: self.counters.total_resolutions.load(Ordering::Relaxed),
            failed_resolutions: self.counters.failed_resolutions.load(Ordering::Relaxed),
            singletons_created: self.counters.singletons_created.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_count())
            .field("max_resolution_depth", &self.max_resolution_depth)
            .finish()
    }
}

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static RESOLUTION_CHAIN: RefCell<Vec<(u64, ServiceKind)>> = const { RefCell::new(Vec::new()) };
}

/// Цепочка kind'ов, которые сейчас конструируются на этом потоке.
///
/// Записи помечены id registry: producer одного registry может резолвить
/// тот же kind из другого (parent/child), это не цикл. Повторный вход в тот
/// же kind того же registry - цикл; без этой проверки `OnceCell`
/// заблокировался бы на собственной инициализации.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(registry: u64, kind: &ServiceKind, max_depth: usize) -> ActivationResult<Self> {
        RESOLUTION_CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();
            let own: Vec<&ServiceKind> = chain
                .iter()
                .filter(|(owner, _)| *owner == registry)
                .map(|(_, entry)| entry)
                .collect();

            if own.contains(&kind) {
                let mut cycle: Vec<String> = own.iter().map(ToString::to_string).collect();
                cycle.push(kind.to_string());
                return Err(ActivationError::CircularDependency { chain: cycle });
            }

            if own.len() >= max_depth {
                return Err(ActivationError::ResolutionDepthExceeded {
                    service: kind.to_string(),
                    max_depth,
                });
            }

            chain.push((registry, kind.clone()));
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLUTION_CHAIN.with(|chain| {
            chain.borrow_mut().pop();
        });
    }
}
