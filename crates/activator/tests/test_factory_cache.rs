//! Сценарии кэшированных фабрик поверх registry

use anyhow::Result;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use activator::{
    create_instance, runtime_args, Activatable, ActivationError, ActivatorConfig, ConstructionContract,
    Constructor, FactoryCache, ServiceRegistry, TypeKey,
};

// === Test Service Types ===

struct RegisteredService1 {
    value: String,
}

impl RegisteredService1 {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[derive(Default)]
struct RegisteredService2;

impl RegisteredService2 {
    fn value(&self) -> &str {
        "world"
    }
}

#[derive(Debug)]
struct CustomService {
    combined_value: String,
}

impl CustomService {
    fn new(
        service: Arc<RegisteredService1>,
        service2: Arc<RegisteredService2>,
        runtime_value: String,
    ) -> Self {
        Self {
            combined_value: format!("{} {} {}", service.value, service2.value(), runtime_value),
        }
    }
}

impl Activatable for CustomService {
    fn contract() -> ConstructionContract<Self> {
        ConstructionContract::single(
            Constructor::builder()
                .inject::<RegisteredService1>()
                .inject::<RegisteredService2>()
                .runtime::<String>()
                .build(|args| {
                    Ok(CustomService::new(
                        args.service()?,
                        args.service()?,
                        args.runtime()?,
                    ))
                }),
        )
    }
}

/// Фабрика уровня приложения: план собирается один раз в конструкторе
struct CustomServiceFactory {
    factory: activator::CachedFactory<CustomService>,
}

impl CustomServiceFactory {
    fn new(cache: &FactoryCache) -> Result<Self> {
        Ok(Self {
            factory: cache.get_or_build_factory::<CustomService>(&[TypeKey::of::<String>()])?,
        })
    }

    fn get_custom_service(
        &self,
        registry: &ServiceRegistry,
        runtime_value: &str,
    ) -> Result<CustomService> {
        Ok(self
            .factory
            .invoke(registry, runtime_args![runtime_value.to_string()])?)
    }
}

fn hello_world_registry() -> ServiceRegistry {
    ServiceRegistry::builder()
        .add_singleton(|_| Ok(RegisteredService1::new("hello")))
        .add_default_singleton::<RegisteredService2>()
        .build()
}

#[test]
fn test_custom_factory_combines_registry_and_runtime_values() -> Result<()> {
    let registry = hello_world_registry();
    let cache = FactoryCache::new();

    let uut = CustomServiceFactory::new(&cache)?;
    let actual = uut.get_custom_service(&registry, "!!!")?.combined_value;

    assert_eq!(actual, "hello world !!!");
    Ok(())
}

#[test]
fn test_factory_reused_across_invocations() -> Result<()> {
    let registry = hello_world_registry();
    let cache = FactoryCache::new();

    let factory = cache.factory_for::<CustomService, (String,)>()?;
    for suffix in ["a", "b", "c"] {
        let service = factory.invoke_with(&registry, (suffix.to_string(),))?;
        assert_eq!(service.combined_value, format!("hello world {suffix}"));
    }

    let again = cache.factory_for::<CustomService, (String,)>()?;
    assert!(factory.ptr_eq(&again));
    assert_eq!(cache.stats().analyses, 1);
    Ok(())
}

#[test]
fn test_one_shot_activation_matches_cached() -> Result<()> {
    let registry = hello_world_registry();

    let service = create_instance::<CustomService>(&registry, runtime_args!["?".to_string()])?;
    assert_eq!(service.combined_value, "hello world ?");
    Ok(())
}

#[test]
fn test_missing_dependency_is_unresolved() -> Result<()> {
    // RegisteredService2 не зарегистрирован
    let registry = ServiceRegistry::builder()
        .add_instance(RegisteredService1::new("hello"))
        .build();
    let cache = FactoryCache::new();

    let factory = cache.factory_for::<CustomService, (String,)>()?;
    let err = factory
        .invoke(&registry, runtime_args!["!!!".to_string()])
        .unwrap_err();

    match err {
        ActivationError::UnresolvedDependency {
            product,
            dependency,
            position,
            missing,
        } => {
            assert!(product.ends_with("CustomService"));
            assert!(dependency.ends_with("RegisteredService2"));
            assert_eq!(missing, dependency);
            assert_eq!(position, 1);
        }
        other => panic!("Expected UnresolvedDependency, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_missing_transitive_dependency_is_unresolved() -> Result<()> {
    struct Storage;

    struct Repository {
        _storage: Arc<Storage>,
    }

    struct Handler {
        _repository: Arc<Repository>,
    }

    impl Activatable for Handler {
        fn contract() -> ConstructionContract<Self> {
            ConstructionContract::single(
                Constructor::builder()
                    .inject::<Repository>()
                    .build(|args| Ok(Handler { _repository: args.service()? })),
            )
        }
    }

    // Repository зарегистрирован, но его Storage нет
    let registry = ServiceRegistry::builder()
        .add_singleton(|r| Ok(Repository { _storage: r.resolve()? }))
        .build();
    let factory = FactoryCache::new().factory_for::<Handler, ()>()?;

    match factory.invoke_with(&registry, ()) {
        Err(ActivationError::UnresolvedDependency {
            dependency,
            position,
            missing,
            ..
        }) => {
            assert!(dependency.ends_with("Repository"));
            assert!(missing.ends_with("Storage"));
            assert_eq!(position, 0);
        }
        other => panic!("Expected UnresolvedDependency, got {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn test_wrong_argument_count_is_shape_mismatch() -> Result<()> {
    let registry = hello_world_registry();
    let cache = FactoryCache::new();
    let factory = cache.factory_for::<CustomService, (String,)>()?;

    let too_many = factory.invoke(
        &registry,
        runtime_args!["!!!".to_string(), "???".to_string()],
    );
    let too_few = factory.invoke(&registry, runtime_args![]);
    let wrong_type = factory.invoke(&registry, runtime_args!["!!!"]);

    for result in [too_many, too_few, wrong_type] {
        assert!(matches!(
            result,
            Err(ActivationError::ArgumentShapeMismatch { .. })
        ));
    }
    Ok(())
}

#[test]
fn test_invoke_sees_current_registry_state() -> Result<()> {
    struct Ticket {
        number: usize,
    }

    struct Visit {
        ticket: Arc<Ticket>,
    }

    impl Activatable for Visit {
        fn contract() -> ConstructionContract<Self> {
            ConstructionContract::single(
                Constructor::builder()
                    .inject::<Ticket>()
                    .build(|args| Ok(Visit { ticket: args.service()? })),
            )
        }
    }

    let issued = Arc::new(AtomicUsize::new(0));
    let counter = issued.clone();
    let registry = ServiceRegistry::builder()
        .add_transient(move |_| {
            Ok(Ticket {
                number: counter.fetch_add(1, Ordering::SeqCst) + 1,
            })
        })
        .build();

    let cache = FactoryCache::new();
    let factory = cache.factory_for::<Visit, ()>()?;

    let first = factory.invoke_with(&registry, ())?;
    let second = factory.invoke_with(&registry, ())?;

    assert_eq!(first.ticket.number, 1);
    assert_eq!(second.ticket.number, 2);
    assert_eq!(issued.load(Ordering::SeqCst), 2);

    // перерегистрация видна уже собранной фабрике
    registry.register_instance(Ticket { number: 99 });
    assert_eq!(factory.invoke_with(&registry, ())?.ticket.number, 99);
    Ok(())
}

struct Report {
    origin: &'static str,
}

struct Formatter;

impl Activatable for Report {
    fn contract() -> ConstructionContract<Self> {
        ConstructionContract::new()
            .with(
                Constructor::builder()
                    .label("plain")
                    .runtime::<String>()
                    .build(|_| Ok(Report { origin: "plain" })),
            )
            .with(
                Constructor::builder()
                    .label("formatted")
                    .inject::<Formatter>()
                    .runtime::<String>()
                    .build(|_| Ok(Report { origin: "formatted" })),
            )
            .with(
                Constructor::builder()
                    .label("numbered")
                    .runtime::<u32>()
                    .build(|_| Ok(Report { origin: "numbered-a" })),
            )
            .with(
                Constructor::builder()
                    .label("numbered-preferred")
                    .runtime::<u32>()
                    .preferred()
                    .build(|_| Ok(Report { origin: "numbered-b" })),
            )
    }
}

#[test]
fn test_ambiguous_constructors_rejected_at_build_time() {
    let cache = FactoryCache::new();

    let err = cache.factory_for::<Report, (String,)>().unwrap_err();
    assert_eq!(
        err,
        ActivationError::AmbiguousConstruction {
            product: TypeKey::of::<Report>().name().to_string(),
            candidates: 2,
        }
    );
    assert!(cache.is_empty());
}

#[test]
fn test_preferred_constructor_breaks_tie() -> Result<()> {
    let registry = ServiceRegistry::new();
    let cache = FactoryCache::new();

    let factory = cache.factory_for::<Report, (u32,)>()?;
    assert_eq!(factory.constructor_label(), Some("numbered-preferred"));
    assert_eq!(factory.invoke_with(&registry, (1u32,))?.origin, "numbered-b");
    Ok(())
}

#[test]
fn test_optional_dependency_defaults_to_none() -> Result<()> {
    struct Tracer;

    struct Job {
        traced: bool,
    }

    impl Activatable for Job {
        fn contract() -> ConstructionContract<Self> {
            ConstructionContract::single(
                Constructor::builder()
                    .inject_optional::<Tracer>()
                    .build(|args| {
                        Ok(Job {
                            traced: args.optional_service::<Tracer>()?.is_some(),
                        })
                    }),
            )
        }
    }

    let registry = ServiceRegistry::new();
    let factory = FactoryCache::new().factory_for::<Job, ()>()?;

    assert!(!factory.invoke_with(&registry, ())?.traced);
    registry.register_instance(Tracer);
    assert!(factory.invoke_with(&registry, ())?.traced);
    Ok(())
}

#[test]
fn test_build_closure_errors_are_wrapped() -> Result<()> {
    struct Port(u16);

    impl Activatable for Port {
        fn contract() -> ConstructionContract<Self> {
            ConstructionContract::single(Constructor::builder().runtime::<u16>().build(|args| {
                let port: u16 = args.runtime()?;
                anyhow::ensure!(port >= 1024, "port {} is privileged", port);
                Ok(Port(port))
            }))
        }
    }

    let registry = ServiceRegistry::new();
    let factory = FactoryCache::new().factory_for::<Port, (u16,)>()?;

    assert_eq!(factory.invoke_with(&registry, (8080u16,))?.0, 8080);
    match factory.invoke_with(&registry, (80u16,)) {
        Err(ActivationError::Construction { message, .. }) => {
            assert_eq!(message, "port 80 is privileged");
        }
        other => panic!("Expected Construction error, got {:?}", other.map(|p| p.0)),
    }
    Ok(())
}

#[test]
fn test_cache_keeps_growing_past_warn_threshold() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("activator=debug")
        .with_test_writer()
        .try_init();

    let config = ActivatorConfig {
        factory_cache_warn_threshold: 1,
        ..ActivatorConfig::minimal()
    };
    let cache = FactoryCache::with_config(&config);

    cache.factory_for::<Report, (String,)>().unwrap_err();
    cache.factory_for::<Report, (u32,)>()?;
    cache.factory_for::<CustomService, (String,)>()?;

    let stats = cache.stats();
    assert_eq!(stats.cached_factories, 2);
    assert_eq!(stats.failed_analyses, 1);
    assert!(cache.contains::<CustomService>(&[TypeKey::of::<String>()]));
    Ok(())
}
