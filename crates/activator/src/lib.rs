//! Activator - явный dependency injection с мемоизированными фабриками
//!
//! ПРИНЦИПЫ:
//! - Registry передается явно в каждый resolve, никакого глобального состояния
//! - Construction contract объявляется типом, reflection не нужен
//! - Анализ contract'а один раз на (тип, форма runtime аргументов),
//!   invoke только проходит по готовому плану
//!
//! ```
//! use activator::{runtime_args, Activatable, ConstructionContract, Constructor, FactoryCache, ServiceRegistry};
//!
//! struct Hello(String);
//!
//! struct Message {
//!     text: String,
//! }
//!
//! impl Activatable for Message {
//!     fn contract() -> ConstructionContract<Self> {
//!         ConstructionContract::single(
//!             Constructor::builder()
//!                 .inject::<Hello>()
//!                 .runtime::<String>()
//!                 .build(|args| {
//!                     let hello = args.service::<Hello>()?;
//!                     let suffix: String = args.runtime()?;
//!                     Ok(Message { text: format!("{} {}", hello.0, suffix) })
//!                 }),
//!         )
//!     }
//! }
//!
//! let registry = ServiceRegistry::builder()
//!     .add_singleton(|_| Ok(Hello("hello".to_string())))
//!     .build();
//!
//! let cache = FactoryCache::new();
//! let factory = cache.factory_for::<Message, (String,)>()?;
//! let message = factory.invoke(&registry, runtime_args!["there".to_string()])?;
//! assert_eq!(message.text, "hello there");
//! # Ok::<(), activator::ActivationError>(())
//! ```

pub mod activator;
pub mod arguments;
pub mod builder;
pub mod config;
pub mod contract;
pub mod errors;
pub mod factory;
pub mod factory_cache;
pub mod registry;
pub mod type_key;

pub use activator::{create_factory, create_instance, Activator};
pub use arguments::{RuntimeArguments, RuntimeShape, RuntimeValue};
pub use builder::ServiceRegistryBuilder;
pub use config::ActivatorConfig;
pub use contract::{
    Activatable, ConstructionContract, Constructor, ConstructorArguments, ConstructorBuilder,
    Parameter,
};
pub use errors::{ActivationError, ActivationResult};
pub use factory::{CachedFactory, FactoryKey};
pub use factory_cache::{FactoryCache, FactoryCacheStats};
pub use registry::{Lifetime, RegistryStats, ServiceRegistry};
pub use type_key::{ServiceKind, TypeKey};
