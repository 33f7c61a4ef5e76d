//! Construction Contract - декларативное описание того, как собрать тип
//!
//! Вместо runtime reflection тип сам перечисляет свои конструкторы:
//! упорядоченный список параметров, каждый с явным источником
//! (registry или runtime аргументы), плюс closure, собирающая экземпляр.
//!
//! ```
//! use activator::{Activatable, ConstructionContract, Constructor};
//! use std::sync::Arc;
//!
//! struct Greeting(String);
//!
//! struct Greeter {
//!     greeting: Arc<Greeting>,
//!     name: String,
//! }
//!
//! impl Activatable for Greeter {
//!     fn contract() -> ConstructionContract<Self> {
//!         ConstructionContract::single(
//!             Constructor::builder()
//!                 .inject::<Greeting>()
//!                 .runtime::<String>()
//!                 .build(|args| {
//!                     Ok(Greeter {
//!                         greeting: args.service()?,
//!                         name: args.runtime()?,
//!                     })
//!                 }),
//!         )
//!     }
//! }
//! ```

use std::{any::Any, collections::VecDeque, fmt, sync::Arc};

use crate::{
    errors::{ActivationError, ActivationResult},
    registry::AnyService,
    type_key::{ServiceKind, TypeKey},
};

/// Тип, который умеет описать свой construction contract
pub trait Activatable: Any + Send + Sized {
    fn contract() -> ConstructionContract<Self>;
}

/// Источник значения для параметра конструктора
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    /// Обязательная зависимость из registry
    Registry(ServiceKind),
    /// Зависимость из registry, `None` если не зарегистрирована
    OptionalRegistry(ServiceKind),
    /// Значение из runtime аргументов, по типу и позиции
    Runtime(TypeKey),
}

impl Parameter {
    pub fn is_runtime(&self) -> bool {
        matches!(self, Parameter::Runtime(_))
    }

    fn describe(&self) -> String {
        match self {
            Parameter::Registry(kind) => format!("service {kind}"),
            Parameter::OptionalRegistry(kind) => format!("optional service {kind}"),
            Parameter::Runtime(key) => format!("runtime {key}"),
        }
    }
}

pub(crate) type BuildFn<T> =
    Arc<dyn Fn(&mut ConstructorArguments) -> anyhow::Result<T> + Send + Sync>;

/// Один конструктор типа `T`
pub struct Constructor<T> {
    label: Option<&'static str>,
    parameters: Vec<Parameter>,
    preferred: bool,
    build: BuildFn<T>,
}

impl Constructor<()> {
    /// Начать описание конструктора
    pub fn builder() -> ConstructorBuilder {
        ConstructorBuilder::default()
    }
}

impl<T> Constructor<T> {
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn is_preferred(&self) -> bool {
        self.preferred
    }

    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    /// Типы runtime параметров в порядке объявления
    pub fn runtime_types(&self) -> Vec<TypeKey> {
        self.parameters
            .iter()
            .filter_map(|parameter| match parameter {
                Parameter::Runtime(key) => Some(*key),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn into_parts(self) -> (Vec<Parameter>, BuildFn<T>, Option<&'static str>) {
        (self.parameters, self.build, self.label)
    }
}

impl<T> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("label", &self.label)
            .field("parameters", &self.parameters)
            .field("preferred", &self.preferred)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ConstructorBuilder {
    label: Option<&'static str>,
    parameters: Vec<Parameter>,
    preferred: bool,
}

impl ConstructorBuilder {
    /// Имя конструктора для логов
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn inject<S: Any + Send + Sync>(mut self) -> Self {
        self.parameters.push(Parameter::Registry(ServiceKind::of::<S>()));
        self
    }

    pub fn inject_named<S: Any + Send + Sync>(mut self, name: impl Into<String>) -> Self {
        self.parameters
            .push(Parameter::Registry(ServiceKind::named::<S>(name)));
        self
    }

    pub fn inject_optional<S: Any + Send + Sync>(mut self) -> Self {
        self.parameters
            .push(Parameter::OptionalRegistry(ServiceKind::of::<S>()));
        self
    }

    pub fn runtime<V: Any + Send>(mut self) -> Self {
        self.parameters.push(Parameter::Runtime(TypeKey::of::<V>()));
        self
    }

    /// Использовать этот конструктор, если подходят несколько
    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    pub fn build<T, F>(self, build: F) -> Constructor<T>
    where
        F: Fn(&mut ConstructorArguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Constructor {
            label: self.label,
            parameters: self.parameters,
            preferred: self.preferred,
            build: Arc::new(build),
        }
    }
}

/// Все конструкторы типа
pub struct ConstructionContract<T> {
    constructors: Vec<Constructor<T>>,
}

impl<T> ConstructionContract<T> {
    pub fn new() -> Self {
        Self {
            constructors: Vec::new(),
        }
    }

    pub fn single(constructor: Constructor<T>) -> Self {
        Self {
            constructors: vec![constructor],
        }
    }

    pub fn with(mut self, constructor: Constructor<T>) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn constructors(&self) -> &[Constructor<T>] {
        &self.constructors
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub(crate) fn into_constructors(self) -> Vec<Constructor<T>> {
        self.constructors
    }
}

impl<T> Default for ConstructionContract<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<Constructor<T>>> for ConstructionContract<T> {
    fn from(constructors: Vec<Constructor<T>>) -> Self {
        Self { constructors }
    }
}

pub(crate) enum ResolvedArgument {
    Service(AnyService),
    Missing,
    Runtime(Box<dyn Any + Send>),
}

/// Значения параметров, переданные в build closure конструктора.
///
/// Значения забираются строго в порядке объявления параметров.
pub struct ConstructorArguments {
    product: TypeKey,
    parameters: Arc<[Parameter]>,
    values: VecDeque<ResolvedArgument>,
    position: usize,
}

impl ConstructorArguments {
    pub(crate) fn new(
        product: TypeKey,
        parameters: Arc<[Parameter]>,
        values: Vec<ResolvedArgument>,
    ) -> Self {
        Self {
            product,
            parameters,
            values: values.into(),
            position: 0,
        }
    }

    /// Следующий обязательный сервис из registry
    pub fn service<S: Any + Send + Sync>(&mut self) -> ActivationResult<Arc<S>> {
        match self.next_value("service")? {
            ResolvedArgument::Service(service) => service
                .downcast::<S>()
                .map_err(|_| ActivationError::type_mismatch(TypeKey::of::<S>())),
            _ => Err(self.misuse("service")),
        }
    }

    /// Следующий опциональный сервис из registry
    pub fn optional_service<S: Any + Send + Sync>(&mut self) -> ActivationResult<Option<Arc<S>>> {
        match self.next_value("optional service")? {
            ResolvedArgument::Service(service) => service
                .downcast::<S>()
                .map(Some)
                .map_err(|_| ActivationError::type_mismatch(TypeKey::of::<S>())),
            ResolvedArgument::Missing => Ok(None),
            ResolvedArgument::Runtime(_) => Err(self.misuse("optional service")),
        }
    }

    /// Следующий runtime аргумент
    pub fn runtime<V: Any>(&mut self) -> ActivationResult<V> {
        match self.next_value("runtime argument")? {
            ResolvedArgument::Runtime(value) => value
                .downcast::<V>()
                .map(|boxed| *boxed)
                .map_err(|_| ActivationError::type_mismatch(TypeKey::of::<V>())),
            _ => Err(self.misuse("runtime argument")),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    fn next_value(&mut self, requested: &str) -> ActivationResult<ResolvedArgument> {
        let value = self.values.pop_front().ok_or_else(|| ActivationError::Construction {
            product: self.product.name().to_string(),
            message: format!(
                "{requested} requested but all {} parameters are consumed",
                self.parameters.len()
            ),
        })?;
        self.position += 1;
        Ok(value)
    }

    fn misuse(&self, requested: &str) -> ActivationError {
        // position уже сдвинут на следующий параметр
        let index = self.position - 1;
        let declared = self
            .parameters
            .get(index)
            .map(Parameter::describe)
            .unwrap_or_default();

        ActivationError::Construction {
            product: self.product.name().to_string(),
            message: format!("parameter #{index} is declared as {declared}, but {requested} was requested"),
        }
    }
}
