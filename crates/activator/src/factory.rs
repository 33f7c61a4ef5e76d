//! CachedFactory - план конструирования, привязанный к паре
//! (product type, runtime argument types).
//!
//! Анализ contract'а (выбор конструктора) делается один раз при сборке
//! фабрики, invoke только проходит по готовому плану.

use std::{fmt, sync::Arc};
use tracing::{debug, trace};

use crate::{
    arguments::{RuntimeArguments, RuntimeShape},
    contract::{Activatable, BuildFn, Constructor, ConstructorArguments, Parameter, ResolvedArgument},
    errors::{ActivationError, ActivationResult},
    registry::{AnyService, ServiceRegistry},
    type_key::{ServiceKind, TypeKey},
};

/// Ключ фабрики: тип продукта + упорядоченные типы runtime аргументов
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactoryKey {
    product: TypeKey,
    runtime: Vec<TypeKey>,
}

impl FactoryKey {
    pub fn new(product: TypeKey, runtime: &[TypeKey]) -> Self {
        Self {
            product,
            runtime: runtime.to_vec(),
        }
    }

    pub fn of<T: 'static>(runtime: &[TypeKey]) -> Self {
        Self::new(TypeKey::of::<T>(), runtime)
    }

    pub fn product(&self) -> TypeKey {
        self.product
    }

    pub fn runtime_types(&self) -> &[TypeKey] {
        &self.runtime
    }
}

impl fmt::Display for FactoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.product.short_name())?;
        for (index, key) in self.runtime.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&key.short_name())?;
        }
        f.write_str(")")
    }
}

struct FactoryPlan<T> {
    key: FactoryKey,
    parameters: Arc<[Parameter]>,
    build: BuildFn<T>,
    label: Option<&'static str>,
}

/// Неизменяемая фабрика экземпляров `T`.
///
/// Clone дешевый (Arc), клоны указывают на один и тот же план.
pub struct CachedFactory<T> {
    plan: Arc<FactoryPlan<T>>,
}

impl<T> Clone for CachedFactory<T> {
    fn clone(&self) -> Self {
        Self {
            plan: Arc::clone(&self.plan),
        }
    }
}

impl<T> fmt::Debug for CachedFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFactory")
            .field("key", &self.plan.key)
            .field("constructor", &self.plan.label)
            .field("parameters", &self.plan.parameters)
            .finish()
    }
}

impl<T: Activatable> CachedFactory<T> {
    /// Проанализировать contract `T` и связать план для данной формы
    /// runtime аргументов. Unbuilt -> Analyzing -> Bound.
    pub(crate) fn analyze(runtime_types: &[TypeKey]) -> ActivationResult<Self> {
        let key = FactoryKey::of::<T>(runtime_types);
        debug!("Analyzing construction contract for {}", key);

        let constructor = select_constructor(&key, T::contract().into_constructors())?;
        let (parameters, build, label) = constructor.into_parts();

        trace!(
            "Bound plan for {}: constructor {:?}, {} parameters",
            key,
            label,
            parameters.len()
        );

        Ok(Self {
            plan: Arc::new(FactoryPlan {
                key,
                parameters: parameters.into(),
                build,
                label,
            }),
        })
    }
}

impl<T: 'static> CachedFactory<T> {
    pub fn key(&self) -> &FactoryKey {
        &self.plan.key
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.plan.parameters
    }

    pub fn constructor_label(&self) -> Option<&'static str> {
        self.plan.label
    }

    /// Обе фабрики разделяют один и тот же план
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.plan, &other.plan)
    }

    /// Создать экземпляр: зависимости берутся из `registry` на момент вызова,
    /// runtime аргументы потребляются по порядку.
    pub fn invoke(
        &self,
        registry: &ServiceRegistry,
        arguments: RuntimeArguments,
    ) -> ActivationResult<T> {
        let plan = &self.plan;
        let product = plan.key.product;

        let actual = arguments.type_keys();
        if actual != plan.key.runtime {
            return Err(self.shape_mismatch(&actual));
        }

        let mut runtime = arguments.into_values().into_iter();
        let mut values = Vec::with_capacity(plan.parameters.len());

        for (position, parameter) in plan.parameters.iter().enumerate() {
            let value = match parameter {
                Parameter::Registry(kind) => {
                    ResolvedArgument::Service(resolve_slot(registry, product, kind, position)?)
                }
                Parameter::OptionalRegistry(kind) if !registry.contains_kind(kind) => {
                    ResolvedArgument::Missing
                }
                Parameter::OptionalRegistry(kind) => {
                    ResolvedArgument::Service(resolve_slot(registry, product, kind, position)?)
                }
                Parameter::Runtime(_) => match runtime.next() {
                    Some(value) => ResolvedArgument::Runtime(value.into_inner()),
                    None => return Err(self.shape_mismatch(&actual)),
                },
            };
            values.push(value);
        }

        let mut constructor_arguments =
            ConstructorArguments::new(product, Arc::clone(&plan.parameters), values);

        (plan.build)(&mut constructor_arguments).map_err(|err| {
            match err.downcast::<ActivationError>() {
                Ok(activation) => activation,
                Err(other) => ActivationError::construction(product.name(), &other),
            }
        })
    }

    /// Typed вариант `invoke` для кортежа runtime аргументов
    pub fn invoke_with<A: RuntimeShape>(
        &self,
        registry: &ServiceRegistry,
        arguments: A,
    ) -> ActivationResult<T> {
        self.invoke(registry, arguments.into_arguments())
    }

    fn shape_mismatch(&self, actual: &[TypeKey]) -> ActivationError {
        ActivationError::ArgumentShapeMismatch {
            product: self.plan.key.product.name().to_string(),
            expected: short_names(&self.plan.key.runtime),
            actual: short_names(actual),
        }
    }
}

/// Разрешить registry-параметр плана. Любой `NotRegistered`, в том числе
/// из producer'а самой зависимости, становится `UnresolvedDependency`.
fn resolve_slot(
    registry: &ServiceRegistry,
    product: TypeKey,
    kind: &ServiceKind,
    position: usize,
) -> ActivationResult<AnyService> {
    registry.resolve_kind(kind).map_err(|err| match err {
        ActivationError::NotRegistered { service } => ActivationError::UnresolvedDependency {
            product: product.name().to_string(),
            dependency: kind.to_string(),
            position,
            missing: service,
        },
        other => other,
    })
}

fn short_names(keys: &[TypeKey]) -> Vec<String> {
    keys.iter().map(TypeKey::short_name).collect()
}

/// Выбрать ровно один конструктор, принимающий данные runtime типы
fn select_constructor<T>(
    key: &FactoryKey,
    constructors: Vec<Constructor<T>>,
) -> ActivationResult<Constructor<T>> {
    let mut candidates: Vec<Constructor<T>> = constructors
        .into_iter()
        .filter(|constructor| constructor.runtime_types() == key.runtime)
        .collect();

    match candidates.len() {
        0 => Err(ActivationError::NoMatchingConstructor {
            product: key.product.name().to_string(),
            runtime_types: short_names(&key.runtime),
        }),
        1 => Ok(candidates.remove(0)),
        count => {
            let preferred: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, constructor)| constructor.is_preferred())
                .map(|(index, _)| index)
                .collect();

            if let [index] = preferred.as_slice() {
                debug!(
                    "{} constructors match {}, using the preferred one",
                    count, key
                );
                Ok(candidates.swap_remove(*index))
            } else {
                Err(ActivationError::AmbiguousConstruction {
                    product: key.product.name().to_string(),
                    candidates: count,
                })
            }
        }
    }
}
