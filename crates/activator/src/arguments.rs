//! Runtime аргументы - значения, которых нет в registry и которые
//! передаются при каждом invoke фабрики.

use std::{any::Any, fmt};

use crate::type_key::TypeKey;

/// Один runtime аргумент с его типом
pub struct RuntimeValue {
    type_key: TypeKey,
    value: Box<dyn Any + Send>,
}

impl RuntimeValue {
    pub fn new<V: Any + Send>(value: V) -> Self {
        Self {
            type_key: TypeKey::of::<V>(),
            value: Box::new(value),
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub(crate) fn into_inner(self) -> Box<dyn Any + Send> {
        self.value
    }
}

impl fmt::Debug for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeValue({})", self.type_key.name())
    }
}

/// Упорядоченный список runtime аргументов
#[derive(Debug, Default)]
pub struct RuntimeArguments {
    values: Vec<RuntimeValue>,
}

impl RuntimeArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Any + Send>(mut self, value: V) -> Self {
        self.push(value);
        self
    }

    pub fn push<V: Any + Send>(&mut self, value: V) {
        self.values.push(RuntimeValue::new(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Типы аргументов в позиционном порядке
    pub fn type_keys(&self) -> Vec<TypeKey> {
        self.values.iter().map(RuntimeValue::type_key).collect()
    }

    pub(crate) fn into_values(self) -> Vec<RuntimeValue> {
        self.values
    }
}

impl From<Vec<RuntimeValue>> for RuntimeArguments {
    fn from(values: Vec<RuntimeValue>) -> Self {
        Self { values }
    }
}

/// Собрать `RuntimeArguments` из списка выражений
///
/// ```
/// let args = activator::runtime_args!["!!!".to_string(), 3u32];
/// assert_eq!(args.len(), 2);
/// ```
#[macro_export]
macro_rules! runtime_args {
    () => {
        $crate::RuntimeArguments::new()
    };
    ($($value:expr),+ $(,)?) => {{
        let mut arguments = $crate::RuntimeArguments::new();
        $(arguments.push($value);)+
        arguments
    }};
}

/// Форма runtime аргументов, известная на этапе компиляции.
///
/// Реализована для кортежей до 6 элементов: `(String,)`, `(String, u32)`...
pub trait RuntimeShape {
    fn type_keys() -> Vec<TypeKey>;

    fn into_arguments(self) -> RuntimeArguments;
}

impl RuntimeShape for () {
    fn type_keys() -> Vec<TypeKey> {
        Vec::new()
    }

    fn into_arguments(self) -> RuntimeArguments {
        RuntimeArguments::new()
    }
}

macro_rules! impl_runtime_shape {
    ($($name:ident),+) => {
        impl<$($name),+> RuntimeShape for ($($name,)+)
        where
            $($name: Any + Send,)+
        {
            fn type_keys() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$name>()),+]
            }

            #[allow(non_snake_case)]
            fn into_arguments(self) -> RuntimeArguments {
                let ($($name,)+) = self;
                let mut arguments = RuntimeArguments::new();
                $(arguments.push($name);)+
                arguments
            }
        }
    };
}

impl_runtime_shape!(A);
impl_runtime_shape!(A, B);
impl_runtime_shape!(A, B, C);
impl_runtime_shape!(A, B, C, D);
impl_runtime_shape!(A, B, C, D, E);
impl_runtime_shape!(A, B, C, D, E, F);
