//! Ошибки активации
//!
//! Все ошибки registry и factory cache сводятся в один enum `ActivationError`.
//! Ошибки producer'ов и build closure приходят как `anyhow::Error` и
//! заворачиваются в `Construction`, чтобы вызывающий код видел единый тип.

use thiserror::Error;

use crate::type_key::{ServiceKind, TypeKey};

pub type ActivationResult<T> = Result<T, ActivationError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActivationError {
    /// В registry нет записи для запрошенного kind
    #[error("Service not registered: {service}")]
    NotRegistered { service: String },

    /// Зависимость из плана фабрики не разрешилась: нет в registry она сама
    /// (`missing == dependency`) или что-то из ее собственных зависимостей
    #[error("Unable to resolve dependency {dependency} (parameter #{position}) while activating {product}: {missing} is not registered")]
    UnresolvedDependency {
        product: String,
        dependency: String,
        position: usize,
        missing: String,
    },

    /// Runtime аргументы не совпадают с формой, под которую собрана фабрика
    #[error("Argument shape mismatch for {product}: expected ({}), got ({})", .expected.join(", "), .actual.join(", "))]
    ArgumentShapeMismatch {
        product: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Ambiguous construction of {product}: {candidates} constructors accept the given argument types")]
    AmbiguousConstruction { product: String, candidates: usize },

    #[error("No constructor of {product} accepts runtime arguments ({})", .runtime_types.join(", "))]
    NoMatchingConstructor {
        product: String,
        runtime_types: Vec<String>,
    },

    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Resolution depth {max_depth} exceeded while resolving {service}")]
    ResolutionDepthExceeded { service: String, max_depth: usize },

    /// Downcast зарегистрированного значения к запрошенному типу не удался
    #[error("Type mismatch: registered value is not a {expected}")]
    TypeMismatch { expected: String },

    #[error("Failed to construct {product}: {message}")]
    Construction { product: String, message: String },

    #[error("Invalid configuration field '{field}': {message}")]
    Configuration { field: String, message: String },
}

impl ActivationError {
    pub fn not_registered(kind: &ServiceKind) -> Self {
        ActivationError::NotRegistered {
            service: kind.to_string(),
        }
    }

    pub fn type_mismatch(expected: TypeKey) -> Self {
        ActivationError::TypeMismatch {
            expected: expected.name().to_string(),
        }
    }

    pub fn construction(product: impl Into<String>, source: &anyhow::Error) -> Self {
        ActivationError::Construction {
            product: product.into(),
            // {:#} сохраняет всю anyhow context цепочку в одной строке
            message: format!("{source:#}"),
        }
    }

    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        ActivationError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Ошибка зависит от состояния registry и может пройти при повторе
    /// после дорегистрации сервисов. Остальные детерминированы.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ActivationError::NotRegistered { .. } => true,
            ActivationError::UnresolvedDependency { .. } => true,
            ActivationError::Construction { .. } => true,
            ActivationError::ArgumentShapeMismatch { .. } => false,
            ActivationError::AmbiguousConstruction { .. } => false,
            ActivationError::NoMatchingConstructor { .. } => false,
            ActivationError::CircularDependency { .. } => false,
            ActivationError::ResolutionDepthExceeded { .. } => false,
            ActivationError::TypeMismatch { .. } => false,
            ActivationError::Configuration { .. } => false,
        }
    }

    /// Категория ошибки для логов и метрик
    pub fn category(&self) -> &'static str {
        match self {
            ActivationError::NotRegistered { .. } => "registry",
            ActivationError::UnresolvedDependency { .. } => "dependency",
            ActivationError::ArgumentShapeMismatch { .. } => "arguments",
            ActivationError::AmbiguousConstruction { .. } => "contract",
            ActivationError::NoMatchingConstructor { .. } => "contract",
            ActivationError::CircularDependency { .. } => "validation",
            ActivationError::ResolutionDepthExceeded { .. } => "validation",
            ActivationError::TypeMismatch { .. } => "registry",
            ActivationError::Construction { .. } => "construction",
            ActivationError::Configuration { .. } => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_messages() {
        let err = ActivationError::ArgumentShapeMismatch {
            product: "CustomService".to_string(),
            expected: vec!["String".to_string()],
            actual: vec!["String".to_string(), "u32".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Argument shape mismatch for CustomService: expected (String), got (String, u32)"
        );

        let err = ActivationError::CircularDependency {
            chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> A");
    }

    #[test]
    fn test_construction_keeps_context_chain() {
        let source = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("opening database")
            .unwrap_err();

        let err = ActivationError::construction("Database", &source);
        assert_eq!(err.category(), "construction");
        assert!(err.to_string().contains("opening database"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_recoverability() {
        let kind = ServiceKind::of::<String>();
        assert!(ActivationError::not_registered(&kind).is_recoverable());
        assert!(!ActivationError::AmbiguousConstruction {
            product: "X".to_string(),
            candidates: 2
        }
        .is_recoverable());
    }
}
