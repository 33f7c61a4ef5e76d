//! Ключи типов для registry и factory cache
//!
//! `TypeKey` заменяет runtime reflection: вместо интроспекции типа
//! храним только `TypeId` и имя типа для диагностики.

use std::{
    any::{type_name, TypeId},
    fmt,
    hash::{Hash, Hasher},
};

/// Идентичность типа + его имя для сообщений об ошибках
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Имя без путей модулей (`alloc::vec::Vec<alloc::string::String>` -> `Vec<String>`)
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Ключ регистрации сервиса в registry
///
/// Один тип может быть зарегистрирован несколько раз под разными именами,
/// unnamed регистрация - это `name == None`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceKind {
    type_key: TypeKey,
    name: Option<String>,
}

impl ServiceKind {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            name: None,
        }
    }

    pub fn named<T: 'static>(name: impl Into<String>) -> Self {
        Self {
            type_key: TypeKey::of::<T>(),
            name: Some(name.into()),
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKind({self})")
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}[{}]", self.type_key.name, name),
            None => f.write_str(self.type_key.name),
        }
    }
}

fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    let mut segment_start = 0;

    // каждый путь внутри generic'ов, кортежей и ссылок укорачивается отдельно
    for (index, ch) in full.char_indices() {
        if is_path_delimiter(ch) {
            short.push_str(last_segment(&full[segment_start..index]));
            short.push(ch);
            segment_start = index + ch.len_utf8();
        }
    }
    short.push_str(last_segment(&full[segment_start..]));

    short
}

fn is_path_delimiter(ch: char) -> bool {
    matches!(ch, '<' | '>' | '(' | ')' | '[' | ']' | ',' | ';' | '&' | '*' | ' ')
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}
