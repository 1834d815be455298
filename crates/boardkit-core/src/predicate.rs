use std::marker::PhantomData;
use std::sync::Arc;

use boardkit_api::Value;

use crate::traits::Record;

pub trait Predicate<T>: Send + Sync {
    fn test(&self, item: &T) -> bool;

    fn or<P>(self, other: P) -> Or<T, Self, P>
    where
        Self: Sized,
        P: Predicate<T>,
    {
        Or {
            left: self,
            right: other,
            _phantom: PhantomData,
        }
    }

    fn not(self) -> Not<T, Self>
    where
        Self: Sized,
    {
        Not {
            inner: self,
            _phantom: PhantomData,
        }
    }

    fn boxed(self) -> Arc<dyn Predicate<T>>
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

impl<T> Predicate<T> for Arc<dyn Predicate<T>> {
    fn test(&self, item: &T) -> bool {
        (**self).test(item)
    }
}

pub struct Or<T, L, R> {
    left: L,
    right: R,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, L, R> Predicate<T> for Or<T, L, R>
where
    L: Predicate<T>,
    R: Predicate<T>,
{
    fn test(&self, item: &T) -> bool {
        self.left.test(item) || self.right.test(item)
    }
}

pub struct Not<T, P> {
    inner: P,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, P> Predicate<T> for Not<T, P>
where
    P: Predicate<T>,
{
    fn test(&self, item: &T) -> bool {
        !self.inner.test(item)
    }
}

/// Predicate backed by a closure.
pub struct FnPredicate<F>(pub F);

impl<T, F> Predicate<T> for FnPredicate<F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn test(&self, item: &T) -> bool {
        (self.0)(item)
    }
}

pub fn predicate_fn<T, F>(f: F) -> FnPredicate<F>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    FnPredicate(f)
}

/// Matches records whose field equals `value`.
pub struct FieldEquals {
    field: String,
    value: Value,
}

impl FieldEquals {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl<R: Record> Predicate<R> for FieldEquals {
    fn test(&self, item: &R) -> bool {
        item.field(&self.field).as_ref() == Some(&self.value)
    }
}

/// Matches records whose field refers to `key`.
///
/// A scalar field matches by its key form; an object matches by its `id`;
/// an array matches when any element does (e.g. `tags`, `assigned_to`).
pub struct FieldContains {
    field: String,
    key: String,
}

impl FieldContains {
    pub fn new(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
        }
    }
}

impl<R: Record> Predicate<R> for FieldContains {
    fn test(&self, item: &R) -> bool {
        match item.field(&self.field) {
            Some(Value::Array(items)) => items
                .iter()
                .any(|v| v.as_key().as_deref() == Some(self.key.as_str())),
            Some(other) => other.as_key().as_deref() == Some(self.key.as_str()),
            None => false,
        }
    }
}
