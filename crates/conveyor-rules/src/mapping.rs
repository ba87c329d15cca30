//! The `PushMapping` trait and its leaf constructor.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use conveyor_types::{Push, Result};

/// What one mapping has to say about a push.
///
/// `Abstain` means "no opinion, must not veto others" and is distinct from
/// `Veto`, which actively suppresses any value the sibling rules produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ruling<V> {
    Abstain,
    Veto,
    Value(V),
}

impl<V> Ruling<V> {
    pub fn is_veto(&self) -> bool {
        matches!(self, Ruling::Veto)
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Ruling::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A named rule deriving one value from a push.
///
/// A failing mapping propagates its error: one bad rule fails the whole
/// push's resolution, which must be visible to the operator rather than
/// silently skipped.
#[async_trait]
pub trait PushMapping<V>: Send + Sync {
    fn name(&self) -> &str;

    async fn value_for_push(&self, push: &Push) -> Result<Ruling<V>>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A leaf mapping built from an async closure.
pub struct FnMapping<V> {
    name: String,
    f: Box<dyn Fn(Push) -> BoxFuture<Result<Ruling<V>>> + Send + Sync>,
}

/// Build a leaf [`PushMapping`] from a name and an async closure.
pub fn push_rule<V, F, Fut>(name: impl Into<String>, f: F) -> FnMapping<V>
where
    F: Fn(Push) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Ruling<V>>> + Send + 'static,
{
    FnMapping {
        name: name.into(),
        f: Box::new(move |push| Box::pin(f(push))),
    }
}

#[async_trait]
impl<V: Send + 'static> PushMapping<V> for FnMapping<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn value_for_push(&self, push: &Push) -> Result<Ruling<V>> {
        (self.f)(push.clone()).await
    }
}
