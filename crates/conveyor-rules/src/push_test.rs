//! Boolean predicates over pushes and their combinators.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_types::{Push, Result};

/// A named boolean predicate over a push. Guards [`crate::PushRule`]s and
/// filters action registrations to those relevant to a push.
#[async_trait]
pub trait PushTest: Send + Sync {
    fn name(&self) -> &str;

    async fn test(&self, push: &Push) -> Result<bool>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A leaf test built from an async closure.
pub struct FnTest {
    name: String,
    f: Box<dyn Fn(Push) -> BoxFuture<Result<bool>> + Send + Sync>,
}

/// Build a [`PushTest`] from a name and an async predicate.
pub fn push_test<F, Fut>(name: impl Into<String>, f: F) -> FnTest
where
    F: Fn(Push) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    FnTest {
        name: name.into(),
        f: Box::new(move |push| Box::pin(f(push))),
    }
}

#[async_trait]
impl PushTest for FnTest {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test(&self, push: &Push) -> Result<bool> {
        (self.f)(push.clone()).await
    }
}

/// A test that matches every push.
pub fn on_any_push() -> Arc<dyn PushTest> {
    Arc::new(push_test("on-any-push", |_push| async { Ok(true) }))
}

struct NotTest {
    name: String,
    inner: Arc<dyn PushTest>,
}

#[async_trait]
impl PushTest for NotTest {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test(&self, push: &Push) -> Result<bool> {
        Ok(!self.inner.test(push).await?)
    }
}

/// Invert a test.
pub fn not(inner: Arc<dyn PushTest>) -> Arc<dyn PushTest> {
    Arc::new(NotTest {
        name: format!("not({})", inner.name()),
        inner,
    })
}

struct AllTest {
    name: String,
    tests: Vec<Arc<dyn PushTest>>,
}

#[async_trait]
impl PushTest for AllTest {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test(&self, push: &Push) -> Result<bool> {
        for t in &self.tests {
            if !t.test(push).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// True when every test passes. An empty list is vacuously true.
pub fn all_satisfied(tests: Vec<Arc<dyn PushTest>>) -> Arc<dyn PushTest> {
    let names: Vec<&str> = tests.iter().map(|t| t.name()).collect();
    Arc::new(AllTest {
        name: format!("all({})", names.join(" & ")),
        tests,
    })
}

struct AnyTest {
    name: String,
    tests: Vec<Arc<dyn PushTest>>,
}

#[async_trait]
impl PushTest for AnyTest {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test(&self, push: &Push) -> Result<bool> {
        for t in &self.tests {
            if t.test(push).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// True when at least one test passes.
pub fn any_satisfied(tests: Vec<Arc<dyn PushTest>>) -> Arc<dyn PushTest> {
    let names: Vec<&str> = tests.iter().map(|t| t.name()).collect();
    Arc::new(AnyTest {
        name: format!("any({})", names.join(" | ")),
        tests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_types::RepoRef;

    fn push() -> Push {
        Push {
            repo: RepoRef::new("octo", "widgets", "gh", "main", "abc1234"),
            before: None,
            after: "abc1234".into(),
            commits: vec![],
            timestamp: chrono::Utc::now(),
        }
    }

    fn true_test() -> Arc<dyn PushTest> {
        Arc::new(push_test("true", |_p| async { Ok(true) }))
    }

    fn false_test() -> Arc<dyn PushTest> {
        Arc::new(push_test("false", |_p| async { Ok(false) }))
    }

    #[tokio::test]
    async fn not_inverts() {
        assert!(!not(true_test()).test(&push()).await.unwrap());
        assert!(not(false_test()).test(&push()).await.unwrap());
    }

    #[tokio::test]
    async fn all_satisfied_requires_every_test() {
        assert!(all_satisfied(vec![true_test()]).test(&push()).await.unwrap());
        assert!(all_satisfied(vec![true_test(), true_test()])
            .test(&push())
            .await
            .unwrap());
        assert!(!all_satisfied(vec![true_test(), false_test()])
            .test(&push())
            .await
            .unwrap());
        assert!(all_satisfied(vec![]).test(&push()).await.unwrap());
    }

    #[tokio::test]
    async fn any_satisfied_requires_one_test() {
        assert!(any_satisfied(vec![true_test(), false_test()])
            .test(&push())
            .await
            .unwrap());
        assert!(!any_satisfied(vec![false_test(), false_test()])
            .test(&push())
            .await
            .unwrap());
        assert!(!any_satisfied(vec![]).test(&push()).await.unwrap());
    }

    #[tokio::test]
    async fn combinator_names_describe_structure() {
        let combined = all_satisfied(vec![true_test(), not(false_test())]);
        assert_eq!(combined.name(), "all(true & not(false))");
    }

    #[tokio::test]
    async fn test_errors_propagate_through_combinators() {
        let failing: Arc<dyn PushTest> = Arc::new(push_test("broken", |_p| async {
            Err(conveyor_types::ConveyorError::Other("boom".into()))
        }));
        let combined = all_satisfied(vec![true_test(), failing]);
        assert!(combined.test(&push()).await.is_err());
    }
}
