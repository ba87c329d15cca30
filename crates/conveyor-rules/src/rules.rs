//! `PushRules` — the composable rule set — and the rule builder.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_types::{ConveyorError, Push, Result};

use crate::mapping::{PushMapping, Ruling};
use crate::push_test::PushTest;

// ---------------------------------------------------------------------------
// PushRule — guard tests plus a value
// ---------------------------------------------------------------------------

/// A rule producing a fixed value when all its guard tests pass, abstaining
/// otherwise.
pub struct PushRule<V> {
    name: String,
    tests: Vec<Arc<dyn PushTest>>,
    value: V,
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> PushMapping<V> for PushRule<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn value_for_push(&self, push: &Push) -> Result<Ruling<V>> {
        for test in &self.tests {
            if !test.test(push).await? {
                return Ok(Ruling::Abstain);
            }
        }
        Ok(Ruling::Value(self.value.clone()))
    }
}

/// Builder returned by [`when_push_satisfies`].
pub struct PushRuleBuilder {
    name: Option<String>,
    tests: Vec<Arc<dyn PushTest>>,
}

impl PushRuleBuilder {
    /// Name the rule. Defaults to the joined guard names.
    pub fn it_means(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set<V>(self, value: V) -> PushRule<V> {
        let name = self.name.unwrap_or_else(|| {
            let names: Vec<&str> = self.tests.iter().map(|t| t.name()).collect();
            names.join(" & ")
        });
        PushRule {
            name,
            tests: self.tests,
            value,
        }
    }
}

/// Start a rule from its guard tests.
pub fn when_push_satisfies(tests: Vec<Arc<dyn PushTest>>) -> PushRuleBuilder {
    PushRuleBuilder { name: None, tests }
}

// ---------------------------------------------------------------------------
// Veto rule
// ---------------------------------------------------------------------------

struct VetoRule<V> {
    name: String,
    tests: Vec<Arc<dyn PushTest>>,
    _marker: PhantomData<fn() -> V>,
}

#[async_trait]
impl<V: Send + Sync + 'static> PushMapping<V> for VetoRule<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn value_for_push(&self, push: &Push) -> Result<Ruling<V>> {
        for test in &self.tests {
            if !test.test(push).await? {
                return Ok(Ruling::Abstain);
            }
        }
        tracing::debug!(rule = %self.name, "Rule vetoes this push");
        Ok(Ruling::Veto)
    }
}

/// A rule that actively vetoes any value when all its tests pass, e.g.
/// "never compute goals for a fork".
pub fn veto_when<V: Send + Sync + 'static>(
    name: impl Into<String>,
    tests: Vec<Arc<dyn PushTest>>,
) -> Arc<dyn PushMapping<V>> {
    Arc::new(VetoRule {
        name: name.into(),
        tests,
        _marker: PhantomData,
    })
}

// ---------------------------------------------------------------------------
// PushRules — the composite
// ---------------------------------------------------------------------------

/// An ordered rule set that is itself a [`PushMapping`].
///
/// Evaluation fans out to all children concurrently; order of dispatch does
/// not imply precedence. Reduction: any veto makes the overall answer
/// abstain, otherwise the first child (in registration order) that produced
/// a value wins.
pub struct PushRules<V> {
    name: String,
    choices: Vec<Arc<dyn PushMapping<V>>>,
}

impl<V: Clone + Send + Sync + 'static> PushRules<V> {
    pub fn new(name: impl Into<String>, choices: Vec<Arc<dyn PushMapping<V>>>) -> Self {
        Self {
            name: name.into(),
            choices,
        }
    }

    pub fn add(&mut self, rule: Arc<dyn PushMapping<V>>) {
        self.choices.push(rule);
    }

    /// A new rule set over the subset of children matching `predicate`. The
    /// original is untouched; this supports test isolation and
    /// environment-specific subsets.
    pub fn filter(&self, predicate: impl Fn(&dyn PushMapping<V>) -> bool) -> PushRules<V> {
        PushRules {
            name: format!("{}-filtered", self.name),
            choices: self
                .choices
                .iter()
                .filter(|c| predicate(c.as_ref()))
                .cloned()
                .collect(),
        }
    }

    /// Evaluate the rule set, reducing to a plain optional value.
    pub async fn resolve(&self, push: &Push) -> Result<Option<V>> {
        Ok(self.value_for_push(push).await?.into_value())
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> PushMapping<V> for PushRules<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn value_for_push(&self, push: &Push) -> Result<Ruling<V>> {
        // Fan out to all children; join in registration order. Never race
        // for a first answer.
        let handles: Vec<_> = self
            .choices
            .iter()
            .map(|choice| {
                let choice = Arc::clone(choice);
                let push = push.clone();
                tokio::spawn(async move { choice.value_for_push(&push).await })
            })
            .collect();

        let mut rulings = Vec::with_capacity(handles.len());
        for (handle, choice) in handles.into_iter().zip(&self.choices) {
            let ruling = handle
                .await
                .map_err(|e| ConveyorError::RuleFailed {
                    rule: choice.name().to_string(),
                    message: e.to_string(),
                })??;
            tracing::debug!(
                rules = %self.name,
                rule = %choice.name(),
                veto = ruling.is_veto(),
                "Evaluated push rule"
            );
            rulings.push(ruling);
        }

        if rulings.iter().any(Ruling::is_veto) {
            tracing::info!(rules = %self.name, push = %push.repo, "A rule vetoed; no value");
            return Ok(Ruling::Abstain);
        }
        for ruling in rulings {
            if let Ruling::Value(v) = ruling {
                return Ok(Ruling::Value(v));
            }
        }
        Ok(Ruling::Abstain)
    }
}
