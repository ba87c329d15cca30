//! Push rule resolution for the Conveyor delivery machine.
//!
//! A [`PushMapping`] derives one value from a push, or declines to. Mappings
//! compose: [`PushRules`] holds an ordered list of child mappings and reduces
//! their answers with a veto-wins-else-first-match policy, so more specific
//! rules go first and any rule can unconditionally suppress a value.

pub mod mapping;
pub mod push_test;
pub mod rules;

pub use mapping::{push_rule, FnMapping, PushMapping, Ruling};
pub use push_test::{
    all_satisfied, any_satisfied, not, on_any_push, push_test, FnTest, PushTest,
};
pub use rules::{veto_when, when_push_satisfies, PushRule, PushRuleBuilder, PushRules};
