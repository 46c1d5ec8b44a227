pub mod grammar;

pub use grammar::{OrPolicy, Rule, RuleBody, RuleId, RuleSet, SubRuleRef};
