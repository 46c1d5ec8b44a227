//! A small parsing toolkit — declare a grammar from code, tokenize input,
//! produce a parse tree, and fire callbacks on recognized productions —
//! plus a generic arithmetic-expression evaluator built on top of it.

pub mod error;
pub mod pos;
pub mod token;
pub mod grammar;
pub mod node;
pub mod numeric;
pub mod parser;
pub mod evaluator;

pub use error::{Result, SyntakError};
pub use pos::SourcePosition;
pub use token::{ParsedToken, TokenSpec, Tokenizer};
pub use grammar::{OrPolicy, Rule, RuleBody, RuleId, RuleSet, SubRuleRef};
pub use node::{reduce_tree, NodeId, NodeView, ParseNode, ParseTree};
pub use numeric::NumericValue;
pub use parser::Parser;
pub use evaluator::MathEvaluator;