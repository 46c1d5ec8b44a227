pub mod token;

pub use token::{ParsedToken, TokenSpec, Tokenizer};
