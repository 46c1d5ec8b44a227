use crate::pos::SourcePosition;
use thiserror::Error;

/// The single structured error type for the whole crate.
///
/// Every fallible public operation (grammar finalization, parsing,
/// evaluation) returns `Result<T, SyntakError>`. There is no partial
/// recovery: any variant here aborts the call that raised it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyntakError {
    #[error("unknown rule '{0}' referenced by the grammar")]
    UnknownRule(String),

    #[error("grammar has no unique top rule")]
    NoTopRule,

    #[error("no parse for input")]
    NoParse,

    #[error("recursion too deep while parsing")]
    TooNested,

    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("unknown identifier '{name}' at {pos}")]
    UnknownIdentifier { name: String, pos: SourcePosition },

    #[error("unknown {arity}-argument function '{name}' at {pos}")]
    UnknownFunction {
        name: String,
        arity: usize,
        pos: SourcePosition,
    },

    #[error("division by zero at {0}")]
    DivisionByZero(SourcePosition),

    #[error("modulo by zero at {0}")]
    ModuloByZero(SourcePosition),

    #[error("internal invariant broken: {0}")]
    InvariantBroken(String),

    /// Only raised by a [`crate::token::Tokenizer`] built with
    /// [`crate::token::Tokenizer::strict`]; the default tokenizer silently
    /// skips characters that match no [`crate::token::TokenSpec`] (see
    /// DESIGN.md for why that is the default).
    #[error("unrecognized character '{ch}' at {pos}")]
    UnknownCharacter { ch: char, pos: SourcePosition },
}

pub type Result<T> = std::result::Result<T, SyntakError>;
