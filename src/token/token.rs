use regex::Regex;
use std::fmt;

use crate::error::{Result, SyntakError};
use crate::pos::SourcePosition;

/// A named terminal of the grammar: either a fixed literal string or an
/// anchored regular expression. TOKEN rules in [`crate::grammar::RuleSet`]
/// are created one-to-one from these.
#[derive(Clone)]
pub struct TokenSpec {
    name: String,
    matcher: Matcher,
}

#[derive(Clone)]
enum Matcher {
    Fixed(String),
    Regex(Regex),
}

impl TokenSpec {
    pub fn fixed(name: impl Into<String>, literal: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matcher: Matcher::Fixed(literal.into()),
        }
    }

    /// `pattern` is anchored at the scan position automatically; callers
    /// write the pattern as if it always matched at the start of the
    /// remaining input.
    pub fn regex(name: impl Into<String>, pattern: &str) -> Self {
        let anchored = format!("^(?:{})", pattern);
        let regex = Regex::new(&anchored)
            .unwrap_or_else(|e| panic!("invalid token regex {:?}: {}", pattern, e));
        Self {
            name: name.into(),
            matcher: Matcher::Regex(regex),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempts a match starting exactly at byte offset `pos`. Returns the
    /// byte offset one past the end of the match on success.
    fn try_match(&self, text: &str, pos: usize) -> Option<usize> {
        match &self.matcher {
            Matcher::Fixed(literal) => {
                if text[pos..].starts_with(literal.as_str()) {
                    Some(pos + literal.len())
                } else {
                    None
                }
            }
            Matcher::Regex(re) => {
                let m = re.find(&text[pos..])?;
                if m.start() == 0 {
                    Some(pos + m.end())
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Debug for TokenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            Matcher::Fixed(s) => write!(f, "TokenSpec({:?} = {:?})", self.name, s),
            Matcher::Regex(re) => write!(f, "TokenSpec({:?} = /{}/)", self.name, re.as_str()),
        }
    }
}

/// One token emitted by the [`Tokenizer`] in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToken {
    name: String,
    text: String,
    pos: SourcePosition,
    valid: bool,
}

impl ParsedToken {
    fn new(name: impl Into<String>, text: impl Into<String>, pos: SourcePosition) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            pos,
            valid: true,
        }
    }

    fn eof(pos: SourcePosition) -> Self {
        Self {
            name: "EOF".to_string(),
            text: String::new(),
            pos,
            valid: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pos(&self) -> SourcePosition {
        self.pos
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_eof(&self) -> bool {
        self.name == "EOF"
    }
}

/// Turns source text into an ordered sequence of [`ParsedToken`]s.
///
/// Scans left to right, skipping whitespace, and at every remaining
/// position picks the [`TokenSpec`] whose match consumes the most
/// characters (longest match wins; ties go to the spec declared first).
/// A character matching no spec is silently dropped unless the tokenizer
/// was built with [`Tokenizer::strict`].
pub struct Tokenizer {
    specs: Vec<TokenSpec>,
    strict: bool,
}

impl Tokenizer {
    pub fn new(specs: Vec<TokenSpec>) -> Self {
        Self {
            specs,
            strict: false,
        }
    }

    /// Like [`Tokenizer::new`] but [`Tokenizer::tokenize`] raises
    /// [`SyntakError::UnknownCharacter`] instead of skipping characters
    /// that match no spec. See DESIGN.md for why silent-skip is the
    /// default.
    pub fn strict(specs: Vec<TokenSpec>) -> Self {
        Self {
            specs,
            strict: true,
        }
    }

    pub fn set_specs(&mut self, specs: Vec<TokenSpec>) {
        self.specs = specs;
    }

    pub fn tokenize(&self, text: &str) -> Result<Vec<ParsedToken>> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let n = chars.len();
        let mut tokens = Vec::new();
        let mut idx = 0usize;
        let mut line = 0usize;

        while idx < n {
            let (byte_pos, ch) = chars[idx];
            if ch == '\n' {
                line += 1;
            }
            if ch.is_whitespace() {
                idx += 1;
                continue;
            }

            let mut best: Option<(usize, &TokenSpec)> = None;
            for spec in &self.specs {
                if let Some(end) = spec.try_match(text, byte_pos) {
                    if best.map_or(true, |(cur_end, _)| end > cur_end) {
                        best = Some((end, spec));
                    }
                }
            }

            match best {
                Some((end, spec)) => {
                    tokens.push(ParsedToken::new(
                        spec.name().to_string(),
                        &text[byte_pos..end],
                        SourcePosition::new(byte_pos, line),
                    ));
                    idx += 1;
                    while idx < n && chars[idx].0 < end {
                        if chars[idx].1 == '\n' {
                            line += 1;
                        }
                        idx += 1;
                    }
                }
                None => {
                    if self.strict {
                        return Err(SyntakError::UnknownCharacter {
                            ch,
                            pos: SourcePosition::new(byte_pos, line),
                        });
                    }
                    trace_skip(ch, byte_pos);
                    idx += 1;
                }
            }
        }

        tokens.push(ParsedToken::eof(SourcePosition::new(text.len(), line)));
        Ok(tokens)
    }
}

fn trace_skip(ch: char, pos: usize) {
    log::trace!("tokenizer: skipping unrecognized character {:?} at byte {}", ch, pos);
}
