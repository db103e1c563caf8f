//! Module providing Token struct for lexing

/// Represents tokens in a reactant list
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    /// A run of characters up to the next whitespace or separator, either a metabolite
    /// id or a coefficient
    Word(String),
    Separator,
    Eof,
}
