//! Module for parsing reactant lists such as `2 atp_c; h2o_c` into metabolite
//! coefficients
use indexmap::IndexMap;
use thiserror::Error;

use crate::io::reactant_parse::lexer::{Lexer, LexerError};
use crate::io::reactant_parse::parser::{ParseError, ReactantListParser};

mod lexer;
pub mod parser;
mod token;

/// Parse a reactant list
///
/// # Parameters
/// - `input`: `;` separated entries, each `id` (coefficient 1) or `coefficient id`
///
/// # Returns
/// Parse result which is
/// - `Ok`: metabolite id => positive coefficient, in list order. An empty or blank
///     input gives an empty map.
/// - `Err`: the [`ReactantParseError`] describing what is wrong with the list
///
/// # Examples
/// ```rust
/// use etfba_core::io::reactant_parse::parse_reactants;
/// let reactants = parse_reactants("2 atp_c; h2o_c").unwrap();
/// assert_eq!(reactants["atp_c"], 2.);
/// assert_eq!(reactants["h2o_c"], 1.);
/// ```
pub fn parse_reactants(input: &str) -> Result<IndexMap<String, f64>, ReactantParseError> {
    let tokens = Lexer::new(input).lex()?;
    let reactants = ReactantListParser::new(tokens).parse()?;
    Ok(reactants)
}

/// Enum representing possible lex and parse errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReactantParseError {
    #[error(transparent)]
    LexingError(#[from] LexerError),
    #[error(transparent)]
    ParsingError(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list() {
        let reactants = parse_reactants("glc.o").unwrap();
        assert_eq!(reactants.len(), 1);
        assert_eq!(reactants["glc.o"], 1.);
        assert!(matches!(
            parse_reactants("1.5"),
            Ok(ref reactants) if reactants["1.5"] == 1.
        ));
        assert!(matches!(
            parse_reactants("a;;"),
            Err(ReactantParseError::ParsingError(ParseError::EmptyEntry(2)))
        ));
    }
}
