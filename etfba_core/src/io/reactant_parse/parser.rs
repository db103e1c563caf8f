use indexmap::IndexMap;
use thiserror::Error;

use crate::io::reactant_parse::token::Token;

/*
Reactant list grammar:
list  -> ( entry ( ";" entry )* )? ;
entry -> COEFFICIENT? ID ;

e.g. 2 atp_c; h2o_c; 0.5 o2_c
 */

/// Reactant list parser
pub struct ReactantListParser {
    /// Tokens from the reactant list
    tokens: Vec<Token>,
    /// Current token being processed
    current: usize,
}

impl ReactantListParser {
    pub fn new(tokens: Vec<Token>) -> ReactantListParser {
        ReactantListParser { tokens, current: 0 }
    }

    // region Parsing Functions

    /// Parse the tokens into metabolite id => coefficient, in list order
    pub fn parse(&mut self) -> Result<IndexMap<String, f64>, ParseError> {
        let mut reactants = IndexMap::new();
        if self.is_at_end() {
            return Ok(reactants);
        }
        loop {
            let (id, coefficient) = self.entry(reactants.len())?;
            if reactants.insert(id.clone(), coefficient).is_some() {
                return Err(ParseError::DuplicateReactant(id));
            }
            if self.is_at_end() {
                return Ok(reactants);
            }
            if !self.match_separator() {
                return Err(ParseError::UnexpectedWord(self.describe_current()));
            }
        }
    }

    fn entry(&mut self, position: usize) -> Result<(String, f64), ParseError> {
        let first = self
            .match_word()
            .ok_or(ParseError::EmptyEntry(position + 1))?;
        match self.match_word() {
            Some(id) => Ok((id, ReactantListParser::coefficient(&first)?)),
            None => Ok((first, 1.)),
        }
    }

    fn coefficient(word: &str) -> Result<f64, ParseError> {
        match word.parse::<f64>() {
            Ok(value) if value.is_finite() && value > 0. => Ok(value),
            _ => Err(ParseError::MalformedCoefficient(word.to_string())),
        }
    }

    // endregion Parsing Functions

    // region parsing helper functions

    fn match_word(&mut self) -> Option<String> {
        if let Token::Word(word) = self.peek() {
            let word = word.clone();
            self.current += 1;
            return Some(word);
        }
        None
    }

    fn match_separator(&mut self) -> bool {
        if *self.peek() == Token::Separator {
            self.current += 1;
            return true;
        }
        false
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Token::Word(word) => word.clone(),
            Token::Separator => ";".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }

    fn is_at_end(&self) -> bool {
        *self.peek() == Token::Eof
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.current).unwrap_or(&Token::Eof)
    }

    // endregion parsing helper functions
}

/// Enum representing possible parse errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Nothing between two separators, or a trailing separator
    #[error("entry {0} of the reactant list is empty")]
    EmptyEntry(usize),
    #[error("'{0}' is not a positive coefficient")]
    MalformedCoefficient(String),
    /// More than a coefficient and an id in one entry
    #[error("unexpected '{0}', expected ';' between reactants")]
    UnexpectedWord(String),
    #[error("metabolite '{0}' appears twice in the reactant list")]
    DuplicateReactant(String),
}
