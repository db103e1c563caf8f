//! Provides struct for representing an optimization problem's objective
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::optimize::expression::Expr;

/// Represents the Objective of an optimization problem
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// Terms included in the objective (See [`ObjectiveTerm`])
    terms: Vec<ObjectiveTerm>,
    /// Sense of the objective (maximize, or minimize), see [`ObjectiveSense`]
    sense: ObjectiveSense,
}

impl Objective {
    // region Creation Functions
    /// Create a new empty objective, with a given sense
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            terms: Vec::new(),
            sense,
        }
    }

    /// Create a new empty maximization objective
    pub fn new_maximize() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new empty minimization objective
    pub fn new_minimize() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }
    // endregion Creation Functions

    /// Change the sense of the objective
    pub fn set_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn terms(&self) -> &[ObjectiveTerm] {
        &self.terms
    }

    // region Adding Terms
    /// Add a new term to the objective
    pub fn add_term(&mut self, term: ObjectiveTerm) {
        self.terms.push(term);
    }

    /// Add a new Linear term to the objective
    pub fn add_linear_term(&mut self, variable: usize, coefficient: f64) {
        self.terms.push(ObjectiveTerm::Linear {
            var: variable,
            coef: coefficient,
        });
    }

    /// Add an arbitrary expression to the objective
    pub fn add_expression(&mut self, expression: Expr) {
        self.terms.push(ObjectiveTerm::Nonlinear(expression));
    }
    // endregion Adding Terms

    /// Remove all terms from the objective
    pub fn remove_all_terms(&mut self) {
        self.terms.clear();
    }

    pub fn contains_nonlinear(&self) -> bool {
        self.terms
            .iter()
            .any(|t| matches!(t, ObjectiveTerm::Nonlinear(e) if !e.is_linear()))
    }

    /// Dense coefficient vector of length `num_variables` and the constant offset,
    /// None if the objective is nonlinear
    pub fn linear_coefficients(&self, num_variables: usize) -> Option<(Vec<f64>, f64)> {
        let mut coefficients = vec![0.; num_variables];
        let mut constant = 0.;
        for term in &self.terms {
            match term {
                ObjectiveTerm::Linear { var, coef } => {
                    *coefficients.get_mut(*var)? += coef;
                }
                ObjectiveTerm::Nonlinear(expression) => {
                    let linear = expression.linear_form()?;
                    for (var, coef) in linear.terms {
                        *coefficients.get_mut(var)? += coef;
                    }
                    constant += linear.constant;
                }
            }
        }
        Some((coefficients, constant))
    }

    /// The whole objective as a single expression
    pub fn to_expression(&self) -> Expr {
        Expr::sum(self.terms.iter().map(|t| match t {
            ObjectiveTerm::Linear { var, coef } => Expr::Const(*coef) * Expr::Var(*var),
            ObjectiveTerm::Nonlinear(expression) => expression.clone(),
        }))
    }

    /// Value of the objective at `values`
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|t| match t {
                ObjectiveTerm::Linear { var, coef } => {
                    coef * values.get(*var).copied().unwrap_or(f64::NAN)
                }
                ObjectiveTerm::Nonlinear(expression) => expression.evaluate(values),
            })
            .sum()
    }
}

impl Display for Objective {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.sense, self.to_expression())
    }
}

/// Represents the sense of the objective, whether it should be maximized or minimized
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveSense {
    #[serde(alias = "min")]
    Minimize,
    #[serde(alias = "max")]
    Maximize,
}

impl Display for ObjectiveSense {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectiveSense::Minimize => write!(f, "minimize"),
            ObjectiveSense::Maximize => write!(f, "maximize"),
        }
    }
}

impl FromStr for ObjectiveSense {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" | "maximize" => Ok(ObjectiveSense::Maximize),
            "min" | "minimize" => Ok(ObjectiveSense::Minimize),
            other => Err(format!("unknown optimization direction '{other}'")),
        }
    }
}

/// Represents a term in the objective function
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveTerm {
    /// `coef` * x\[`var`\]
    Linear { var: usize, coef: f64 },
    /// Any expression, typically a nonlinear one
    Nonlinear(Expr),
}
