//! Provides struct for representing a constraint in an optimization problem
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::optimize::expression::{Expr, LinearExpr};

/// Represents a constraint in an optimization problem
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Represents an equality constraint, where `terms` = `equals`
    Equality {
        /// Linear terms which are added together, see [`ConstraintTerm`] for more
        terms: Vec<ConstraintTerm>,
        /// The right hand side of the equality constraint
        equals: f64,
    },
    /// Represents an inequality constraint, `lower_bound` <= `terms` <= `upper_bound`
    Inequality {
        /// Linear terms which are added together, see [`ConstraintTerm`] for more
        terms: Vec<ConstraintTerm>,
        /// The lowest value the sum of the terms can take, may be -inf
        lower_bound: f64,
        /// The highest value the sum of the terms can take, may be +inf
        upper_bound: f64,
    },
    /// `lower_bound` <= `expression` <= `upper_bound` for an arbitrary expression
    Nonlinear {
        expression: Expr,
        lower_bound: f64,
        upper_bound: f64,
    },
}

impl Constraint {
    /// Create a new equality constraint
    ///
    /// # Parameters
    /// - `terms`: (variable index, coefficient) pairs
    /// - `equals`: The right hand side of the equality
    ///
    /// # Examples
    /// ```rust
    /// use etfba_core::optimize::constraint::Constraint;
    /// // 3*x0 + 2*x1 = 6
    /// let constraint = Constraint::new_equality(&[(0, 3.), (1, 2.)], 6.);
    /// assert!(constraint.is_satisfied(&[2., 0.], 1e-9));
    /// ```
    pub fn new_equality(terms: &[(usize, f64)], equals: f64) -> Self {
        Constraint::Equality {
            terms: Constraint::into_terms(terms),
            equals,
        }
    }

    /// Create a new inequality constraint, use infinite bounds for one-sided constraints
    pub fn new_inequality(terms: &[(usize, f64)], lower_bound: f64, upper_bound: f64) -> Self {
        Constraint::Inequality {
            terms: Constraint::into_terms(terms),
            lower_bound,
            upper_bound,
        }
    }

    /// Create a constraint on an expression; linear expressions become linear constraints
    pub fn new_expression(expression: Expr, lower_bound: f64, upper_bound: f64) -> Self {
        match expression.linear_form() {
            Some(LinearExpr { terms, constant }) => {
                if lower_bound == upper_bound {
                    Constraint::new_equality(&terms, lower_bound - constant)
                } else {
                    Constraint::new_inequality(&terms, lower_bound - constant, upper_bound - constant)
                }
            }
            None => Constraint::Nonlinear {
                expression,
                lower_bound,
                upper_bound,
            },
        }
    }

    fn into_terms(terms: &[(usize, f64)]) -> Vec<ConstraintTerm> {
        terms
            .iter()
            .map(|(variable, coefficient)| ConstraintTerm {
                variable: *variable,
                coefficient: *coefficient,
            })
            .collect()
    }

    /// Lower and upper bound on the constraint body
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Constraint::Equality { equals, .. } => (*equals, *equals),
            Constraint::Inequality {
                lower_bound,
                upper_bound,
                ..
            }
            | Constraint::Nonlinear {
                lower_bound,
                upper_bound,
                ..
            } => (*lower_bound, *upper_bound),
        }
    }

    /// Linear terms of the body, None for a nonlinear constraint
    pub fn linear_terms(&self) -> Option<&[ConstraintTerm]> {
        match self {
            Constraint::Equality { terms, .. } | Constraint::Inequality { terms, .. } => {
                Some(terms.as_slice())
            }
            Constraint::Nonlinear { .. } => None,
        }
    }

    pub fn is_linear(&self) -> bool {
        self.linear_terms().is_some()
    }

    /// Indices of the variables appearing in the constraint
    pub fn variables(&self) -> BTreeSet<usize> {
        match self {
            Constraint::Equality { terms, .. } | Constraint::Inequality { terms, .. } => {
                terms.iter().map(|t| t.variable).collect()
            }
            Constraint::Nonlinear { expression, .. } => expression.variables(),
        }
    }

    /// Value of the constraint body at `values`
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        match self {
            Constraint::Equality { terms, .. } | Constraint::Inequality { terms, .. } => terms
                .iter()
                .map(|t| t.coefficient * values.get(t.variable).copied().unwrap_or(f64::NAN))
                .sum(),
            Constraint::Nonlinear { expression, .. } => expression.evaluate(values),
        }
    }

    /// How far the body at `values` lies outside the bounds, 0 if it is inside
    pub fn violation(&self, values: &[f64]) -> f64 {
        let body = self.evaluate(values);
        let (lb, ub) = self.bounds();
        if body.is_nan() {
            return f64::INFINITY;
        }
        (lb - body).max(body - ub).max(0.)
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        self.violation(values) <= tolerance
    }

    /// Create a string representation of the terms in the Constraint
    fn constraint_to_string(&self) -> String {
        match self {
            Constraint::Equality { terms, equals } => {
                format!("{} = {}", Self::terms_to_string(terms), equals)
            }
            Constraint::Inequality {
                terms,
                lower_bound,
                upper_bound,
            } => format!(
                "{} <= {} <= {}",
                lower_bound,
                Self::terms_to_string(terms),
                upper_bound
            ),
            Constraint::Nonlinear {
                expression,
                lower_bound,
                upper_bound,
            } => format!("{} <= {} <= {}", lower_bound, expression, upper_bound),
        }
    }

    /// Convert a vector of terms into a String representation
    fn terms_to_string(terms: &[ConstraintTerm]) -> String {
        if terms.is_empty() {
            return String::from("0");
        }
        terms
            .iter()
            .map(ConstraintTerm::to_string)
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.constraint_to_string())
    }
}

/// Represents a single term in a constraint, specifically
/// represents the multiplication of the `variable` by the `coefficient`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintTerm {
    /// Index of the variable in the problem
    pub variable: usize,
    /// The coefficient for the variable
    pub coefficient: f64,
}

impl Display for ConstraintTerm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}*x[{}]", self.coefficient, self.variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_expressions_become_linear_constraints() {
        // 2*x0 + 1 <= 5
        let expr = Expr::Const(2.) * Expr::Var(0) + Expr::Const(1.);
        let constraint = Constraint::new_expression(expr, f64::NEG_INFINITY, 5.);
        assert!(constraint.is_linear());
        assert_eq!(constraint.bounds(), (f64::NEG_INFINITY, 4.));
        assert!(constraint.is_satisfied(&[2.], 0.));
        assert!(!constraint.is_satisfied(&[2.5], 0.));
    }

    #[test]
    fn nonlinear_expression_kept_as_is() {
        let expr = Expr::Var(0).exp();
        let constraint = Constraint::new_expression(expr, 0., 1.);
        assert!(!constraint.is_linear());
        assert_eq!(constraint.violation(&[0.]), 0.);
        assert!((constraint.violation(&[1.]) - (1f64.exp() - 1.)).abs() < 1e-12);
    }

    #[test]
    fn display() {
        let constraint = Constraint::new_inequality(&[(0, 1.), (2, -1.)], 0., 10.);
        assert_eq!(constraint.to_string(), "0 <= 1*x[0] + -1*x[2] <= 10");
        assert_eq!(Constraint::new_equality(&[], 0.).to_string(), "0 = 0");
    }
}
