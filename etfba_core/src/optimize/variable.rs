//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};

use derive_builder::Builder;

/// A decision variable of an optimization problem
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Variable {
    /// Unique identifier within the problem
    #[builder(setter(into))]
    pub id: String,
    /// Optional human-readable name
    #[builder(default = "None")]
    pub name: Option<String>,
    #[builder(default = "VariableType::Continuous")]
    pub variable_type: VariableType,
    #[builder(default = "f64::NEG_INFINITY")]
    pub lower_bound: f64,
    #[builder(default = "f64::INFINITY")]
    pub upper_bound: f64,
    /// Starting value suggested to solvers that accept one
    #[builder(default = "None")]
    pub initial_value: Option<f64>,
    /// Position of the variable in the problem, assigned when it is added
    #[builder(setter(skip))]
    pub(crate) index: usize,
}

impl VariableBuilder {
    fn validate(&self) -> Result<(), String> {
        let lb = self.lower_bound.unwrap_or(f64::NEG_INFINITY);
        let ub = self.upper_bound.unwrap_or(f64::INFINITY);
        if lb.is_nan() || ub.is_nan() || lb > ub {
            return Err(format!("invalid bounds [{lb}, {ub}]"));
        }
        Ok(())
    }
}

impl Variable {
    /// Position of the variable in its problem, used by expressions and constraint terms
    pub fn index(&self) -> usize {
        self.index
    }

    /// Point a solver should start from: the initial value if one was given, otherwise
    /// zero pulled inside the bounds
    pub fn starting_point(&self) -> f64 {
        self.initial_value
            .unwrap_or(0.)
            .max(self.lower_bound)
            .min(self.upper_bound)
    }

    /// Lower and upper bound are equal
    pub fn is_fixed(&self) -> bool {
        self.lower_bound == self.upper_bound
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", name, self.variable_type),
            None => write!(f, "{}:{}", self.id, self.variable_type),
        }
    }
}

/// Represents the type of variable in an optimization problem
///
/// # Notes:
/// Not all variable types are supported for all solvers, Clarabel only supports
/// Continuous variables
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl VariableType {
    pub fn is_integral(&self) -> bool {
        !matches!(self, VariableType::Continuous)
    }
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_variable() {
        let var = VariableBuilder::default()
            .id("v_pgi")
            .lower_bound(-10.)
            .upper_bound(10.)
            .build()
            .unwrap();
        assert_eq!(var.variable_type, VariableType::Continuous);
        assert_eq!(var.to_string(), "v_pgi:CONTINUOUS");
        assert_eq!(var.starting_point(), 0.);
    }

    #[test]
    fn starting_point_is_clamped() {
        let var = VariableBuilder::default()
            .id("lnc_atp")
            .lower_bound(0.001f64.ln())
            .upper_bound(10f64.ln())
            .build()
            .unwrap();
        assert_eq!(var.starting_point(), 0.);
        let var = VariableBuilder::default()
            .id("x")
            .lower_bound(1.)
            .upper_bound(2.)
            .initial_value(Some(5.))
            .build()
            .unwrap();
        assert_eq!(var.starting_point(), 2.);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(VariableBuilder::default()
            .id("x")
            .lower_bound(1.)
            .upper_bound(0.)
            .build()
            .is_err());
    }
}
