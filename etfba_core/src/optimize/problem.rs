//! Provides struct representing an optimization problem
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use thiserror::Error;

use crate::optimize::constraint::Constraint;
use crate::optimize::expression::Expr;
use crate::optimize::objective::{Objective, ObjectiveSense, ObjectiveTerm};
use crate::optimize::variable::{Variable, VariableBuilder, VariableType};

/// An optimization problem
///
/// Variables are owned by the problem and referenced everywhere else by their index,
/// which is their insertion position.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    /// Objective to optimize
    objective: Objective,
    /// Variables of the optimization problem
    variables: IndexMap<String, Variable>,
    /// Constraints of the optimization problem
    constraints: IndexMap<String, Constraint>,
}

impl Problem {
    // region Creation Functions
    /// Create a new optimization problem
    pub fn new(objective_sense: ObjectiveSense) -> Self {
        Self {
            objective: Objective::new(objective_sense),
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
        }
    }

    /// Create a new maximization problem
    pub fn new_maximization() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new minimization problem
    pub fn new_minimization() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }
    // endregion Creation Functions

    // region Update Objective
    /// Update the objective sense of the problem
    pub fn update_objective_sense(&mut self, sense: ObjectiveSense) {
        self.objective.set_sense(sense);
    }

    /// Replace the objective with a single expression
    pub fn set_objective(&mut self, expression: Expr, sense: ObjectiveSense) -> Result<(), ProblemError> {
        self.validate_indices(&expression.variables().into_iter().collect::<Vec<_>>())
            .map_err(|_| ProblemError::NonExistentVariablesInObjective)?;
        self.objective.remove_all_terms();
        self.objective.set_sense(sense);
        self.objective.add_expression(expression);
        Ok(())
    }
    // endregion Update Objective

    // region Adding Variables
    /// Add a variable to the optimization problem, returning its index
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<usize, ProblemError> {
        self.validate_variable(&variable)?;
        let index = self.variables.len();
        variable.index = index;
        self.variables.insert(variable.id.clone(), variable);
        Ok(index)
    }

    /// Create a new variable and add it to the optimization problem, returning its index
    pub fn add_new_variable(
        &mut self,
        id: &str,
        name: Option<&str>,
        variable_type: VariableType,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<usize, ProblemError> {
        let (lower_bound, upper_bound) = match variable_type {
            VariableType::Binary => (0., 1.),
            _ => (lower_bound, upper_bound),
        };
        let variable = VariableBuilder::default()
            .id(id)
            .name(name.map(str::to_string))
            .variable_type(variable_type)
            .lower_bound(lower_bound)
            .upper_bound(upper_bound)
            .build()
            .map_err(|_| ProblemError::InvalidVariableBounds(id.to_string()))?;
        self.add_variable(variable)
    }
    // endregion Adding Variables

    // region Adding Constraints
    /// Add a constraint to the problem
    pub fn add_constraint(&mut self, id: &str, constraint: Constraint) -> Result<(), ProblemError> {
        self.validate_constraint(id, &constraint)?;
        self.constraints.insert(id.to_string(), constraint);
        Ok(())
    }

    /// Create a new equality constraint and add it to the model
    pub fn add_new_equality_constraint(
        &mut self,
        id: &str,
        terms: &[(usize, f64)],
        equals: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(id, Constraint::new_equality(terms, equals))
    }

    /// Create a new inequality constraint and add it to the model
    pub fn add_new_inequality_constraint(
        &mut self,
        id: &str,
        terms: &[(usize, f64)],
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(id, Constraint::new_inequality(terms, lower_bound, upper_bound))
    }

    /// Create a constraint bounding an expression and add it to the model
    ///
    /// Linear expressions are stored as linear constraints, so linear solvers can still
    /// handle the problem.
    pub fn add_new_expression_constraint(
        &mut self,
        id: &str,
        expression: Expr,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        self.add_constraint(id, Constraint::new_expression(expression, lower_bound, upper_bound))
    }
    // endregion Adding Constraints

    // region Adding Objective Terms
    /// Add a new term to the objective
    pub fn add_objective_term(&mut self, objective_term: ObjectiveTerm) -> Result<(), ProblemError> {
        let indices: Vec<usize> = match &objective_term {
            ObjectiveTerm::Linear { var, .. } => vec![*var],
            ObjectiveTerm::Nonlinear(expression) => expression.variables().into_iter().collect(),
        };
        self.validate_indices(&indices)
            .map_err(|_| ProblemError::NonExistentVariablesInObjective)?;
        self.objective.add_term(objective_term);
        Ok(())
    }

    /// Add a new linear term to the objective using the variable id
    pub fn add_new_linear_objective_term_by_id(
        &mut self,
        variable_id: &str,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        let var = self
            .variable_index(variable_id)
            .ok_or(ProblemError::NonExistentVariablesInObjective)?;
        self.add_objective_term(ObjectiveTerm::Linear {
            var,
            coef: coefficient,
        })
    }
    // endregion Adding Objective Terms

    // region Update Variable Bounds
    /// Update the bounds of a variable
    pub fn update_variable_bounds(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound.is_nan() || upper_bound.is_nan() || lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds(id.to_string()));
        }
        let var = self
            .variables
            .get_mut(id)
            .ok_or_else(|| ProblemError::NonExistentVariable(id.to_string()))?;
        var.lower_bound = lower_bound;
        var.upper_bound = upper_bound;
        Ok(())
    }

    /// Set the starting point suggested for a variable
    pub fn set_initial_value(&mut self, id: &str, value: f64) -> Result<(), ProblemError> {
        let var = self
            .variables
            .get_mut(id)
            .ok_or_else(|| ProblemError::NonExistentVariable(id.to_string()))?;
        var.initial_value = Some(value);
        Ok(())
    }
    // endregion Update Variable Bounds

    /// Remove a constraint (by id) from the model
    pub fn remove_constraint(&mut self, constraint_id: &str) -> Option<Constraint> {
        self.constraints.shift_remove(constraint_id)
    }

    // region Accessors
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn variables(&self) -> &IndexMap<String, Variable> {
        &self.variables
    }

    pub fn constraints(&self) -> &IndexMap<String, Constraint> {
        &self.constraints
    }

    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub fn variable_index(&self, id: &str) -> Option<usize> {
        self.variables.get_index_of(id)
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Suggested starting point for every variable, in index order
    pub fn starting_point(&self) -> Vec<f64> {
        self.variables.values().map(Variable::starting_point).collect()
    }

    /// Variable values keyed by id turned into a dense vector in index order
    ///
    /// Missing variables are NaN.
    pub fn values_in_order(&self, values: &IndexMap<String, f64>) -> Vec<f64> {
        self.variables
            .keys()
            .map(|id| values.get(id).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Largest bound or constraint violation at `values`
    pub fn max_violation(&self, values: &[f64]) -> f64 {
        let bound_violation = self.variables.values().map(|var| {
            let value = values.get(var.index).copied().unwrap_or(f64::NAN);
            if value.is_nan() {
                f64::INFINITY
            } else {
                (var.lower_bound - value).max(value - var.upper_bound).max(0.)
            }
        });
        let constraint_violation = self.constraints.values().map(|c| c.violation(values));
        bound_violation
            .chain(constraint_violation)
            .fold(0., f64::max)
    }
    // endregion Accessors

    // region Check Problem
    pub fn has_integer_variables(&self) -> bool {
        self.variables
            .values()
            .any(|var| var.variable_type.is_integral())
    }

    pub fn has_nonlinear_parts(&self) -> bool {
        self.objective.contains_nonlinear() || self.constraints.values().any(|c| !c.is_linear())
    }

    /// Classify the problem by the most demanding feature it uses
    pub fn problem_type(&self) -> ProblemType {
        match (self.has_nonlinear_parts(), self.has_integer_variables()) {
            (false, false) => ProblemType::LinearContinuous,
            (false, true) => ProblemType::LinearMixedInteger,
            (true, false) => ProblemType::NonlinearContinuous,
            (true, true) => ProblemType::NonlinearMixedInteger,
        }
    }
    // endregion Check Problem

    // region Validation Functions
    /// Check that a variable to be added is valid to add to this problem
    fn validate_variable(&self, variable: &Variable) -> Result<(), ProblemError> {
        if self.variables.contains_key(&variable.id) {
            return Err(ProblemError::VariableIdAlreadyExists(variable.id.clone()));
        }
        let (lb, ub) = (variable.lower_bound, variable.upper_bound);
        if lb.is_nan() || ub.is_nan() || lb > ub {
            return Err(ProblemError::InvalidVariableBounds(variable.id.clone()));
        }
        Ok(())
    }

    /// Check that a constraint to be added is valid to add to this Problem
    fn validate_constraint(&self, id: &str, constraint: &Constraint) -> Result<(), ProblemError> {
        if self.constraints.contains_key(id) {
            return Err(ProblemError::ConstraintAlreadyExists(id.to_string()));
        }
        let (lb, ub) = constraint.bounds();
        if lb.is_nan() || ub.is_nan() || lb > ub {
            return Err(ProblemError::InvalidConstraintBounds(id.to_string()));
        }
        self.validate_indices(&constraint.variables().into_iter().collect::<Vec<_>>())
            .map_err(|_| ProblemError::NonExistentVariablesInConstraint(id.to_string()))
    }

    fn validate_indices(&self, indices: &[usize]) -> Result<(), ()> {
        if indices.iter().all(|i| *i < self.variables.len()) {
            Ok(())
        } else {
            Err(())
        }
    }
    // endregion Validation Functions
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.objective)?;
        writeln!(f, "subject to")?;
        for (id, constraint) in &self.constraints {
            writeln!(f, "  {id}: {constraint}")?;
        }
        writeln!(f, "bounds")?;
        for var in self.variables.values() {
            writeln!(
                f,
                "  x[{}] {} in [{}, {}]",
                var.index, var, var.lower_bound, var.upper_bound
            )?;
        }
        Ok(())
    }
}

/// Types of optimization problems
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProblemType {
    /// Problem with linear objectives and constraints, and continuous variables
    LinearContinuous,
    /// Problem with linear objective and constraints, with integer and continuous variables
    LinearMixedInteger,
    /// Problem with a nonlinear objective or constraints, and continuous variables
    NonlinearContinuous,
    /// Problem with a nonlinear objective or constraints, and some integer variables
    NonlinearMixedInteger,
}

impl ProblemType {
    pub fn is_nonlinear(&self) -> bool {
        matches!(
            self,
            ProblemType::NonlinearContinuous | ProblemType::NonlinearMixedInteger
        )
    }

    pub fn is_mixed_integer(&self) -> bool {
        matches!(
            self,
            ProblemType::LinearMixedInteger | ProblemType::NonlinearMixedInteger
        )
    }
}

impl Display for ProblemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemType::LinearContinuous => write!(f, "LP"),
            ProblemType::LinearMixedInteger => write!(f, "MILP"),
            ProblemType::NonlinearContinuous => write!(f, "NLP"),
            ProblemType::NonlinearMixedInteger => write!(f, "MINLP"),
        }
    }
}

/// Errors associated with the Problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// Error when trying to add a variable with the same id as an existing variable
    #[error("Tried to add variable {0} which already exists")]
    VariableIdAlreadyExists(String),
    /// Error when trying to add variable with invalid bounds
    #[error("Tried to give variable {0} a lower_bound > upper_bound")]
    InvalidVariableBounds(String),
    /// Error when trying to add a constraint with the same id as an existing constraint
    #[error("Tried to add constraint {0} which already exists")]
    ConstraintAlreadyExists(String),
    /// Error when trying to add a constraint with invalid bounds
    #[error("Tried to add constraint {0} with lower_bound > upper_bound")]
    InvalidConstraintBounds(String),
    /// Error when trying to add a constraint that contains variables not in the model
    #[error("Tried to add constraint {0} with variables not in the model")]
    NonExistentVariablesInConstraint(String),
    /// Error when trying to add an objective term which includes variables not in the model
    #[error("Tried adding an objective term with variables not in the model")]
    NonExistentVariablesInObjective,
    /// Error when trying to perform an update on a variable that doesn't exist
    #[error("Tried to access variable {0} which doesn't exist")]
    NonExistentVariable(String),
}
