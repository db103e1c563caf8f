//! Implements a solver interface for microlp, a simplex solver with branch and bound
//! for integer variables
use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, info, warn};
use microlp::{ComparisonOp, OptimizationDirection};

use crate::configuration::SolverSettings;
use crate::optimize::constraint::ConstraintTerm;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::variable::VariableType;
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Adapter for microlp, handles linear problems with continuous, integer and binary
/// variables
#[derive(Debug, Default, Clone)]
pub struct MicrolpSolver {}

impl MicrolpSolver {
    pub fn new() -> Self {
        Self {}
    }
}

/// Sum the coefficients of repeated variables, microlp rejects repeats
fn merge_terms(terms: &[ConstraintTerm], vars: &[microlp::Variable]) -> Vec<(microlp::Variable, f64)> {
    let mut merged: IndexMap<usize, f64> = IndexMap::new();
    for term in terms {
        *merged.entry(term.variable).or_insert(0.) += term.coefficient;
    }
    merged
        .into_iter()
        .filter(|(_, coefficient)| *coefficient != 0.)
        .map(|(index, coefficient)| (vars[index], coefficient))
        .collect()
}

/// Settings microlp has no knob for
fn ignored_settings(settings: &SolverSettings) -> Vec<&'static str> {
    let mut ignored = vec!["max_iterations"];
    if settings.time_limit.is_some() {
        ignored.push("time_limit");
    }
    if settings.verbose {
        ignored.push("verbose");
    }
    ignored
}

impl Solver for MicrolpSolver {
    fn name(&self) -> &str {
        "microlp"
    }

    fn integer_variable_capable(&self) -> bool {
        true
    }

    fn nonlinear_capable(&self) -> bool {
        false
    }

    fn solve(
        &self,
        problem: &Problem,
        settings: &SolverSettings,
    ) -> Result<ProblemSolution, SolverError> {
        let problem_type = problem.problem_type();
        if !self.supports(problem_type) {
            return Err(SolverError::Unsupported {
                solver: self.name().to_string(),
                problem_type,
            });
        }
        debug!(
            "microlp runs to completion, ignoring {}",
            ignored_settings(settings).join(", ")
        );
        let (objective, _) = problem
            .objective()
            .linear_coefficients(problem.num_variables())
            .ok_or_else(|| SolverError::Setup("objective is not linear".to_string()))?;
        let direction = match problem.objective().sense() {
            ObjectiveSense::Maximize => OptimizationDirection::Maximize,
            ObjectiveSense::Minimize => OptimizationDirection::Minimize,
        };
        let mut lp = microlp::Problem::new(direction);

        let mut vars = Vec::with_capacity(problem.num_variables());
        for variable in problem.variables().values() {
            let coefficient = objective[variable.index()];
            let var = match variable.variable_type {
                VariableType::Continuous => {
                    lp.add_var(coefficient, (variable.lower_bound, variable.upper_bound))
                }
                VariableType::Binary => lp.add_binary_var(coefficient),
                VariableType::Integer => lp.add_integer_var(
                    coefficient,
                    (
                        integer_bound(variable.lower_bound),
                        integer_bound(variable.upper_bound),
                    ),
                ),
            };
            vars.push(var);
        }

        for (id, constraint) in problem.constraints() {
            let terms = constraint
                .linear_terms()
                .ok_or_else(|| SolverError::Setup(format!("constraint {id} is not linear")))?;
            let expression = merge_terms(terms, &vars);
            let (lb, ub) = constraint.bounds();
            if lb == ub {
                lp.add_constraint(expression.as_slice(), ComparisonOp::Eq, lb);
                continue;
            }
            if ub.is_finite() {
                lp.add_constraint(expression.as_slice(), ComparisonOp::Le, ub);
            }
            if lb.is_finite() {
                lp.add_constraint(expression.as_slice(), ComparisonOp::Ge, lb);
            }
        }
        debug!(
            "microlp problem with {} variables and {} constraints",
            problem.num_variables(),
            problem.num_constraints()
        );

        let started = Instant::now();
        let outcome = lp.solve();
        if let Some(limit) = settings.time_limit {
            if started.elapsed() > limit {
                warn!(
                    "microlp took {:?}, over the {:?} time limit it can't enforce",
                    started.elapsed(),
                    limit
                );
            }
        }
        match outcome {
            Ok(solution) => {
                info!("microlp found an optimal solution");
                let variable_values: IndexMap<String, f64> = problem
                    .variables()
                    .iter()
                    .map(|(id, var)| (id.clone(), solution[vars[var.index()]]))
                    .collect();
                let values: Vec<f64> = variable_values.values().copied().collect();
                Ok(ProblemSolution {
                    status: OptimizationStatus::Optimal,
                    objective_value: Some(problem.objective().evaluate(&values)),
                    variable_values: Some(variable_values),
                })
            }
            Err(microlp::Error::Infeasible) => {
                info!("microlp: problem is infeasible");
                Ok(ProblemSolution::without_values(OptimizationStatus::Infeasible))
            }
            Err(microlp::Error::Unbounded) => {
                info!("microlp: problem is unbounded");
                Ok(ProblemSolution::without_values(OptimizationStatus::Unbounded))
            }
            Err(err) => Err(SolverError::Internal(err.to_string())),
        }
    }
}

/// Integer bounds for microlp, infinite bounds saturate
fn integer_bound(bound: f64) -> i32 {
    if bound.is_nan() {
        0
    } else {
        bound.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }
}
