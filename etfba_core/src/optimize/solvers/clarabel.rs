//! Implements a solver interface for Clarabel
//!
//! Clarabel solves conic programs of the form
//! minimize q'x subject to Ax + s = b, s in K. Linear problems are mapped onto a
//! zero cone (equalities and fixed variables) followed by a nonnegative cone
//! (inequalities and variable bounds).
use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use indexmap::IndexMap;
use log::{debug, info};
use nalgebra_sparse::{CooMatrix, CscMatrix as NalgebraCsc};

use crate::configuration::SolverSettings;
use crate::optimize::constraint::ConstraintTerm;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Adapter for the Clarabel interior point solver, handles continuous linear problems
#[derive(Debug, Default, Clone)]
pub struct ClarabelSolver {}

impl ClarabelSolver {
    pub fn new() -> Self {
        Self {}
    }
}

/// Rows of the constraint matrix, split by the cone they belong to
#[derive(Default)]
struct ConicRows {
    equalities: Vec<(Vec<ConstraintTerm>, f64)>,
    inequalities: Vec<(Vec<ConstraintTerm>, f64)>,
}

impl ConicRows {
    /// a'x = rhs
    fn push_equality(&mut self, terms: &[ConstraintTerm], rhs: f64) {
        self.equalities.push((terms.to_vec(), rhs));
    }

    /// lb <= a'x <= ub, infinite sides are dropped
    fn push_range(&mut self, terms: &[ConstraintTerm], lb: f64, ub: f64) {
        if lb == ub {
            self.push_equality(terms, lb);
            return;
        }
        if ub.is_finite() {
            self.inequalities.push((terms.to_vec(), ub));
        }
        if lb.is_finite() {
            let negated = terms
                .iter()
                .map(|t| ConstraintTerm {
                    variable: t.variable,
                    coefficient: -t.coefficient,
                })
                .collect();
            self.inequalities.push((negated, -lb));
        }
    }

    fn num_rows(&self) -> usize {
        self.equalities.len() + self.inequalities.len()
    }

    /// Constraint matrix in Clarabel's compressed column format, and the right hand side
    fn assemble(self, num_variables: usize) -> (CscMatrix<f64>, Vec<f64>) {
        let num_rows = self.num_rows();
        let mut coo = CooMatrix::new(num_rows, num_variables);
        let mut b = Vec::with_capacity(num_rows);
        for (row, (terms, rhs)) in self
            .equalities
            .into_iter()
            .chain(self.inequalities)
            .enumerate()
        {
            for term in terms {
                coo.push(row, term.variable, term.coefficient);
            }
            b.push(rhs);
        }
        let (col_offsets, row_indices, values) = NalgebraCsc::from(&coo).disassemble();
        (
            CscMatrix::new(num_rows, num_variables, col_offsets, row_indices, values),
            b,
        )
    }
}

impl Solver for ClarabelSolver {
    fn name(&self) -> &str {
        "clarabel"
    }

    fn integer_variable_capable(&self) -> bool {
        false
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
        let n = problem.num_variables();
        let (mut q, _) = problem
            .objective()
            .linear_coefficients(n)
            .ok_or_else(|| SolverError::Setup("objective is not linear".to_string()))?;
        if problem.objective().sense() == ObjectiveSense::Maximize {
            q.iter_mut().for_each(|c| *c = -*c);
        }

        let mut rows = ConicRows::default();
        for (id, constraint) in problem.constraints() {
            let terms = constraint
                .linear_terms()
                .ok_or_else(|| SolverError::Setup(format!("constraint {id} is not linear")))?;
            let (lb, ub) = constraint.bounds();
            rows.push_range(terms, lb, ub);
        }
        for variable in problem.variables().values() {
            let unit = [ConstraintTerm {
                variable: variable.index(),
                coefficient: 1.,
            }];
            rows.push_range(&unit, variable.lower_bound, variable.upper_bound);
        }
        let num_equalities = rows.equalities.len();
        let num_inequalities = rows.inequalities.len();
        let (a, b) = rows.assemble(n);
        let cones = [
            SupportedConeT::ZeroConeT(num_equalities),
            SupportedConeT::NonnegativeConeT(num_inequalities),
        ];
        let p = CscMatrix::new(n, n, vec![0; n + 1], vec![], vec![]);
        debug!(
            "Clarabel problem with {} variables, {} equality and {} inequality rows",
            n, num_equalities, num_inequalities
        );

        let clarabel_settings = DefaultSettingsBuilder::default()
            .verbose(settings.verbose)
            .max_iter(settings.max_iterations)
            .time_limit(
                settings
                    .time_limit
                    .map(|limit| limit.as_secs_f64())
                    .unwrap_or(f64::INFINITY),
            )
            .build()
            .map_err(|err| SolverError::Setup(err.to_string()))?;
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, clarabel_settings);
        solver.solve();

        let status = match solver.solution.status {
            SolverStatus::Solved => OptimizationStatus::Optimal,
            SolverStatus::AlmostSolved => OptimizationStatus::AlmostOptimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                OptimizationStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                OptimizationStatus::Unbounded
            }
            SolverStatus::NumericalError => OptimizationStatus::NumericalError,
            SolverStatus::Unsolved => OptimizationStatus::Unoptimized,
            _ => OptimizationStatus::SolverHalted,
        };
        info!("Clarabel finished with status {:?}", solver.solution.status);
        if !status.is_successful() {
            return Ok(ProblemSolution::without_values(status));
        }
        let x = &solver.solution.x;
        let variable_values: IndexMap<String, f64> = problem
            .variables()
            .iter()
            .map(|(id, var)| (id.clone(), x[var.index()]))
            .collect();
        Ok(ProblemSolution {
            status,
            objective_value: Some(problem.objective().evaluate(x)),
            variable_values: Some(variable_values),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::optimize::variable::VariableType;

    #[test]
    fn small_lp() {
        // max x + y, x + 2y <= 4, x - y = 1, 0 <= x, y <= 10
        let mut problem = Problem::new_maximization();
        let x = problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 10.)
            .unwrap();
        let y = problem
            .add_new_variable("y", None, VariableType::Continuous, 0., 10.)
            .unwrap();
        problem.add_new_linear_objective_term_by_id("x", 1.).unwrap();
        problem.add_new_linear_objective_term_by_id("y", 1.).unwrap();
        problem
            .add_new_inequality_constraint("cap", &[(x, 1.), (y, 2.)], f64::NEG_INFINITY, 4.)
            .unwrap();
        problem
            .add_new_equality_constraint("link", &[(x, 1.), (y, -1.)], 1.)
            .unwrap();
        let solution = ClarabelSolver::new()
            .solve(&problem, &SolverSettings::default())
            .unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        let values = solution.variable_values.unwrap();
        assert_abs_diff_eq!(values["x"], 2., epsilon = 1e-5);
        assert_abs_diff_eq!(values["y"], 1., epsilon = 1e-5);
        assert_abs_diff_eq!(solution.objective_value.unwrap(), 3., epsilon = 1e-5);
    }

    #[test]
    fn infeasible_lp() {
        let mut problem = Problem::new_minimization();
        let x = problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem.add_new_linear_objective_term_by_id("x", 1.).unwrap();
        problem
            .add_new_inequality_constraint("high", &[(x, 1.)], 2., f64::INFINITY)
            .unwrap();
        let solution = ClarabelSolver::new()
            .solve(&problem, &SolverSettings::default())
            .unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.variable_values.is_none());
    }

    #[test]
    fn rejects_integer_problems() {
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("b", None, VariableType::Binary, 0., 1.)
            .unwrap();
        assert!(matches!(
            ClarabelSolver::new().solve(&problem, &SolverSettings::default()),
            Err(SolverError::Unsupported { .. })
        ));
    }
}
