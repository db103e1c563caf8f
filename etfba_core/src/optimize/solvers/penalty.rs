//! Augmented Lagrangian adapter for continuous nonlinear problems
//!
//! Constraints are folded into the objective as squared violations shifted by a
//! multiplier per row, variable bounds as plain squared violations, and the
//! resulting unconstrained problem is minimized with argmin's L-BFGS. After every
//! round the multipliers move by weight times the shifted violation, and the weight
//! only grows when the violation stopped shrinking. Gradients come from the symbolic
//! derivatives of the expressions.
//!
//! The answer is a local optimum: problems with several basins (enzyme costs near
//! equilibrium are one) may need a different starting point.
use std::sync::Arc;
use std::time::Instant;

use argmin::core::{CostFunction, Error as ArgminError, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use indexmap::IndexMap;
use log::{debug, info, warn};
use ndarray::Array1;

use crate::configuration::SolverSettings;
use crate::optimize::constraint::{Constraint, ConstraintTerm};
use crate::optimize::expression::Expr;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Adapter minimizing an augmented Lagrangian with L-BFGS, handles continuous problems
#[derive(Debug, Clone)]
pub struct PenaltySolver {
    /// Penalty weight of the first round
    pub initial_weight: f64,
    /// Factor applied to the weight after a round that didn't reduce the violation
    /// enough
    pub weight_growth: f64,
    /// The weight never grows past this
    pub max_weight: f64,
    /// A round makes progress when it brings the violation below this fraction of
    /// the previous one
    pub progress_ratio: f64,
    /// Number of rounds before giving up
    pub max_rounds: usize,
    /// Largest violation accepted as feasible
    pub feasibility_tolerance: f64,
    /// Number of past iterations L-BFGS keeps
    pub history: usize,
}

impl Default for PenaltySolver {
    fn default() -> Self {
        PenaltySolver {
            initial_weight: 10.,
            weight_growth: 10.,
            max_weight: 1e12,
            progress_ratio: 0.25,
            max_rounds: 50,
            feasibility_tolerance: 1e-5,
            history: 7,
        }
    }
}

impl PenaltySolver {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Body of a penalized row and its gradient
#[derive(Debug)]
enum RowBody {
    Linear(Vec<ConstraintTerm>),
    Nonlinear { expression: Expr, gradient: Vec<(usize, Expr)> },
}

#[derive(Debug)]
struct PenaltyRow {
    body: RowBody,
    lower_bound: f64,
    upper_bound: f64,
}

impl PenaltyRow {
    fn value(&self, x: &[f64]) -> f64 {
        match &self.body {
            RowBody::Linear(terms) => terms.iter().map(|t| t.coefficient * x[t.variable]).sum(),
            RowBody::Nonlinear { expression, .. } => expression.evaluate(x),
        }
    }

    /// Signed distance of `value` to the bounds, negative below the lower bound
    fn excess(&self, value: f64) -> f64 {
        if value < self.lower_bound {
            value - self.lower_bound
        } else if value > self.upper_bound {
            value - self.upper_bound
        } else {
            0.
        }
    }

    fn violation(&self, x: &[f64]) -> f64 {
        self.excess(self.value(x))
    }

    /// Excess of the body shifted by `multiplier / weight`
    fn shifted_excess(&self, x: &[f64], multiplier: f64, weight: f64) -> f64 {
        self.excess(self.value(x) + multiplier / weight)
    }

    /// Add `scale` times the gradient of the body to `gradient`
    fn accumulate_gradient(&self, x: &[f64], scale: f64, gradient: &mut [f64]) {
        match &self.body {
            RowBody::Linear(terms) => {
                for t in terms {
                    gradient[t.variable] += scale * t.coefficient;
                }
            }
            RowBody::Nonlinear { gradient: partials, .. } => {
                for (var, partial) in partials {
                    gradient[*var] += scale * partial.evaluate(x);
                }
            }
        }
    }
}

/// The problem prepared for repeated evaluation
#[derive(Debug)]
struct CompiledProblem {
    /// 1 to minimize, -1 to maximize
    sense: f64,
    objective: Expr,
    objective_gradient: Vec<(usize, Expr)>,
    rows: Vec<PenaltyRow>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
}

fn symbolic_gradient(expression: &Expr) -> Vec<(usize, Expr)> {
    expression
        .variables()
        .into_iter()
        .map(|var| (var, expression.derivative(var)))
        .collect()
}

impl CompiledProblem {
    fn new(problem: &Problem) -> Self {
        let objective = problem.objective().to_expression();
        let rows = problem
            .constraints()
            .values()
            .map(|constraint| {
                let (lower_bound, upper_bound) = constraint.bounds();
                let body = match constraint {
                    Constraint::Nonlinear { expression, .. } => RowBody::Nonlinear {
                        gradient: symbolic_gradient(expression),
                        expression: expression.clone(),
                    },
                    Constraint::Equality { terms, .. } | Constraint::Inequality { terms, .. } => {
                        RowBody::Linear(terms.clone())
                    }
                };
                PenaltyRow {
                    body,
                    lower_bound,
                    upper_bound,
                }
            })
            .collect();
        CompiledProblem {
            sense: match problem.objective().sense() {
                ObjectiveSense::Minimize => 1.,
                ObjectiveSense::Maximize => -1.,
            },
            objective_gradient: symbolic_gradient(&objective),
            objective,
            rows,
            lower_bounds: problem.variables().values().map(|v| v.lower_bound).collect(),
            upper_bounds: problem.variables().values().map(|v| v.upper_bound).collect(),
        }
    }

    /// The point pulled inside the variable bounds
    fn project(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower_bounds.iter().zip(&self.upper_bounds))
            .map(|(value, (lb, ub))| value.max(*lb).min(*ub))
            .collect()
    }

    /// Largest row violation at `inside`, a point within the variable bounds
    fn max_violation(&self, inside: &[f64]) -> f64 {
        self.rows
            .iter()
            .map(|row| row.violation(inside).abs())
            .fold(0., f64::max)
    }

    /// Multipliers for the next round, from those of the round that ended at `inside`
    fn updated_multipliers(&self, inside: &[f64], multipliers: &[f64], weight: f64) -> Vec<f64> {
        self.rows
            .iter()
            .zip(multipliers)
            .map(|(row, multiplier)| weight * row.shifted_excess(inside, *multiplier, weight))
            .collect()
    }
}

/// Augmented Lagrangian of one round
#[derive(Clone)]
struct PenalizedObjective {
    problem: Arc<CompiledProblem>,
    multipliers: Arc<Vec<f64>>,
    weight: f64,
}

impl CostFunction for PenalizedObjective {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let x = param.to_vec();
        let inside = self.problem.project(&x);
        let objective = self.problem.sense * self.problem.objective.evaluate(&inside);
        let outside: f64 = x
            .iter()
            .zip(&inside)
            .map(|(value, projected)| (value - projected).powi(2))
            .sum();
        let rows: f64 = self
            .problem
            .rows
            .iter()
            .zip(self.multipliers.iter())
            .map(|(row, multiplier)| row.shifted_excess(&inside, *multiplier, self.weight).powi(2))
            .sum();
        let cost = objective + 0.5 * self.weight * (outside + rows);
        if cost.is_finite() {
            Ok(cost)
        } else {
            Err(ArgminError::msg("penalized objective is not finite"))
        }
    }
}

impl Gradient for PenalizedObjective {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        let x = param.to_vec();
        let inside = self.problem.project(&x);
        let mut gradient = vec![0.; x.len()];
        for (var, partial) in &self.problem.objective_gradient {
            gradient[*var] += self.problem.sense * partial.evaluate(&inside);
        }
        for (row, multiplier) in self.problem.rows.iter().zip(self.multipliers.iter()) {
            let excess = row.shifted_excess(&inside, *multiplier, self.weight);
            if excess != 0. {
                row.accumulate_gradient(&inside, self.weight * excess, &mut gradient);
            }
        }
        // Outside the bounds only the distance back to them counts
        for (i, (value, projected)) in x.iter().zip(&inside).enumerate() {
            if value != projected {
                gradient[i] = self.weight * (value - projected);
            }
        }
        if gradient.iter().all(|g| g.is_finite()) {
            Ok(Array1::from(gradient))
        } else {
            Err(ArgminError::msg("penalized gradient is not finite"))
        }
    }
}

impl Solver for PenaltySolver {
    fn name(&self) -> &str {
        "penalty-lbfgs"
    }

    fn integer_variable_capable(&self) -> bool {
        false
    }

    fn nonlinear_capable(&self) -> bool {
        true
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
        let compiled = Arc::new(CompiledProblem::new(problem));
        let started = Instant::now();
        let mut x = problem.starting_point();
        let mut multipliers = vec![0.; compiled.rows.len()];
        let mut weight = self.initial_weight;
        let mut previous_violation = f64::INFINITY;
        let mut failed_rounds = 0;
        let mut rounds = 0;

        while rounds < self.max_rounds {
            rounds += 1;
            if let Some(limit) = settings.time_limit {
                if started.elapsed() > limit {
                    warn!("Penalty solver hit the time limit after {rounds} rounds");
                    return Ok(ProblemSolution::without_values(
                        OptimizationStatus::SolverHalted,
                    ));
                }
            }
            let cost = PenalizedObjective {
                problem: Arc::clone(&compiled),
                multipliers: Arc::new(multipliers.clone()),
                weight,
            };
            let linesearch = MoreThuenteLineSearch::new();
            let solver = LBFGS::new(linesearch, self.history);
            let start = Array1::from(x.clone());
            let result = Executor::new(cost, solver)
                .configure(|state| state.param(start).max_iters(settings.max_iterations as u64))
                .run();
            match result {
                Ok(result) => {
                    if let Some(best) = result.state.get_best_param() {
                        x = best.to_vec();
                    }
                }
                Err(err) => {
                    warn!("Penalty solver round {rounds} failed: {err}");
                    failed_rounds += 1;
                    if weight >= self.max_weight {
                        break;
                    }
                    weight = (weight * self.weight_growth).min(self.max_weight);
                    continue;
                }
            }

            let inside = compiled.project(&x);
            let violation = compiled.max_violation(&inside);
            debug!("Penalty round {rounds}: weight {weight:e}, max violation {violation:e}");
            if violation <= self.feasibility_tolerance {
                info!("Penalty solver converged after {rounds} rounds");
                let variable_values: IndexMap<String, f64> = problem
                    .variables()
                    .iter()
                    .map(|(id, var)| (id.clone(), inside[var.index()]))
                    .collect();
                return Ok(ProblemSolution {
                    status: OptimizationStatus::Optimal,
                    objective_value: Some(problem.objective().evaluate(&inside)),
                    variable_values: Some(variable_values),
                });
            }
            multipliers = compiled.updated_multipliers(&inside, &multipliers, weight);
            if violation > self.progress_ratio * previous_violation {
                if weight >= self.max_weight {
                    debug!("Penalty solver stalled at the largest weight");
                    break;
                }
                weight = (weight * self.weight_growth).min(self.max_weight);
            }
            previous_violation = violation;
        }
        if failed_rounds == rounds {
            return Ok(ProblemSolution::without_values(
                OptimizationStatus::NumericalError,
            ));
        }
        info!("Penalty solver found no feasible point");
        Ok(ProblemSolution::without_values(OptimizationStatus::Infeasible))
    }
}
