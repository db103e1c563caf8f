//! Explicit outcome of a solve, and the retry policy for nonlinear problems
use indexmap::IndexMap;
use log::{info, warn};

use crate::formulate::results::Results;
use crate::formulate::{FormulationError, Formulator};
use crate::metabolic_model::model::NetworkModel;
use crate::optimize::solvers::Solver;

/// What came of handing a problem to a solver
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Optimal(Results),
    /// No feasible point was found
    Infeasible,
    /// The solver failed, or the problem was unbounded
    SolverError(String),
}

impl SolveOutcome {
    /// Sort the result of [`Formulator::solve`] into an outcome
    ///
    /// Only errors raised by the solve become outcomes. Reference, configuration and
    /// data errors are returned as errors.
    pub fn from_solve(
        result: Result<Results, FormulationError>,
    ) -> Result<SolveOutcome, FormulationError> {
        match result {
            Ok(results) => Ok(SolveOutcome::Optimal(results)),
            Err(FormulationError::Infeasible) => Ok(SolveOutcome::Infeasible),
            Err(error) if error.is_solver_error() => Ok(SolveOutcome::SolverError(error.to_string())),
            Err(error) => Err(error),
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal(_))
    }

    pub fn results(&self) -> Option<&Results> {
        match self {
            SolveOutcome::Optimal(results) => Some(results),
            _ => None,
        }
    }

    pub fn into_results(self) -> Option<Results> {
        match self {
            SolveOutcome::Optimal(results) => Some(results),
            _ => None,
        }
    }

    /// The solved fluxes, or a zero flux for every reaction of `network`
    ///
    /// Batch drivers use this to keep going after a failed scenario.
    pub fn fluxes_or_zero(&self, network: &NetworkModel) -> IndexMap<String, f64> {
        match self {
            SolveOutcome::Optimal(results) => results.fluxes().clone(),
            _ => {
                let mut ids: Vec<&String> = network.reactions().keys().collect();
                ids.sort();
                ids.into_iter().map(|id| (id.clone(), 0.)).collect()
            }
        }
    }
}

/// Solve up to `max_attempts` times, stopping at the first optimal outcome
///
/// Only nonlinear problems are retried, each attempt starting from different default
/// concentrations. Linear and mixed integer linear solves are deterministic and run
/// once. The last outcome is returned when every attempt failed.
pub fn solve_with_retries<S: Solver + ?Sized>(
    formulator: &Formulator<'_>,
    solver: &S,
    max_attempts: usize,
) -> Result<SolveOutcome, FormulationError> {
    let attempts = if formulator.is_nonlinear() {
        max_attempts.max(1)
    } else {
        1
    };
    let mut outcome = SolveOutcome::from_solve(formulator.solve_attempt(solver, 0))?;
    for attempt in 1..attempts {
        match &outcome {
            SolveOutcome::Optimal(_) => break,
            SolveOutcome::Infeasible => {
                warn!("Attempt {attempt} of {attempts} was infeasible, retrying");
            }
            SolveOutcome::SolverError(reason) => {
                warn!("Attempt {attempt} of {attempts} failed ({reason}), retrying");
            }
        }
        outcome = SolveOutcome::from_solve(formulator.solve_attempt(solver, attempt))?;
    }
    if !outcome.is_optimal() {
        info!("Giving up after {attempts} attempt(s)");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use indexmap::IndexSet;

    use super::*;
    use crate::formulate::options::{FluxSourceMode, OptimizeOptionsBuilder};
    use crate::formulate::OptimizationKind;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use crate::optimize::problem::{Problem, ProblemType};
    use crate::optimize::solvers::SolverError;
    use crate::optimize::{OptimizationStatus, ProblemSolution};
    use crate::configuration::SolverSettings;

    /// Fails a fixed number of times, then returns the starting point as optimal
    #[derive(Debug)]
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Flaky {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Solver for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn integer_variable_capable(&self) -> bool {
            true
        }

        fn nonlinear_capable(&self) -> bool {
            true
        }

        fn solve(
            &self,
            problem: &Problem,
            _settings: &SolverSettings,
        ) -> Result<ProblemSolution, SolverError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Ok(ProblemSolution::without_values(OptimizationStatus::Infeasible));
            }
            let point = problem.starting_point();
            Ok(ProblemSolution {
                status: OptimizationStatus::Optimal,
                objective_value: Some(problem.objective().evaluate(&point)),
                variable_values: Some(
                    problem
                        .variables()
                        .keys()
                        .cloned()
                        .zip(point)
                        .collect(),
                ),
            })
        }
    }

    fn network() -> NetworkModel {
        let mut network = NetworkModel::new_empty();
        network.add_reaction(
            ReactionBuilder::default()
                .id("r1")
                .substrate("a", 1.)
                .product("b", 1.)
                .standard_gibbs_energy(Some(-10.))
                .build()
                .unwrap(),
        );
        network
    }

    fn etfba(network: &NetworkModel) -> Formulator<'_> {
        let options = OptimizeOptionsBuilder::default()
            .included_for_enzyme_cost(IndexSet::from(["r1".to_string()]))
            .flux_source_mode(FluxSourceMode::Preset(IndexMap::from([(
                "r1".to_string(),
                5.,
            )])))
            .build()
            .unwrap();
        network.optimize(OptimizationKind::Etfba, options).unwrap()
    }

    #[test]
    fn solver_errors_become_outcomes() {
        assert_eq!(
            SolveOutcome::from_solve(Err(FormulationError::Infeasible)),
            Ok(SolveOutcome::Infeasible)
        );
        assert!(matches!(
            SolveOutcome::from_solve(Err(FormulationError::Unbounded)),
            Ok(SolveOutcome::SolverError(_))
        ));
        assert!(matches!(
            SolveOutcome::from_solve(Err(FormulationError::Solver(
                SolverError::NoCapableSolver(ProblemType::NonlinearMixedInteger)
            ))),
            Ok(SolveOutcome::SolverError(_))
        ));
        assert!(SolveOutcome::from_solve(Err(FormulationError::Configuration(
            "bad".to_string()
        )))
        .is_err());
    }

    #[test]
    fn zero_fluxes_after_failure() {
        let network = network();
        let fluxes = SolveOutcome::Infeasible.fluxes_or_zero(&network);
        assert_eq!(fluxes, IndexMap::from([("r1".to_string(), 0.)]));
    }

    #[test]
    fn retries_until_optimal() {
        let network = network();
        let formulator = etfba(&network);
        let solver = Flaky::new(2);
        let outcome = solve_with_retries(&formulator, &solver, 3).unwrap();
        assert!(outcome.is_optimal());
        assert_eq!(solver.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.fluxes_or_zero(&network)["r1"], 5.);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let network = network();
        let formulator = etfba(&network);
        let solver = Flaky::new(10);
        let outcome = solve_with_retries(&formulator, &solver, 3).unwrap();
        assert_eq!(outcome, SolveOutcome::Infeasible);
        assert_eq!(solver.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn linear_problems_run_once() {
        let network = network();
        let options = OptimizeOptionsBuilder::default()
            .objective(IndexMap::from([("r1".to_string(), 1.)]))
            .build()
            .unwrap();
        let formulator = network.optimize(OptimizationKind::Fba, options).unwrap();
        let solver = Flaky::new(10);
        let outcome = solve_with_retries(&formulator, &solver, 5).unwrap();
        assert_eq!(outcome, SolveOutcome::Infeasible);
        assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
    }
}
