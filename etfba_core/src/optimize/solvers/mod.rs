//! Solver interface, and adapters onto the solver engines the crate ships with
//!
//! Each adapter translates a [`Problem`] into the engine's own representation,
//! runs it, and translates the answer back into a [`ProblemSolution`]. A
//! [`SolverChain`] dispatches a problem to the first adapter able to handle it.
use log::debug;
use thiserror::Error;

use crate::configuration::SolverSettings;
use crate::optimize::problem::{Problem, ProblemType};
use crate::optimize::ProblemSolution;

pub mod clarabel;
#[cfg(feature = "microlp")]
pub mod microlp;
pub mod penalty;

/// Something able to solve (some) optimization problems
pub trait Solver {
    /// Name used in log messages
    fn name(&self) -> &str;

    /// Can the solver handle integer and binary variables
    fn integer_variable_capable(&self) -> bool;

    /// Can the solver handle nonlinear objectives and constraints
    fn nonlinear_capable(&self) -> bool;

    /// Can the solver handle problems of type `problem_type`
    fn supports(&self, problem_type: ProblemType) -> bool {
        (self.integer_variable_capable() || !problem_type.is_mixed_integer())
            && (self.nonlinear_capable() || !problem_type.is_nonlinear())
    }

    /// Solve the problem
    ///
    /// Infeasibility and unboundedness are reported through the status of the returned
    /// solution, errors are reserved for problems the solver could not even attempt.
    fn solve(
        &self,
        problem: &Problem,
        settings: &SolverSettings,
    ) -> Result<ProblemSolution, SolverError>;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn integer_variable_capable(&self) -> bool {
        (**self).integer_variable_capable()
    }

    fn nonlinear_capable(&self) -> bool {
        (**self).nonlinear_capable()
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        (**self).supports(problem_type)
    }

    fn solve(
        &self,
        problem: &Problem,
        settings: &SolverSettings,
    ) -> Result<ProblemSolution, SolverError> {
        (**self).solve(problem, settings)
    }
}

/// Ordered list of solvers, problems are handed to the first one supporting them
#[derive(Default)]
pub struct SolverChain {
    solvers: Vec<Box<dyn Solver + Send + Sync>>,
}

impl SolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a solver to the end of the chain
    pub fn with_solver<S: Solver + Send + Sync + 'static>(mut self, solver: S) -> Self {
        self.solvers.push(Box::new(solver));
        self
    }

    /// Chain of the solvers compiled into the crate
    ///
    /// Linear problems go to microlp when it is enabled, else to clarabel. Nonlinear
    /// continuous problems go to the penalty solver.
    pub fn default_chain() -> Self {
        with_mixed_integer_solver(SolverChain::new())
            .with_solver(clarabel::ClarabelSolver::new())
            .with_solver(penalty::PenaltySolver::new())
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    fn first_capable(&self, problem_type: ProblemType) -> Option<&(dyn Solver + Send + Sync)> {
        self.solvers
            .iter()
            .find(|solver| solver.supports(problem_type))
            .map(|solver| solver.as_ref())
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "microlp")] {
        fn with_mixed_integer_solver(chain: SolverChain) -> SolverChain {
            chain.with_solver(microlp::MicrolpSolver::new())
        }
    } else {
        fn with_mixed_integer_solver(chain: SolverChain) -> SolverChain {
            chain
        }
    }
}

impl Solver for SolverChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn integer_variable_capable(&self) -> bool {
        self.solvers.iter().any(|s| s.integer_variable_capable())
    }

    fn nonlinear_capable(&self) -> bool {
        self.solvers.iter().any(|s| s.nonlinear_capable())
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        self.first_capable(problem_type).is_some()
    }

    fn solve(
        &self,
        problem: &Problem,
        settings: &SolverSettings,
    ) -> Result<ProblemSolution, SolverError> {
        let problem_type = problem.problem_type();
        let solver = self
            .first_capable(problem_type)
            .ok_or(SolverError::NoCapableSolver(problem_type))?;
        debug!("Dispatching {} problem to {}", problem_type, solver.name());
        solver.solve(problem, settings)
    }
}

/// Errors raised by solvers before or while solving
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The problem uses a feature the solver can't handle
    #[error("Solver {solver} can't handle {problem_type} problems")]
    Unsupported {
        solver: String,
        problem_type: ProblemType,
    },
    /// No solver in the chain can handle the problem
    #[error("No available solver can handle {0} problems")]
    NoCapableSolver(ProblemType),
    /// The problem couldn't be handed to the solver
    #[error("Failed to set up solver: {0}")]
    Setup(String),
    /// The solver failed in a way not described by a status
    #[error("Solver failed: {0}")]
    Internal(String),
}
