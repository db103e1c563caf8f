//! Turns a network and a set of options into an optimization problem, and the solution
//! of that problem back into results
//!
//! A [`Formulator`] holds an ordered list of [`ConstraintStrategy`]s chosen by the
//! [`OptimizationKind`]: mass balance for FBA, plus thermodynamics for TFBA, plus enzyme
//! cost for ETFBA. Each strategy adds its variables, constraints and objective to a
//! shared [`BuildState`] and records where it put them in the [`ProblemLayout`].
//!
//! [`variability::VariabilityAnalyzer`] reuses a built problem to find how far each flux
//! and Gibbs energy can move while the objective stays near its optimum.
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configuration::Configuration;
use crate::formulate::enzyme_cost::EnzymeCost;
use crate::formulate::mass_balance::MassBalance;
use crate::formulate::options::{FluxSourceMode, OptimizeOptions};
use crate::formulate::outcome::SolveOutcome;
use crate::formulate::results::{ResultExtractor, Results};
use crate::formulate::thermodynamics::Thermodynamics;
use crate::metabolic_model::model::{NetworkError, NetworkModel};
use crate::optimize::expression::{Expr, LinearExpr};
use crate::optimize::problem::{Problem, ProblemError, ProblemType};
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

pub mod enzyme_cost;
pub mod mass_balance;
pub mod options;
pub mod outcome;
mod parsimonious;
pub mod results;
pub mod thermodynamics;
pub mod variability;

/// Class of problem built from a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationKind {
    /// Flux balance analysis, a linear program
    Fba,
    /// Thermodynamics-based FBA, a mixed integer linear program
    Tfba,
    /// Enzyme-cost and thermodynamics-based FBA, a nonlinear program
    Etfba,
}

impl FromStr for OptimizationKind {
    type Err = FormulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fba" => Ok(OptimizationKind::Fba),
            "tfba" => Ok(OptimizationKind::Tfba),
            "etfba" => Ok(OptimizationKind::Etfba),
            other => Err(FormulationError::Configuration(format!(
                "unknown optimization kind '{other}', expected fba, tfba or etfba"
            ))),
        }
    }
}

impl Display for OptimizationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationKind::Fba => write!(f, "fba"),
            OptimizationKind::Tfba => write!(f, "tfba"),
            OptimizationKind::Etfba => write!(f, "etfba"),
        }
    }
}

/// How a reaction's flux enters the problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FluxTerm {
    /// Free flux, the index of its variable
    Variable(usize),
    /// Frozen flux
    Fixed(f64),
}

impl FluxTerm {
    pub fn to_expr(self) -> Expr {
        match self {
            FluxTerm::Variable(index) => Expr::Var(index),
            FluxTerm::Fixed(value) => Expr::Const(value),
        }
    }

    pub fn value(self, values: &[f64]) -> f64 {
        match self {
            FluxTerm::Variable(index) => values.get(index).copied().unwrap_or(f64::NAN),
            FluxTerm::Fixed(value) => value,
        }
    }
}

/// Where each quantity of interest lives in a built problem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemLayout {
    /// Reaction id => flux, sorted by id
    pub(crate) fluxes: IndexMap<String, FluxTerm>,
    /// Metabolite id => index of its ln concentration variable
    pub(crate) ln_concentrations: IndexMap<String, usize>,
    /// Reaction id => index of its direction indicator
    pub(crate) indicators: IndexMap<String, usize>,
    /// Reaction id => ΔG' as a linear function of ln concentrations
    pub(crate) gibbs_energies: IndexMap<String, LinearExpr>,
    /// Reaction id => enzyme cost
    pub(crate) enzyme_costs: IndexMap<String, Expr>,
    /// The objective is an enzyme cost (or cost per unit flux) rather than a flux
    pub(crate) objective_is_cost: bool,
}

impl ProblemLayout {
    pub fn fluxes(&self) -> &IndexMap<String, FluxTerm> {
        &self.fluxes
    }

    pub fn ln_concentrations(&self) -> &IndexMap<String, usize> {
        &self.ln_concentrations
    }

    pub fn indicators(&self) -> &IndexMap<String, usize> {
        &self.indicators
    }

    pub fn gibbs_energies(&self) -> &IndexMap<String, LinearExpr> {
        &self.gibbs_energies
    }

    pub fn enzyme_costs(&self) -> &IndexMap<String, Expr> {
        &self.enzyme_costs
    }

    pub fn objective_is_cost(&self) -> bool {
        self.objective_is_cost
    }

    /// Unrounded flux of every reaction at `values`
    pub fn flux_values(&self, values: &[f64]) -> IndexMap<String, f64> {
        self.fluxes
            .iter()
            .map(|(id, term)| (id.clone(), term.value(values)))
            .collect()
    }
}

/// A built problem together with its layout
#[derive(Debug, Clone)]
pub struct Formulation {
    pub problem: Problem,
    pub layout: ProblemLayout,
}

/// Everything the strategies share while a problem is built
pub struct BuildState<'a> {
    pub network: &'a NetworkModel,
    pub options: &'a OptimizeOptions,
    pub config: &'a Configuration,
    pub problem: Problem,
    pub layout: ProblemLayout,
    /// Reaction id => flux, when fluxes are constants
    pub frozen_fluxes: Option<IndexMap<String, f64>>,
    /// Reaction id => true for forward, when directions were settled beforehand
    pub fixed_directions: Option<IndexMap<String, bool>>,
    /// Reaction id => starting flux
    pub starting_fluxes: IndexMap<String, f64>,
    /// Solve attempt, moves the default starting concentrations
    pub attempt: usize,
}

/// One family of constraints, added to a problem under construction
pub trait ConstraintStrategy: Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, state: &mut BuildState<'_>) -> Result<(), FormulationError>;
}

/// Builds, solves and reads back one optimization of a network
#[derive(Debug)]
pub struct Formulator<'a> {
    network: &'a NetworkModel,
    kind: OptimizationKind,
    options: OptimizeOptions,
    config: Configuration,
    strategies: Vec<Box<dyn ConstraintStrategy + Send + Sync>>,
}

impl<'a> Formulator<'a> {
    /// Check `options` against `kind` and `network`, and choose the strategies for `kind`
    pub fn new(
        network: &'a NetworkModel,
        kind: OptimizationKind,
        options: OptimizeOptions,
        config: Configuration,
    ) -> Result<Self, FormulationError> {
        options.check_kind(kind)?;
        options.check_references(network)?;
        options.check_values(network)?;
        let mut strategies: Vec<Box<dyn ConstraintStrategy + Send + Sync>> =
            vec![Box::new(MassBalance)];
        if matches!(kind, OptimizationKind::Tfba | OptimizationKind::Etfba) {
            strategies.push(Box::new(Thermodynamics));
        }
        if kind == OptimizationKind::Etfba {
            strategies.push(Box::new(EnzymeCost));
        }
        Ok(Formulator {
            network,
            kind,
            options,
            config,
            strategies,
        })
    }

    pub fn kind(&self) -> OptimizationKind {
        self.kind
    }

    pub fn options(&self) -> &OptimizeOptions {
        &self.options
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn network(&self) -> &NetworkModel {
        self.network
    }

    /// Enzyme cost problems are nonlinear, their solves may be retried
    pub fn is_nonlinear(&self) -> bool {
        self.kind == OptimizationKind::Etfba
    }

    // region Building
    /// Build the problem without solving it
    ///
    /// `solver` is used for the flux pre-solve of parametric enzyme cost problems, and
    /// to settle reaction directions when it can't handle binaries next to enzyme costs.
    pub fn build<S: Solver + ?Sized>(&self, solver: &S) -> Result<Formulation, FormulationError> {
        self.build_attempt(solver, 0)
    }

    pub(crate) fn build_attempt<S: Solver + ?Sized>(
        &self,
        solver: &S,
        attempt: usize,
    ) -> Result<Formulation, FormulationError> {
        let frozen_fluxes = self.frozen_fluxes(solver)?;
        let (fixed_directions, mut starting_fluxes) = match self.direction_presolve(solver)? {
            Some((directions, fluxes)) => (Some(directions), fluxes),
            None => (None, IndexMap::new()),
        };
        if let Some(initial) = &self.options.initial_fluxes {
            starting_fluxes.extend(initial.iter().map(|(id, v)| (id.clone(), *v)));
        }
        let mut state = BuildState {
            network: self.network,
            options: &self.options,
            config: &self.config,
            problem: Problem::new(self.options.direction()),
            layout: ProblemLayout::default(),
            frozen_fluxes,
            fixed_directions,
            starting_fluxes,
            attempt,
        };
        for strategy in &self.strategies {
            debug!("Adding {} constraints", strategy.name());
            strategy.apply(&mut state)?;
        }
        debug!(
            "Built {} problem: {} variables, {} constraints ({})",
            self.kind,
            state.problem.num_variables(),
            state.problem.num_constraints(),
            state.problem.problem_type()
        );
        Ok(Formulation {
            problem: state.problem,
            layout: state.layout,
        })
    }

    /// Fluxes to freeze for parametric and preset enzyme cost problems
    fn frozen_fluxes<S: Solver + ?Sized>(
        &self,
        solver: &S,
    ) -> Result<Option<IndexMap<String, f64>>, FormulationError> {
        if self.kind != OptimizationKind::Etfba {
            return Ok(None);
        }
        match self.options.flux_source_mode() {
            FluxSourceMode::Parametric(presolve_kind) => {
                info!("Solving {} problem for the fluxes to freeze", OptimizationKind::from(presolve_kind));
                let presolver = Formulator::new(
                    self.network,
                    presolve_kind.into(),
                    self.options.presolve_options(presolve_kind),
                    self.config.clone(),
                )?;
                let (formulation, _, values) = presolver.solve_raw(solver, 0)?;
                Ok(Some(formulation.layout.flux_values(&values)))
            }
            FluxSourceMode::Preset(fluxes) => Ok(Some(fluxes)),
            FluxSourceMode::SelfConsistent | FluxSourceMode::Budgeted(_) => Ok(None),
        }
    }

    /// Directions and starting fluxes from a thermodynamic pre-solve, for enzyme cost
    /// problems with free fluxes handed to a solver that can't take binaries
    #[allow(clippy::type_complexity)]
    fn direction_presolve<S: Solver + ?Sized>(
        &self,
        solver: &S,
    ) -> Result<Option<(IndexMap<String, bool>, IndexMap<String, f64>)>, FormulationError> {
        if self.kind != OptimizationKind::Etfba
            || self.options.flux_source_mode().freezes_fluxes()
            || solver.supports(ProblemType::NonlinearMixedInteger)
        {
            return Ok(None);
        }
        info!("Fixing reaction directions with a thermodynamic pre-solve");
        let presolver = Formulator::new(
            self.network,
            OptimizationKind::Tfba,
            self.options.presolve_options(options::PresolveKind::Tfba),
            self.config.clone(),
        )?;
        let (formulation, _, values) = presolver.solve_raw(solver, 0)?;
        let directions = formulation
            .layout
            .indicators
            .iter()
            .map(|(id, index)| (id.clone(), values[*index] > 0.5))
            .collect();
        Ok(Some((directions, formulation.layout.flux_values(&values))))
    }
    // endregion Building

    // region Solving
    /// Build and solve the problem
    ///
    /// Infeasible and unbounded problems, and solver failures, are errors. See
    /// [`Formulator::outcome`] for the same information as a [`SolveOutcome`].
    pub fn solve<S: Solver + ?Sized>(&self, solver: &S) -> Result<Results, FormulationError> {
        self.solve_attempt(solver, 0)
    }

    pub(crate) fn solve_attempt<S: Solver + ?Sized>(
        &self,
        solver: &S,
        attempt: usize,
    ) -> Result<Results, FormulationError> {
        let (formulation, solution, values) = self.solve_raw(solver, attempt)?;
        let (formulation, solution, values) = if self.options.parsimonious {
            parsimonious::minimize_total_flux(formulation, solution, values, solver, &self.config)?
        } else {
            (formulation, solution, values)
        };
        let extractor = ResultExtractor::new(&formulation, &solution, &values, &self.config);
        Ok(extractor.extract(self.kind))
    }

    /// Build and solve the problem, returning the solver's answer unrounded
    fn solve_raw<S: Solver + ?Sized>(
        &self,
        solver: &S,
        attempt: usize,
    ) -> Result<(Formulation, ProblemSolution, Vec<f64>), FormulationError> {
        let formulation = self.build_attempt(solver, attempt)?;
        let solution = solver.solve(&formulation.problem, &self.config.solver)?;
        info!("{} solve finished with status {:?}", self.kind, solution.status);
        let values = solved_values(&formulation.problem, &solution)?;
        Ok((formulation, solution, values))
    }

    /// Build and solve the problem, with solver trouble as a [`SolveOutcome`]
    ///
    /// Reference, configuration and data errors are still errors.
    pub fn outcome<S: Solver + ?Sized>(&self, solver: &S) -> Result<SolveOutcome, FormulationError> {
        SolveOutcome::from_solve(self.solve(solver))
    }
    // endregion Solving
}

/// Variable values of a solve in problem order, or the reason there are none
pub(crate) fn solved_values(
    problem: &Problem,
    solution: &ProblemSolution,
) -> Result<Vec<f64>, FormulationError> {
    match solution.status {
        OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal => {}
        OptimizationStatus::Infeasible => return Err(FormulationError::Infeasible),
        OptimizationStatus::Unbounded => return Err(FormulationError::Unbounded),
        status => {
            return Err(FormulationError::SolverFailure(format!(
                "solver stopped with status {status:?}"
            )))
        }
    }
    match &solution.variable_values {
        Some(values) => Ok(problem.values_in_order(values)),
        None => Err(FormulationError::SolverFailure(
            "solver reported success without values".to_string(),
        )),
    }
}

/// Errors raised while setting up, building or solving an optimization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulationError {
    /// An option names a reaction the network doesn't have
    #[error("{option} names reaction '{id}' which is not part of the network")]
    UnknownReaction { option: String, id: String },
    /// An option names a metabolite the network doesn't have
    #[error("{option} names metabolite '{id}' which is not part of the network")]
    UnknownMetabolite { option: String, id: String },
    /// An option was passed that the kind doesn't accept
    #[error("option {option} is not allowed for {kind} problems")]
    IllegalOption {
        option: String,
        kind: OptimizationKind,
    },
    /// A required option was not passed
    #[error("option {option} is required for {kind} problems")]
    MissingOption {
        option: String,
        kind: OptimizationKind,
    },
    /// Invalid bounds, illegal members of the included set and the like
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The solver proved (or, for nonlinear problems, concluded) that no feasible point exists
    #[error("problem is infeasible")]
    Infeasible,
    #[error("problem is unbounded")]
    Unbounded,
    /// The solver stopped without an answer
    #[error("solver failed: {0}")]
    SolverFailure(String),
}

impl FormulationError {
    /// Errors raised by the solve itself, rather than by the request
    pub fn is_solver_error(&self) -> bool {
        matches!(
            self,
            FormulationError::Solver(_)
                | FormulationError::Infeasible
                | FormulationError::Unbounded
                | FormulationError::SolverFailure(_)
        )
    }
}
