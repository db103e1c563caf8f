//! Flux and Gibbs energy variability around an optimum
//!
//! The problem of the matching [`OptimizationKind`] is built once, its objective is
//! replaced by a row keeping the flux objective within a fraction `gamma` of a known
//! optimum, and every flux (and, for the thermodynamic kinds, every ΔG') is then
//! minimized and maximized in turn.
//!
//! # Examples
//! ```rust
//! use etfba_core::formulate::variability::VariabilityKind;
//! use etfba_core::formulate::OptimizationKind;
//! let kind: VariabilityKind = "tfva".parse().unwrap();
//! assert_eq!(kind.optimization_kind(), OptimizationKind::Tfba);
//! ```
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::formulate::options::{FluxSourceMode, OptimizeOptions};
use crate::formulate::{solved_values, FluxTerm, FormulationError, Formulator, OptimizationKind};
use crate::metabolic_model::model::NetworkModel;
use crate::optimize::expression::Expr;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::Solver;
use crate::optimize::OptimizationStatus;
use crate::utils::rounding::round_to;

/// Class of variability analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariabilityKind {
    /// Flux ranges of a flux balance analysis
    Fva,
    /// Flux and ΔG' ranges under thermodynamic constraints
    Tfva,
    /// Flux and ΔG' ranges under thermodynamic constraints and an enzyme budget
    Etva,
}

impl VariabilityKind {
    /// Kind of the problem whose feasible region is explored
    pub fn optimization_kind(self) -> OptimizationKind {
        match self {
            VariabilityKind::Fva => OptimizationKind::Fba,
            VariabilityKind::Tfva => OptimizationKind::Tfba,
            VariabilityKind::Etva => OptimizationKind::Etfba,
        }
    }
}

impl FromStr for VariabilityKind {
    type Err = FormulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fva" => Ok(VariabilityKind::Fva),
            "tfva" => Ok(VariabilityKind::Tfva),
            "etva" => Ok(VariabilityKind::Etva),
            other => Err(FormulationError::Configuration(format!(
                "unknown variability kind '{other}', expected fva, tfva or etva"
            ))),
        }
    }
}

impl Display for VariabilityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariabilityKind::Fva => write!(f, "fva"),
            VariabilityKind::Tfva => write!(f, "tfva"),
            VariabilityKind::Etva => write!(f, "etva"),
        }
    }
}

/// Bounds keeping an objective within `slack` of `optimum` on the side the sense
/// improves towards
pub(crate) fn objective_window(sense: ObjectiveSense, optimum: f64, slack: f64) -> (f64, f64) {
    match sense {
        ObjectiveSense::Maximize => (optimum - slack, f64::INFINITY),
        ObjectiveSense::Minimize => (f64::NEG_INFINITY, optimum + slack),
    }
}

/// Smallest and largest value of each quantity, rounded like [`crate::formulate::results::Results`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariabilityResults {
    pub kind: VariabilityKind,
    /// Reaction id => (minimum, maximum) flux
    pub flux_ranges: IndexMap<String, (f64, f64)>,
    /// Reaction id => (minimum, maximum) ΔG' in kJ/mol, empty for [`VariabilityKind::Fva`]
    pub gibbs_energy_ranges: IndexMap<String, (f64, f64)>,
}

fn write_ranges(
    f: &mut Formatter<'_>,
    name: &str,
    ranges: &IndexMap<String, (f64, f64)>,
) -> std::fmt::Result {
    writeln!(f, "{name}:")?;
    let mut ids: Vec<&String> = ranges.keys().collect();
    ids.sort();
    for id in ids {
        let (low, high) = ranges[id];
        writeln!(f, "  {id}: [{low}, {high}]")?;
    }
    Ok(())
}

impl Display for VariabilityResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ranges", self.kind)?;
        write_ranges(f, "fluxes", &self.flux_ranges)?;
        if !self.gibbs_energy_ranges.is_empty() {
            write_ranges(f, "gibbs energies", &self.gibbs_energy_ranges)?;
        }
        Ok(())
    }
}

/// Explores the near optimal region of one network
#[derive(Debug)]
pub struct VariabilityAnalyzer<'a> {
    formulator: Formulator<'a>,
    kind: VariabilityKind,
    objective_value: f64,
    gamma: f64,
}

impl<'a> VariabilityAnalyzer<'a> {
    /// Check the options like [`Formulator::new`] does for the matching kind
    ///
    /// # Parameters
    /// - `objective_value`: optimum of the flux objective, usually from an earlier solve
    /// - `gamma`: fraction of the optimum to keep, in (0, 1]
    ///
    /// [`VariabilityKind::Etva`] needs [`FluxSourceMode::Budgeted`], the enzyme budget is
    /// what sets it apart from [`VariabilityKind::Tfva`].
    pub fn new(
        network: &'a NetworkModel,
        kind: VariabilityKind,
        options: OptimizeOptions,
        config: Configuration,
        objective_value: f64,
        gamma: f64,
    ) -> Result<Self, FormulationError> {
        if !(gamma > 0. && gamma <= 1.) {
            return Err(FormulationError::Configuration(format!(
                "gamma must be in (0, 1], got {gamma}"
            )));
        }
        if !objective_value.is_finite() {
            return Err(FormulationError::Configuration(format!(
                "objective value must be finite, got {objective_value}"
            )));
        }
        if kind == VariabilityKind::Etva
            && !matches!(options.flux_source_mode, Some(FluxSourceMode::Budgeted(_)))
        {
            return Err(FormulationError::Configuration(
                "etva needs a budgeted flux source mode".to_string(),
            ));
        }
        if options.objective.is_empty() {
            return Err(FormulationError::Configuration(
                "objective names no reaction".to_string(),
            ));
        }
        let formulator = Formulator::new(network, kind.optimization_kind(), options, config)?;
        Ok(VariabilityAnalyzer {
            formulator,
            kind,
            objective_value,
            gamma,
        })
    }

    pub fn kind(&self) -> VariabilityKind {
        self.kind
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Minimize and maximize every flux, and every ΔG' for the thermodynamic kinds
    ///
    /// An infeasible objective window is an error. A quantity unbounded in one direction
    /// is reported as an infinite end of its range.
    pub fn evaluate<S: Solver + ?Sized>(
        &self,
        solver: &S,
    ) -> Result<VariabilityResults, FormulationError> {
        let formulation = self.formulator.build(solver)?;
        let mut problem = formulation.problem;
        let layout = formulation.layout;
        let options = self.formulator.options();
        let precision = self.formulator.config().precision;

        let flux_objective = Expr::sum(options.objective.iter().filter_map(|(id, weight)| {
            layout
                .fluxes
                .get(id)
                .map(|flux| Expr::Const(*weight) * flux.to_expr())
        }));
        let (lower, upper) = objective_window(
            options.direction(),
            self.objective_value,
            (1. - self.gamma) * self.objective_value.abs(),
        );
        info!(
            "Running {} with the objective in [{lower}, {upper}]",
            self.kind
        );
        match flux_objective.constant_value() {
            Some(value) if value < lower || value > upper => {
                return Err(FormulationError::Infeasible)
            }
            Some(_) => debug!("Objective is constant at frozen fluxes"),
            None => problem.add_new_expression_constraint(
                "objective_window",
                flux_objective,
                lower,
                upper,
            )?,
        }

        let mut flux_ranges = IndexMap::with_capacity(layout.fluxes.len());
        for (reaction_id, flux) in &layout.fluxes {
            let (low, high) = match flux {
                FluxTerm::Fixed(value) => (*value, *value),
                FluxTerm::Variable(index) => self.range(solver, &mut problem, &Expr::Var(*index))?,
            };
            debug!("Flux of {reaction_id} ranges over [{low}, {high}]");
            flux_ranges.insert(
                reaction_id.clone(),
                (round_to(low, precision.flux), round_to(high, precision.flux)),
            );
        }

        let mut gibbs_energy_ranges = IndexMap::with_capacity(layout.gibbs_energies.len());
        for (reaction_id, gibbs_energy) in &layout.gibbs_energies {
            let target = Expr::from(gibbs_energy.clone());
            let (low, high) = self.range(solver, &mut problem, &target)?;
            debug!("ΔG' of {reaction_id} ranges over [{low}, {high}]");
            gibbs_energy_ranges.insert(
                reaction_id.clone(),
                (
                    round_to(low, precision.gibbs_energy),
                    round_to(high, precision.gibbs_energy),
                ),
            );
        }

        Ok(VariabilityResults {
            kind: self.kind,
            flux_ranges,
            gibbs_energy_ranges,
        })
    }

    fn range<S: Solver + ?Sized>(
        &self,
        solver: &S,
        problem: &mut Problem,
        target: &Expr,
    ) -> Result<(f64, f64), FormulationError> {
        let low = self.extreme(solver, problem, target, ObjectiveSense::Minimize)?;
        let high = self.extreme(solver, problem, target, ObjectiveSense::Maximize)?;
        Ok((low, high))
    }

    fn extreme<S: Solver + ?Sized>(
        &self,
        solver: &S,
        problem: &mut Problem,
        target: &Expr,
        sense: ObjectiveSense,
    ) -> Result<f64, FormulationError> {
        problem.set_objective(target.clone(), sense)?;
        let solution = solver.solve(problem, &self.formulator.config().solver)?;
        if solution.status == OptimizationStatus::Unbounded {
            return Ok(match sense {
                ObjectiveSense::Minimize => f64::NEG_INFINITY,
                ObjectiveSense::Maximize => f64::INFINITY,
            });
        }
        let values = solved_values(problem, &solution)?;
        Ok(target.evaluate(&values))
    }
}
