//! Constants and defaults used while building and reporting optimization problems
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Physical constants, formulation constants and defaults shared by every formulator.
///
/// A `Configuration` is passed explicitly into [`crate::metabolic_model::model::NetworkModel::optimize`],
/// so two concurrent optimizations can run with different settings against the same network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Gas constant in kJ/mol/K
    pub gas_constant: f64,
    /// Temperature in K
    pub temperature: f64,
    /// Constant used to switch the direction constraints on and off
    ///
    /// Must be far larger than any feasible flux or Gibbs energy magnitude
    pub big_m: f64,
    /// Smallest Gibbs energy dissipation a thermodynamically constrained reaction may have
    pub tolerance: f64,
    /// Forward kcat (1/s) used when a reaction has none
    pub default_kcat: f64,
    /// Enzyme molecular weight (kDa) used when a reaction has none
    pub default_molecular_weight: f64,
    /// Michaelis constant (mM) used when a reactant has none
    pub default_km: f64,
    /// Flux bounds used when an optimization doesn't specify any
    pub flux_bounds: (f64, f64),
    /// Concentration bounds (mM) used when an optimization doesn't specify any
    pub concentration_bounds: (f64, f64),
    /// Metabolite id suffix marking a boundary (exchange) species
    pub boundary_suffix: String,
    /// Decimal places used when reporting results
    pub precision: ReportPrecision,
    /// Limits handed to the solver
    pub solver: SolverSettings,
    /// How many times a nonlinear solve may be attempted before giving up
    pub max_solve_attempts: usize,
}

impl Configuration {
    /// RT in kJ/mol
    pub fn rt(&self) -> f64 {
        self.gas_constant * self.temperature
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            gas_constant: 8.315e-3,
            temperature: 298.15,
            big_m: 1.0e4,
            tolerance: 0.01,
            default_kcat: 200.,
            default_molecular_weight: 40.,
            default_km: 0.2,
            flux_bounds: (-100., 100.),
            concentration_bounds: (0.001, 10.),
            boundary_suffix: String::from(".o"),
            precision: ReportPrecision::default(),
            solver: SolverSettings::default(),
            max_solve_attempts: 3,
        }
    }
}

/// Number of decimal places kept for each kind of reported value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPrecision {
    pub objective: u32,
    pub flux: u32,
    pub concentration: u32,
    pub gibbs_energy: u32,
    /// Enzyme costs are small fractions of cell dry weight, so they keep more digits
    pub enzyme_cost: u32,
}

impl Default for ReportPrecision {
    fn default() -> Self {
        ReportPrecision {
            objective: 2,
            flux: 2,
            concentration: 4,
            gibbs_energy: 2,
            enzyme_cost: 5,
        }
    }
}

/// Limits passed through to whichever solver handles a problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of solver iterations
    pub max_iterations: u32,
    /// Wall clock limit for a single solve, if any
    pub time_limit: Option<Duration>,
    /// Ask the solver to print its progress
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: 10000,
            time_limit: None,
            verbose: false,
        }
    }
}
