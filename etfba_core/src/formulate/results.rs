//! Typed, rounded views of a solved problem
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::formulate::{Formulation, OptimizationKind};
use crate::optimize::ProblemSolution;
use crate::utils::rounding::{round_map, round_to};

/// Direction a reaction ran in, from the sign of its reported flux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluxDirection {
    #[serde(rename = "f")]
    Forward,
    #[serde(rename = "b")]
    Backward,
}

impl FluxDirection {
    /// Non-negative fluxes run forward
    pub fn from_flux(flux: f64) -> Self {
        if flux >= 0. {
            FluxDirection::Forward
        } else {
            FluxDirection::Backward
        }
    }
}

impl Display for FluxDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FluxDirection::Forward => write!(f, "f"),
            FluxDirection::Backward => write!(f, "b"),
        }
    }
}

/// Results of a flux balance analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbaResults {
    pub optimization_successful: bool,
    pub objective: f64,
    /// Reaction id => flux
    pub fluxes: IndexMap<String, f64>,
}

/// Results of a thermodynamics-based flux balance analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfbaResults {
    pub optimization_successful: bool,
    pub objective: f64,
    pub fluxes: IndexMap<String, f64>,
    /// Metabolite id => concentration in mM, for metabolites with a concentration variable
    pub concentrations: IndexMap<String, f64>,
    pub directions: IndexMap<String, FluxDirection>,
    /// Reaction id => ΔG' in kJ/mol, for thermodynamically constrained reactions
    pub gibbs_energies: IndexMap<String, f64>,
}

/// Results of an enzyme cost optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtfbaResults {
    pub optimization_successful: bool,
    pub objective: f64,
    pub fluxes: IndexMap<String, f64>,
    pub concentrations: IndexMap<String, f64>,
    pub directions: IndexMap<String, FluxDirection>,
    pub gibbs_energies: IndexMap<String, f64>,
    pub total_enzyme_cost: f64,
    /// Reaction id => enzyme cost, for the reactions included in the cost
    pub enzyme_costs: IndexMap<String, f64>,
}

/// Results of any kind of optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Results {
    Fba(FbaResults),
    Tfba(TfbaResults),
    Etfba(EtfbaResults),
}

impl Results {
    pub fn kind(&self) -> OptimizationKind {
        match self {
            Results::Fba(_) => OptimizationKind::Fba,
            Results::Tfba(_) => OptimizationKind::Tfba,
            Results::Etfba(_) => OptimizationKind::Etfba,
        }
    }

    pub fn optimization_successful(&self) -> bool {
        match self {
            Results::Fba(results) => results.optimization_successful,
            Results::Tfba(results) => results.optimization_successful,
            Results::Etfba(results) => results.optimization_successful,
        }
    }

    pub fn objective(&self) -> f64 {
        match self {
            Results::Fba(results) => results.objective,
            Results::Tfba(results) => results.objective,
            Results::Etfba(results) => results.objective,
        }
    }

    pub fn fluxes(&self) -> &IndexMap<String, f64> {
        match self {
            Results::Fba(results) => &results.fluxes,
            Results::Tfba(results) => &results.fluxes,
            Results::Etfba(results) => &results.fluxes,
        }
    }

    /// Concentrations, empty for flux balance analysis
    pub fn concentrations(&self) -> Option<&IndexMap<String, f64>> {
        match self {
            Results::Fba(_) => None,
            Results::Tfba(results) => Some(&results.concentrations),
            Results::Etfba(results) => Some(&results.concentrations),
        }
    }

    pub fn as_fba(&self) -> Option<&FbaResults> {
        match self {
            Results::Fba(results) => Some(results),
            _ => None,
        }
    }

    pub fn as_tfba(&self) -> Option<&TfbaResults> {
        match self {
            Results::Tfba(results) => Some(results),
            _ => None,
        }
    }

    pub fn as_etfba(&self) -> Option<&EtfbaResults> {
        match self {
            Results::Etfba(results) => Some(results),
            _ => None,
        }
    }
}

// region Display
fn write_section<V: Display>(
    f: &mut Formatter<'_>,
    name: &str,
    values: &IndexMap<String, V>,
) -> std::fmt::Result {
    writeln!(f, "{name}:")?;
    let mut ids: Vec<&String> = values.keys().collect();
    ids.sort();
    for id in ids {
        writeln!(f, "  {id}: {}", values[id])?;
    }
    Ok(())
}

impl Display for FbaResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "objective: {}", self.objective)?;
        writeln!(f, "optimization successful: {}", self.optimization_successful)?;
        write_section(f, "fluxes", &self.fluxes)
    }
}

impl Display for TfbaResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write_section(f, "concentrations", &self.concentrations)?;
        write_section(f, "directions", &self.directions)?;
        write_section(f, "fluxes", &self.fluxes)?;
        write_section(f, "gibbs energies", &self.gibbs_energies)?;
        writeln!(f, "objective: {}", self.objective)?;
        writeln!(f, "optimization successful: {}", self.optimization_successful)
    }
}

impl Display for EtfbaResults {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write_section(f, "concentrations", &self.concentrations)?;
        write_section(f, "directions", &self.directions)?;
        write_section(f, "enzyme costs", &self.enzyme_costs)?;
        write_section(f, "fluxes", &self.fluxes)?;
        write_section(f, "gibbs energies", &self.gibbs_energies)?;
        writeln!(f, "objective: {}", self.objective)?;
        writeln!(f, "optimization successful: {}", self.optimization_successful)?;
        writeln!(f, "total enzyme cost: {}", self.total_enzyme_cost)
    }
}

impl Display for Results {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Results::Fba(results) => results.fmt(f),
            Results::Tfba(results) => results.fmt(f),
            Results::Etfba(results) => results.fmt(f),
        }
    }
}
// endregion Display

/// Reads the values of interest out of a solved problem
///
/// The extractor only borrows the formulation and solution, nothing is modified.
#[derive(Debug, Clone, Copy)]
pub struct ResultExtractor<'a> {
    formulation: &'a Formulation,
    solution: &'a ProblemSolution,
    values: &'a [f64],
    config: &'a Configuration,
}

impl<'a> ResultExtractor<'a> {
    /// `values` are the solution's variable values in problem order
    pub fn new(
        formulation: &'a Formulation,
        solution: &'a ProblemSolution,
        values: &'a [f64],
        config: &'a Configuration,
    ) -> Self {
        ResultExtractor {
            formulation,
            solution,
            values,
            config,
        }
    }

    pub fn extract(&self, kind: OptimizationKind) -> Results {
        match kind {
            OptimizationKind::Fba => Results::Fba(self.fba()),
            OptimizationKind::Tfba => Results::Tfba(self.tfba()),
            OptimizationKind::Etfba => Results::Etfba(self.etfba()),
        }
    }

    /// Objective at the solution, cost objectives are rounded like enzyme costs
    pub fn objective(&self) -> f64 {
        let raw = self
            .solution
            .objective_value
            .unwrap_or_else(|| self.formulation.problem.objective().evaluate(self.values));
        let precision = if self.formulation.layout.objective_is_cost {
            self.config.precision.enzyme_cost
        } else {
            self.config.precision.objective
        };
        round_to(raw, precision)
    }

    pub fn fluxes(&self) -> IndexMap<String, f64> {
        round_map(
            &self.formulation.layout.flux_values(self.values),
            self.config.precision.flux,
        )
    }

    pub fn concentrations(&self) -> IndexMap<String, f64> {
        self.formulation
            .layout
            .ln_concentrations
            .iter()
            .map(|(id, index)| {
                let ln_concentration = self.values.get(*index).copied().unwrap_or(f64::NAN);
                (
                    id.clone(),
                    round_to(ln_concentration.exp(), self.config.precision.concentration),
                )
            })
            .collect()
    }

    pub fn gibbs_energies(&self) -> IndexMap<String, f64> {
        self.formulation
            .layout
            .gibbs_energies
            .iter()
            .map(|(id, gibbs)| {
                (
                    id.clone(),
                    round_to(gibbs.evaluate(self.values), self.config.precision.gibbs_energy),
                )
            })
            .collect()
    }

    fn raw_enzyme_costs(&self) -> IndexMap<String, f64> {
        self.formulation
            .layout
            .enzyme_costs
            .iter()
            .map(|(id, cost)| (id.clone(), cost.evaluate(self.values)))
            .collect()
    }

    fn directions(fluxes: &IndexMap<String, f64>) -> IndexMap<String, FluxDirection> {
        fluxes
            .iter()
            .map(|(id, flux)| (id.clone(), FluxDirection::from_flux(*flux)))
            .collect()
    }

    fn fba(&self) -> FbaResults {
        FbaResults {
            optimization_successful: self.solution.status.is_successful(),
            objective: self.objective(),
            fluxes: self.fluxes(),
        }
    }

    fn tfba(&self) -> TfbaResults {
        let fluxes = self.fluxes();
        TfbaResults {
            optimization_successful: self.solution.status.is_successful(),
            objective: self.objective(),
            directions: ResultExtractor::directions(&fluxes),
            fluxes,
            concentrations: self.concentrations(),
            gibbs_energies: self.gibbs_energies(),
        }
    }

    fn etfba(&self) -> EtfbaResults {
        let fluxes = self.fluxes();
        let raw_costs = self.raw_enzyme_costs();
        let precision = self.config.precision.enzyme_cost;
        EtfbaResults {
            optimization_successful: self.solution.status.is_successful(),
            objective: self.objective(),
            directions: ResultExtractor::directions(&fluxes),
            fluxes,
            concentrations: self.concentrations(),
            gibbs_energies: self.gibbs_energies(),
            total_enzyme_cost: round_to(raw_costs.values().sum(), precision),
            enzyme_costs: round_map(&raw_costs, precision),
        }
    }
}
