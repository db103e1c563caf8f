//! Options accepted by [`crate::metabolic_model::model::NetworkModel::optimize`]
use derive_builder::Builder;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::formulate::{FormulationError, OptimizationKind};
use crate::metabolic_model::model::NetworkModel;
use crate::optimize::objective::ObjectiveSense;

/// Everything a caller can say about one optimization
///
/// Options that only make sense for some kinds are `Option`s, an option is "passed"
/// when it is `Some`. [`OptimizeOptions::check_kind`] rejects options illegal for a kind.
///
/// # Examples
/// ```rust
/// use etfba_core::formulate::options::OptimizeOptionsBuilder;
/// let options = OptimizeOptionsBuilder::default()
///     .objective([("biomass_rxn".to_string(), 1.)])
///     .flux_bounds((0., 100.))
///     .build()
///     .unwrap();
/// assert_eq!(options.flux_bounds, Some((0., 100.)));
/// ```
#[derive(Builder, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[builder(default)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizeOptions {
    /// Reaction id => weight of its flux in the objective
    #[builder(setter(into))]
    pub objective: IndexMap<String, f64>,
    /// Defaults to maximize
    #[builder(setter(into, strip_option))]
    pub direction: Option<ObjectiveSense>,
    /// Bounds applied to every flux without an override
    #[builder(setter(into, strip_option))]
    pub flux_bounds: Option<(f64, f64)>,
    #[builder(setter(into, strip_option))]
    pub flux_bound_overrides: Option<IndexMap<String, (f64, f64)>>,
    /// Concentration bounds in mM applied to every metabolite without an override
    #[builder(setter(into, strip_option))]
    pub conc_bounds: Option<(f64, f64)>,
    #[builder(setter(into, strip_option))]
    pub conc_bound_overrides: Option<IndexMap<String, (f64, f64)>>,
    /// Reaction id => flux the reaction is fixed at
    #[builder(setter(into, strip_option))]
    pub preset_fluxes: Option<IndexMap<String, f64>>,
    /// Metabolite id => concentration (mM) the metabolite is fixed at
    #[builder(setter(into, strip_option))]
    pub preset_concentrations: Option<IndexMap<String, f64>>,
    /// When given, exactly these reactions are irreversible, whatever the network says
    #[builder(setter(into, strip_option))]
    pub irreversible_reactions: Option<IndexSet<String>>,
    #[builder(setter(into, strip_option))]
    pub excluded_from_mass_balance: Option<IndexSet<String>>,
    #[builder(setter(into, strip_option))]
    pub excluded_from_conc: Option<IndexSet<String>>,
    #[builder(setter(into, strip_option))]
    pub excluded_from_thermodynamics: Option<IndexSet<String>>,
    /// Reactions whose enzyme cost is accounted for
    #[builder(setter(into, strip_option))]
    pub included_for_enzyme_cost: Option<IndexSet<String>>,
    #[builder(setter(into, strip_option))]
    pub flux_source_mode: Option<FluxSourceMode>,
    /// Starting fluxes handed to nonlinear solvers
    #[builder(setter(into, strip_option))]
    pub initial_fluxes: Option<IndexMap<String, f64>>,
    /// Starting concentrations (mM) handed to nonlinear solvers
    #[builder(setter(into, strip_option))]
    pub initial_concentrations: Option<IndexMap<String, f64>>,
    /// After the solve, hold the objective at its optimum and minimize Σ|v|
    pub parsimonious: bool,
}

/// Where an enzyme cost optimization takes its fluxes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxSourceMode {
    /// Solve the flux problem of the given kind first, then freeze the fluxes
    Parametric(PresolveKind),
    /// Freeze the fluxes at caller supplied values, every reaction must be covered
    Preset(IndexMap<String, f64>),
    /// Fluxes stay free, minimize total enzyme cost per unit of objective flux
    #[default]
    SelfConsistent,
    /// Fluxes stay free, total enzyme cost is capped and the flux objective optimized
    Budgeted(f64),
}

impl FluxSourceMode {
    /// Fluxes are constants in the enzyme cost problem
    pub fn freezes_fluxes(&self) -> bool {
        matches!(self, FluxSourceMode::Parametric(_) | FluxSourceMode::Preset(_))
    }
}

/// Problem solved to obtain fluxes in [`FluxSourceMode::Parametric`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresolveKind {
    Fba,
    Tfba,
}

impl From<PresolveKind> for OptimizationKind {
    fn from(kind: PresolveKind) -> Self {
        match kind {
            PresolveKind::Fba => OptimizationKind::Fba,
            PresolveKind::Tfba => OptimizationKind::Tfba,
        }
    }
}

impl OptimizeOptions {
    pub fn direction(&self) -> ObjectiveSense {
        self.direction.unwrap_or(ObjectiveSense::Maximize)
    }

    pub fn flux_source_mode(&self) -> FluxSourceMode {
        self.flux_source_mode.clone().unwrap_or_default()
    }

    /// Names of the options that were passed
    fn passed(&self) -> Vec<&'static str> {
        let mut passed = Vec::new();
        let mut note = |is_some: bool, name: &'static str| {
            if is_some {
                passed.push(name);
            }
        };
        note(self.conc_bounds.is_some(), "conc_bounds");
        note(self.conc_bound_overrides.is_some(), "conc_bound_overrides");
        note(self.preset_concentrations.is_some(), "preset_concentrations");
        note(self.excluded_from_conc.is_some(), "excluded_from_conc");
        note(
            self.excluded_from_thermodynamics.is_some(),
            "excluded_from_thermodynamics",
        );
        note(
            self.included_for_enzyme_cost.is_some(),
            "included_for_enzyme_cost",
        );
        note(self.flux_source_mode.is_some(), "flux_source_mode");
        note(
            self.initial_concentrations.is_some(),
            "initial_concentrations",
        );
        passed
    }

    /// Check that every passed option is legal for `kind`, and that `kind`'s required
    /// options are there
    pub fn check_kind(&self, kind: OptimizationKind) -> Result<(), FormulationError> {
        let illegal: &[&str] = match kind {
            OptimizationKind::Fba => &[
                "conc_bounds",
                "conc_bound_overrides",
                "preset_concentrations",
                "excluded_from_conc",
                "excluded_from_thermodynamics",
                "included_for_enzyme_cost",
                "flux_source_mode",
                "initial_concentrations",
            ],
            OptimizationKind::Tfba => &["included_for_enzyme_cost", "flux_source_mode"],
            OptimizationKind::Etfba => &[],
        };
        if let Some(option) = self.passed().into_iter().find(|o| illegal.contains(o)) {
            return Err(FormulationError::IllegalOption {
                option: option.to_string(),
                kind,
            });
        }
        if kind == OptimizationKind::Etfba && self.included_for_enzyme_cost.is_none() {
            return Err(FormulationError::MissingOption {
                option: "included_for_enzyme_cost".to_string(),
                kind,
            });
        }
        Ok(())
    }

    /// Check that every id named in the options is part of `network`
    pub fn check_references(&self, network: &NetworkModel) -> Result<(), FormulationError> {
        let reaction_ids = self
            .objective
            .keys()
            .map(|id| ("objective", id))
            .chain(keys("flux_bound_overrides", &self.flux_bound_overrides))
            .chain(keys("preset_fluxes", &self.preset_fluxes))
            .chain(members("irreversible_reactions", &self.irreversible_reactions))
            .chain(members(
                "excluded_from_thermodynamics",
                &self.excluded_from_thermodynamics,
            ))
            .chain(members(
                "included_for_enzyme_cost",
                &self.included_for_enzyme_cost,
            ))
            .chain(keys("initial_fluxes", &self.initial_fluxes));
        let preset_mode_fluxes = match &self.flux_source_mode {
            Some(FluxSourceMode::Preset(fluxes)) => Some(fluxes.clone()),
            _ => None,
        };
        for (option, id) in reaction_ids.chain(keys("flux_source_mode", &preset_mode_fluxes)) {
            if network.reaction(id).is_err() {
                return Err(FormulationError::UnknownReaction {
                    option: option.to_string(),
                    id: id.clone(),
                });
            }
        }

        let metabolite_ids = keys("conc_bound_overrides", &self.conc_bound_overrides)
            .chain(keys("preset_concentrations", &self.preset_concentrations))
            .chain(members(
                "excluded_from_mass_balance",
                &self.excluded_from_mass_balance,
            ))
            .chain(members("excluded_from_conc", &self.excluded_from_conc))
            .chain(keys("initial_concentrations", &self.initial_concentrations));
        for (option, id) in metabolite_ids {
            if network.metabolite(id).is_err() {
                return Err(FormulationError::UnknownMetabolite {
                    option: option.to_string(),
                    id: id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check bounds and presets for consistency
    pub fn check_values(&self, network: &NetworkModel) -> Result<(), FormulationError> {
        let flux_bounds = self
            .flux_bounds
            .iter()
            .map(|b| ("flux_bounds".to_string(), *b))
            .chain(self.flux_bound_overrides.iter().flatten().map(|(id, b)| {
                (format!("flux_bound_overrides[{id}]"), *b)
            }));
        for (name, (lb, ub)) in flux_bounds {
            if lb.is_nan() || ub.is_nan() || lb > ub {
                return Err(FormulationError::Configuration(format!(
                    "{name}: lower bound {lb} exceeds upper bound {ub}"
                )));
            }
        }

        let conc_bounds = self
            .conc_bounds
            .iter()
            .map(|b| ("conc_bounds".to_string(), *b))
            .chain(self.conc_bound_overrides.iter().flatten().map(|(id, b)| {
                (format!("conc_bound_overrides[{id}]"), *b)
            }));
        for (name, (lb, ub)) in conc_bounds {
            if lb.is_nan() || ub.is_nan() || lb > ub || lb <= 0. {
                return Err(FormulationError::Configuration(format!(
                    "{name}: concentration bounds ({lb}, {ub}) must be positive and ordered"
                )));
            }
        }
        let positive_concentrations = self
            .preset_concentrations
            .iter()
            .flatten()
            .map(|(id, c)| ("preset_concentrations", id, *c))
            .chain(
                self.initial_concentrations
                    .iter()
                    .flatten()
                    .map(|(id, c)| ("initial_concentrations", id, *c)),
            );
        for (option, id, concentration) in positive_concentrations {
            if !(concentration > 0.) || !concentration.is_finite() {
                return Err(FormulationError::Configuration(format!(
                    "{option}[{id}]: concentration must be positive, got {concentration}"
                )));
            }
        }

        if let Some(included) = &self.included_for_enzyme_cost {
            if included.is_empty() {
                return Err(FormulationError::Configuration(
                    "included_for_enzyme_cost is empty".to_string(),
                ));
            }
            for id in included {
                let reaction = network.reaction(id)?;
                if reaction.is_pseudo_reaction() {
                    return Err(FormulationError::Configuration(format!(
                        "included_for_enzyme_cost: {id} is a biomass formation or exchange reaction"
                    )));
                }
            }
        }
        match &self.flux_source_mode {
            Some(FluxSourceMode::Preset(fluxes)) => {
                if let Some(missing) = network.reactions().keys().find(|id| !fluxes.contains_key(*id)) {
                    return Err(FormulationError::Configuration(format!(
                        "flux_source_mode: preset fluxes don't cover reaction {missing}"
                    )));
                }
            }
            Some(FluxSourceMode::Budgeted(budget)) if !(*budget > 0.) => {
                return Err(FormulationError::Configuration(format!(
                    "flux_source_mode: enzyme budget must be positive, got {budget}"
                )));
            }
            _ => {}
        }
        let needs_objective = !matches!(self.flux_source_mode, Some(FluxSourceMode::Preset(_)));
        if needs_objective && self.objective.is_empty() {
            return Err(FormulationError::Configuration(
                "objective names no reaction".to_string(),
            ));
        }
        Ok(())
    }

    /// The options of the flux problem solved before a parametric enzyme cost problem
    pub(crate) fn presolve_options(&self, kind: PresolveKind) -> OptimizeOptions {
        let mut options = self.clone();
        options.included_for_enzyme_cost = None;
        options.flux_source_mode = None;
        options.parsimonious = false;
        if kind == PresolveKind::Fba {
            options.conc_bounds = None;
            options.conc_bound_overrides = None;
            options.preset_concentrations = None;
            options.excluded_from_conc = None;
            options.excluded_from_thermodynamics = None;
            options.initial_concentrations = None;
        }
        options
    }
}

fn keys<'a, V>(
    option: &'static str,
    map: &'a Option<IndexMap<String, V>>,
) -> impl Iterator<Item = (&'static str, &'a String)> {
    map.iter().flat_map(|m| m.keys()).map(move |id| (option, id))
}

fn members<'a>(
    option: &'static str,
    set: &'a Option<IndexSet<String>>,
) -> impl Iterator<Item = (&'static str, &'a String)> {
    set.iter().flatten().map(move |id| (option, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fba_rejects_every_concentration_option() {
        let cases = [
            OptimizeOptionsBuilder::default().conc_bounds((0.1, 1.)).build(),
            OptimizeOptionsBuilder::default()
                .conc_bound_overrides(IndexMap::from([("a".to_string(), (0.1, 1.))]))
                .build(),
            OptimizeOptionsBuilder::default()
                .preset_concentrations(IndexMap::from([("a".to_string(), 1.)]))
                .build(),
            OptimizeOptionsBuilder::default()
                .excluded_from_conc(IndexSet::from(["a".to_string()]))
                .build(),
            OptimizeOptionsBuilder::default()
                .excluded_from_thermodynamics(IndexSet::from(["r".to_string()]))
                .build(),
            OptimizeOptionsBuilder::default()
                .included_for_enzyme_cost(IndexSet::from(["r".to_string()]))
                .build(),
            OptimizeOptionsBuilder::default()
                .flux_source_mode(FluxSourceMode::SelfConsistent)
                .build(),
            OptimizeOptionsBuilder::default()
                .initial_concentrations(IndexMap::from([("a".to_string(), 1.)]))
                .build(),
        ];
        let expected = [
            "conc_bounds",
            "conc_bound_overrides",
            "preset_concentrations",
            "excluded_from_conc",
            "excluded_from_thermodynamics",
            "included_for_enzyme_cost",
            "flux_source_mode",
            "initial_concentrations",
        ];
        for (options, name) in cases.into_iter().zip(expected) {
            let err = options.unwrap().check_kind(OptimizationKind::Fba).unwrap_err();
            assert_eq!(
                err,
                FormulationError::IllegalOption {
                    option: name.to_string(),
                    kind: OptimizationKind::Fba
                }
            );
        }
    }

    #[test]
    fn tfba_rejects_enzyme_cost_options() {
        let options = OptimizeOptionsBuilder::default()
            .conc_bounds((0.1, 1.))
            .flux_source_mode(FluxSourceMode::SelfConsistent)
            .build()
            .unwrap();
        assert_eq!(
            options.check_kind(OptimizationKind::Tfba),
            Err(FormulationError::IllegalOption {
                option: "flux_source_mode".to_string(),
                kind: OptimizationKind::Tfba
            })
        );
    }

    #[test]
    fn etfba_requires_included_set() {
        let options = OptimizeOptions::default();
        assert_eq!(
            options.check_kind(OptimizationKind::Etfba),
            Err(FormulationError::MissingOption {
                option: "included_for_enzyme_cost".to_string(),
                kind: OptimizationKind::Etfba
            })
        );
        assert_eq!(options.flux_source_mode(), FluxSourceMode::SelfConsistent);
        assert_eq!(options.direction(), ObjectiveSense::Maximize);
    }

    #[test]
    fn deserialize_request_options() {
        let options: OptimizeOptions = serde_json::from_str(
            r#"{
                "objective": {"r2": 1.0},
                "direction": "min",
                "flux_source_mode": {"parametric": "tfba"},
                "included_for_enzyme_cost": ["r1"]
            }"#,
        )
        .unwrap();
        assert_eq!(options.direction(), ObjectiveSense::Minimize);
        assert_eq!(
            options.flux_source_mode(),
            FluxSourceMode::Parametric(PresolveKind::Tfba)
        );
        assert!(serde_json::from_str::<OptimizeOptions>(r#"{"objectiv": {}}"#).is_err());
    }

    #[test]
    fn presolve_drops_enzyme_options() {
        let options = OptimizeOptionsBuilder::default()
            .conc_bounds((0.1, 1.))
            .included_for_enzyme_cost(IndexSet::from(["r".to_string()]))
            .flux_source_mode(FluxSourceMode::Parametric(PresolveKind::Fba))
            .parsimonious(true)
            .build()
            .unwrap();
        let presolve = options.presolve_options(PresolveKind::Fba);
        assert!(!presolve.parsimonious);
        assert!(presolve.check_kind(OptimizationKind::Fba).is_ok());
        let presolve = options.presolve_options(PresolveKind::Tfba);
        assert_eq!(presolve.conc_bounds, Some((0.1, 1.)));
        assert!(presolve.check_kind(OptimizationKind::Tfba).is_ok());
    }
}
