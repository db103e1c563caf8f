//! This module provides the NetworkModel struct for representing an entire metabolic network
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configuration::Configuration;
use crate::formulate::options::OptimizeOptions;
use crate::formulate::variability::{VariabilityAnalyzer, VariabilityKind};
use crate::formulate::{FormulationError, Formulator, OptimizationKind};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;
use crate::metabolic_model::stoichiometry::StoichiometricMatrix;

/// Represents a metabolic reaction network
///
/// The network is the single registry of metabolites and reactions: adding a reaction creates
/// (or reuses) the canonical metabolite for every participant id. Derived matrices are computed
/// lazily and dropped whenever the structure changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkModel {
    /// Id associated with the network
    pub id: Option<String>,
    /// Metabolite id suffix marking boundary species
    boundary_suffix: String,
    /// Map of metabolite ids to metabolites
    metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to reactions
    reactions: IndexMap<String, Reaction>,
    #[serde(skip)]
    stoichiometric_matrix: OnceLock<StoichiometricMatrix>,
    #[serde(skip)]
    total_stoichiometric_matrix: OnceLock<StoichiometricMatrix>,
    #[serde(skip)]
    end_metabolites: OnceLock<IndexSet<String>>,
}

impl Default for NetworkModel {
    fn default() -> Self {
        NetworkModel::new_empty()
    }
}

impl NetworkModel {
    /// Create an empty network using the default boundary suffix
    pub fn new_empty() -> Self {
        NetworkModel::with_boundary_suffix(&Configuration::default().boundary_suffix)
    }

    /// Create an empty network whose boundary species are recognized by `suffix`
    pub fn with_boundary_suffix(suffix: &str) -> Self {
        NetworkModel {
            id: None,
            boundary_suffix: suffix.to_string(),
            metabolites: IndexMap::new(),
            reactions: IndexMap::new(),
            stoichiometric_matrix: OnceLock::new(),
            total_stoichiometric_matrix: OnceLock::new(),
            end_metabolites: OnceLock::new(),
        }
    }

    pub fn boundary_suffix(&self) -> &str {
        &self.boundary_suffix
    }

    // region Structural Updates
    /// Add a reaction to the network
    ///
    /// Participants are registered as metabolites if they aren't already. A reaction with
    /// the same id as an existing one replaces it.
    ///
    /// # Examples
    /// ```rust
    /// use etfba_core::metabolic_model::model::NetworkModel;
    /// use etfba_core::metabolic_model::reaction::ReactionBuilder;
    /// let mut network = NetworkModel::new_empty();
    /// let reaction = ReactionBuilder::default()
    ///     .id("r1")
    ///     .substrate("a", 1.)
    ///     .product("b", 1.)
    ///     .build()
    ///     .unwrap();
    /// network.add_reaction(reaction);
    /// assert!(network.metabolite("a").is_ok());
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) {
        if self.reactions.contains_key(&reaction.id) {
            debug!("Replacing reaction {}", reaction.id);
            self.unregister_participants(&reaction.id);
        }
        for (met_id, _) in reaction.participants() {
            let suffix = &self.boundary_suffix;
            self.metabolites
                .entry(met_id.to_string())
                .or_insert_with(|| Metabolite::new(met_id, suffix))
                .reactions
                .insert(reaction.id.clone());
        }
        self.reactions.insert(reaction.id.clone(), reaction);
        self.invalidate();
    }

    /// Add several reactions to the network
    pub fn add_reactions<I: IntoIterator<Item = Reaction>>(&mut self, reactions: I) {
        for reaction in reactions {
            self.add_reaction(reaction);
        }
    }

    /// Remove a reaction, dropping any metabolite that no longer takes part in a reaction
    pub fn remove_reaction(&mut self, id: &str) -> Result<Reaction, NetworkError> {
        if !self.reactions.contains_key(id) {
            return Err(NetworkError::ReactionNotFound(id.to_string()));
        }
        self.unregister_participants(id);
        let removed = self
            .reactions
            .shift_remove(id)
            .ok_or_else(|| NetworkError::ReactionNotFound(id.to_string()))?;
        self.invalidate();
        Ok(removed)
    }

    /// Add a metabolite, or update the name and boundary flag of the existing one with that id
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        match self.metabolites.get_mut(&metabolite.id) {
            Some(existing) => {
                existing.name = metabolite.name;
                existing.is_boundary = metabolite.is_boundary;
            }
            None => {
                self.metabolites.insert(metabolite.id.clone(), metabolite);
            }
        }
        self.invalidate();
    }

    fn unregister_participants(&mut self, reaction_id: &str) {
        let Some(reaction) = self.reactions.get(reaction_id) else {
            return;
        };
        let participants: Vec<String> = reaction
            .participants()
            .map(|(id, _)| id.to_string())
            .collect();
        for met_id in participants {
            let orphaned = match self.metabolites.get_mut(&met_id) {
                Some(met) => {
                    met.reactions.shift_remove(reaction_id);
                    met.reactions.is_empty()
                }
                None => false,
            };
            if orphaned {
                self.metabolites.shift_remove(&met_id);
            }
        }
    }

    fn invalidate(&mut self) {
        self.stoichiometric_matrix.take();
        self.total_stoichiometric_matrix.take();
        self.end_metabolites.take();
    }
    // endregion Structural Updates

    // region Lookup
    /// Get a metabolite by id
    pub fn metabolite(&self, id: &str) -> Result<&Metabolite, NetworkError> {
        self.metabolites
            .get(id)
            .ok_or_else(|| NetworkError::MetaboliteNotFound(id.to_string()))
    }

    /// Get a reaction by id
    pub fn reaction(&self, id: &str) -> Result<&Reaction, NetworkError> {
        self.reactions
            .get(id)
            .ok_or_else(|| NetworkError::ReactionNotFound(id.to_string()))
    }

    pub fn metabolites(&self) -> &IndexMap<String, Metabolite> {
        &self.metabolites
    }

    pub fn reactions(&self) -> &IndexMap<String, Reaction> {
        &self.reactions
    }

    /// Signed stoichiometric coefficient of a metabolite in a reaction
    pub fn coefficient(&self, reaction_id: &str, metabolite_id: &str) -> Result<f64, NetworkError> {
        self.metabolite(metabolite_id)?;
        self.reaction(reaction_id)?
            .signed_coefficient(metabolite_id)
            .ok_or_else(|| NetworkError::NotAParticipant {
                reaction: reaction_id.to_string(),
                metabolite: metabolite_id.to_string(),
            })
    }

    /// Michaelis constant of a metabolite in a reaction, None if it isn't known
    pub fn km(&self, reaction_id: &str, metabolite_id: &str) -> Result<Option<f64>, NetworkError> {
        self.metabolite(metabolite_id)?;
        self.reaction(reaction_id)?
            .reactant(metabolite_id)
            .map(|r| r.km)
            .ok_or_else(|| NetworkError::NotAParticipant {
                reaction: reaction_id.to_string(),
                metabolite: metabolite_id.to_string(),
            })
    }
    // endregion Lookup

    // region Derived Views
    /// Metabolite × reaction matrix of signed coefficients
    pub fn stoichiometric_matrix(&self) -> &StoichiometricMatrix {
        self.stoichiometric_matrix.get_or_init(|| {
            debug!(
                "Building stoichiometric matrix ({} metabolites, {} reactions)",
                self.metabolites.len(),
                self.reactions.len()
            );
            StoichiometricMatrix::new(self.metabolites.keys(), self.reactions.values())
        })
    }

    /// Metabolite × (forward, backward) matrix, every reaction split into `{id}_f` and `{id}_b`
    pub fn total_stoichiometric_matrix(&self) -> &StoichiometricMatrix {
        self.total_stoichiometric_matrix.get_or_init(|| {
            StoichiometricMatrix::new_split(self.metabolites.keys(), self.reactions.values())
        })
    }

    /// Metabolites consumed or produced by exactly one reaction, sorted by id
    pub fn end_metabolites(&self) -> &IndexSet<String> {
        self.end_metabolites.get_or_init(|| {
            let matrix = self.stoichiometric_matrix();
            matrix
                .metabolite_ids()
                .filter(|id| matrix.row_nnz(id) == 1)
                .map(str::to_string)
                .collect()
        })
    }

    pub fn is_end_metabolite(&self, id: &str) -> bool {
        self.end_metabolites().contains(id)
    }
    // endregion Derived Views

    // region Optimization
    /// Set up an optimization of this network using the default [`Configuration`]
    ///
    /// # Parameters
    /// - `kind`: which class of problem to build, see [`OptimizationKind`]
    /// - `options`: objective, bounds, presets and exclusion lists, checked against `kind`
    ///
    /// # Returns
    /// A [`Formulator`] ready to build and solve the problem, or the first reference or
    /// configuration error found in `options`
    pub fn optimize(
        &self,
        kind: OptimizationKind,
        options: OptimizeOptions,
    ) -> Result<Formulator<'_>, FormulationError> {
        self.optimize_with(kind, options, Configuration::default())
    }

    /// Set up an optimization of this network with an explicit [`Configuration`]
    pub fn optimize_with(
        &self,
        kind: OptimizationKind,
        options: OptimizeOptions,
        config: Configuration,
    ) -> Result<Formulator<'_>, FormulationError> {
        Formulator::new(self, kind, options, config)
    }

    /// Set up a variability analysis of this network using the default [`Configuration`]
    ///
    /// # Parameters
    /// - `kind`: fva, tfva or etva, see [`VariabilityKind`]
    /// - `options`: checked like the options of the matching optimization kind
    /// - `objective_value`: optimum of the flux objective
    /// - `gamma`: fraction of `objective_value` every explored solution must reach
    pub fn evaluate_variability(
        &self,
        kind: VariabilityKind,
        options: OptimizeOptions,
        objective_value: f64,
        gamma: f64,
    ) -> Result<VariabilityAnalyzer<'_>, FormulationError> {
        self.evaluate_variability_with(kind, options, objective_value, gamma, Configuration::default())
    }

    pub fn evaluate_variability_with(
        &self,
        kind: VariabilityKind,
        options: OptimizeOptions,
        objective_value: f64,
        gamma: f64,
        config: Configuration,
    ) -> Result<VariabilityAnalyzer<'_>, FormulationError> {
        VariabilityAnalyzer::new(self, kind, options, config, objective_value, gamma)
    }
    // endregion Optimization
}

impl Display for NetworkModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} ({} metabolites, {} reactions)",
            self.id.as_deref().unwrap_or("network"),
            self.metabolites.len(),
            self.reactions.len()
        )?;
        let mut ids: Vec<&String> = self.reactions.keys().collect();
        ids.sort();
        for id in ids {
            if let Some(reaction) = self.reactions.get(id) {
                writeln!(f, "  {reaction}")?;
            }
        }
        Ok(())
    }
}

/// Errors associated with looking things up in a [`NetworkModel`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// Tried to access a metabolite that isn't in the network
    #[error("metabolite '{0}' is not part of the network")]
    MetaboliteNotFound(String),
    /// Tried to access a reaction that isn't in the network
    #[error("reaction '{0}' is not part of the network")]
    ReactionNotFound(String),
    /// Both exist, but the metabolite doesn't take part in the reaction
    #[error("metabolite '{metabolite}' does not take part in reaction '{reaction}'")]
    NotAParticipant { reaction: String, metabolite: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::reaction::ReactionBuilder;

    fn reaction(id: &str, substrates: &[(&str, f64)], products: &[(&str, f64)]) -> Reaction {
        let mut builder = ReactionBuilder::default();
        builder.id(id);
        for (met, coe) in substrates {
            builder.substrate_with_km(*met, *coe, Some(0.5));
        }
        for (met, coe) in products {
            builder.product(*met, *coe);
        }
        builder.build().unwrap()
    }

    fn branched() -> Vec<Reaction> {
        vec![
            reaction("v1", &[("a", 1.)], &[("b", 1.)]),
            reaction("v2", &[("b", 1.)], &[("c", 1.)]),
            reaction("v3", &[("b", 1.)], &[("d", 1.)]),
            reaction("v4", &[("c", 1.), ("d", 1.)], &[("e", 2.)]),
        ]
    }

    #[test]
    fn registers_participants() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        assert_eq!(network.metabolites().len(), 5);
        let b = network.metabolite("b").unwrap();
        assert_eq!(b.reactions().collect::<Vec<_>>(), vec!["v1", "v2", "v3"]);
        assert_eq!(network.coefficient("v4", "e").unwrap(), 2.);
        assert_eq!(network.coefficient("v4", "d").unwrap(), -1.);
        assert_eq!(network.km("v4", "c").unwrap(), Some(0.5));
        assert_eq!(network.km("v4", "e").unwrap(), None);
    }

    #[test]
    fn lookups_fail_for_unknown_ids() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        assert_eq!(
            network.reaction("v9").unwrap_err(),
            NetworkError::ReactionNotFound("v9".to_string())
        );
        assert_eq!(
            network.metabolite("z").unwrap_err(),
            NetworkError::MetaboliteNotFound("z".to_string())
        );
        assert!(matches!(
            network.coefficient("v1", "e"),
            Err(NetworkError::NotAParticipant { .. })
        ));
    }

    #[test]
    fn end_metabolites() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        let ends: Vec<&str> = network.end_metabolites().iter().map(String::as_str).collect();
        assert_eq!(ends, vec!["a", "e"]);
        assert!(network.is_end_metabolite("a"));
        assert!(!network.is_end_metabolite("b"));
    }

    #[test]
    fn end_metabolites_do_not_depend_on_insertion_order() {
        let mut forward = NetworkModel::new_empty();
        forward.add_reactions(branched());
        let mut reversed = NetworkModel::new_empty();
        reversed.add_reactions(branched().into_iter().rev());
        assert_eq!(forward.end_metabolites(), reversed.end_metabolites());
        assert_eq!(
            forward.stoichiometric_matrix(),
            reversed.stoichiometric_matrix()
        );
        // asking twice gives the same answer
        assert_eq!(forward.end_metabolites(), forward.end_metabolites());
    }

    #[test]
    fn metabolite_pairs_have_a_single_role() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        let matrix = network.stoichiometric_matrix();
        for (rxn_id, rxn) in network.reactions() {
            for met_id in matrix.metabolite_ids() {
                let entry = matrix.get(met_id, rxn_id);
                match (rxn.substrates.get(met_id), rxn.products.get(met_id)) {
                    (Some(s), None) => assert_eq!(entry, -s.coefficient),
                    (None, Some(p)) => assert_eq!(entry, p.coefficient),
                    (None, None) => assert_eq!(entry, 0.),
                    (Some(_), Some(_)) => panic!("{met_id} has two roles in {rxn_id}"),
                }
            }
        }
    }

    #[test]
    fn mutation_invalidates_cached_views() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        assert_eq!(network.end_metabolites().len(), 2);
        network.add_reaction(reaction("v5", &[("e", 1.)], &[("f", 1.)]));
        let ends: Vec<&str> = network.end_metabolites().iter().map(String::as_str).collect();
        assert_eq!(ends, vec!["a", "f"]);
        assert_eq!(network.stoichiometric_matrix().ncols(), 5);

        let removed = network.remove_reaction("v5").unwrap();
        assert_eq!(removed.id, "v5");
        assert!(network.metabolite("f").is_err());
        assert_eq!(network.stoichiometric_matrix().ncols(), 4);
        assert!(network.remove_reaction("v5").is_err());
    }

    #[test]
    fn replacing_a_reaction_unregisters_old_participants() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        network.add_reaction(reaction("v4", &[("c", 1.), ("d", 1.)], &[("g", 1.)]));
        assert!(network.metabolite("e").is_err());
        assert_eq!(network.coefficient("v4", "g").unwrap(), 1.);
        assert_eq!(network.reactions().len(), 4);
    }

    #[test]
    fn boundary_species_use_the_network_suffix() {
        let mut network = NetworkModel::with_boundary_suffix("_ext");
        network.add_reaction(reaction("up", &[("glc_ext", 1.)], &[("glc", 1.)]));
        assert!(network.metabolite("glc_ext").unwrap().is_boundary);
        assert!(!network.metabolite("glc").unwrap().is_boundary);
    }

    #[test]
    fn naming_a_registered_metabolite() {
        let mut network = NetworkModel::new_empty();
        network.add_reactions(branched());
        let mut glucose = Metabolite::new("a", "");
        glucose.name = Some("glucose".to_string());
        network.add_metabolite(glucose);
        assert_eq!(network.metabolite("a").unwrap().name.as_deref(), Some("glucose"));
        assert_eq!(network.metabolites().len(), 5);
    }
}
