//! This module provides the metabolite struct representing a metabolite
use derive_builder::Builder;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Represents a metabolite
///
/// Stoichiometric coefficients and Michaelis constants belong to a (reaction, metabolite) pair
/// and live on the [`Reaction`](crate::metabolic_model::reaction::Reaction), they are looked up
/// through [`NetworkModel::coefficient`](crate::metabolic_model::model::NetworkModel::coefficient)
/// and [`NetworkModel::km`](crate::metabolic_model::model::NetworkModel::km).
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    #[builder(setter(into))]
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Whether this is a boundary species, outside the modeled system
    #[builder(default = "false")]
    pub is_boundary: bool,
    /// Ids of the reactions this metabolite takes part in, kept up to date by the network
    #[builder(setter(skip))]
    #[serde(default)]
    pub(crate) reactions: IndexSet<String>,
}

impl Metabolite {
    /// Create a metabolite, classifying it as a boundary species when its id ends
    /// with `boundary_suffix`
    pub fn new(id: &str, boundary_suffix: &str) -> Self {
        Metabolite {
            id: id.to_string(),
            name: None,
            is_boundary: !boundary_suffix.is_empty() && id.ends_with(boundary_suffix),
            reactions: IndexSet::new(),
        }
    }

    /// The biomass pseudo-metabolite has no meaningful concentration
    pub fn is_biomass(&self) -> bool {
        self.id.eq_ignore_ascii_case("biomass")
    }

    /// Ids of the reactions this metabolite takes part in
    pub fn reactions(&self) -> impl Iterator<Item = &str> {
        self.reactions.iter().map(String::as_str)
    }
}
