//! This module provides a struct for representing reactions
use std::fmt::{Display, Formatter};

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A metabolite's participation in one reaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reactant {
    /// Stoichiometric coefficient, always a positive magnitude
    pub coefficient: f64,
    /// Michaelis constant in mM, if known
    pub km: Option<f64>,
}

impl Reactant {
    pub fn new(coefficient: f64, km: Option<f64>) -> Self {
        Reactant { coefficient, km }
    }
}

/// Represents a reaction in the metabolic network
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Reaction {
    /// Used to identify the reaction
    #[builder(setter(into))]
    pub id: String,
    /// Name of the catalyzing enzyme
    #[builder(default = "None")]
    pub enzyme: Option<String>,
    /// Forward catalytic rate constant in 1/s
    #[builder(default = "None")]
    pub forward_kcat: Option<f64>,
    /// Backward catalytic rate constant in 1/s
    #[builder(default = "None")]
    pub backward_kcat: Option<f64>,
    /// Molecular weight of the catalyzing enzyme in kDa
    #[builder(default = "None")]
    pub molecular_weight: Option<f64>,
    /// Standard transformed Gibbs energy of reaction (ΔG'm) in kJ/mol
    #[builder(default = "None")]
    pub standard_gibbs_energy: Option<f64>,
    #[builder(default = "true")]
    pub reversible: bool,
    #[builder(default = "false")]
    pub is_biomass_formation: bool,
    #[builder(default = "false")]
    pub is_exchange: bool,
    /// Substrate id => participation
    #[builder(default = "IndexMap::new()")]
    pub substrates: IndexMap<String, Reactant>,
    /// Product id => participation
    #[builder(default = "IndexMap::new()")]
    pub products: IndexMap<String, Reactant>,
}

impl ReactionBuilder {
    /// Add a substrate without a Michaelis constant
    pub fn substrate<S: Into<String>>(&mut self, id: S, coefficient: f64) -> &mut Self {
        self.substrate_with_km(id, coefficient, None)
    }

    /// Add a substrate
    pub fn substrate_with_km<S: Into<String>>(
        &mut self,
        id: S,
        coefficient: f64,
        km: Option<f64>,
    ) -> &mut Self {
        self.substrates
            .get_or_insert_with(IndexMap::new)
            .insert(id.into(), Reactant::new(coefficient, km));
        self
    }

    /// Add a product without a Michaelis constant
    pub fn product<S: Into<String>>(&mut self, id: S, coefficient: f64) -> &mut Self {
        self.product_with_km(id, coefficient, None)
    }

    /// Add a product
    pub fn product_with_km<S: Into<String>>(
        &mut self,
        id: S,
        coefficient: f64,
        km: Option<f64>,
    ) -> &mut Self {
        self.products
            .get_or_insert_with(IndexMap::new)
            .insert(id.into(), Reactant::new(coefficient, km));
        self
    }

    fn validate(&self) -> Result<(), String> {
        let id = self.id.as_deref().unwrap_or("<unnamed>");
        let empty = IndexMap::new();
        let substrates = self.substrates.as_ref().unwrap_or(&empty);
        let products = self.products.as_ref().unwrap_or(&empty);

        if substrates.is_empty() && products.is_empty() {
            return Err(format!("reaction '{id}' has no substrates or products"));
        }
        if let Some(shared) = substrates.keys().find(|s| products.contains_key(*s)) {
            return Err(format!(
                "metabolite '{shared}' is both a substrate and a product of reaction '{id}'"
            ));
        }
        for (met, reactant) in substrates.iter().chain(products.iter()) {
            if !is_positive(reactant.coefficient) {
                return Err(format!(
                    "coefficient of '{met}' in reaction '{id}' must be positive, got {}",
                    reactant.coefficient
                ));
            }
            if let Some(km) = reactant.km {
                if !is_positive(km) {
                    return Err(format!(
                        "Km of '{met}' in reaction '{id}' must be positive, got {km}"
                    ));
                }
            }
        }
        let parameters = [
            ("forward kcat", &self.forward_kcat),
            ("backward kcat", &self.backward_kcat),
            ("molecular weight", &self.molecular_weight),
        ];
        for (name, value) in parameters {
            if let Some(Some(value)) = value {
                if !is_positive(*value) {
                    return Err(format!(
                        "{name} of reaction '{id}' must be positive, got {value}"
                    ));
                }
            }
        }
        if let Some(Some(dgpm)) = self.standard_gibbs_energy {
            if !dgpm.is_finite() {
                return Err(format!("standard Gibbs energy of reaction '{id}' is not finite"));
            }
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.
}

impl Reaction {
    /// Every participant with its signed coefficient, substrates negative and products positive
    pub fn participants(&self) -> impl Iterator<Item = (&str, f64)> {
        self.substrates
            .iter()
            .map(|(id, r)| (id.as_str(), -r.coefficient))
            .chain(self.products.iter().map(|(id, r)| (id.as_str(), r.coefficient)))
    }

    /// The participation of `metabolite_id` in this reaction, if any
    pub fn reactant(&self, metabolite_id: &str) -> Option<&Reactant> {
        self.substrates
            .get(metabolite_id)
            .or_else(|| self.products.get(metabolite_id))
    }

    /// Signed stoichiometric coefficient of `metabolite_id`, None if it doesn't take part
    pub fn signed_coefficient(&self, metabolite_id: &str) -> Option<f64> {
        if let Some(r) = self.substrates.get(metabolite_id) {
            return Some(-r.coefficient);
        }
        self.products.get(metabolite_id).map(|r| r.coefficient)
    }

    /// Biomass formation and exchange reactions never carry thermodynamic or enzyme cost constraints
    pub fn is_pseudo_reaction(&self) -> bool {
        self.is_biomass_formation || self.is_exchange
    }

    fn side_to_string(side: &IndexMap<String, Reactant>) -> String {
        let mut ids: Vec<(&String, &Reactant)> = side.iter().collect();
        ids.sort_by(|a, b| a.0.cmp(b.0));
        ids.iter()
            .map(|(id, r)| {
                if r.coefficient == 1. {
                    id.to_string()
                } else {
                    format!("{} {}", r.coefficient, id)
                }
            })
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

impl Display for Reaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let arrow = if self.reversible { "<=>" } else { "=>" };
        write!(
            f,
            "{}: {} {} {}",
            self.id,
            Reaction::side_to_string(&self.substrates),
            arrow,
            Reaction::side_to_string(&self.products)
        )
    }
}
