//! Reaction rows, the tabular description of a network, and their conversion into a
//! [`NetworkModel`]
use std::fmt::Write as _;

use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::configuration::Configuration;
use crate::io::reactant_parse::{parse_reactants, ReactantParseError};
use crate::metabolic_model::model::NetworkModel;
use crate::metabolic_model::reaction::{Reactant, Reaction, ReactionBuilder};

/// One reaction of a network as it appears in a table
///
/// Reactant lists use the grammar of [`parse_reactants`], Km lists are `;` separated
/// with one entry per reactant (empty entries are absent Kms). Numeric fields accept
/// numbers, `null`, or strings, with the empty string meaning absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionRow {
    pub id: String,
    #[serde(deserialize_with = "optional_text")]
    pub enzyme: Option<String>,
    pub substrates: String,
    pub products: String,
    #[serde(deserialize_with = "flag")]
    pub reversible: bool,
    pub substrate_kms: String,
    pub product_kms: String,
    #[serde(deserialize_with = "optional_number")]
    pub forward_kcat: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub backward_kcat: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub molecular_weight: Option<f64>,
    #[serde(deserialize_with = "optional_number")]
    pub standard_gibbs_energy: Option<f64>,
}

// region Lenient Fields
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

fn optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(value)) => Ok(Some(value)),
        Some(NumberOrText::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{text}' is not a number"))),
    }
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|text| !text.trim().is_empty()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Reversibility is written as a boolean, as 0/1, or as text
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Number(value) => Ok(value != 0.),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" | "yes" => Ok(true),
            "0" | "0.0" | "false" | "no" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!(
                "'{text}' is not a reversibility flag"
            ))),
        },
    }
}
// endregion Lenient Fields

/// Recognizes biomass formation and exchange rows
#[derive(Debug, Clone)]
pub struct RowClassifier {
    biomass: Regex,
    boundary: Regex,
}

impl RowClassifier {
    pub fn new(boundary_suffix: &str) -> Result<Self, RowError> {
        let biomass = Regex::new(r"(?i)biomass").map_err(|e| RowError::Pattern(e.to_string()))?;
        let boundary = Regex::new(&format!(r"^[\w._]+{}$", regex::escape(boundary_suffix)))
            .map_err(|e| RowError::Pattern(e.to_string()))?;
        Ok(RowClassifier { biomass, boundary })
    }

    /// The product list mentions biomass
    pub fn is_biomass_formation(&self, row: &ReactionRow) -> bool {
        self.biomass.is_match(&row.products)
    }

    /// Either side is a single boundary species
    pub fn is_exchange(&self, row: &ReactionRow) -> bool {
        self.boundary.is_match(row.substrates.trim()) || self.boundary.is_match(row.products.trim())
    }
}

impl ReactionRow {
    /// Validate the row and turn it into a [`Reaction`]
    pub fn to_reaction(&self, classifier: &RowClassifier) -> Result<Reaction, RowError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(RowError::EmptyId);
        }
        let is_biomass_formation = classifier.is_biomass_formation(self);
        let is_exchange = classifier.is_exchange(self);
        let pseudo = is_biomass_formation || is_exchange;

        let parse_side = |list: &str, kms: &str, side: Side| -> Result<IndexMap<String, Reactant>, RowError> {
            let reactants = parse_reactants(list).map_err(|source| RowError::Reactants {
                reaction: id.to_string(),
                side,
                source,
            })?;
            let kms = parse_kms(id, kms)?;
            // an empty list is still one (empty) entry
            let entries = reactants.len().max(1);
            if kms.len() != entries && !is_biomass_formation {
                return Err(RowError::KmCountMismatch {
                    reaction: id.to_string(),
                    side,
                    reactants: entries,
                    kms: kms.len(),
                });
            }
            Ok(reactants
                .into_iter()
                .enumerate()
                .map(|(i, (metabolite_id, coefficient))| {
                    let km = if pseudo {
                        None
                    } else {
                        kms.get(i).copied().flatten()
                    };
                    (metabolite_id, Reactant::new(coefficient, km))
                })
                .collect())
        };
        let substrates = parse_side(&self.substrates, &self.substrate_kms, Side::Substrates)?;
        let products = parse_side(&self.products, &self.product_kms, Side::Products)?;

        ReactionBuilder::default()
            .id(id)
            .enzyme(self.enzyme.clone())
            .forward_kcat(self.forward_kcat)
            .backward_kcat(self.backward_kcat)
            .molecular_weight(self.molecular_weight)
            .standard_gibbs_energy(self.standard_gibbs_energy)
            .reversible(self.reversible)
            .is_biomass_formation(is_biomass_formation)
            .is_exchange(is_exchange)
            .substrates(substrates)
            .products(products)
            .build()
            .map_err(|e| RowError::InvalidReaction {
                reaction: id.to_string(),
                reason: e.to_string(),
            })
    }

    /// The row describing `reaction`
    pub fn from_reaction(reaction: &Reaction) -> Self {
        ReactionRow {
            id: reaction.id.clone(),
            enzyme: reaction.enzyme.clone(),
            substrates: format_reactants(&reaction.substrates),
            products: format_reactants(&reaction.products),
            reversible: reaction.reversible,
            substrate_kms: format_kms(&reaction.substrates),
            product_kms: format_kms(&reaction.products),
            forward_kcat: reaction.forward_kcat,
            backward_kcat: reaction.backward_kcat,
            molecular_weight: reaction.molecular_weight,
            standard_gibbs_energy: reaction.standard_gibbs_energy,
        }
    }
}

/// Km list entries, blank entries are absent Kms
fn parse_kms(reaction: &str, kms: &str) -> Result<Vec<Option<f64>>, RowError> {
    kms.split(';')
        .map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return Ok(None);
            }
            match entry.parse::<f64>() {
                Ok(km) if km.is_finite() && km > 0. => Ok(Some(km)),
                _ => Err(RowError::MalformedKm {
                    reaction: reaction.to_string(),
                    value: entry.to_string(),
                }),
            }
        })
        .collect()
}

fn format_reactants(reactants: &IndexMap<String, Reactant>) -> String {
    let mut list = String::new();
    for (i, (id, reactant)) in reactants.iter().enumerate() {
        if i > 0 {
            list.push_str("; ");
        }
        if reactant.coefficient == 1. {
            list.push_str(id);
        } else {
            let _ = write!(list, "{} {}", reactant.coefficient, id);
        }
    }
    list
}

fn format_kms(reactants: &IndexMap<String, Reactant>) -> String {
    reactants
        .values()
        .map(|reactant| reactant.km.map(|km| km.to_string()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(";")
}

impl NetworkModel {
    /// Build a network from reaction rows
    ///
    /// Metabolites are recognized as boundary species, and rows as exchange reactions,
    /// using the boundary suffix of `config`.
    ///
    /// # Examples
    /// ```rust
    /// use etfba_core::configuration::Configuration;
    /// use etfba_core::io::rows::ReactionRow;
    /// use etfba_core::metabolic_model::model::NetworkModel;
    /// let rows = vec![ReactionRow {
    ///     id: "r1".to_string(),
    ///     substrates: "2 a".to_string(),
    ///     products: "b".to_string(),
    ///     substrate_kms: "0.1".to_string(),
    ///     product_kms: "0.5".to_string(),
    ///     ..Default::default()
    /// }];
    /// let network = NetworkModel::from_rows(rows, &Configuration::default()).unwrap();
    /// assert_eq!(network.coefficient("r1", "a").unwrap(), -2.);
    /// ```
    pub fn from_rows<I: IntoIterator<Item = ReactionRow>>(
        rows: I,
        config: &Configuration,
    ) -> Result<NetworkModel, RowError> {
        let classifier = RowClassifier::new(&config.boundary_suffix)?;
        let mut network = NetworkModel::with_boundary_suffix(&config.boundary_suffix);
        for row in rows {
            let reaction = row.to_reaction(&classifier)?;
            if network.reactions().contains_key(&reaction.id) {
                return Err(RowError::DuplicateReaction(reaction.id));
            }
            network.add_reaction(reaction);
        }
        debug!(
            "Built network with {} reactions and {} metabolites from rows",
            network.reactions().len(),
            network.metabolites().len()
        );
        Ok(network)
    }

    /// One row per reaction, in network order
    pub fn to_rows(&self) -> Vec<ReactionRow> {
        self.reactions().values().map(ReactionRow::from_reaction).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Substrates,
    Products,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Substrates => write!(f, "substrates"),
            Side::Products => write!(f, "products"),
        }
    }
}

/// Errors found while validating reaction rows
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("a reaction row has an empty id")]
    EmptyId,
    #[error("reaction '{0}' appears in more than one row")]
    DuplicateReaction(String),
    #[error("malformed {side} of reaction '{reaction}': {source}")]
    Reactants {
        reaction: String,
        side: Side,
        source: ReactantParseError,
    },
    #[error("reaction '{reaction}' has {reactants} {side} but {kms} Km values")]
    KmCountMismatch {
        reaction: String,
        side: Side,
        reactants: usize,
        kms: usize,
    },
    #[error("Km '{value}' of reaction '{reaction}' is not a positive number")]
    MalformedKm { reaction: String, value: String },
    /// The row parsed, but doesn't describe a valid reaction (overlapping substrates and
    /// products, non-positive parameters)
    #[error("invalid reaction '{reaction}': {reason}")]
    InvalidReaction { reaction: String, reason: String },
    #[error("invalid classification pattern: {0}")]
    Pattern(String),
}
