//! Module providing the representation of a metabolic reaction network
pub mod metabolite;
pub mod model;
pub mod reaction;
pub mod stoichiometry;
