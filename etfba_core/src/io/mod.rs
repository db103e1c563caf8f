//! Module for reading and writing networks
pub mod binary;
pub mod json;
pub mod reactant_parse;
pub mod rows;
