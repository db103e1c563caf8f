//! Core of etfba, a crate for flux balance analysis under thermodynamic and enzyme cost
//! constraints.
//!
//! A [`NetworkModel`](metabolic_model::model::NetworkModel) is built once, from
//! reaction rows or a persisted blob. Each call to
//! [`optimize`](metabolic_model::model::NetworkModel::optimize) checks a set of options
//! against one kind of analysis and returns a
//! [`Formulator`](formulate::Formulator), which builds the optimization problem, hands
//! it to a [`Solver`](optimize::solvers::Solver) and reads the solution back into
//! rounded [`Results`](formulate::results::Results).
pub mod configuration;
pub mod formulate;
pub mod io;
pub mod metabolic_model;
pub mod optimize;
mod utils;
