#![allow(dead_code)]
use std::path::PathBuf;

use etfba_core::configuration::{Configuration, SolverSettings};
use etfba_core::metabolic_model::model::NetworkModel;
use etfba_core::metabolic_model::reaction::{Reaction, ReactionBuilder};
use etfba_core::optimize::problem::Problem;
use etfba_core::optimize::solvers::clarabel::ClarabelSolver;
use etfba_core::optimize::solvers::{Solver, SolverError};
use etfba_core::optimize::{OptimizationStatus, ProblemSolution};

pub fn toy_network_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("test_data")
        .join("toy_network.json")
}

pub fn toy_network() -> NetworkModel {
    NetworkModel::read_json(toy_network_path(), &Configuration::default()).unwrap()
}

pub fn reaction(id: &str, substrate: &str, product: &str, reversible: bool) -> Reaction {
    ReactionBuilder::default()
        .id(id)
        .substrate(substrate, 1.)
        .product(product, 1.)
        .reversible(reversible)
        .build()
        .unwrap()
}

/// A -> B -> C, both steps irreversible with ΔG'm = -10 and kinetic parameters on r1
pub fn chain(r1_kcat: f64) -> NetworkModel {
    let mut network = NetworkModel::new_empty();
    network.add_reaction(
        ReactionBuilder::default()
            .id("r1")
            .substrate_with_km("a", 1., Some(0.2))
            .product_with_km("b", 1., Some(0.2))
            .reversible(false)
            .forward_kcat(Some(r1_kcat))
            .molecular_weight(Some(40.))
            .standard_gibbs_energy(Some(-10.))
            .build()
            .unwrap(),
    );
    network.add_reaction(
        ReactionBuilder::default()
            .id("r2")
            .substrate("b", 1.)
            .product("c", 1.)
            .reversible(false)
            .standard_gibbs_energy(Some(-10.))
            .build()
            .unwrap(),
    );
    network
}

/// Solves linear problems with clarabel, and answers nonlinear ones with their starting
/// point, so enzyme costs are evaluated at a known point
pub struct StartingPointSolver {
    linear: ClarabelSolver,
}

impl StartingPointSolver {
    pub fn new() -> Self {
        StartingPointSolver {
            linear: ClarabelSolver::new(),
        }
    }
}

impl Solver for StartingPointSolver {
    fn name(&self) -> &str {
        "starting point"
    }

    fn integer_variable_capable(&self) -> bool {
        false
    }

    fn nonlinear_capable(&self) -> bool {
        true
    }

    fn solve(
        &self,
        problem: &Problem,
        settings: &SolverSettings,
    ) -> Result<ProblemSolution, SolverError> {
        if !problem.has_nonlinear_parts() {
            return self.linear.solve(problem, settings);
        }
        let point = problem.starting_point();
        Ok(ProblemSolution {
            status: OptimizationStatus::Optimal,
            objective_value: Some(problem.objective().evaluate(&point)),
            variable_values: Some(problem.variables().keys().cloned().zip(point).collect()),
        })
    }
}
