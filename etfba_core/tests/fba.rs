mod common;

use approx::assert_abs_diff_eq;
use indexmap::{IndexMap, IndexSet};

use etfba_core::formulate::options::OptimizeOptionsBuilder;
use etfba_core::formulate::{FormulationError, OptimizationKind};
use etfba_core::metabolic_model::model::NetworkModel;
use etfba_core::optimize::objective::ObjectiveSense;
use etfba_core::optimize::solvers::clarabel::ClarabelSolver;
use etfba_core::optimize::solvers::{Solver, SolverChain};

use common::{chain, reaction, toy_network};

fn chain_optimum<S: Solver>(solver: &S) -> f64 {
    let network = chain(200.);
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r2".to_string(), 1.)]))
        .flux_bounds((0., 100.))
        .build()
        .unwrap();
    let results = network
        .optimize(OptimizationKind::Fba, options)
        .unwrap()
        .solve(solver)
        .unwrap();
    assert!(results.optimization_successful());
    assert_abs_diff_eq!(results.fluxes()["r1"], results.fluxes()["r2"], epsilon = 1e-6);
    results.objective()
}

#[test]
fn chain_is_limited_by_the_shared_bound() {
    assert_abs_diff_eq!(chain_optimum(&ClarabelSolver::new()), 100., epsilon = 1e-6);
    assert_abs_diff_eq!(chain_optimum(&SolverChain::default_chain()), 100., epsilon = 1e-6);
}

#[cfg(feature = "microlp")]
#[test]
fn clarabel_and_microlp_agree() {
    use etfba_core::optimize::solvers::microlp::MicrolpSolver;
    assert_eq!(
        chain_optimum(&ClarabelSolver::new()),
        chain_optimum(&MicrolpSolver::new())
    );
}

#[test]
fn toy_network_mass_balance() {
    let network = toy_network();
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("biomass".to_string(), 1.)]))
        .build()
        .unwrap();
    let results = network
        .optimize(OptimizationKind::Fba, options)
        .unwrap()
        .solve(&SolverChain::default_chain())
        .unwrap();
    assert_abs_diff_eq!(results.objective(), 50., epsilon = 1e-6);

    let matrix = network.stoichiometric_matrix();
    for metabolite_id in matrix.metabolite_ids() {
        if network.is_end_metabolite(metabolite_id) {
            continue;
        }
        let net: f64 = matrix
            .row(metabolite_id)
            .iter()
            .map(|(reaction_id, coefficient)| coefficient * results.fluxes()[reaction_id])
            .sum();
        assert_abs_diff_eq!(net, 0., epsilon = 0.05);
    }
}

#[test]
fn minimizing_a_reversible_reaction() {
    let mut network = NetworkModel::new_empty();
    network.add_reaction(reaction("r1", "a", "b", true));
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r1".to_string(), 1.)]))
        .direction(ObjectiveSense::Minimize)
        .build()
        .unwrap();
    let results = network
        .optimize(OptimizationKind::Fba, options)
        .unwrap()
        .solve(&ClarabelSolver::new())
        .unwrap();
    assert_abs_diff_eq!(results.fluxes()["r1"], -100., epsilon = 1e-6);
}

#[test]
fn excluded_metabolites_are_not_balanced() {
    let network = chain(200.);
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r2".to_string(), 1.)]))
        .flux_bound_overrides(IndexMap::from([("r1".to_string(), (0., 10.))]))
        .excluded_from_mass_balance(IndexSet::from(["b".to_string()]))
        .build()
        .unwrap();
    let results = network
        .optimize(OptimizationKind::Fba, options)
        .unwrap()
        .solve(&ClarabelSolver::new())
        .unwrap();
    assert_abs_diff_eq!(results.fluxes()["r1"], 10., epsilon = 1e-6);
    assert_abs_diff_eq!(results.fluxes()["r2"], 100., epsilon = 1e-6);
}

#[test]
fn unknown_ids_are_reference_errors() {
    let network = chain(200.);
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r9".to_string(), 1.)]))
        .build()
        .unwrap();
    assert_eq!(
        network.optimize(OptimizationKind::Fba, options).unwrap_err(),
        FormulationError::UnknownReaction {
            option: "objective".to_string(),
            id: "r9".to_string()
        }
    );
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r1".to_string(), 1.)]))
        .excluded_from_mass_balance(IndexSet::from(["z".to_string()]))
        .build()
        .unwrap();
    assert!(matches!(
        network.optimize(OptimizationKind::Fba, options),
        Err(FormulationError::UnknownMetabolite { .. })
    ));
}

#[test]
fn end_metabolites_ignore_insertion_order() {
    let reactions = vec![
        reaction("r1", "a", "b", true),
        reaction("r2", "b", "c", true),
        reaction("r3", "c", "b", true),
        reaction("r4", "c", "d", false),
    ];
    let mut forward = NetworkModel::new_empty();
    forward.add_reactions(reactions.clone());
    let mut backward = NetworkModel::new_empty();
    backward.add_reactions(reactions.into_iter().rev());

    let mut forward_ends: Vec<String> = forward.end_metabolites().iter().cloned().collect();
    let mut backward_ends: Vec<String> = backward.end_metabolites().iter().cloned().collect();
    forward_ends.sort();
    backward_ends.sort();
    assert_eq!(forward_ends, vec!["a".to_string(), "d".to_string()]);
    assert_eq!(forward_ends, backward_ends);
    assert_eq!(
        forward.stoichiometric_matrix().to_dense(),
        backward.stoichiometric_matrix().to_dense()
    );
}

#[test]
fn no_pair_is_both_substrate_and_product() {
    let network = toy_network();
    for reaction in network.reactions().values() {
        for metabolite_id in reaction.substrates.keys() {
            assert!(!reaction.products.contains_key(metabolite_id));
            assert!(network.coefficient(&reaction.id, metabolite_id).unwrap() < 0.);
        }
    }
}
