//! Enzyme cost scenarios in each flux source mode
mod common;

use approx::assert_abs_diff_eq;
use indexmap::{IndexMap, IndexSet};

use etfba_core::formulate::options::{FluxSourceMode, OptimizeOptions, OptimizeOptionsBuilder, PresolveKind};
use etfba_core::formulate::outcome::{solve_with_retries, SolveOutcome};
use etfba_core::formulate::results::FluxDirection;
use etfba_core::formulate::{FormulationError, OptimizationKind};
use etfba_core::optimize::solvers::penalty::PenaltySolver;

use common::{chain, toy_network, StartingPointSolver};

fn included(ids: &[&str]) -> IndexSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn parametric_fba() -> OptimizeOptions {
    OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r2".to_string(), 1.)]))
        .flux_bounds((0., 100.))
        .included_for_enzyme_cost(included(&["r1"]))
        .flux_source_mode(FluxSourceMode::Parametric(PresolveKind::Fba))
        .build()
        .unwrap()
}

fn preset(flux: f64) -> OptimizeOptions {
    OptimizeOptionsBuilder::default()
        .included_for_enzyme_cost(included(&["r1", "r2"]))
        .flux_source_mode(FluxSourceMode::Preset(IndexMap::from([
            ("r1".to_string(), flux),
            ("r2".to_string(), flux),
        ])))
        .build()
        .unwrap()
}

#[test]
fn doubling_kcat_halves_the_cost() {
    let solver = StartingPointSolver::new();
    let slow_network = chain(100.);
    let fast_network = chain(200.);
    let slow = slow_network
        .optimize(OptimizationKind::Etfba, parametric_fba())
        .unwrap()
        .solve(&solver)
        .unwrap();
    let fast = fast_network
        .optimize(OptimizationKind::Etfba, parametric_fba())
        .unwrap()
        .solve(&solver)
        .unwrap();
    let slow = slow.as_etfba().unwrap();
    let fast = fast.as_etfba().unwrap();

    // fluxes come from the FBA pre-solve
    assert_abs_diff_eq!(slow.fluxes["r1"], 100., epsilon = 1e-6);
    assert_eq!(slow.directions["r1"], FluxDirection::Forward);
    assert_eq!(slow.concentrations, fast.concentrations);
    assert!(slow.enzyme_costs["r1"] > 0.);
    assert_abs_diff_eq!(slow.enzyme_costs["r1"], 2. * fast.enzyme_costs["r1"], epsilon = 2e-5);
    assert_abs_diff_eq!(slow.total_enzyme_cost, slow.enzyme_costs["r1"], epsilon = 1e-5);
    assert_abs_diff_eq!(slow.objective, slow.total_enzyme_cost, epsilon = 1e-2);
}

#[test]
fn preset_fluxes_are_solved_to_a_thermodynamically_feasible_point() {
    let network = chain(100.);
    let formulator = network.optimize(OptimizationKind::Etfba, preset(10.)).unwrap();
    let outcome = solve_with_retries(&formulator, &PenaltySolver::new(), 3).unwrap();
    let results = match outcome {
        SolveOutcome::Optimal(results) => results,
        other => panic!("expected an optimal outcome, got {other:?}"),
    };
    let results = results.as_etfba().unwrap();
    assert_eq!(results.fluxes["r1"], 10.);
    assert_eq!(results.fluxes["r2"], 10.);
    for reaction_id in ["r1", "r2"] {
        assert!(results.gibbs_energies[reaction_id] < 0., "{reaction_id}");
        assert!(results.enzyme_costs[reaction_id] > 0.);
    }
    for concentration in results.concentrations.values() {
        assert!(*concentration >= 0.001 - 1e-4 && *concentration <= 10. + 1e-4);
    }
}

#[test]
fn preset_must_cover_every_reaction() {
    let network = chain(100.);
    let options = OptimizeOptionsBuilder::default()
        .included_for_enzyme_cost(included(&["r1"]))
        .flux_source_mode(FluxSourceMode::Preset(IndexMap::from([(
            "r1".to_string(),
            10.,
        )])))
        .build()
        .unwrap();
    assert!(matches!(
        network.optimize(OptimizationKind::Etfba, options),
        Err(FormulationError::Configuration(_))
    ));
}

#[test]
fn pseudo_reactions_have_no_enzyme_cost() {
    let network = toy_network();
    let options = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("biomass".to_string(), 1.)]))
        .included_for_enzyme_cost(included(&["hk", "biomass"]))
        .build()
        .unwrap();
    assert!(matches!(
        network.optimize(OptimizationKind::Etfba, options),
        Err(FormulationError::Configuration(_))
    ));
}

#[test]
fn kind_decides_which_options_are_legal() {
    let network = chain(100.);
    let missing = OptimizeOptionsBuilder::default()
        .objective(IndexMap::from([("r2".to_string(), 1.)]))
        .build()
        .unwrap();
    assert_eq!(
        network.optimize(OptimizationKind::Etfba, missing).unwrap_err(),
        FormulationError::MissingOption {
            option: "included_for_enzyme_cost".to_string(),
            kind: OptimizationKind::Etfba
        }
    );
    assert_eq!(
        network.optimize(OptimizationKind::Fba, parametric_fba()).unwrap_err(),
        FormulationError::IllegalOption {
            option: "included_for_enzyme_cost".to_string(),
            kind: OptimizationKind::Fba
        }
    );
    assert!(network.optimize(OptimizationKind::Etfba, parametric_fba()).is_ok());
}

#[test]
fn failed_scenarios_report_zero_fluxes() {
    let network = chain(100.);
    // r1 can't run forward with 10 mM of b and 0.001 mM of a
    let options = OptimizeOptionsBuilder::default()
        .included_for_enzyme_cost(included(&["r1"]))
        .flux_source_mode(FluxSourceMode::Preset(IndexMap::from([
            ("r1".to_string(), 10.),
            ("r2".to_string(), 10.),
        ])))
        .preset_concentrations(IndexMap::from([
            ("a".to_string(), 0.001),
            ("b".to_string(), 10.),
        ]))
        .build()
        .unwrap();
    let formulator = network.optimize(OptimizationKind::Etfba, options).unwrap();
    let outcome = solve_with_retries(&formulator, &PenaltySolver::new(), 2).unwrap();
    assert!(!outcome.is_optimal());
    assert_eq!(
        outcome.fluxes_or_zero(&network),
        IndexMap::from([("r1".to_string(), 0.), ("r2".to_string(), 0.)])
    );
}

#[cfg(feature = "microlp")]
mod free_fluxes {
    use super::*;
    use etfba_core::optimize::problem::ProblemType;
    use etfba_core::formulate::results::EtfbaResults;
    use etfba_core::formulate::variability::VariabilityKind;
    use etfba_core::optimize::solvers::SolverChain;

    fn options(mode: FluxSourceMode) -> OptimizeOptions {
        OptimizeOptionsBuilder::default()
            .objective(IndexMap::from([("r2".to_string(), 1.)]))
            .flux_bounds((0., 100.))
            .included_for_enzyme_cost(included(&["r1", "r2"]))
            .flux_source_mode(mode)
            .build()
            .unwrap()
    }

    #[test]
    fn self_consistent_directions_come_from_a_presolve() {
        let network = chain(100.);
        let formulator = network
            .optimize(OptimizationKind::Etfba, options(FluxSourceMode::SelfConsistent))
            .unwrap();
        let formulation = formulator.build(&SolverChain::default_chain()).unwrap();
        let problem = &formulation.problem;
        assert_eq!(problem.problem_type(), ProblemType::NonlinearContinuous);
        assert!(!problem.variables().keys().any(|id| id.starts_with("x_")));
        assert!(problem.constraints().contains_key("dg_r1"));
        assert!(problem.constraints().contains_key("dg_r2"));
        assert!(problem.objective().contains_nonlinear());
        // the pre-solve settled both reactions forward
        assert_eq!(problem.variable("v_r1").unwrap().lower_bound, 0.);
        assert_eq!(formulation.layout.enzyme_costs().len(), 2);
    }

    #[test]
    fn budget_caps_the_total_cost() {
        let network = chain(100.);
        let formulator = network
            .optimize(OptimizationKind::Etfba, options(FluxSourceMode::Budgeted(0.5)))
            .unwrap();
        let formulation = formulator.build(&SolverChain::default_chain()).unwrap();
        let budget = &formulation.problem.constraints()["enzyme_budget"];
        assert!(!budget.is_linear());
        assert_eq!(budget.bounds().1, 0.5);
        assert!(!formulation.problem.objective().contains_nonlinear());
    }

    fn solve(mode: FluxSourceMode) -> EtfbaResults {
        let network = chain(100.);
        let formulator = network.optimize(OptimizationKind::Etfba, options(mode)).unwrap();
        match solve_with_retries(&formulator, &SolverChain::default_chain(), 3).unwrap() {
            SolveOutcome::Optimal(results) => results.as_etfba().unwrap().clone(),
            other => panic!("expected an optimal solve, got {other:?}"),
        }
    }

    #[test]
    fn self_consistent_solve_prices_each_unit_of_flux() {
        let results = solve(FluxSourceMode::SelfConsistent);
        assert!(results.optimization_successful);
        assert!(results.fluxes["r2"] > 0.);
        assert_abs_diff_eq!(results.fluxes["r1"], results.fluxes["r2"], epsilon = 1e-6);
        // at best each reaction costs MW/(3600 kcat) per unit of flux
        let floor: f64 = 40. / (3600. * 100.) + 40. / (3600. * 200.);
        assert!(results.objective >= (floor * 1e5).floor() / 1e5, "{}", results.objective);
        assert!(results.objective < 1e-3, "{}", results.objective);
        for gibbs_energy in results.gibbs_energies.values() {
            assert!(*gibbs_energy <= -0.01 + 0.005);
        }
    }

    #[test]
    fn loose_budget_leaves_the_flux_at_its_bound() {
        let results = solve(FluxSourceMode::Budgeted(0.5));
        assert_abs_diff_eq!(results.fluxes["r2"], 100., epsilon = 1e-3);
        assert_abs_diff_eq!(results.objective, 100., epsilon = 1e-3);
        assert!(results.total_enzyme_cost <= 0.5);
    }

    #[test]
    fn tight_budget_limits_the_flux() {
        let results = solve(FluxSourceMode::Budgeted(0.005));
        assert!(results.total_enzyme_cost <= 0.005 + 2e-5, "{}", results.total_enzyme_cost);
        let flux = results.fluxes["r2"];
        assert!(flux > 15. && flux < 30.1, "{flux}");
        assert_abs_diff_eq!(results.fluxes["r1"], flux, epsilon = 1e-2);
    }

    #[test]
    fn ranges_under_a_tight_budget() {
        let optimum = solve(FluxSourceMode::Budgeted(0.005)).objective;
        let network = chain(100.);
        let ranges = network
            .evaluate_variability(
                VariabilityKind::Etva,
                options(FluxSourceMode::Budgeted(0.005)),
                optimum,
                0.9,
            )
            .unwrap()
            .evaluate(&SolverChain::default_chain())
            .unwrap();
        let (low, high) = ranges.flux_ranges["r2"];
        assert!(low >= 0.9 * optimum - 0.05, "{low} vs {optimum}");
        assert!(low <= high);
        assert!(high <= optimum + 0.05, "{high} vs {optimum}");
        for id in ["r1", "r2"] {
            let (low, high) = ranges.gibbs_energy_ranges[id];
            assert!(low <= high, "{id}: [{low}, {high}]");
            assert!(high <= -0.01 + 0.005, "{id}: [{low}, {high}]");
        }
    }
}
