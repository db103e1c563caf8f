//! Enzyme cost expressions and the objectives built from them
use log::{debug, warn};

use crate::formulate::options::FluxSourceMode;
use crate::formulate::{BuildState, ConstraintStrategy, FluxTerm, FormulationError};
use crate::metabolic_model::reaction::Reaction;
use crate::optimize::expression::{Expr, LinearExpr};
use crate::optimize::objective::ObjectiveSense;

/// Enzyme needed to carry each included reaction's flux under reversible saturation
/// kinetics
///
/// With S = Σ_sub coe·(c - ln Km), P = Σ_pro coe·(c - ln Km) and
/// D = Σ_pro coe·c - Σ_sub coe·c + ΔG'm/RT,
///
/// e(r) = MW·v/(3600·kcat) · (exp(S) + exp(P) + 1) / (exp(S)·(1 - exp(D)))
///
/// The objective depends on where the fluxes come from, see [`FluxSourceMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnzymeCost;

impl EnzymeCost {
    fn cost_expression(
        state: &BuildState<'_>,
        reaction: &Reaction,
        flux: FluxTerm,
    ) -> Expr {
        let config = state.config;
        let concentrations = &state.layout.ln_concentrations;
        let kcat = reaction.forward_kcat.unwrap_or(config.default_kcat);
        let molecular_weight = reaction
            .molecular_weight
            .unwrap_or(config.default_molecular_weight);

        let mut substrate_saturation = LinearExpr::default();
        let mut product_saturation = LinearExpr::default();
        let mut displacement = LinearExpr::default();
        for (metabolite_id, reactant) in &reaction.substrates {
            if let Some(index) = concentrations.get(metabolite_id) {
                let km = reactant.km.unwrap_or(config.default_km);
                substrate_saturation.add_term(*index, reactant.coefficient);
                substrate_saturation.constant -= reactant.coefficient * km.ln();
                displacement.add_term(*index, -reactant.coefficient);
            }
        }
        for (metabolite_id, reactant) in &reaction.products {
            if let Some(index) = concentrations.get(metabolite_id) {
                let km = reactant.km.unwrap_or(config.default_km);
                product_saturation.add_term(*index, reactant.coefficient);
                product_saturation.constant -= reactant.coefficient * km.ln();
                displacement.add_term(*index, reactant.coefficient);
            }
        }

        let substrate_term = Expr::from(substrate_saturation.compact()).exp();
        let numerator =
            substrate_term.clone() + Expr::from(product_saturation.compact()).exp() + Expr::Const(1.);
        let denominator = match reaction.standard_gibbs_energy {
            Some(dgpm) => {
                displacement.constant += dgpm / config.rt();
                substrate_term * (Expr::Const(1.) - Expr::from(displacement.compact()).exp())
            }
            None => {
                warn!(
                    "Reaction {} has no standard Gibbs energy, its enzyme cost ignores thermodynamics",
                    reaction.id
                );
                substrate_term
            }
        };
        Expr::Const(molecular_weight / (3600. * kcat)) * flux.to_expr() * numerator / denominator
    }
}

impl ConstraintStrategy for EnzymeCost {
    fn name(&self) -> &'static str {
        "enzyme cost"
    }

    fn apply(&self, state: &mut BuildState<'_>) -> Result<(), FormulationError> {
        let mut included: Vec<&String> = state
            .options
            .included_for_enzyme_cost
            .iter()
            .flatten()
            .collect();
        included.sort();

        for reaction_id in included {
            let reaction = state.network.reaction(reaction_id)?;
            let flux = state.layout.fluxes.get(reaction_id).copied().ok_or_else(|| {
                FormulationError::Configuration(format!("no flux for reaction {reaction_id}"))
            })?;
            let cost = EnzymeCost::cost_expression(state, reaction, flux);
            state.layout.enzyme_costs.insert(reaction_id.clone(), cost);
        }
        let total = Expr::sum(state.layout.enzyme_costs.values().cloned());

        match state.options.flux_source_mode() {
            FluxSourceMode::Parametric(_) | FluxSourceMode::Preset(_) => {
                debug!("Minimizing total enzyme cost at frozen fluxes");
                state.layout.objective_is_cost = true;
                state.problem.set_objective(total, ObjectiveSense::Minimize)?;
            }
            FluxSourceMode::SelfConsistent => {
                debug!("Minimizing total enzyme cost per unit of objective flux");
                state.layout.objective_is_cost = true;
                let flux_objective = Expr::sum(state.options.objective.iter().filter_map(
                    |(reaction_id, coefficient)| {
                        state
                            .layout
                            .fluxes
                            .get(reaction_id)
                            .map(|flux| Expr::Const(*coefficient) * flux.to_expr())
                    },
                ));
                state
                    .problem
                    .set_objective(total / flux_objective, ObjectiveSense::Minimize)?;
            }
            FluxSourceMode::Budgeted(budget) => {
                debug!("Capping total enzyme cost at {budget}");
                state.problem.add_new_expression_constraint(
                    "enzyme_budget",
                    total,
                    f64::NEG_INFINITY,
                    budget,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indexmap::{IndexMap, IndexSet};

    use super::*;
    use crate::configuration::Configuration;
    use crate::formulate::mass_balance::MassBalance;
    use crate::formulate::options::{OptimizeOptions, OptimizeOptionsBuilder};
    use crate::formulate::thermodynamics::Thermodynamics;
    use crate::formulate::ProblemLayout;
    use crate::metabolic_model::model::NetworkModel;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use crate::optimize::problem::{Problem, ProblemType};

    fn network(kcat: f64) -> NetworkModel {
        let mut network = NetworkModel::new_empty();
        network.add_reaction(
            ReactionBuilder::default()
                .id("r1")
                .substrate_with_km("a", 1., Some(0.5))
                .product_with_km("b", 1., Some(2.))
                .forward_kcat(Some(kcat))
                .molecular_weight(Some(60.))
                .standard_gibbs_energy(Some(-20.))
                .build()
                .unwrap(),
        );
        network
    }

    fn build(network: &NetworkModel, options: &OptimizeOptions) -> (Problem, ProblemLayout) {
        let config = Configuration::default();
        let mut state = BuildState {
            network,
            options,
            config: &config,
            problem: Problem::new(options.direction()),
            layout: ProblemLayout::default(),
            frozen_fluxes: Some(IndexMap::from([("r1".to_string(), 10.)])),
            fixed_directions: None,
            starting_fluxes: IndexMap::new(),
            attempt: 0,
        };
        MassBalance.apply(&mut state).unwrap();
        Thermodynamics.apply(&mut state).unwrap();
        EnzymeCost.apply(&mut state).unwrap();
        (state.problem, state.layout)
    }

    fn preset_options() -> OptimizeOptions {
        OptimizeOptionsBuilder::default()
            .included_for_enzyme_cost(IndexSet::from(["r1".to_string()]))
            .flux_source_mode(FluxSourceMode::Preset(IndexMap::from([(
                "r1".to_string(),
                10.,
            )])))
            .build()
            .unwrap()
    }

    #[test]
    fn cost_matches_closed_form() {
        let network = network(100.);
        let (problem, layout) = build(&network, &preset_options());
        assert_eq!(problem.problem_type(), ProblemType::NonlinearContinuous);
        let a = problem.variable_index("lnc_a").unwrap();
        let b = problem.variable_index("lnc_b").unwrap();
        let mut point = vec![0.; problem.num_variables()];
        point[a] = 1f64.ln();
        point[b] = 0.1f64.ln();

        let rt = Configuration::default().rt();
        let s = 1f64.ln() - 0.5f64.ln();
        let p = 0.1f64.ln() - 2f64.ln();
        let d = 0.1f64.ln() - 1f64.ln() - 20. / rt;
        let expected =
            60. * 10. / (3600. * 100.) * (s.exp() + p.exp() + 1.) / (s.exp() * (1. - d.exp()));
        let cost = layout.enzyme_costs["r1"].evaluate(&point);
        assert!((cost - expected).abs() < 1e-12);
        assert!((problem.objective().evaluate(&point) - expected).abs() < 1e-12);
        assert_eq!(problem.objective().sense(), ObjectiveSense::Minimize);
        assert!(layout.objective_is_cost());
    }

    #[test]
    fn doubling_kcat_halves_cost() {
        let slow = network(100.);
        let fast = network(200.);
        let (problem, slow_layout) = build(&slow, &preset_options());
        let (_, fast_layout) = build(&fast, &preset_options());
        let point = problem.starting_point();
        let ratio = slow_layout.enzyme_costs["r1"].evaluate(&point)
            / fast_layout.enzyme_costs["r1"].evaluate(&point);
        assert!((ratio - 2.).abs() < 1e-12);
    }

    #[test]
    fn budget_becomes_a_constraint() {
        let network = network(100.);
        let mut options = preset_options();
        options.flux_source_mode = Some(FluxSourceMode::Budgeted(0.5));
        let (problem, layout) = build(&network, &options);
        assert!(!layout.objective_is_cost());
        let budget = &problem.constraints()["enzyme_budget"];
        assert!(!budget.is_linear());
        assert_eq!(budget.bounds(), (f64::NEG_INFINITY, 0.5));
    }
}
