//! Concentration variables, Gibbs energies and the flux direction constraints
use std::collections::HashSet;

use log::{debug, warn};

use crate::formulate::{BuildState, ConstraintStrategy, FluxTerm, FormulationError};
use crate::optimize::expression::LinearExpr;
use crate::optimize::variable::VariableType;
use crate::utils::rounding::round_to;

/// Ties the sign of each constrained reaction's flux to the sign of its ΔG'
///
/// ΔG'(r) = ΔG'm(r) + RT·Σ s_m·ln c_m over metabolites with a concentration variable.
/// With an indicator x_r the big-M pair reads
///
/// * ΔG'(r) <= M·(1 - x_r) - ε and ΔG'(r) >= -M·x_r + ε
/// * v_r >= -M·(1 - x_r) and v_r <= M·x_r
///
/// When the flux is a constant, or the direction was settled beforehand, the pair
/// collapses to a single linear bound on ΔG' and no indicator is added.
#[derive(Debug, Clone, Copy, Default)]
pub struct Thermodynamics;

/// Fraction of the way between the ln concentration bounds that solve `attempt` starts
/// from: 1/2, 1/4, 3/4, 1/8, ...
pub(crate) fn starting_fraction(attempt: usize) -> f64 {
    let mut n = attempt + 1;
    let mut denominator = 1.;
    let mut fraction = 0.;
    while n > 0 {
        denominator *= 2.;
        if n & 1 == 1 {
            fraction += 1. / denominator;
        }
        n >>= 1;
    }
    fraction
}

impl Thermodynamics {
    /// Metabolites given a concentration variable, sorted by id
    fn concentration_metabolites(state: &BuildState<'_>) -> Vec<String> {
        let network = state.network;
        let exchange_participants: HashSet<&str> = network
            .reactions()
            .values()
            .filter(|reaction| reaction.is_exchange)
            .flat_map(|reaction| reaction.participants().map(|(id, _)| id))
            .collect();
        let excluded = state.options.excluded_from_conc.as_ref();
        let mut ids: Vec<String> = network
            .metabolites()
            .values()
            .filter(|m| {
                !m.is_biomass()
                    && !m.is_boundary
                    && !exchange_participants.contains(m.id.as_str())
                    && !excluded.is_some_and(|excluded| excluded.contains(&m.id))
            })
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Reactions constrained by thermodynamics with their ΔG'm, sorted by id
    fn constrained_reactions(state: &BuildState<'_>) -> Vec<(String, f64)> {
        let excluded = state.options.excluded_from_thermodynamics.as_ref();
        let mut reactions: Vec<(String, f64)> = state
            .network
            .reactions()
            .values()
            .filter(|r| !r.is_pseudo_reaction())
            .filter(|r| !excluded.is_some_and(|excluded| excluded.contains(&r.id)))
            .filter_map(|r| r.standard_gibbs_energy.map(|dgpm| (r.id.clone(), dgpm)))
            .collect();
        reactions.sort_by(|a, b| a.0.cmp(&b.0));
        reactions
    }

    fn add_concentrations(state: &mut BuildState<'_>) -> Result<(), FormulationError> {
        let options = state.options;
        let (default_lb, default_ub) = options
            .conc_bounds
            .unwrap_or(state.config.concentration_bounds);
        let fraction = starting_fraction(state.attempt);
        for metabolite_id in Thermodynamics::concentration_metabolites(state) {
            let preset = options
                .preset_concentrations
                .as_ref()
                .and_then(|preset| preset.get(&metabolite_id).copied());
            let (lb, ub) = match preset {
                Some(concentration) => (concentration.ln(), concentration.ln()),
                None => {
                    let (lb, ub) = options
                        .conc_bound_overrides
                        .as_ref()
                        .and_then(|overrides| overrides.get(&metabolite_id).copied())
                        .unwrap_or((default_lb, default_ub));
                    (lb.ln(), ub.ln())
                }
            };
            let variable_id = format!("lnc_{metabolite_id}");
            let index = state.problem.add_new_variable(
                &variable_id,
                Some(&metabolite_id),
                VariableType::Continuous,
                lb,
                ub,
            )?;
            let start = options
                .initial_concentrations
                .as_ref()
                .and_then(|initial| initial.get(&metabolite_id))
                .map(|c| c.ln())
                .unwrap_or(lb + fraction * (ub - lb));
            state.problem.set_initial_value(&variable_id, start)?;
            state.layout.ln_concentrations.insert(metabolite_id, index);
        }
        Ok(())
    }

    /// Single sided bound on ΔG' for a reaction whose direction is known
    fn add_fixed_direction(
        state: &mut BuildState<'_>,
        reaction_id: &str,
        gibbs: &LinearExpr,
        forward: bool,
    ) -> Result<(), FormulationError> {
        let tolerance = state.config.tolerance;
        let (lb, ub) = if forward {
            (f64::NEG_INFINITY, -tolerance - gibbs.constant)
        } else {
            (tolerance - gibbs.constant, f64::INFINITY)
        };
        if gibbs.terms.is_empty() {
            if 0. < lb || 0. > ub {
                warn!(
                    "Reaction {reaction_id} can't run {} with ΔG' fixed at {}",
                    if forward { "forward" } else { "backward" },
                    gibbs.constant
                );
                return Err(FormulationError::Infeasible);
            }
            return Ok(());
        }
        state
            .problem
            .add_new_inequality_constraint(&format!("dg_{reaction_id}"), &gibbs.terms, lb, ub)?;
        Ok(())
    }

    fn add_big_m(
        state: &mut BuildState<'_>,
        reaction_id: &str,
        gibbs: &LinearExpr,
        flux_index: usize,
    ) -> Result<(), FormulationError> {
        let big_m = state.config.big_m;
        let tolerance = state.config.tolerance;
        let indicator = state.problem.add_new_variable(
            &format!("x_{reaction_id}"),
            Some(reaction_id),
            VariableType::Binary,
            0.,
            1.,
        )?;
        let mut with_indicator = gibbs.terms.clone();
        with_indicator.push((indicator, big_m));
        state.problem.add_new_inequality_constraint(
            &format!("dg_ub_{reaction_id}"),
            &with_indicator,
            f64::NEG_INFINITY,
            big_m - tolerance - gibbs.constant,
        )?;
        state.problem.add_new_inequality_constraint(
            &format!("dg_lb_{reaction_id}"),
            &with_indicator,
            tolerance - gibbs.constant,
            f64::INFINITY,
        )?;
        let flux_terms = [(flux_index, 1.), (indicator, -big_m)];
        state.problem.add_new_inequality_constraint(
            &format!("v_lb_{reaction_id}"),
            &flux_terms,
            -big_m,
            f64::INFINITY,
        )?;
        state.problem.add_new_inequality_constraint(
            &format!("v_ub_{reaction_id}"),
            &flux_terms,
            f64::NEG_INFINITY,
            0.,
        )?;
        state
            .layout
            .indicators
            .insert(reaction_id.to_string(), indicator);
        Ok(())
    }
}

impl ConstraintStrategy for Thermodynamics {
    fn name(&self) -> &'static str {
        "thermodynamic"
    }

    fn apply(&self, state: &mut BuildState<'_>) -> Result<(), FormulationError> {
        Thermodynamics::add_concentrations(state)?;
        let rt = state.config.rt();
        let constrained = Thermodynamics::constrained_reactions(state);
        debug!(
            "{} concentration variables, {} thermodynamically constrained reactions",
            state.layout.ln_concentrations.len(),
            constrained.len()
        );

        for (reaction_id, dgpm) in constrained {
            let reaction = state.network.reaction(&reaction_id)?;
            let mut gibbs = LinearExpr::new(Vec::new(), dgpm);
            for (metabolite_id, coefficient) in reaction.participants() {
                if let Some(index) = state.layout.ln_concentrations.get(metabolite_id) {
                    gibbs.add_term(*index, rt * coefficient);
                }
            }
            let gibbs = gibbs.compact();

            let flux = state.layout.fluxes.get(&reaction_id).copied().ok_or_else(|| {
                FormulationError::Configuration(format!("no flux for reaction {reaction_id}"))
            })?;
            let settled = state
                .fixed_directions
                .as_ref()
                .and_then(|directions| directions.get(&reaction_id).copied());
            match (flux, settled) {
                (FluxTerm::Fixed(value), _) => {
                    // same sign test as the reported direction, so solver noise around
                    // zero counts as forward
                    let forward = round_to(value, state.config.precision.flux) >= 0.;
                    Thermodynamics::add_fixed_direction(state, &reaction_id, &gibbs, forward)?;
                }
                (FluxTerm::Variable(_), Some(forward)) => {
                    let variable_id = format!("v_{reaction_id}");
                    let (lb, ub) = state
                        .problem
                        .variable(&variable_id)
                        .map(|v| (v.lower_bound, v.upper_bound))
                        .ok_or_else(|| {
                            FormulationError::Configuration(format!("no flux for {reaction_id}"))
                        })?;
                    let (lb, ub) = if forward { (lb.max(0.), ub) } else { (lb, ub.min(0.)) };
                    state.problem.update_variable_bounds(&variable_id, lb, ub)?;
                    Thermodynamics::add_fixed_direction(state, &reaction_id, &gibbs, forward)?;
                }
                (FluxTerm::Variable(index), None) => {
                    Thermodynamics::add_big_m(state, &reaction_id, &gibbs, index)?;
                }
            }
            state.layout.gibbs_energies.insert(reaction_id, gibbs);
        }
        Ok(())
    }
}
