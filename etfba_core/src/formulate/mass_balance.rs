//! Flux variables, steady state mass balance and the flux objective
use log::debug;

use crate::formulate::{BuildState, ConstraintStrategy, FluxTerm, FormulationError};
use crate::optimize::objective::ObjectiveTerm;
use crate::optimize::variable::VariableType;

/// Adds a flux per reaction and Σ S\[m, r\]·v_r = 0 for every balanced metabolite
///
/// Balanced metabolites are all metabolites except end metabolites and those the
/// caller excluded. With frozen fluxes the fluxes are constants and no balance is
/// added, the fluxes came from a balanced solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassBalance;

impl MassBalance {
    /// Flux bounds of a reaction that isn't preset
    fn bounds(state: &BuildState<'_>, reaction_id: &str) -> Result<(f64, f64), FormulationError> {
        let options = state.options;
        let (lb, ub) = options
            .flux_bound_overrides
            .as_ref()
            .and_then(|overrides| overrides.get(reaction_id).copied())
            .or(options.flux_bounds)
            .unwrap_or(state.config.flux_bounds);
        let irreversible = match &options.irreversible_reactions {
            Some(irreversible) => irreversible.contains(reaction_id),
            None => !state.network.reaction(reaction_id)?.reversible,
        };
        let lb = if irreversible { lb.max(0.) } else { lb };
        if lb > ub {
            return Err(FormulationError::Configuration(format!(
                "irreversible reaction {reaction_id} has a negative upper bound {ub}"
            )));
        }
        Ok((lb, ub))
    }
}

impl ConstraintStrategy for MassBalance {
    fn name(&self) -> &'static str {
        "mass balance"
    }

    fn apply(&self, state: &mut BuildState<'_>) -> Result<(), FormulationError> {
        let matrix = state.network.stoichiometric_matrix();

        for reaction_id in matrix.column_ids() {
            if let Some(frozen) = &state.frozen_fluxes {
                let flux = frozen.get(reaction_id).copied().ok_or_else(|| {
                    FormulationError::Configuration(format!("no frozen flux for {reaction_id}"))
                })?;
                state
                    .layout
                    .fluxes
                    .insert(reaction_id.to_string(), FluxTerm::Fixed(flux));
                continue;
            }
            let preset = state
                .options
                .preset_fluxes
                .as_ref()
                .and_then(|preset| preset.get(reaction_id).copied());
            let (lb, ub) = match preset {
                Some(flux) => (flux, flux),
                None => MassBalance::bounds(state, reaction_id)?,
            };
            let variable_id = format!("v_{reaction_id}");
            let index = state.problem.add_new_variable(
                &variable_id,
                Some(reaction_id),
                VariableType::Continuous,
                lb,
                ub,
            )?;
            if let Some(start) = state.starting_fluxes.get(reaction_id) {
                state.problem.set_initial_value(&variable_id, *start)?;
            }
            state
                .layout
                .fluxes
                .insert(reaction_id.to_string(), FluxTerm::Variable(index));
        }

        if state.frozen_fluxes.is_none() {
            let excluded = state.options.excluded_from_mass_balance.as_ref();
            let mut balanced = 0;
            for metabolite_id in matrix.metabolite_ids() {
                if state.network.is_end_metabolite(metabolite_id)
                    || excluded.is_some_and(|excluded| excluded.contains(metabolite_id))
                {
                    continue;
                }
                let terms: Vec<(usize, f64)> = matrix
                    .row(metabolite_id)
                    .iter()
                    .filter_map(|(reaction_id, coefficient)| {
                        match state.layout.fluxes.get(reaction_id) {
                            Some(FluxTerm::Variable(index)) => Some((*index, *coefficient)),
                            _ => None,
                        }
                    })
                    .collect();
                state.problem.add_new_equality_constraint(
                    &format!("mb_{metabolite_id}"),
                    &terms,
                    0.,
                )?;
                balanced += 1;
            }
            debug!("Balanced {balanced} of {} metabolites", matrix.nrows());
        }

        for (reaction_id, coefficient) in &state.options.objective {
            if let Some(FluxTerm::Variable(index)) = state.layout.fluxes.get(reaction_id) {
                state.problem.add_objective_term(ObjectiveTerm::Linear {
                    var: *index,
                    coef: *coefficient,
                })?;
            }
        }
        Ok(())
    }
}
