//! Smallest total flux among the optimal solutions of a problem
use log::{debug, info};

use crate::configuration::Configuration;
use crate::formulate::variability::objective_window;
use crate::formulate::{solved_values, FluxTerm, Formulation, FormulationError};
use crate::optimize::expression::{Expr, LinearExpr};
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::solvers::Solver;
use crate::optimize::variable::VariableType;
use crate::optimize::ProblemSolution;

/// Relative room left around the optimum when it is held fixed
const OPTIMUM_SLACK: f64 = 1e-6;

/// Hold the objective of a solved problem at its optimum and minimize Σ|v| over the free
/// fluxes
///
/// Fluxes that can't change sign enter the sum directly, the others through a magnitude
/// variable m with m ≥ v and m ≥ -v. The returned solution reports the original objective,
/// and the layout is unchanged since new variables only go after existing ones.
pub(crate) fn minimize_total_flux<S: Solver + ?Sized>(
    formulation: Formulation,
    solution: ProblemSolution,
    values: Vec<f64>,
    solver: &S,
    config: &Configuration,
) -> Result<(Formulation, ProblemSolution, Vec<f64>), FormulationError> {
    let free: Vec<(String, usize)> = formulation
        .layout
        .fluxes
        .iter()
        .filter_map(|(id, term)| match term {
            FluxTerm::Variable(index) => Some((id.clone(), *index)),
            FluxTerm::Fixed(_) => None,
        })
        .collect();
    if free.is_empty() {
        debug!("Fluxes are frozen, nothing to minimize");
        return Ok((formulation, solution, values));
    }

    let Formulation {
        mut problem,
        layout,
    } = formulation;
    let objective = problem.objective().to_expression();
    let optimum = objective.evaluate(&values);
    let (lower, upper) = objective_window(
        problem.objective().sense(),
        optimum,
        OPTIMUM_SLACK * optimum.abs().max(1.),
    );
    problem.add_new_expression_constraint("optimal_objective", objective.clone(), lower, upper)?;

    let ids: Vec<String> = problem.variables().keys().cloned().collect();
    for (id, value) in ids.iter().zip(&values) {
        problem.set_initial_value(id, *value)?;
    }

    let mut total = LinearExpr::default();
    for (reaction_id, index) in free {
        let (lb, ub) = match problem.variables().get_index(index) {
            Some((_, variable)) => (variable.lower_bound, variable.upper_bound),
            None => {
                return Err(FormulationError::Configuration(format!(
                    "no flux variable for reaction {reaction_id}"
                )))
            }
        };
        if lb >= 0. {
            total.add_term(index, 1.);
        } else if ub <= 0. {
            total.add_term(index, -1.);
        } else {
            let magnitude_id = format!("abs_v_{reaction_id}");
            let magnitude = problem.add_new_variable(
                &magnitude_id,
                None,
                VariableType::Continuous,
                0.,
                lb.abs().max(ub.abs()),
            )?;
            let start = values.get(index).map_or(0., |v| v.abs());
            problem.set_initial_value(&magnitude_id, start)?;
            problem.add_new_inequality_constraint(
                &format!("abs_v_fwd_{reaction_id}"),
                &[(magnitude, 1.), (index, -1.)],
                0.,
                f64::INFINITY,
            )?;
            problem.add_new_inequality_constraint(
                &format!("abs_v_rev_{reaction_id}"),
                &[(magnitude, 1.), (index, 1.)],
                0.,
                f64::INFINITY,
            )?;
            total.add_term(magnitude, 1.);
        }
    }
    problem.set_objective(Expr::from(total), ObjectiveSense::Minimize)?;

    info!("Minimizing total flux at an objective of {optimum}");
    let parsimonious = solver.solve(&problem, &config.solver)?;
    let values = solved_values(&problem, &parsimonious)?;
    let solution = ProblemSolution {
        objective_value: Some(objective.evaluate(&values)),
        ..parsimonious
    };
    Ok((Formulation { problem, layout }, solution, values))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use indexmap::IndexMap;

    use crate::formulate::options::OptimizeOptionsBuilder;
    use crate::formulate::OptimizationKind;
    use crate::metabolic_model::model::NetworkModel;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use crate::optimize::solvers::clarabel::ClarabelSolver;

    /// a -> b -> c, with a futile cycle b <=> d -> b on the side
    fn cycling_network() -> NetworkModel {
        let mut network = NetworkModel::new_empty();
        for (id, substrate, product, reversible) in [
            ("r1", "a", "b", false),
            ("r2", "b", "c", false),
            ("r3", "b", "d", true),
            ("r4", "d", "b", false),
        ] {
            network.add_reaction(
                ReactionBuilder::default()
                    .id(id)
                    .substrate(substrate, 1.)
                    .product(product, 1.)
                    .reversible(reversible)
                    .build()
                    .unwrap(),
            );
        }
        network
    }

    #[test]
    fn futile_cycle_is_switched_off() {
        let network = cycling_network();
        let options = OptimizeOptionsBuilder::default()
            .objective(IndexMap::from([("r2".to_string(), 1.)]))
            .flux_bounds((-10., 10.))
            .parsimonious(true)
            .build()
            .unwrap();
        let results = network
            .optimize(OptimizationKind::Fba, options)
            .unwrap()
            .solve(&ClarabelSolver::new())
            .unwrap();
        // the flux objective is reported, not the total flux
        assert_abs_diff_eq!(results.objective(), 10., epsilon = 1e-6);
        let fluxes = results.fluxes();
        assert_abs_diff_eq!(fluxes["r1"], 10., epsilon = 1e-6);
        assert_abs_diff_eq!(fluxes["r2"], 10., epsilon = 1e-6);
        assert_abs_diff_eq!(fluxes["r3"], 0., epsilon = 1e-6);
        assert_abs_diff_eq!(fluxes["r4"], 0., epsilon = 1e-6);
    }

    #[test]
    fn minimizing_objectives_are_held_too() {
        let network = cycling_network();
        let options = OptimizeOptionsBuilder::default()
            .objective(IndexMap::from([("r2".to_string(), -1.)]))
            .direction(crate::optimize::objective::ObjectiveSense::Minimize)
            .flux_bounds((-10., 10.))
            .parsimonious(true)
            .build()
            .unwrap();
        let results = network
            .optimize(OptimizationKind::Fba, options)
            .unwrap()
            .solve(&ClarabelSolver::new())
            .unwrap();
        assert_abs_diff_eq!(results.objective(), -10., epsilon = 1e-6);
        assert_abs_diff_eq!(results.fluxes()["r3"], 0., epsilon = 1e-6);
    }
}
