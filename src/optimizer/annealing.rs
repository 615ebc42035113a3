use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::QpConfig;
use crate::error::QpError;
use crate::plan::PlanNode;
use crate::query::SqlQuery;

use super::cost::cost_of;
use super::initial::InitialPlanBuilder;
use super::random_neighbor;

// Annealing schedule: geometric cooling by ALPHA from an initial
// temperature proportional to the starting cost, down to END_TEMPERATURE.
const ALPHA: f64 = 0.85;
const END_TEMPERATURE: f64 = 1.0;
const INIT_TEMP_PARAM: f64 = 2.0;

/// Simulated annealing over the same neighbor space as iterative
/// improvement, with the Metropolis criterion for uphill moves. Can start
/// from a supplied plan, which makes it usable as a second-stage
/// refinement of another search's winner; the returned plan is never
/// costlier than that starting point.
pub struct SimulatedAnnealing<'a> {
    config: &'a QpConfig,
    query: &'a SqlQuery,
    start_plan: Option<PlanNode>,
}

impl<'a> SimulatedAnnealing<'a> {
    pub fn new(config: &'a QpConfig, query: &'a SqlQuery) -> SimulatedAnnealing<'a> {
        SimulatedAnnealing { config, query, start_plan: None }
    }

    pub fn with_start_plan(
        config: &'a QpConfig,
        query: &'a SqlQuery,
        start_plan: PlanNode,
    ) -> SimulatedAnnealing<'a> {
        SimulatedAnnealing { config, query, start_plan: Some(start_plan) }
    }

    pub fn optimize(mut self, rng: &mut StdRng) -> Result<PlanNode, QpError> {
        let builder = InitialPlanBuilder::new(self.config, self.query);
        let num_joins = builder.num_joins();

        let initial = match self.start_plan.take() {
            Some(plan) => plan,
            None => builder.build(rng)?,
        };
        if num_joins == 0 {
            return Ok(initial);
        }

        let mut best_cost = cost_of(self.config, &initial)?;
        let mut best_plan = initial;

        for restart in 0..2 * num_joins {
            // Fresh random starting point for every restart after the first.
            let (mut restart_best, mut restart_cost) = if restart == 0 {
                (best_plan.clone(), best_cost)
            } else {
                let plan = builder.build(rng)?;
                let cost = cost_of(self.config, &plan)?;
                (plan, cost)
            };
            debug!("restart {}: starting cost {}", restart, restart_cost);

            let mut temperature = restart_cost as f64 * INIT_TEMP_PARAM;
            while temperature > END_TEMPERATURE {
                let mut current = restart_best.clone();
                let mut current_cost = restart_cost;

                for _ in 0..10 * num_joins {
                    let mut neighbor = current.clone();
                    random_neighbor(&mut neighbor, rng)?;
                    let neighbor_cost = cost_of(self.config, &neighbor)?;
                    if neighbor_cost <= current_cost
                        || self.accept_uphill(temperature, neighbor_cost, current_cost, rng)
                    {
                        current = neighbor;
                        current_cost = neighbor_cost;
                    }
                }

                if current_cost < restart_cost {
                    restart_best = current;
                    restart_cost = current_cost;
                }
                temperature *= ALPHA;
            }

            debug!("restart {}: settled at cost {}", restart, restart_cost);
            if restart_cost < best_cost {
                best_cost = restart_cost;
                best_plan = restart_best;
            }
        }

        info!("simulated annealing: best cost {}", best_cost);
        Ok(best_plan)
    }

    /// Metropolis criterion: accept a worse neighbor with probability
    /// exp(-|delta| / T).
    fn accept_uphill(
        &self,
        temperature: f64,
        neighbor_cost: u64,
        current_cost: u64,
        rng: &mut StdRng,
    ) -> bool {
        let delta = neighbor_cost.abs_diff(current_cost) as f64;
        let probability = (-delta / temperature).exp();
        rng.gen::<f64>() < probability
    }
}
