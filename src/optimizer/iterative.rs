use log::{debug, info};
use rand::rngs::StdRng;

use crate::config::QpConfig;
use crate::error::QpError;
use crate::plan::PlanNode;
use crate::query::SqlQuery;

use super::cost::cost_of;
use super::initial::InitialPlanBuilder;
use super::random_neighbor;

/// Hill climbing with random restarts: from each random initial plan,
/// repeatedly adopt the cheapest of a batch of sampled neighbors as long
/// as it strictly improves, then record the local minimum. The best local
/// minimum across all restarts wins, so the result is never worse than
/// the first initial plan.
pub struct IterativeImprovement<'a> {
    config: &'a QpConfig,
    query: &'a SqlQuery,
}

impl<'a> IterativeImprovement<'a> {
    pub fn new(config: &'a QpConfig, query: &'a SqlQuery) -> IterativeImprovement<'a> {
        IterativeImprovement { config, query }
    }

    pub fn optimize(&self, rng: &mut StdRng) -> Result<PlanNode, QpError> {
        let builder = InitialPlanBuilder::new(self.config, self.query);
        let num_joins = builder.num_joins();

        if num_joins == 0 {
            return builder.build(rng);
        }

        let mut best_plan: Option<PlanNode> = None;
        let mut best_cost = u64::MAX;
        let mut improvements = 0;

        for restart in 0..3 * num_joins {
            if improvements >= 10 {
                break;
            }
            let mut current = builder.build(rng)?;
            let mut current_cost = cost_of(self.config, &current)?;
            debug!("restart {}: initial cost {}", restart, current_cost);

            loop {
                let mut min_neighbor: Option<PlanNode> = None;
                let mut min_cost = current_cost;
                for _ in 0..2 * num_joins {
                    let mut neighbor = current.clone();
                    random_neighbor(&mut neighbor, rng)?;
                    let neighbor_cost = cost_of(self.config, &neighbor)?;
                    if neighbor_cost < min_cost {
                        min_cost = neighbor_cost;
                        min_neighbor = Some(neighbor);
                    }
                }
                match min_neighbor {
                    Some(plan) => {
                        current = plan;
                        current_cost = min_cost;
                    }
                    None => break,
                }
            }

            debug!("restart {}: local minimum cost {}", restart, current_cost);
            if current_cost < best_cost {
                best_cost = current_cost;
                best_plan = Some(current);
                improvements += 1;
            } else if best_plan.is_none() {
                // keep something even when no restart beats u64::MAX
                best_plan = Some(current);
                best_cost = current_cost;
            }
        }

        info!("iterative improvement: best cost {}", best_cost);
        best_plan.ok_or_else(|| QpError::Plan("no plan produced by search".to_string()))
    }
}
