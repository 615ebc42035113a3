/*
    Randomized plan search. The two strategies (iterative improvement and
    simulated annealing) share the neighbor moves defined here: pick a join
    node by its stable index, then either re-tag its join method, commute
    its children, or rotate an adjacent pair of joins associatively.
    Every structural move is followed by a full bottom-up schema refresh.
 */

use log::debug;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::QpError;
use crate::plan::{JoinMethod, PlanKind, PlanNode};
use crate::query::Condition;

pub mod annealing;
pub mod cost;
pub mod initial;
pub mod iterative;

pub use annealing::SimulatedAnnealing;
pub use iterative::IterativeImprovement;

/// Applies one uniformly random neighbor move in place. The plan must
/// contain at least one join node.
pub fn random_neighbor(plan: &mut PlanNode, rng: &mut StdRng) -> Result<(), QpError> {
    let num_joins = plan.num_joins();
    let node_index = rng.gen_range(0..num_joins);
    match rng.gen_range(0..3) {
        0 => neighbor_method(plan, node_index, rng),
        1 => neighbor_commutative(plan, node_index),
        _ => neighbor_associative(plan, node_index, rng),
    }
}

/// Re-tags the addressed join with a different, uniformly random method.
pub(crate) fn neighbor_method(
    plan: &mut PlanNode,
    node_index: usize,
    rng: &mut StdRng,
) -> Result<(), QpError> {
    debug!("neighbor: method change at join {}", node_index);
    let node = find_join(plan, node_index)?;
    if let PlanKind::Join { method, conditions, .. } = &mut node.kind {
        let candidates = JoinMethod::candidates(conditions);
        let mut next = candidates[rng.gen_range(0..candidates.len())];
        while next == *method {
            next = candidates[rng.gen_range(0..candidates.len())];
        }
        *method = next;
    }
    Ok(())
}

/// Swaps the addressed join's children and flips its conditions.
pub(crate) fn neighbor_commutative(plan: &mut PlanNode, node_index: usize) -> Result<(), QpError> {
    debug!("neighbor: commute join {}", node_index);
    let node = find_join(plan, node_index)?;
    if let PlanKind::Join { left, right, conditions, .. } = &mut node.kind {
        std::mem::swap(left, right);
        for condition in conditions.iter_mut() {
            condition.flip();
        }
    }
    plan.refresh_schema()
}

/// Rotates the addressed join with a join child, if it has one. With two
/// join children the direction is a coin flip; with none the move is a
/// no-op (a lone join has nothing to associate with).
pub(crate) fn neighbor_associative(
    plan: &mut PlanNode,
    node_index: usize,
    rng: &mut StdRng,
) -> Result<(), QpError> {
    debug!("neighbor: associative rotation at join {}", node_index);
    let node = find_join(plan, node_index)?;
    let owned = std::mem::replace(node, PlanNode::placeholder());
    *node = rotate(owned, rng);
    plan.refresh_schema()
}

fn find_join(plan: &mut PlanNode, node_index: usize) -> Result<&mut PlanNode, QpError> {
    plan.find_join_mut(node_index)
        .ok_or_else(|| QpError::Plan(format!("no join node with index {}", node_index)))
}

fn rotate(node: PlanNode, rng: &mut StdRng) -> PlanNode {
    let (limit, offset) = (node.limit, node.offset);
    let mut rotated = match node.kind {
        PlanKind::Join { left, right, conditions, method, node_index } => {
            let left_is_join = matches!(left.kind, PlanKind::Join { .. });
            let right_is_join = matches!(right.kind, PlanKind::Join { .. });
            let rotate_left = match (left_is_join, right_is_join) {
                (true, false) => true,
                (false, true) => false,
                (true, true) => rng.gen_bool(0.5),
                (false, false) => {
                    // A X B has no adjacent join to rotate with.
                    return rebuild_join(left, right, conditions, method, node_index);
                }
            };
            if rotate_left {
                rotate_left_to_right(*left, right, conditions, method, node_index)
            } else {
                rotate_right_to_left(left, *right, conditions, method, node_index)
            }
        }
        other => PlanNode::new(other, node.schema),
    };
    rotated.limit = limit;
    rotated.offset = offset;
    rotated
}

/// (A X B) X C becomes A X (B X C), or B X (A X C) when the outer
/// condition's left attribute lives under A rather than B (the retained
/// inner condition is flipped in that case).
fn rotate_left_to_right(
    left: PlanNode,
    right: Box<PlanNode>,
    outer_conds: Vec<Condition>,
    outer_method: JoinMethod,
    outer_index: usize,
) -> PlanNode {
    let (left_left, left_right, mut inner_conds, inner_method, inner_index) =
        match left.kind {
            PlanKind::Join { left, right, conditions, method, node_index } => {
                (left, right, conditions, method, node_index)
            }
            _ => unreachable!("rotation direction checked by caller"),
        };
    let outer_attr = &outer_conds[0].lhs;
    if left_right.schema.contains(outer_attr) {
        let inner = rebuild_join(left_right, right, outer_conds, outer_method, outer_index);
        rebuild_join(left_left, Box::new(inner), inner_conds, inner_method, inner_index)
    } else {
        let inner = rebuild_join(left_left, right, outer_conds, outer_method, outer_index);
        for condition in inner_conds.iter_mut() {
            condition.flip();
        }
        rebuild_join(left_right, Box::new(inner), inner_conds, inner_method, inner_index)
    }
}

/// A X (B X C) becomes (A X B) X C, or (A X C) X B when the outer
/// condition's right attribute lives under C rather than B.
fn rotate_right_to_left(
    left: Box<PlanNode>,
    right: PlanNode,
    outer_conds: Vec<Condition>,
    outer_method: JoinMethod,
    outer_index: usize,
) -> PlanNode {
    let (right_left, right_right, mut inner_conds, inner_method, inner_index) =
        match right.kind {
            PlanKind::Join { left, right, conditions, method, node_index } => {
                (left, right, conditions, method, node_index)
            }
            _ => unreachable!("rotation direction checked by caller"),
        };
    let outer_attr = outer_conds[0].rhs_attr();
    if right_left.schema.contains(outer_attr) {
        let inner = rebuild_join(left, right_left, outer_conds, outer_method, outer_index);
        rebuild_join(Box::new(inner), right_right, inner_conds, inner_method, inner_index)
    } else {
        let inner = rebuild_join(left, right_right, outer_conds, outer_method, outer_index);
        for condition in inner_conds.iter_mut() {
            condition.flip();
        }
        rebuild_join(Box::new(inner), right_left, inner_conds, inner_method, inner_index)
    }
}

fn rebuild_join(
    left: Box<PlanNode>,
    right: Box<PlanNode>,
    conditions: Vec<Condition>,
    method: JoinMethod,
    node_index: usize,
) -> PlanNode {
    let schema = left.schema.join_with(&right.schema);
    PlanNode::new(
        PlanKind::Join { left, right, conditions, method, node_index },
        schema,
    )
}
