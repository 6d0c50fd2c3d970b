//! Constraint-island counting. The presolve loop scales its convergence
//! target by the number of independent jointed groups, so one stubborn
//! chain does not hold every other group hostage.

use std::collections::HashSet;

use crate::core::dim::Dim;
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::JointDescriptor;
use crate::utils::allocator::{Arena, EntityId};

/// Count connected groups of jointed, simulated bodies. A joint is only
/// crossed away from a dynamic endpoint; immovable bodies terminate their
/// island rather than merging the groups hanging off them.
pub fn count_islands<D: Dim>(
    bodies: &Arena<RigidBody<D>>,
    descriptors: &Arena<JointDescriptor<D>>,
    simulated: &[EntityId],
) -> usize {
    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut stack: Vec<EntityId> = Vec::new();
    let mut islands = 0;

    for &root in simulated {
        let Some(body) = bodies.get(root) else {
            continue;
        };
        if body.constraints.is_empty() || visited.contains(&root) {
            continue;
        }
        islands += 1;
        visited.insert(root);
        stack.push(root);

        while let Some(current) = stack.pop() {
            let Some(body) = bodies.get(current) else {
                continue;
            };
            for &descriptor_id in &body.constraints {
                let Some(descriptor) = descriptors.get(descriptor_id) else {
                    continue;
                };
                let swap = descriptor.a.body != current;
                let (other, crossing) = if swap {
                    (descriptor.a.body, descriptor.b.is_dynamic(bodies))
                } else {
                    (descriptor.b.body, descriptor.a.is_dynamic(bodies))
                };
                if !crossing || !visited.insert(other) {
                    continue;
                }
                stack.push(other);
            }
        }
    }
    islands
}
