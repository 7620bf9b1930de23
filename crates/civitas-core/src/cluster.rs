//! Single-linkage spatial clustering over agent positions.
//!
//! Two agents are linked when their planar (x, z) distance is at most the
//! cluster radius; a cluster is a connected component of that graph. Height
//! is ignored for linking but averaged into the cluster center.

use civitas_types::{AgentId, Position};
use serde::{Deserialize, Serialize};

/// A connected group of agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Members in input order.
    pub members: Vec<AgentId>,
    /// Mean position of the members.
    pub center: Position,
}

impl Cluster {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Every unordered pair of members.
    pub fn pairs(&self) -> impl Iterator<Item = (&AgentId, &AgentId)> {
        self.members
            .iter()
            .enumerate()
            .flat_map(move |(i, a)| self.members.iter().skip(i.saturating_add(1)).map(move |b| (a, b)))
    }
}

/// Partition `points` into single-linkage clusters.
///
/// Every point lands in exactly one cluster, singletons included. Clusters
/// are ordered by their first member's position in the input.
pub fn single_linkage(points: &[(AgentId, Position)], radius: f64) -> Vec<Cluster> {
    let mut assigned = vec![false; points.len()];
    let mut clusters = Vec::new();

    for start in 0..points.len() {
        match assigned.get_mut(start) {
            Some(flag) if !*flag => *flag = true,
            _ => continue,
        }

        let mut component = vec![start];
        let mut frontier = vec![start];
        while let Some(i) = frontier.pop() {
            let Some((_, here)) = points.get(i) else {
                continue;
            };
            for (j, (_, there)) in points.iter().enumerate() {
                let Some(flag) = assigned.get_mut(j) else {
                    continue;
                };
                if !*flag && here.planar_distance(there) <= radius {
                    *flag = true;
                    component.push(j);
                    frontier.push(j);
                }
            }
        }
        component.sort_unstable();

        let members: Vec<&(AgentId, Position)> =
            component.iter().filter_map(|&i| points.get(i)).collect();
        clusters.push(Cluster {
            members: members.iter().map(|(id, _)| id.clone()).collect(),
            center: centroid(members.iter().map(|(_, p)| p)),
        });
    }

    clusters
}

fn centroid<'a>(positions: impl Iterator<Item = &'a Position>) -> Position {
    let mut sum = Position::new(0.0, 0.0, 0.0);
    let mut n = 0_u32;
    for p in positions {
        sum.x += p.x;
        sum.y += p.y;
        sum.z += p.z;
        n = n.saturating_add(1);
    }
    if n == 0 {
        return sum;
    }
    let n = f64::from(n);
    Position::new(sum.x / n, sum.y / n, sum.z / n)
}
