//! Deployment ordering.
//!
//! Dependencies are implicit: a unit depends on every unit one of its arguments references.
//! The order is a topological sort of that graph where ties are broken by declaration order,
//! so the same manifest always deploys in the same sequence.

use std::collections::{BTreeSet, HashMap};

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

use crate::{CycleError, DeploymentUnit, UnitId};

/// Dependency graph over a slice of units.
///
/// Node `i` is `units[i]`; an edge `a -> b` means `b` depends on `a`. References to ids that are
/// not part of the slice produce no edge.
pub struct DependencyGraph<'a> {
    units: &'a [DeploymentUnit],
    graph: DiGraph<(), ()>,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(units: &'a [DeploymentUnit]) -> Self {
        let mut graph = DiGraph::with_capacity(units.len(), units.len());
        for _ in units {
            graph.add_node(());
        }

        let index: HashMap<&str, usize> = units
            .iter()
            .enumerate()
            .map(|(i, unit)| (unit.id.as_str(), i))
            .collect();

        for (i, unit) in units.iter().enumerate() {
            for dependency in unit.dependencies() {
                if let Some(&j) = index.get(dependency.as_str()) {
                    graph.update_edge(NodeIndex::new(j), NodeIndex::new(i), ());
                }
            }
        }

        Self { units, graph }
    }

    /// Ids of the units that `units[index]` directly depends on, in declaration order.
    pub fn dependencies_of(&self, index: usize) -> Vec<&'a UnitId> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
            .map(NodeIndex::index)
            .collect();
        deps.sort_unstable();
        deps.into_iter().map(|i| &self.units[i].id).collect()
    }

    /// Topologically sort the units (Kahn's algorithm, smallest declaration index first).
    pub fn sorted(&self) -> Result<Vec<&'a DeploymentUnit>, CycleError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.units.len());
        while let Some(i) = ready.pop_first() {
            order.push(&self.units[i]);
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
            {
                let j = next.index();
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() < self.units.len() {
            return Err(self.cycle_error());
        }

        Ok(order)
    }

    /// Name the members of the first cycle, by declaration order of its earliest member.
    fn cycle_error(&self) -> CycleError {
        let mut cycles: Vec<Vec<usize>> = tarjan_scc(&self.graph)
            .into_iter()
            .map(|component| {
                let mut members: Vec<usize> = component.iter().map(|n| n.index()).collect();
                members.sort_unstable();
                members
            })
            .filter(|members| {
                members.len() > 1 || {
                    let node = NodeIndex::new(members[0]);
                    self.graph.contains_edge(node, node)
                }
            })
            .collect();
        cycles.sort();

        let members = cycles
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|i| self.units[i].id.clone())
            .collect();

        CycleError { members }
    }
}

/// Resolve the deployment order of `units`.
///
/// Every unit appears after all the units it depends on. Fails with [`CycleError`] if the
/// dependency graph is cyclic.
pub fn resolve_order(units: &[DeploymentUnit]) -> Result<Vec<&DeploymentUnit>, CycleError> {
    DependencyGraph::new(units).sorted()
}
