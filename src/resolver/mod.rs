//! Provisioning order for resource types.
//!
//! The dependency graph is restricted to the requested types plus everything
//! they transitively depend on, then sorted with Kahn's algorithm. Ties
//! between ready nodes go to the type declared first in the catalog, so the
//! order is stable from run to run.

use std::collections::BTreeSet;

use crate::error::HarnessError;
use crate::resources::ResourceCatalog;

/// Creation order of a run. Teardown is the exact reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOrder {
    order: Vec<String>,
}

impl ProvisionOrder {
    pub fn creation(&self) -> &[String] {
        &self.order
    }

    pub fn teardown(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }
}

/// Orders `requested` and their transitive dependencies so that every type
/// comes after all of its dependencies.
pub fn resolve<I>(catalog: &ResourceCatalog, requested: I) -> Result<ProvisionOrder, HarnessError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let specs = catalog.specs();

    // deps[i] holds the declaration indices node i depends on.
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let dependencies = spec.dependencies();
        let mut indices = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            let index = catalog.index_of(dep).ok_or_else(|| {
                HarnessError::config(format!(
                    "Resource type `{}` depends on unknown type `{dep}`",
                    spec.type_name
                ))
            })?;
            indices.push(index);
        }
        deps.push(indices);
    }

    let mut included = vec![false; specs.len()];
    let mut stack = Vec::new();
    for name in requested {
        let name = name.as_ref();
        let index = catalog
            .index_of(name)
            .ok_or_else(|| HarnessError::config(format!("Unknown resource type `{name}`")))?;
        stack.push(index);
    }
    while let Some(index) = stack.pop() {
        if !included[index] {
            included[index] = true;
            stack.extend(deps[index].iter().copied());
        }
    }

    let mut in_degree = vec![0usize; specs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    for (node, node_deps) in deps.iter().enumerate() {
        if !included[node] {
            continue;
        }
        for &dep in node_deps {
            in_degree[node] += 1;
            dependents[dep].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..specs.len())
        .filter(|&node| included[node] && in_degree[node] == 0)
        .collect();

    let mut order = Vec::new();
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    let remaining: Vec<usize> = (0..specs.len())
        .filter(|&node| included[node] && in_degree[node] > 0)
        .collect();
    if !remaining.is_empty() {
        let cycle = find_cycle(&deps, &remaining)
            .into_iter()
            .map(|index| specs[index].type_name.clone())
            .collect();
        return Err(HarnessError::CyclicDependency { cycle });
    }

    Ok(ProvisionOrder {
        order: order
            .into_iter()
            .map(|index| specs[index].type_name.clone())
            .collect(),
    })
}

/// Walks dependency edges among the unsorted nodes until one repeats. Every
/// node left over by Kahn's algorithm has an unsorted dependency, so the walk
/// always closes a cycle. The result starts and ends with the same node.
fn find_cycle(deps: &[Vec<usize>], remaining: &[usize]) -> Vec<usize> {
    let unsorted = |node: &usize| remaining.contains(node);
    let mut path = Vec::new();
    let Some(&start) = remaining.first() else {
        return path;
    };

    let mut current = start;
    loop {
        if let Some(position) = path.iter().position(|&node| node == current) {
            let mut cycle = path.split_off(position);
            cycle.push(current);
            return cycle;
        }
        path.push(current);
        match deps[current].iter().copied().find(unsorted) {
            Some(next) => current = next,
            None => return path,
        }
    }
}
