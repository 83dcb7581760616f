//! Definition validation and dependency-graph compilation.
//!
//! `validate` reports every structural problem in a definition at once.
//! `build_dependency_graph` compiles a valid definition into ordered parallel
//! levels: every step in level *i* depends only on steps in levels `< i`, so
//! each level can run concurrently once the previous one has settled.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use strata_types::workflow::{StepDefinition, WorkflowDefinition};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A single structural problem in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The workflow name is empty.
    EmptyName,
    /// The step at `index` has an empty key.
    EmptyStepKey { index: usize },
    /// Two or more steps share a key.
    DuplicateKey { key: String },
    /// A step depends on a key that no step defines.
    UnknownDependency { step: String, dependency: String },
    /// A step lists itself as a dependency.
    SelfDependency { step: String },
    /// The listed steps depend on each other in a cycle.
    Cycle { steps: Vec<String> },
    /// Level assignment stalled; these steps can never be scheduled.
    Unschedulable { steps: Vec<String> },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::EmptyName => write!(f, "workflow name must not be empty"),
            Violation::EmptyStepKey { index } => write!(f, "step #{index} has an empty key"),
            Violation::DuplicateKey { key } => write!(f, "duplicate step key '{key}'"),
            Violation::UnknownDependency { step, dependency } => {
                write!(f, "step '{step}' depends on unknown step '{dependency}'")
            }
            Violation::SelfDependency { step } => write!(f, "step '{step}' depends on itself"),
            Violation::Cycle { steps } => {
                write!(f, "dependency cycle among steps: {}", steps.join(", "))
            }
            Violation::Unschedulable { steps } => write!(
                f,
                "steps can never be scheduled (dependency cycle): {}",
                steps.join(", ")
            ),
        }
    }
}

/// A definition failed validation. Carries every violation found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid workflow definition: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

/// Compiled, immutable execution plan for a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Parallel levels in execution order. Keys keep definition order.
    pub levels: Vec<Vec<String>>,
    /// Concatenation of `levels`.
    pub topological_order: Vec<String>,
}

impl DependencyGraph {
    /// Index of the level containing `key`.
    pub fn level_of(&self, key: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|k| k == key))
    }

    /// Number of steps in the graph.
    pub fn len(&self) -> usize {
        self.topological_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topological_order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a definition, collecting every violation.
///
/// Checks:
/// - Workflow name and step keys are non-empty
/// - Step keys are unique
/// - Every `depends_on` entry names an existing step
/// - No step depends on itself
/// - The dependency relation is acyclic (each independent cycle reported)
pub fn validate(def: &WorkflowDefinition) -> Result<(), ValidationError> {
    let mut violations = structural_violations(def);
    violations.extend(find_cycles(&def.steps));

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

/// Every violation except cycles.
fn structural_violations(def: &WorkflowDefinition) -> Vec<Violation> {
    let mut violations = Vec::new();

    if def.name.trim().is_empty() {
        violations.push(Violation::EmptyName);
    }

    let mut keys = HashSet::new();
    let mut duplicates = HashSet::new();
    for (index, step) in def.steps.iter().enumerate() {
        if step.key.trim().is_empty() {
            violations.push(Violation::EmptyStepKey { index });
        } else if !keys.insert(step.key.as_str()) && duplicates.insert(step.key.as_str()) {
            violations.push(Violation::DuplicateKey {
                key: step.key.clone(),
            });
        }
    }

    let mut reported = HashSet::new();
    for step in &def.steps {
        for dep in &step.depends_on {
            if !reported.insert((step.key.as_str(), dep.as_str())) {
                continue;
            }
            if dep == &step.key {
                violations.push(Violation::SelfDependency {
                    step: step.key.clone(),
                });
            } else if !keys.contains(dep.as_str()) {
                violations.push(Violation::UnknownDependency {
                    step: step.key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    violations
}

/// Report each strongly connected component of more than one step.
///
/// Self-edges and unknown dependencies are skipped here; they have their own
/// violations.
fn find_cycles(steps: &[StepDefinition]) -> Vec<Violation> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for step in steps {
        nodes
            .entry(step.key.as_str())
            .or_insert_with(|| graph.add_node(step.key.as_str()));
    }

    for step in steps {
        let to = nodes[step.key.as_str()];
        for dep in &step.depends_on {
            if dep == &step.key {
                continue;
            }
            if let Some(&from) = nodes.get(dep.as_str()) {
                graph.update_edge(from, to, ());
            }
        }
    }

    let position: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .rev()
        .map(|(i, s)| (s.key.as_str(), i))
        .collect();

    let mut cycles: Vec<Vec<&str>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut keys: Vec<&str> = component.into_iter().map(|idx| graph[idx]).collect();
            keys.sort_by_key(|k| position[k]);
            keys
        })
        .collect();
    cycles.sort_by_key(|keys| position[keys[0]]);

    cycles
        .into_iter()
        .map(|keys| Violation::Cycle {
            steps: keys.into_iter().map(String::from).collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Level computation
// ---------------------------------------------------------------------------

/// Compile a definition into parallel levels.
///
/// Structural violations fail the build up front. Levels are then assigned by
/// peeling: each round takes every unleveled step whose dependencies are all
/// leveled. A round that makes no progress means the remaining steps sit on
/// or behind a cycle; the build fails naming them, never returning a partial
/// graph.
pub fn build_dependency_graph(
    def: &WorkflowDefinition,
) -> Result<DependencyGraph, ValidationError> {
    let violations = structural_violations(def);
    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    let mut leveled: HashSet<&str> = HashSet::with_capacity(def.steps.len());
    let mut remaining: Vec<&StepDefinition> = def.steps.iter().collect();
    let mut levels: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&StepDefinition>, Vec<&StepDefinition>) = remaining
            .into_iter()
            .partition(|s| s.depends_on.iter().all(|d| leveled.contains(d.as_str())));

        if ready.is_empty() {
            return Err(ValidationError {
                violations: vec![Violation::Unschedulable {
                    steps: blocked.iter().map(|s| s.key.clone()).collect(),
                }],
            });
        }

        leveled.extend(ready.iter().map(|s| s.key.as_str()));
        levels.push(ready.iter().map(|s| s.key.clone()).collect());
        remaining = blocked;
    }

    let topological_order = levels.iter().flatten().cloned().collect();
    Ok(DependencyGraph {
        levels,
        topological_order,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
