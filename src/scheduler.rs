//! Dependency scheduler.
//!
//! Creating a task happens in two steps. First the transitive dependency
//! closure of the requested task is collected from the registry into a small
//! graph, which is checked for missing tasks and cycles before anything runs.
//! Then the graph is executed: every node whose dependencies are satisfied is
//! spawned onto a [`JoinSet`], and finishing a node unlocks its dependents.
//!
//! Each node goes through [`RunState`], so a task runs at most once per
//! cycle no matter how many plans (or concurrent callers) include it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{Graph, NodeIndex};
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::Fixture;
use crate::error::{FixtureError, Result};
use crate::example;
use crate::registry::Registry;
use crate::task::Task;
use crate::utils::lock;

/// Per-name run-once cells.
///
/// A task counts as run once its cell is initialized. Concurrent runs of the
/// same task wait on the same cell instead of executing it twice. Cleaning a
/// task drops its cell so the next cycle starts fresh.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    cells: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl RunState {
    fn cell(&self, name: &str) -> Arc<OnceCell<()>> {
        lock(&self.cells)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn has_run(&self, name: &str) -> bool {
        lock(&self.cells)
            .get(name)
            .is_some_and(|cell| cell.initialized())
    }

    pub fn reset(&self, name: &str) {
        lock(&self.cells).remove(name);
    }
}

/// The dependency closure of one requested task. Edges point from a
/// dependency to its dependent.
pub(crate) struct Plan {
    graph: Graph<Arc<Task>, ()>,
    target: NodeIndex,
}

impl Plan {
    pub fn target(&self) -> &Arc<Task> {
        &self.graph[self.target]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[cfg(test)]
    fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .graph
            .node_weights()
            .map(|task| task.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Collects everything `name` needs before it can run.
pub(crate) fn plan(registry: &Registry, name: &str) -> Result<Plan> {
    let root = registry.require(name)?.clone();

    let mut graph = Graph::new();
    let mut indices = HashMap::new();

    let target = graph.add_node(root.clone());
    indices.insert(root.name.clone(), target);

    let mut pending = vec![target];
    while let Some(index) = pending.pop() {
        let task = graph[index].clone();

        for dependency in &task.dependencies {
            let dependency_index = match indices.get(dependency) {
                Some(&found) => found,
                None => {
                    let found = registry.get(dependency).ok_or_else(|| {
                        FixtureError::dependency(name, FixtureError::UnknownTask(dependency.clone()))
                    })?;

                    let added = graph.add_node(found.clone());
                    indices.insert(dependency.clone(), added);
                    pending.push(added);
                    added
                }
            };

            graph.add_edge(dependency_index, index, ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        return Err(FixtureError::DependencyCycle(describe_cycle(
            &graph,
            cycle.node_id(),
        )));
    }

    Ok(Plan { graph, target })
}

/// Names of the tasks in the strongly connected component holding `node`,
/// with the first name repeated at the end.
fn describe_cycle(graph: &Graph<Arc<Task>, ()>, node: NodeIndex) -> Vec<String> {
    let component = tarjan_scc(graph)
        .into_iter()
        .find(|component| component.contains(&node))
        .unwrap_or_else(|| vec![node]);

    let mut names: Vec<_> = component
        .iter()
        .map(|&index| graph[index].name.clone())
        .collect();
    names.sort();

    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    names
}

/// Runs the dependency closure of `name` and returns the value it stored.
pub(crate) async fn start(fixture: &Fixture, name: &str) -> Result<Option<Value>> {
    let plan = {
        let registry = fixture.registry();
        plan(&registry, name)?
    };

    tracing::debug!(task = name, nodes = plan.len(), "starting task");
    execute(fixture, plan).await?;

    Ok(fixture.get(name))
}

/// Nodes spawned by one [`execute`] call.
///
/// Started work is never cancelled. Dropping the set, whether on an error or
/// because the caller stopped polling, detaches the nodes still running.
struct Running(JoinSet<(NodeIndex, Result<()>)>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

/// Executes a plan, spawning nodes as soon as their dependencies are done.
///
/// The first failure stops new nodes from being spawned. Nodes already
/// running are left to finish.
pub(crate) async fn execute(fixture: &Fixture, plan: Plan) -> Result<()> {
    let Plan { graph, target } = plan;
    let requested = graph[target].name.clone();

    // Build a map from a dependency to the nodes that depend on it.
    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    let mut dependency_counts: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|index| {
            (
                index,
                graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count(),
            )
        })
        .collect();

    let total_tasks = graph.node_count();
    let mut completed_tasks = 0;

    let mut running = Running(JoinSet::new());

    let spawn_task = |running: &mut JoinSet<(NodeIndex, Result<()>)>, index: NodeIndex| {
        let task = graph[index].clone();
        let fixture = fixture.clone();
        let span = tracing::debug_span!("task", name = %task.name);

        running.spawn(
            async move {
                let result = run_node(&fixture, task).await;
                (index, result)
            }
            .instrument(span),
        );
    };

    // Seed the nodes without dependencies
    for index in graph.node_indices() {
        if dependency_counts.get(&index).copied().unwrap_or(0) == 0 {
            spawn_task(&mut running.0, index);
        }
    }

    while completed_tasks < total_tasks {
        let Some(joined) = running.0.join_next().await else {
            return Err(FixtureError::task(
                requested,
                anyhow::anyhow!("scheduler stalled after {completed_tasks} of {total_tasks} tasks"),
            ));
        };

        let (completed, result) = match joined {
            Ok(joined) => joined,
            Err(err) => return Err(FixtureError::dependency(requested, err.into())),
        };

        if let Err(err) = result {
            tracing::debug!(task = %requested, error = %err, "task failed, abandoning the rest");
            return Err(FixtureError::dependency(requested, err));
        }

        completed_tasks += 1;

        // Unlock dependents
        if let Some(unlocked) = dependents.get(&completed) {
            for &index in unlocked {
                if let Some(count) = dependency_counts.get_mut(&index) {
                    *count -= 1;
                    if *count == 0 {
                        spawn_task(&mut running.0, index);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_node(fixture: &Fixture, task: Arc<Task>) -> Result<()> {
    let cell = fixture.run_state().cell(&task.name);

    if cell.initialized() {
        tracing::debug!(task = %task.name, "already ran task");
        return Ok(());
    }

    cell.get_or_try_init(|| run_task(fixture, &task)).await?;
    Ok(())
}

async fn run_task(fixture: &Fixture, task: &Arc<Task>) -> Result<()> {
    tracing::debug!(task = %task.name, "running task");

    if let Some(initialize) = &task.initialize {
        initialize(fixture).map_err(|err| FixtureError::task(&task.name, err))?;
        tracing::debug!(task = %task.name, "ran initialize");
    }

    fixture.push_cleanup(task.clone());
    tracing::debug!(task = %task.name, "added clean up task");

    if let Some(example) = example::produce(task)? {
        let value = match &task.create {
            Some(create) => create(fixture.clone(), example)
                .await
                .map_err(|err| FixtureError::task(&task.name, err))?,
            None => example,
        };

        tracing::debug!(task = %task.name, %value, "stored value");
        fixture.insert(&task.name, value);
    }

    Ok(())
}
