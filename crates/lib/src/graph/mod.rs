//! Stage graph: the validated DAG of build stages.
//!
//! Edges run from an upstream stage to the stage that consumes its
//! artifacts. Construction rejects cycles, dangling references and
//! duplicate declarations before anything executes.

pub mod resolve;

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use thiserror::Error;

use crate::descriptor::{BuildDescriptor, StageId, StageSpec};

pub use resolve::{ResolveError, ResolvedPlatforms, resolve_all, resolve_effective_platform};

/// Structural problems in a descriptor, detected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("descriptor declares no stages")]
  Empty,

  #[error("invalid stage id '{0}': ids name a directory and may not be empty or contain '/', '\\' or '..'")]
  InvalidStageId(StageId),

  #[error("stage '{0}' is declared more than once")]
  DuplicateStage(StageId),

  #[error("stage '{stage}' consumes from unknown stage '{upstream}'")]
  UnknownUpstream { stage: StageId, upstream: StageId },

  #[error("stage '{stage}' consumes '{path}' but stage '{upstream}' does not export it")]
  UnknownArtifact {
    stage: StageId,
    upstream: StageId,
    path: String,
  },

  #[error("stage '{stage}' exports '{path}' more than once")]
  DuplicateArtifact { stage: StageId, path: String },

  #[error("stage '{stage}' receives more than one artifact at '{dest}'")]
  DuplicateDestination { stage: StageId, dest: String },

  #[error("target stage '{0}' does not exist")]
  UnknownTarget(StageId),

  #[error("dependency cycle between stages: {}", join_ids(.stages))]
  Cycle { stages: Vec<StageId> },
}

fn join_ids(ids: &[StageId]) -> String {
  ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(" -> ")
}

/// Stage ids become directory names, so they must be a single plain path
/// component.
fn is_valid_stage_id(id: &StageId) -> bool {
  let id = id.as_str();
  !id.is_empty() && id != "." && !id.contains("..") && !id.contains(['/', '\\'])
}

/// A validated, acyclic graph of build stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
  graph: DiGraph<StageId, ()>,
  nodes: HashMap<StageId, NodeIndex>,
  stages: Vec<StageSpec>,
  terminal: StageId,
}

impl StageGraph {
  /// Validate a descriptor and build its graph.
  pub fn from_descriptor(descriptor: &BuildDescriptor) -> Result<Self, GraphError> {
    let terminal = descriptor.terminal().cloned().ok_or(GraphError::Empty)?;

    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for stage in &descriptor.stages {
      if !is_valid_stage_id(&stage.id) {
        return Err(GraphError::InvalidStageId(stage.id.clone()));
      }
      if nodes.contains_key(&stage.id) {
        return Err(GraphError::DuplicateStage(stage.id.clone()));
      }
      let mut seen = HashSet::new();
      for artifact in &stage.artifacts {
        if !seen.insert(artifact.path.as_str()) {
          return Err(GraphError::DuplicateArtifact {
            stage: stage.id.clone(),
            path: artifact.path.clone(),
          });
        }
      }
      nodes.insert(stage.id.clone(), graph.add_node(stage.id.clone()));
    }

    if !nodes.contains_key(&terminal) {
      return Err(GraphError::UnknownTarget(terminal));
    }

    for stage in &descriptor.stages {
      let dependent = nodes[&stage.id];
      let mut destinations = HashSet::new();

      for r in &stage.consumes {
        let Some(&upstream) = nodes.get(&r.stage) else {
          return Err(GraphError::UnknownUpstream {
            stage: stage.id.clone(),
            upstream: r.stage.clone(),
          });
        };

        let exported = descriptor
          .stage(&r.stage)
          .is_some_and(|up| up.artifact(&r.path).is_some());
        if !exported {
          return Err(GraphError::UnknownArtifact {
            stage: stage.id.clone(),
            upstream: r.stage.clone(),
            path: r.path.clone(),
          });
        }

        if !destinations.insert(r.destination()) {
          return Err(GraphError::DuplicateDestination {
            stage: stage.id.clone(),
            dest: r.destination().to_string(),
          });
        }

        graph.update_edge(upstream, dependent, ());
      }
    }

    let dag = Self {
      graph,
      nodes,
      stages: descriptor.stages.clone(),
      terminal,
    };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), GraphError> {
    if toposort(&self.graph, None).is_ok() {
      return Ok(());
    }

    // Report the members of the first cycle found, in declaration order.
    let cyclic = tarjan_scc(&self.graph)
      .into_iter()
      .find(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
      .unwrap_or_default();
    let members: HashSet<&StageId> = cyclic.iter().map(|&idx| &self.graph[idx]).collect();
    let stages = self
      .stages
      .iter()
      .filter(|s| members.contains(&s.id))
      .map(|s| s.id.clone())
      .collect();

    Err(GraphError::Cycle { stages })
  }

  pub fn len(&self) -> usize {
    self.stages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }

  /// Stages in declaration order.
  pub fn stages(&self) -> &[StageSpec] {
    &self.stages
  }

  pub fn stage(&self, id: &StageId) -> Option<&StageSpec> {
    self.stages.iter().find(|s| &s.id == id)
  }

  pub fn contains(&self, id: &StageId) -> bool {
    self.nodes.contains_key(id)
  }

  /// The terminal ("runtime") stage whose success defines build success.
  pub fn terminal(&self) -> &StageId {
    &self.terminal
  }

  /// Direct upstream stages, in declaration order.
  pub fn upstream(&self, id: &StageId) -> Vec<StageId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct downstream stages, in declaration order.
  pub fn downstream(&self, id: &StageId) -> Vec<StageId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &StageId, dir: Direction) -> Vec<StageId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    let found: HashSet<&StageId> = self.graph.neighbors_directed(idx, dir).map(|n| &self.graph[n]).collect();
    self.ordered(|s| found.contains(s))
  }

  /// Every stage that depends on `id`, directly or transitively.
  pub fn dependents(&self, id: &StageId) -> Vec<StageId> {
    let Some(&start) = self.nodes.get(id) else {
      return Vec::new();
    };
    let mut found = HashSet::new();
    let mut dfs = Dfs::new(&self.graph, start);
    while let Some(idx) = dfs.next(&self.graph) {
      if idx != start {
        found.insert(&self.graph[idx]);
      }
    }
    self.ordered(|s| found.contains(s))
  }

  /// The terminal stage and every stage it transitively depends on.
  pub fn required_for_terminal(&self) -> BTreeSet<StageId> {
    let start = self.nodes[&self.terminal];
    let reversed = Reversed(&self.graph);
    let mut found = BTreeSet::new();
    let mut dfs = Dfs::new(reversed, start);
    while let Some(idx) = dfs.next(reversed) {
      found.insert(self.graph[idx].clone());
    }
    found
  }

  /// Stage ids with dependencies before dependents, ties in declaration order.
  pub fn topological_order(&self) -> Vec<StageId> {
    self.waves().into_iter().flatten().collect()
  }

  /// Stages grouped into levels: every stage's upstreams sit in earlier waves.
  pub fn waves(&self) -> Vec<Vec<StageId>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: HashSet<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();
      if ready.is_empty() {
        // Unreachable for a validated graph.
        break;
      }

      for idx in &ready {
        remaining.remove(idx);
        for next in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&next) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let ids: HashSet<&StageId> = ready.iter().map(|&idx| &self.graph[idx]).collect();
      waves.push(self.ordered(|s| ids.contains(s)));
    }

    waves
  }

  fn ordered(&self, keep: impl Fn(&StageId) -> bool) -> Vec<StageId> {
    self.stages.iter().map(|s| &s.id).filter(|id| keep(id)).cloned().collect()
  }
}
