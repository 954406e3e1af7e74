//! Bounded graph traversal over the typed edge set.
//!
//! BFS keeps a global visited set, so every node is reached at most once and
//! a `target` hit is by construction a shortest path. DFS keeps a per-path
//! visited set (marked on entry, unmarked on backtrack), so one node may
//! appear on many paths but never twice within a single path. Both
//! strategies filter edges by relation type at neighbor enumeration.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::StoredEdge;

/// Traversal strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalStrategy {
    Bfs,
    Dfs,
}

/// One discovered path: the node ids from the start (inclusive), the edges
/// connecting them, and the depth (number of edges).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraversalPath {
    pub entities: Vec<Uuid>,
    pub edges: Vec<StoredEdge>,
    pub depth: usize,
}

impl TraversalPath {
    pub fn last(&self) -> Uuid {
        *self.entities.last().expect("path always contains the start")
    }
}

/// Traversal options.
#[derive(Debug, Clone, Default)]
pub struct TraverseOptions {
    pub strategy: Option<TraversalStrategy>,
    pub max_depth: Option<usize>,
    pub rel_filter: Option<Vec<String>>,
    pub target: Option<Uuid>,
}

/// Graph traversal over a neighbor function, decoupled from storage so the
/// algorithms are testable on synthetic adjacency.
pub struct GraphTraversal {
    max_depth: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 3;

impl GraphTraversal {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn traverse<F>(
        &self,
        start: Uuid,
        neighbors: &F,
        strategy: TraversalStrategy,
        rel_filter: Option<&[String]>,
        target: Option<Uuid>,
    ) -> Result<Vec<TraversalPath>>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        if let Some(target) = target {
            if target == start {
                return Ok(vec![TraversalPath {
                    entities: vec![start],
                    edges: Vec::new(),
                    depth: 0,
                }]);
            }
        }
        if self.max_depth == 0 {
            return Ok(Vec::new());
        }
        match strategy {
            TraversalStrategy::Bfs => self.bfs(start, neighbors, rel_filter, target),
            TraversalStrategy::Dfs => self.dfs(start, neighbors, rel_filter, target),
        }
    }

    fn bfs<F>(
        &self,
        start: Uuid,
        neighbors: &F,
        rel_filter: Option<&[String]>,
        target: Option<Uuid>,
    ) -> Result<Vec<TraversalPath>>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        let mut paths = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::from([start]);
        let mut queue: VecDeque<TraversalPath> = VecDeque::from([TraversalPath {
            entities: vec![start],
            edges: Vec::new(),
            depth: 0,
        }]);

        while let Some(path) = queue.pop_front() {
            if path.depth >= self.max_depth {
                continue;
            }
            for edge in filtered(neighbors(path.last())?, rel_filter) {
                let next = edge.dst_id;
                if visited.contains(&next) {
                    continue;
                }
                visited.insert(next);

                let mut extended = path.clone();
                extended.entities.push(next);
                extended.edges.push(edge);
                extended.depth += 1;
                paths.push(extended.clone());

                if target == Some(next) {
                    // First hit in BFS order is the shortest path.
                    return Ok(vec![extended]);
                }
                queue.push_back(extended);
            }
        }
        Ok(paths)
    }

    fn dfs<F>(
        &self,
        start: Uuid,
        neighbors: &F,
        rel_filter: Option<&[String]>,
        target: Option<Uuid>,
    ) -> Result<Vec<TraversalPath>>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        let mut paths = Vec::new();
        let mut on_path: HashSet<Uuid> = HashSet::new();
        let seed = TraversalPath {
            entities: vec![start],
            edges: Vec::new(),
            depth: 0,
        };
        self.dfs_visit(&seed, neighbors, rel_filter, target, &mut on_path, &mut paths)?;
        Ok(paths)
    }

    fn dfs_visit<F>(
        &self,
        path: &TraversalPath,
        neighbors: &F,
        rel_filter: Option<&[String]>,
        target: Option<Uuid>,
        on_path: &mut HashSet<Uuid>,
        paths: &mut Vec<TraversalPath>,
    ) -> Result<()>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        if path.depth >= self.max_depth {
            return Ok(());
        }
        let current = path.last();
        on_path.insert(current);

        for edge in filtered(neighbors(current)?, rel_filter) {
            let next = edge.dst_id;
            if on_path.contains(&next) {
                continue;
            }
            let mut extended = path.clone();
            extended.entities.push(next);
            extended.edges.push(edge);
            extended.depth += 1;
            paths.push(extended.clone());

            if target == Some(next) {
                // Target terminates this branch only; siblings continue.
                continue;
            }
            self.dfs_visit(&extended, neighbors, rel_filter, target, on_path, paths)?;
        }

        on_path.remove(&current);
        Ok(())
    }

    /// Shortest path (BFS with target); `None` when unreachable.
    pub fn shortest_path<F>(
        &self,
        src: Uuid,
        dst: Uuid,
        neighbors: &F,
        rel_filter: Option<&[String]>,
    ) -> Result<Option<TraversalPath>>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        let mut paths = self.traverse(src, neighbors, TraversalStrategy::Bfs, rel_filter, Some(dst))?;
        Ok(paths
            .pop()
            .filter(|p| p.last() == dst))
    }

    /// All simple paths from `src` to `dst` within the depth bound (DFS).
    pub fn all_paths<F>(
        &self,
        src: Uuid,
        dst: Uuid,
        neighbors: &F,
        rel_filter: Option<&[String]>,
    ) -> Result<Vec<TraversalPath>>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        let paths = self.traverse(src, neighbors, TraversalStrategy::Dfs, rel_filter, Some(dst))?;
        Ok(paths.into_iter().filter(|p| p.last() == dst).collect())
    }

    /// All node ids at exactly `depth` hops from `src` (BFS).
    pub fn neighbors_at_depth<F>(
        &self,
        src: Uuid,
        depth: usize,
        neighbors: &F,
        rel_filter: Option<&[String]>,
    ) -> Result<HashSet<Uuid>>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        let paths = self.traverse(src, neighbors, TraversalStrategy::Bfs, rel_filter, None)?;
        Ok(paths
            .into_iter()
            .filter(|p| p.depth == depth)
            .map(|p| p.last())
            .collect())
    }

    /// Number of distinct simple paths from `src` to `dst`.
    pub fn count_paths<F>(
        &self,
        src: Uuid,
        dst: Uuid,
        neighbors: &F,
        rel_filter: Option<&[String]>,
    ) -> Result<usize>
    where
        F: Fn(Uuid) -> Result<Vec<StoredEdge>>,
    {
        Ok(self.all_paths(src, dst, neighbors, rel_filter)?.len())
    }
}

fn filtered(edges: Vec<StoredEdge>, rel_filter: Option<&[String]>) -> Vec<StoredEdge> {
    match rel_filter {
        Some(rels) => edges
            .into_iter()
            .filter(|e| rels.iter().any(|r| r == &e.rel_type))
            .collect(),
        None => edges,
    }
}
