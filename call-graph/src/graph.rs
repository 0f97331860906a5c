use crate::resolve::Resolver;
use faultline_entity_store::CodeEntity;
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Counters collected while building a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub entities: usize,
    pub edges: usize,
    /// `calls` references that matched no entity and were dropped
    pub unresolved: usize,
}

/// An entity reached by graph traversal and the hop count it was first reached at
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Expansion {
    pub id: String,
    pub depth: usize,
}

#[derive(Clone, Copy)]
enum Direction {
    Callers,
    Callees,
}

/// Directed call relation between entity ids.
///
/// Both directions are kept so caller expansion is a direct lookup. Neighbour
/// sets are ordered, which makes every traversal deterministic.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: BTreeSet<String>,
    callees: HashMap<String, BTreeSet<String>>,
    callers: HashMap<String, BTreeSet<String>>,
    generation: u64,
    stats: BuildStats,
}

impl CallGraph {
    /// Build the graph in a single pass over `entities`.
    ///
    /// `generation` is the store generation of the snapshot the entities were
    /// taken from.
    pub fn build(entities: &[CodeEntity], generation: u64) -> Self {
        let resolver = Resolver::new(entities);
        let mut graph = CallGraph {
            nodes: entities.iter().map(|entity| entity.id.clone()).collect(),
            generation,
            ..Default::default()
        };

        let mut unresolved = 0;
        for caller in entities {
            for reference in &caller.calls {
                match resolver.resolve(caller, reference) {
                    Some(callee) => graph.add_edge(&caller.id, callee),
                    None => {
                        unresolved += 1;
                        debug!(
                            "Dropping unresolved call '{reference}' from {}",
                            caller.full_name
                        );
                    }
                }
            }
        }

        graph.stats = BuildStats {
            entities: graph.nodes.len(),
            edges: graph.edge_count(),
            unresolved,
        };
        info!(
            "Built call graph: {} entities, {} edges, {} unresolved references (generation {generation})",
            graph.stats.entities, graph.stats.edges, graph.stats.unresolved
        );
        graph
    }

    fn add_edge(&mut self, caller: &str, callee: &str) {
        self.callees
            .entry(caller.to_string())
            .or_default()
            .insert(callee.to_string());
        self.callers
            .entry(callee.to_string())
            .or_default()
            .insert(caller.to_string());
    }

    /// Store generation this graph reflects
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.callees.values().map(BTreeSet::len).sum()
    }

    pub fn has_edge(&self, caller: &str, callee: &str) -> bool {
        self.callees
            .get(caller)
            .is_some_and(|callees| callees.contains(callee))
    }

    /// Direct callers of `id` in id order
    pub fn callers(&self, id: &str) -> Vec<&str> {
        neighbours(&self.callers, id)
    }

    /// Direct callees of `id` in id order
    pub fn callees(&self, id: &str) -> Vec<&str> {
        neighbours(&self.callees, id)
    }

    /// Breadth-first walk from `seeds` to their callers, callers-of-callers
    /// and so on, up to `max_depth` hops.
    ///
    /// Each id is visited at most once and reported with the depth it was
    /// first reached at. At most `max_fanin` callers are followed from any
    /// node, taken in id order. Seeds are never reported and seeds unknown to
    /// the graph are ignored. Results are ordered by depth, then id.
    pub fn expand<'s>(
        &self,
        seeds: impl IntoIterator<Item = &'s str>,
        max_depth: usize,
        max_fanin: usize,
    ) -> Vec<Expansion> {
        self.walk(seeds, max_depth, max_fanin, Direction::Callers)
    }

    /// Like [`Self::expand`], but walks towards callees
    pub fn expand_callees<'s>(
        &self,
        seeds: impl IntoIterator<Item = &'s str>,
        max_depth: usize,
        max_fanin: usize,
    ) -> Vec<Expansion> {
        self.walk(seeds, max_depth, max_fanin, Direction::Callees)
    }

    /// Callers and callees of `id` within `max_depth` hops, closest depth
    /// winning when an id is reachable both ways
    pub fn related(&self, id: &str, max_depth: usize) -> Vec<Expansion> {
        let mut depths: HashMap<String, usize> = HashMap::new();
        for found in self
            .walk([id], max_depth, usize::MAX, Direction::Callers)
            .into_iter()
            .chain(self.walk([id], max_depth, usize::MAX, Direction::Callees))
        {
            let depth = depths.entry(found.id).or_insert(found.depth);
            *depth = (*depth).min(found.depth);
        }

        let mut related: Vec<Expansion> = depths
            .into_iter()
            .map(|(id, depth)| Expansion { id, depth })
            .collect();
        sort_expansions(&mut related);
        related
    }

    fn walk<'s>(
        &self,
        seeds: impl IntoIterator<Item = &'s str>,
        max_depth: usize,
        max_fanin: usize,
        direction: Direction,
    ) -> Vec<Expansion> {
        let adjacency = match direction {
            Direction::Callers => &self.callers,
            Direction::Callees => &self.callees,
        };

        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = Vec::new();
        for seed in seeds {
            if let Some(id) = self.nodes.get(seed)
                && visited.insert(id.as_str())
            {
                frontier.push(id.as_str());
            }
        }

        let mut discovered = Vec::new();
        for depth in 1..=max_depth {
            if frontier.is_empty() || max_fanin == 0 {
                break;
            }
            frontier.sort_unstable();

            let mut next = Vec::new();
            for node in &frontier {
                let Some(neighbours) = adjacency.get(*node) else {
                    continue;
                };
                for neighbour in neighbours.iter().take(max_fanin) {
                    if visited.insert(neighbour.as_str()) {
                        next.push(neighbour.as_str());
                        discovered.push(Expansion {
                            id: neighbour.clone(),
                            depth,
                        });
                    }
                }
            }
            frontier = next;
        }

        sort_expansions(&mut discovered);
        discovered
    }
}

fn neighbours<'a>(adjacency: &'a HashMap<String, BTreeSet<String>>, id: &str) -> Vec<&'a str> {
    adjacency
        .get(id)
        .map(|ids| ids.iter().map(String::as_str).collect())
        .unwrap_or_default()
}

fn sort_expansions(expansions: &mut [Expansion]) {
    expansions.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.cmp(&b.id)));
}
