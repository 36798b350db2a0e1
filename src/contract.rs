// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Builds a contraction hierarchy out of a plain [Network].
//!
//! Nodes are contracted one at a time, least important first, where importance
//! is the edge difference (shortcuts added minus arcs removed) plus the number
//! of already-contracted neighbours. Priorities are updated lazily.
//!
//! Witness searches are bounded; giving up early only ever adds a redundant
//! shortcut, never a wrong distance.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::graph::{ArcKind, Edge, Geometry, Hierarchy, HierarchyArc, Node};
use crate::network::{Network, NetworkError};

/// Max number of nodes settled by a single witness search.
const WITNESS_SETTLE_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy)]
struct Link {
    node: u32,
    weight: u32,
    arc: u32,
}

#[derive(Debug, Clone, Copy)]
struct Shortcut {
    source: u32,
    target: u32,
    weight: u32,
    first: u32,
    second: u32,
}

/// Converts travel time in seconds into an arc weight (tenths of a second, at least 1).
pub fn seconds_to_weight(seconds: f64) -> u32 {
    (seconds * 10.0).round().clamp(1.0, u32::MAX as f64) as u32
}

/// Contracts a [Network] into a [Hierarchy] and the [Geometry] it refers to.
///
/// Two-way network edges become two directed edges. Of multiple edges between
/// the same pair of nodes, only the fastest one gets an arc; self-loops get none.
/// The result is deterministic for a given network.
pub fn contract(network: &Network) -> Result<(Hierarchy, Geometry), NetworkError> {
    network.validate()?;

    let geometry = build_geometry(network);
    let mut contractor = Contractor::new(network.nodes.len(), &geometry.edges);
    contractor.run();

    let nodes = network
        .nodes
        .iter()
        .zip(contractor.rank.iter())
        .map(|(&coordinate, &rank)| Node { coordinate, rank })
        .collect();

    log::debug!(
        "contracted {} nodes: {} edges, {} arcs",
        network.nodes.len(),
        geometry.edges.len(),
        contractor.arcs.len(),
    );

    Ok((
        Hierarchy {
            nodes,
            arcs: contractor.arcs,
        },
        geometry,
    ))
}

fn build_geometry(network: &Network) -> Geometry {
    let mut g = Geometry::default();
    let mut name_ids: HashMap<&str, u32> = HashMap::new();

    for e in &network.edges {
        let name = e.name.as_deref().map(|name| {
            *name_ids.entry(name).or_insert_with(|| {
                g.names.push(name.to_string());
                (g.names.len() - 1) as u32
            })
        });
        let weight = seconds_to_weight(e.seconds);

        g.edges.push(Edge {
            from: e.from,
            to: e.to,
            weight,
            kind: e.kind,
            name,
            first_point: g.points.len() as u32,
            point_count: e.shape.len() as u32,
        });
        g.points.extend_from_slice(&e.shape);

        if !e.oneway {
            g.edges.push(Edge {
                from: e.to,
                to: e.from,
                weight,
                kind: e.kind,
                name,
                first_point: g.points.len() as u32,
                point_count: e.shape.len() as u32,
            });
            g.points.extend(e.shape.iter().rev());
        }
    }

    g
}

struct Contractor {
    outgoing: Vec<Vec<Link>>,
    incoming: Vec<Vec<Link>>,
    arcs: Vec<HierarchyArc>,
    contracted: Vec<bool>,
    contracted_neighbours: Vec<u32>,
    rank: Vec<u32>,
}

impl Contractor {
    fn new(node_count: usize, edges: &[Edge]) -> Self {
        // Keep only the fastest edge between any pair of nodes
        let mut fastest: HashMap<(u32, u32), u32> = HashMap::new();
        for (i, e) in edges.iter().enumerate() {
            if e.from == e.to {
                continue;
            }
            fastest
                .entry((e.from, e.to))
                .and_modify(|best| {
                    if e.weight < edges[*best as usize].weight {
                        *best = i as u32;
                    }
                })
                .or_insert(i as u32);
        }

        let mut c = Self {
            outgoing: vec![Vec::new(); node_count],
            incoming: vec![Vec::new(); node_count],
            arcs: Vec::with_capacity(fastest.len() * 2),
            contracted: vec![false; node_count],
            contracted_neighbours: vec![0; node_count],
            rank: vec![0; node_count],
        };

        for (i, e) in edges.iter().enumerate() {
            if fastest.get(&(e.from, e.to)) == Some(&(i as u32)) {
                c.push_arc(e.from, e.to, e.weight, ArcKind::Original { edge: i as u32 });
            }
        }

        c
    }

    fn push_arc(&mut self, source: u32, target: u32, weight: u32, kind: ArcKind) {
        let arc = self.arcs.len() as u32;
        self.arcs.push(HierarchyArc {
            source,
            target,
            weight,
            kind,
        });
        self.outgoing[source as usize].push(Link {
            node: target,
            weight,
            arc,
        });
        self.incoming[target as usize].push(Link {
            node: source,
            weight,
            arc,
        });
    }

    fn run(&mut self) {
        let n = self.contracted.len() as u32;
        let mut queue: BinaryHeap<Reverse<(i64, u32)>> =
            (0..n).map(|v| Reverse((self.priority(v), v))).collect();

        let mut next_rank = 0;
        while let Some(Reverse((priority, v))) = queue.pop() {
            if self.contracted[v as usize] {
                continue;
            }

            // Lazy update: if the node became more important, try again later
            let current = self.priority(v);
            if current > priority {
                queue.push(Reverse((current, v)));
                continue;
            }

            self.contract_node(v, next_rank);
            next_rank += 1;
        }

        debug_assert_eq!(next_rank, n);
    }

    fn priority(&self, v: u32) -> i64 {
        let shortcuts = self.shortcuts(v).len() as i64;
        let removed = (self.live(&self.incoming[v as usize], v).len()
            + self.live(&self.outgoing[v as usize], v).len()) as i64;
        shortcuts - removed + self.contracted_neighbours[v as usize] as i64
    }

    fn contract_node(&mut self, v: u32, rank: u32) {
        let shortcuts = self.shortcuts(v);

        let mut neighbours: Vec<u32> = self
            .live(&self.incoming[v as usize], v)
            .into_iter()
            .chain(self.live(&self.outgoing[v as usize], v))
            .map(|l| l.node)
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();
        for n in neighbours {
            self.contracted_neighbours[n as usize] += 1;
        }

        self.contracted[v as usize] = true;
        self.rank[v as usize] = rank;

        for s in shortcuts {
            self.push_arc(
                s.source,
                s.target,
                s.weight,
                ArcKind::Shortcut {
                    first: s.first,
                    second: s.second,
                },
            );
        }
    }

    /// Returns links to non-contracted nodes other than `skip`,
    /// keeping only the cheapest link to every neighbour.
    fn live(&self, links: &[Link], skip: u32) -> Vec<Link> {
        let mut best: Vec<Link> = Vec::with_capacity(links.len());
        for &l in links {
            if l.node == skip || self.contracted[l.node as usize] {
                continue;
            }
            match best.iter_mut().find(|b| b.node == l.node) {
                Some(b) if l.weight < b.weight => *b = l,
                Some(_) => {}
                None => best.push(l),
            }
        }
        best
    }

    /// Computes shortcuts needed to preserve distances if `v` were contracted.
    fn shortcuts(&self, v: u32) -> Vec<Shortcut> {
        let ins = self.live(&self.incoming[v as usize], v);
        let outs = self.live(&self.outgoing[v as usize], v);
        let mut shortcuts = Vec::new();

        for inc in &ins {
            let limit = outs
                .iter()
                .filter(|out| out.node != inc.node)
                .map(|out| inc.weight as u64 + out.weight as u64)
                .max();
            let Some(limit) = limit else { continue };

            let witness = self.witness_search(inc.node, v, limit);

            for out in outs.iter().filter(|out| out.node != inc.node) {
                let via = inc.weight as u64 + out.weight as u64;
                let has_witness = witness.get(&out.node).is_some_and(|&d| d <= via);
                if !has_witness {
                    shortcuts.push(Shortcut {
                        source: inc.node,
                        target: out.node,
                        weight: u32::try_from(via).unwrap_or(u32::MAX),
                        first: inc.arc,
                        second: out.arc,
                    });
                }
            }
        }

        shortcuts
    }

    /// Bounded Dijkstra from `source` over non-contracted nodes, never entering `avoid`.
    fn witness_search(&self, source: u32, avoid: u32, limit: u64) -> HashMap<u32, u64> {
        let mut dist: HashMap<u32, u64> = HashMap::new();
        let mut queue: BinaryHeap<Reverse<(u64, u32)>> = BinaryHeap::new();
        let mut settled = 0;

        dist.insert(source, 0);
        queue.push(Reverse((0, source)));

        while let Some(Reverse((d, u))) = queue.pop() {
            if d > limit || settled >= WITNESS_SETTLE_LIMIT {
                break;
            }
            if d > dist.get(&u).copied().unwrap_or(u64::MAX) {
                continue;
            }
            settled += 1;

            for l in &self.outgoing[u as usize] {
                if l.node == avoid || self.contracted[l.node as usize] {
                    continue;
                }
                let nd = d + l.weight as u64;
                if nd <= limit && nd < dist.get(&l.node).copied().unwrap_or(u64::MAX) {
                    dist.insert(l.node, nd);
                    queue.push(Reverse((nd, l.node)));
                }
            }
        }

        dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkEdge;
    use crate::{testing, Coordinate, RouteGraph};

    #[test]
    fn weights_are_positive_tenths_of_a_second() {
        assert_eq!(seconds_to_weight(1.0), 10);
        assert_eq!(seconds_to_weight(0.01), 1);
        assert_eq!(seconds_to_weight(2.34), 23);
    }

    #[test]
    fn two_way_edges_are_split() {
        let network = Network {
            nodes: vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01)],
            edges: vec![NetworkEdge {
                shape: vec![Coordinate::new(0.001, 0.003), Coordinate::new(0.001, 0.006)],
                ..NetworkEdge::new(0, 1, 3.0).named("Długa")
            }],
        };

        let (h, g) = contract(&network).unwrap();
        assert_eq!(g.edges.len(), 2);
        assert_eq!(g.names, vec!["Długa".to_string()]);
        assert_eq!((g.edges[1].from, g.edges[1].to), (1, 0));
        assert_eq!(g.points[2], Coordinate::new(0.001, 0.006));
        assert_eq!(h.arcs.len(), 2);

        let mut ranks: Vec<u32> = h.nodes.iter().map(|n| n.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 1]);
    }

    #[test]
    fn parallel_edges_keep_fastest_arc() {
        let network = Network {
            nodes: vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.01)],
            edges: vec![
                NetworkEdge::new(0, 1, 9.0).oneway(),
                NetworkEdge::new(0, 1, 4.0).oneway(),
                NetworkEdge::new(1, 1, 1.0).oneway(),
            ],
        };

        let (h, g) = contract(&network).unwrap();
        assert_eq!(g.edges.len(), 3);
        assert_eq!(h.arcs.len(), 1);
        assert_eq!(h.arcs[0].kind, ArcKind::Original { edge: 1 });
    }

    #[test]
    fn result_passes_structural_checks() {
        let (h, g) = contract(&testing::grid_network(6, 5)).unwrap();
        let graph = RouteGraph::from_parts(h, g).unwrap();
        assert_eq!(graph.node_count(), 30);
    }

    #[test]
    fn contraction_is_deterministic() {
        let network = testing::grid_network(5, 5);
        assert_eq!(contract(&network).unwrap(), contract(&network).unwrap());
    }

    #[test]
    fn preserves_shortest_distances() {
        let network = testing::grid_network(6, 6);
        let (h, g) = contract(&network).unwrap();
        let graph = RouteGraph::from_parts(h, g.clone()).unwrap();

        for from in 0..36 {
            for to in 0..36 {
                let expected = testing::dijkstra(&g, 36, from, to);
                let actual = crate::route::search::shortest_path(&graph, from, to, &|| false)
                    .unwrap()
                    .map(|p| p.weight);
                assert_eq!(actual, expected, "{from} → {to}");
            }
        }
    }
}
