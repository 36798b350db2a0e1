// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use super::RouteError;
use crate::RouteGraph;

/// How many queue pops happen between calls to the interrupt callback.
const INTERRUPT_CHECK_INTERVAL: usize = 256;

/// Shortest path between two nodes, expanded to road segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Path {
    /// Total weight, in tenths of a second.
    pub weight: u64,

    /// Visited nodes, from start to destination.
    pub nodes: Vec<u32>,

    /// Traversed [Edge](crate::graph::Edge) ids; always one fewer than `nodes`.
    pub edges: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// One half of the bidirectional search.
#[derive(Debug)]
struct Side {
    direction: Direction,
    queue: BinaryHeap<Reverse<(u64, u32)>>,
    dist: HashMap<u32, u64>,

    /// Node → (predecessor in search order, hierarchy arc used to reach it).
    parent: HashMap<u32, (u32, u32)>,
}

impl Side {
    fn new(direction: Direction, origin: u32) -> Self {
        let mut s = Self {
            direction,
            queue: BinaryHeap::new(),
            dist: HashMap::new(),
            parent: HashMap::new(),
        };
        s.dist.insert(origin, 0);
        s.queue.push(Reverse((0, origin)));
        s
    }

    fn min_key(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse((d, _))| *d)
    }

    /// Search in this direction is finished once nothing left in its queue
    /// can improve on `best`.
    fn exhausted(&self, best: u64) -> bool {
        self.min_key().map_or(true, |d| d >= best)
    }

    fn relax(&mut self, g: &RouteGraph, at: u32, d: u64) {
        let arcs = match self.direction {
            Direction::Forward => g.up_arcs(at),
            Direction::Backward => g.down_arcs(at),
        };

        for &arc_id in arcs {
            let arc = g.arc(arc_id);
            let next = match self.direction {
                Direction::Forward => arc.target,
                Direction::Backward => arc.source,
            };
            let nd = d + arc.weight as u64;

            match self.dist.entry(next) {
                Entry::Vacant(e) => {
                    e.insert(nd);
                }
                Entry::Occupied(mut e) => {
                    let known = *e.get();
                    let better_tie = nd == known
                        && self.parent.get(&next).is_some_and(|&(prev, _)| at < prev);
                    if nd < known {
                        e.insert(nd);
                    } else if better_tie {
                        // Same distance, lower-id predecessor: keep for determinism
                        self.parent.insert(next, (at, arc_id));
                        continue;
                    } else {
                        continue;
                    }
                }
            }

            self.parent.insert(next, (at, arc_id));
            self.queue.push(Reverse((nd, next)));
        }
    }
}

/// Runs a bidirectional contraction-hierarchy search between two nodes.
///
/// The forward search only follows arcs towards higher-ranked nodes from `from`,
/// the backward search only follows arcs arriving from higher-ranked nodes into `to`.
/// Among equally short paths, the one meeting at the lowest node id is returned.
///
/// Returns `Ok(None)` if `to` can't be reached from `from`, and
/// [RouteError::Interrupted] as soon as `interrupt` returns true.
/// `interrupt` is polled every few hundred settled nodes.
pub(crate) fn shortest_path<F: Fn() -> bool>(
    g: &RouteGraph,
    from: u32,
    to: u32,
    interrupt: &F,
) -> Result<Option<Path>, RouteError> {
    if from == to {
        return Ok(Some(Path {
            weight: 0,
            nodes: vec![from],
            edges: Vec::new(),
        }));
    }

    let mut forward = Side::new(Direction::Forward, from);
    let mut backward = Side::new(Direction::Backward, to);
    let mut best = u64::MAX;
    let mut meeting: Option<u32> = None;
    let mut pops: usize = 0;

    loop {
        let forward_done = forward.exhausted(best);
        let backward_done = backward.exhausted(best);
        if forward_done && backward_done {
            break;
        }

        // Advance the side with the smaller frontier, preferring forward on ties
        let (side, other) = match (forward.min_key(), backward.min_key()) {
            _ if backward_done => (&mut forward, &backward),
            _ if forward_done => (&mut backward, &forward),
            (Some(f), Some(b)) if b < f => (&mut backward, &forward),
            _ => (&mut forward, &backward),
        };

        if pops % INTERRUPT_CHECK_INTERVAL == 0 && interrupt() {
            return Err(RouteError::Interrupted);
        }
        pops += 1;

        let Some(Reverse((d, at))) = side.queue.pop() else {
            continue;
        };

        // Skip stale entries
        if d > side.dist.get(&at).copied().unwrap_or(u64::MAX) {
            continue;
        }

        if let Some(&other_d) = other.dist.get(&at) {
            let total = d + other_d;
            if total < best || (total == best && meeting.is_some_and(|m| at < m)) {
                best = total;
                meeting = Some(at);
            }
        }

        side.relax(g, at, d);
    }

    let Some(meeting) = meeting else {
        return Ok(None);
    };

    // Hierarchy arcs from `from` to `meeting`, then from `meeting` to `to`
    let mut arcs = Vec::new();
    let mut at = meeting;
    while let Some(&(prev, arc)) = forward.parent.get(&at) {
        arcs.push(arc);
        at = prev;
    }
    arcs.reverse();

    let mut at = meeting;
    while let Some(&(next, arc)) = backward.parent.get(&at) {
        arcs.push(arc);
        at = next;
    }

    let mut edges = Vec::new();
    for arc in arcs {
        g.unpack_into(arc, &mut edges);
    }

    let mut nodes = Vec::with_capacity(edges.len() + 1);
    nodes.push(from);
    for &e in &edges {
        if let Some(edge) = g.edge(e) {
            nodes.push(edge.to);
        }
    }

    Ok(Some(Path {
        weight: best,
        nodes,
        edges,
    }))
}
