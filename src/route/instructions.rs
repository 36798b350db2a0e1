// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Turn-by-turn instructions derived from the road segments of a route.

use serde::{Deserialize, Serialize};

use crate::graph::EdgeKind;
use crate::{bearing_delta, initial_bearing, polyline_length, Coordinate, RouteGraph};

/// Upper bounds (in degrees, inclusive) of the absolute bearing change
/// for every class of [Maneuver].
///
/// A change above `sharp` is a U-turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnThresholds {
    pub straight: f64,
    pub slight: f64,
    pub turn: f64,
    pub sharp: f64,
}

impl Default for TurnThresholds {
    fn default() -> Self {
        Self {
            straight: 15.0,
            slight: 45.0,
            turn: 120.0,
            sharp: 170.0,
        }
    }
}

impl TurnThresholds {
    /// Returns true if the thresholds are finite, increasing and within `0..=180`.
    pub fn is_valid(&self) -> bool {
        let t = [self.straight, self.slight, self.turn, self.sharp];
        t.iter().all(|x| x.is_finite() && (0.0..=180.0).contains(x))
            && t.windows(2).all(|w| w[0] <= w[1])
    }
}

/// What a driver has to do at a node of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Maneuver {
    Straight,
    SlightLeft,
    SlightRight,
    Left,
    Right,
    SharpLeft,
    SharpRight,
    UTurn,

    /// Drive through a roundabout, leaving at the given exit (counted from 1).
    /// Exit 0 means the route ends on the roundabout.
    Roundabout {
        exit: u32,
    },
}

impl Maneuver {
    /// Classifies a signed bearing change, as returned by [bearing_delta].
    /// Positive changes turn right.
    pub fn classify(delta: f64, t: &TurnThresholds) -> Self {
        let abs = delta.abs();
        let right = delta > 0.0;

        if abs <= t.straight {
            Self::Straight
        } else if abs <= t.slight {
            if right {
                Self::SlightRight
            } else {
                Self::SlightLeft
            }
        } else if abs <= t.turn {
            if right {
                Self::Right
            } else {
                Self::Left
            }
        } else if abs <= t.sharp {
            if right {
                Self::SharpRight
            } else {
                Self::SharpLeft
            }
        } else {
            Self::UTurn
        }
    }
}

/// A single maneuver, followed by `distance_m` meters of driving along `street`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub maneuver: Maneuver,
    pub street: Option<String>,
    pub distance_m: f64,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (text, preposition) = match self.maneuver {
            Maneuver::Straight => ("Continue straight", "on"),
            Maneuver::SlightLeft => ("Turn slightly left", "onto"),
            Maneuver::SlightRight => ("Turn slightly right", "onto"),
            Maneuver::Left => ("Turn left", "onto"),
            Maneuver::Right => ("Turn right", "onto"),
            Maneuver::SharpLeft => ("Turn sharply left", "onto"),
            Maneuver::SharpRight => ("Turn sharply right", "onto"),
            Maneuver::UTurn => ("Make a U-turn", "onto"),
            Maneuver::Roundabout { exit: 0 } => ("Enter the roundabout", "on"),
            Maneuver::Roundabout { exit } => {
                write!(f, "At the roundabout, take exit {exit}")?;
                ("", "onto")
            }
        };

        f.write_str(text)?;
        if let Some(street) = &self.street {
            write!(f, " {preposition} {street}")?;
        }
        Ok(())
    }
}

/// Bearings and length of a single road segment.
struct Leg {
    kind: EdgeKind,
    from: u32,
    street: Option<String>,
    entry: f64,
    exit: f64,
    length_m: f64,
}

impl Leg {
    fn new(g: &RouteGraph, edge: u32) -> Option<Self> {
        let e = g.edge(edge)?;
        let line = g.edge_polyline(edge);
        let bearing = |a: &[Coordinate]| initial_bearing(a[0], a[1]);

        Some(Self {
            kind: e.kind,
            from: e.from,
            street: g.edge_name(edge).map(str::to_string),
            entry: bearing(&line[..2]),
            exit: bearing(&line[line.len() - 2..]),
            length_m: polyline_length(&line) * 1000.0,
        })
    }
}

/// Derives turn instructions from the traversed road segments of a route.
///
/// The first instruction always continues straight along the first segment.
/// A new instruction starts at every node where the bearing changes by more than
/// [TurnThresholds::straight], except that a repeat of the current turn class
/// at a node which is not a junction (e.g. a long bend drawn as several segments)
/// extends the current instruction. Consecutive roundabout segments collapse into
/// one instruction counting the passed junctions.
pub fn derive(g: &RouteGraph, edges: &[u32], thresholds: &TurnThresholds) -> Vec<Instruction> {
    let legs: Vec<Leg> = edges.iter().filter_map(|&e| Leg::new(g, e)).collect();
    let Some(first) = legs.first() else {
        return Vec::new();
    };

    let mut instructions = Vec::new();
    let mut current = Instruction {
        maneuver: if first.kind == EdgeKind::Roundabout {
            Maneuver::Roundabout { exit: 0 }
        } else {
            Maneuver::Straight
        },
        street: first.street.clone(),
        distance_m: first.length_m,
    };

    for pair in legs.windows(2) {
        let (prev, leg) = (&pair[0], &pair[1]);
        let on_roundabout = prev.kind == EdgeKind::Roundabout;
        let to_roundabout = leg.kind == EdgeKind::Roundabout;

        match (on_roundabout, to_roundabout) {
            (false, true) => {
                instructions.push(current);
                current = Instruction {
                    maneuver: Maneuver::Roundabout { exit: 0 },
                    street: None,
                    distance_m: leg.length_m,
                };
            }

            (true, true) => {
                if let Maneuver::Roundabout { ref mut exit } = current.maneuver {
                    if g.is_junction(leg.from) {
                        *exit += 1;
                    }
                }
                current.distance_m += leg.length_m;
            }

            (true, false) => {
                if let Maneuver::Roundabout { ref mut exit } = current.maneuver {
                    *exit += 1;
                }
                current.street = leg.street.clone();
                current.distance_m += leg.length_m;
            }

            (false, false) => {
                let maneuver =
                    Maneuver::classify(bearing_delta(prev.exit, leg.entry), thresholds);
                let merge = maneuver == Maneuver::Straight
                    || (maneuver == current.maneuver && !g.is_junction(leg.from));

                if merge {
                    current.distance_m += leg.length_m;
                    if current.street.is_none() {
                        current.street = leg.street.clone();
                    }
                } else {
                    instructions.push(current);
                    current = Instruction {
                        maneuver,
                        street: leg.street.clone(),
                        distance_m: leg.length_m,
                    };
                }
            }
        }
    }

    instructions.push(current);
    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::contract;
    use crate::network::{Network, NetworkEdge};

    fn graph(nodes: &[(f64, f64)], edges: Vec<NetworkEdge>) -> RouteGraph {
        let network = Network {
            nodes: nodes.iter().map(|&(lat, lon)| Coordinate::new(lat, lon)).collect(),
            edges,
        };
        let (h, g) = contract(&network).unwrap();
        RouteGraph::from_parts(h, g).unwrap()
    }

    fn maneuvers(instructions: &[Instruction]) -> Vec<Maneuver> {
        instructions.iter().map(|i| i.maneuver).collect()
    }

    #[test]
    fn classify() {
        let t = TurnThresholds::default();
        assert_eq!(Maneuver::classify(0.0, &t), Maneuver::Straight);
        assert_eq!(Maneuver::classify(-15.0, &t), Maneuver::Straight);
        assert_eq!(Maneuver::classify(30.0, &t), Maneuver::SlightRight);
        assert_eq!(Maneuver::classify(-90.0, &t), Maneuver::Left);
        assert_eq!(Maneuver::classify(150.0, &t), Maneuver::SharpRight);
        assert_eq!(Maneuver::classify(-175.0, &t), Maneuver::UTurn);
        assert_eq!(Maneuver::classify(180.0, &t), Maneuver::UTurn);
    }

    #[test]
    fn thresholds_validity() {
        assert!(TurnThresholds::default().is_valid());
        assert!(!TurnThresholds {
            slight: 10.0,
            ..Default::default()
        }
        .is_valid());
        assert!(!TurnThresholds {
            sharp: 190.0,
            ..Default::default()
        }
        .is_valid());
    }

    #[test]
    fn display() {
        let i = Instruction {
            maneuver: Maneuver::Left,
            street: Some("Market Street".to_string()),
            distance_m: 120.0,
        };
        assert_eq!(i.to_string(), "Turn left onto Market Street");

        let i = Instruction {
            maneuver: Maneuver::Straight,
            street: None,
            distance_m: 10.0,
        };
        assert_eq!(i.to_string(), "Continue straight");

        let i = Instruction {
            maneuver: Maneuver::Roundabout { exit: 2 },
            street: Some("Rue de Rivoli".to_string()),
            distance_m: 80.0,
        };
        assert_eq!(i.to_string(), "At the roundabout, take exit 2 onto Rue de Rivoli");
    }

    #[test]
    fn straight_segments_merge() {
        // 0 → 1 → 2 → 3, all heading east
        let g = graph(
            &[(0.0, 0.0), (0.0, 0.001), (0.0, 0.002), (0.0, 0.003)],
            vec![
                NetworkEdge::new(0, 1, 1.0).oneway().named("Main"),
                NetworkEdge::new(1, 2, 1.0).oneway().named("Main"),
                NetworkEdge::new(2, 3, 1.0).oneway().named("Main"),
            ],
        );

        let instructions = derive(&g, &[0, 1, 2], &TurnThresholds::default());
        assert_eq!(maneuvers(&instructions), vec![Maneuver::Straight]);
        assert_eq!(instructions[0].street.as_deref(), Some("Main"));
        assert!((instructions[0].distance_m - 333.6).abs() < 1.0);
    }

    #[test]
    fn left_then_right() {
        // 0 → 1 east, 1 → 2 north, 2 → 3 east
        let g = graph(
            &[(0.0, 0.0), (0.0, 0.001), (0.001, 0.001), (0.001, 0.002)],
            vec![
                NetworkEdge::new(0, 1, 1.0).oneway().named("First"),
                NetworkEdge::new(1, 2, 1.0).oneway().named("Second"),
                NetworkEdge::new(2, 3, 1.0).oneway().named("Third"),
            ],
        );

        let instructions = derive(&g, &[0, 1, 2], &TurnThresholds::default());
        assert_eq!(
            maneuvers(&instructions),
            vec![Maneuver::Straight, Maneuver::Left, Maneuver::Right],
        );
        assert_eq!(instructions[1].to_string(), "Turn left onto Second");
    }

    #[test]
    fn bend_without_junction_merges() {
        // Two consecutive slight right bends at nodes with only two neighbours
        let g = graph(
            &[(0.0, 0.0), (0.0, 0.001), (-0.0005, 0.0019), (-0.0013, 0.0025)],
            vec![
                NetworkEdge::new(0, 1, 1.0).oneway(),
                NetworkEdge::new(1, 2, 1.0).oneway(),
                NetworkEdge::new(2, 3, 1.0).oneway(),
            ],
        );

        let instructions = derive(&g, &[0, 1, 2], &TurnThresholds::default());
        assert_eq!(
            maneuvers(&instructions),
            vec![Maneuver::Straight, Maneuver::SlightRight],
        );
    }

    #[test]
    fn roundabout_counts_exits() {
        //        4
        //        |
        // 0 ─ 1 ─ 2 ─ 3 (roundabout 1 → 2 → 3), 5 hangs off 3
        let g = graph(
            &[
                (0.0, 0.0),
                (0.0, 0.001),
                (0.0, 0.002),
                (0.0, 0.003),
                (0.001, 0.002),
                (-0.001, 0.003),
            ],
            vec![
                NetworkEdge::new(0, 1, 1.0).oneway(),
                NetworkEdge::new(1, 2, 1.0).oneway().kind(EdgeKind::Roundabout),
                NetworkEdge::new(2, 3, 1.0).oneway().kind(EdgeKind::Roundabout),
                NetworkEdge::new(2, 4, 1.0).oneway(),
                NetworkEdge::new(3, 5, 1.0).oneway().named("Exit Road"),
            ],
        );

        let instructions = derive(&g, &[0, 1, 2, 4], &TurnThresholds::default());
        assert_eq!(
            maneuvers(&instructions),
            vec![Maneuver::Straight, Maneuver::Roundabout { exit: 2 }],
        );
        assert_eq!(
            instructions[1].to_string(),
            "At the roundabout, take exit 2 onto Exit Road"
        );
    }

    #[test]
    fn empty() {
        let g = graph(&[(0.0, 0.0)], vec![]);
        assert!(derive(&g, &[], &TurnThresholds::default()).is_empty());
    }
}
