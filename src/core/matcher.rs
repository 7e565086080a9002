//! Turning per-pair circuit demand into concrete port reservations.
//!
//! Matching runs in two phases over a disposable [`IdlePorts`] copy:
//! every pair first gets its `min_links` (any miss fails the whole attempt),
//! then every pair is extended towards `max_links` on a best-effort basis.

use crate::core::demand::LinkDemand;
use crate::core::fabric::{Circuit, IdlePorts};
use crate::core::GroupId;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchAlgorithm {
    /// Exhaustive scan in fixed switch/switch/port order
    Native,
    /// Round-robin over switch pairs, spreading circuits across switches
    #[default]
    Optimize,
}

impl MatchAlgorithm {
    pub fn matcher(self) -> &'static dyn PairMatcher {
        match self {
            MatchAlgorithm::Native => &NativeMatcher,
            MatchAlgorithm::Optimize => &RotatingMatcher,
        }
    }

    /// The other pair strategy.
    pub fn alternate(self) -> Self {
        match self {
            MatchAlgorithm::Native => MatchAlgorithm::Optimize,
            MatchAlgorithm::Optimize => MatchAlgorithm::Native,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum AllocationResult {
    /// Every pair reached its `max_links`
    MeetMax,
    /// Every pair reached `min_links`, at least one fell short of `max_links`
    MeetMin,
    /// Some pair could not reach `min_links`
    Failure,
}

/// A pair that received fewer circuits than it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairShortfall {
    pub group_a: GroupId,
    pub group_b: GroupId,
    pub wanted: u32,
    pub matched: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub result: AllocationResult,
    /// Circuits taken from the working copy; empty on `Failure`
    pub circuits: Vec<Circuit>,
    /// On `Failure`, the pair that missed its minimum; on `MeetMin`, every
    /// pair that missed its maximum
    pub shortfalls: Vec<PairShortfall>,
}

/// Strategy for finding circuits between two groups.
pub trait PairMatcher: Sync {
    /// Take up to `count` circuits between `group_a` and `group_b` out of
    /// `ports`, appending them to `out`. Returns how many were taken; fewer
    /// than `count` means the pair is exhausted.
    fn match_pair(
        &self,
        ports: &mut IdlePorts,
        group_a: GroupId,
        group_b: GroupId,
        count: u32,
        out: &mut Vec<Circuit>,
    ) -> u32;
}

/// First idle-at-both-ends port in `(switch_a, switch_b, port)` order.
pub struct NativeMatcher;

impl PairMatcher for NativeMatcher {
    fn match_pair(
        &self,
        ports: &mut IdlePorts,
        group_a: GroupId,
        group_b: GroupId,
        count: u32,
        out: &mut Vec<Circuit>,
    ) -> u32 {
        let mut matched = 0;
        if count == 0 {
            return matched;
        }

        let switches = ports.switches_per_group();
        for switch_a in 0..switches {
            for switch_b in 0..switches {
                for port in 0..ports.ports_per_switch() {
                    if !(ports.is_idle(group_a, switch_a, port)
                        && ports.is_idle(group_b, switch_b, port))
                    {
                        continue;
                    }
                    let circuit = Circuit {
                        src_group: group_a,
                        src_switch: switch_a,
                        dst_group: group_b,
                        dst_switch: switch_b,
                        port,
                    };
                    ports.take(&circuit);
                    out.push(circuit);
                    matched += 1;
                    if matched == count {
                        return matched;
                    }
                }
            }
        }
        matched
    }
}

/// Rotating cursor over `(switch_a, switch_b)` cells with exhaustion marks.
/// Lives for a single `match_pair` call.
struct SwitchCursor {
    n: usize,
    src: usize,
    dst: usize,
    exhausted: Vec<bool>,
    open: usize,
}

impl SwitchCursor {
    fn new(n: usize) -> Self {
        Self {
            n,
            src: 0,
            dst: 0,
            exhausted: vec![false; n * n],
            open: n * n,
        }
    }

    /// Move to the next non-exhausted cell, scanning the current row from
    /// `dst` before moving on to the next row.
    fn next_open(&mut self) -> Option<(usize, usize)> {
        if self.open == 0 {
            return None;
        }
        let n = self.n;
        for k in 0..n * n {
            let src = (self.src + k / n) % n;
            let dst = (self.dst + k % n) % n;
            if !self.exhausted[src * n + dst] {
                self.src = src;
                self.dst = dst;
                return Some((src, dst));
            }
        }
        None
    }

    fn exhaust(&mut self, src: usize, dst: usize) {
        let cell = &mut self.exhausted[src * self.n + dst];
        if !*cell {
            *cell = true;
            self.open -= 1;
        }
    }

    /// Step diagonally so consecutive circuits land on different switches.
    fn advance(&mut self) {
        self.src = (self.src + 1) % self.n;
        self.dst = (self.dst + 1) % self.n;
    }
}

/// Lowest common idle port of the cursor's switch pair, rotating the cursor
/// after every circuit.
pub struct RotatingMatcher;

impl PairMatcher for RotatingMatcher {
    fn match_pair(
        &self,
        ports: &mut IdlePorts,
        group_a: GroupId,
        group_b: GroupId,
        count: u32,
        out: &mut Vec<Circuit>,
    ) -> u32 {
        let mut cursor = SwitchCursor::new(ports.switches_per_group());
        let mut matched = 0;
        while matched < count {
            let Some((switch_a, switch_b)) = cursor.next_open() else {
                break;
            };
            match ports.first_common(group_a, switch_a, group_b, switch_b) {
                Some(port) => {
                    let circuit = Circuit {
                        src_group: group_a,
                        src_switch: switch_a,
                        dst_group: group_b,
                        dst_switch: switch_b,
                        port,
                    };
                    ports.take(&circuit);
                    out.push(circuit);
                    matched += 1;
                    cursor.advance();
                }
                None => cursor.exhaust(switch_a, switch_b),
            }
        }
        matched
    }
}

/// Give every pair its `min_links`, in demand order. Returns the circuits and
/// per-pair counts, or the first pair that fell short.
fn match_minimums(
    ports: &mut IdlePorts,
    demands: &[LinkDemand],
    algorithm: MatchAlgorithm,
) -> Result<(Vec<Circuit>, Vec<u32>), PairShortfall> {
    let matcher = algorithm.matcher();
    let mut circuits = Vec::new();
    let mut matched = Vec::with_capacity(demands.len());

    for demand in demands {
        let got = matcher.match_pair(
            ports,
            demand.group_a,
            demand.group_b,
            demand.min_links,
            &mut circuits,
        );
        if got < demand.min_links {
            tracing::debug!(
                "{}: pair ({}, {}) matched {}/{} minimum circuits",
                algorithm,
                demand.group_a,
                demand.group_b,
                got,
                demand.min_links
            );
            return Err(PairShortfall {
                group_a: demand.group_a,
                group_b: demand.group_b,
                wanted: demand.min_links,
                matched: got,
            });
        }
        matched.push(got);
    }
    Ok((circuits, matched))
}

/// Match `demands` against `ports` with the two-phase protocol.
///
/// Pairs that share a group compete for the same endpoints, so a greedy pass
/// can miss a minimum another port order would meet. Phase one is declared a
/// `Failure` only once both pair strategies have missed on the same state.
///
/// `ports` is a working copy: on `Failure` it holds partial takes and must be
/// discarded by the caller.
pub fn match_links(
    ports: &mut IdlePorts,
    demands: &[LinkDemand],
    algorithm: MatchAlgorithm,
) -> LinkMatch {
    // A lone pair gets the same verdict under either order
    let snapshot = (demands.len() > 1).then(|| ports.clone());
    let (mut circuits, mut matched) = match match_minimums(ports, demands, algorithm) {
        Ok(phase_one) => phase_one,
        Err(shortfall) => {
            let retried = snapshot.and_then(|mut retry| {
                let alternate = algorithm.alternate();
                let phase_one = match_minimums(&mut retry, demands, alternate).ok()?;
                tracing::debug!("{}: minimums met by {} port order", algorithm, alternate);
                *ports = retry;
                Some(phase_one)
            });
            match retried {
                Some(phase_one) => phase_one,
                None => {
                    return LinkMatch {
                        result: AllocationResult::Failure,
                        circuits: Vec::new(),
                        shortfalls: vec![shortfall],
                    }
                }
            }
        }
    };
    let matcher = algorithm.matcher();

    let mut shortfalls = Vec::new();
    for (i, demand) in demands.iter().enumerate() {
        let want = demand.max_links.saturating_sub(matched[i]);
        if want == 0 {
            continue;
        }
        let got = matcher.match_pair(ports, demand.group_a, demand.group_b, want, &mut circuits);
        matched[i] += got;
        if got < want {
            shortfalls.push(PairShortfall {
                group_a: demand.group_a,
                group_b: demand.group_b,
                wanted: demand.max_links,
                matched: matched[i],
            });
        }
    }

    let result = if shortfalls.is_empty() {
        AllocationResult::MeetMax
    } else {
        AllocationResult::MeetMin
    };
    tracing::debug!(
        "{}: matched {} circuits for {} pairs ({})",
        algorithm,
        circuits.len(),
        demands.len(),
        result
    );
    LinkMatch {
        result,
        circuits,
        shortfalls,
    }
}
