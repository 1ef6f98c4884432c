//! Drainage network topology.
//!
//! Catchments and nexuses live in flat arenas addressed by [`CatchmentIdx`]
//! and [`NexusIdx`]. Each catchment's reach drains into one nexus; a nexus
//! drains into zero (outlet), one, or several (diffluence) downstream
//! catchments. Diffluences are resolved once at build time according to a
//! [`DiffluencePolicy`], giving every catchment a list of weighted
//! downstream edges from which the topological order, cumulative areas,
//! cohorts and downstream paths are derived.
use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use tracing::{debug, info};

use crate::constants::BRANCH_SUM_TOLERANCE;
use crate::error::{DisaggError, Result};
use crate::travel_time::ReachGeometry;

/// Index of a catchment in the network arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatchmentIdx(pub usize);

/// Index of a nexus in the network arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NexusIdx(pub usize);

/// How a nexus with more than one downstream branch is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffluencePolicy {
    /// Fail with `NonDendriticUnresolved`.
    Reject,
    /// Follow only the branch with the largest declared fraction
    /// (first declared wins a tie).
    DominantBranch,
    /// Keep every branch, weighted by its declared fraction.
    SplitByFraction,
}

/// Catchment as delivered by hydrofabric ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentRecord {
    pub id: String,
    /// Incremental drainage area [km^2].
    pub area_km2: f64,
    /// Nexus the catchment's reach drains into.
    pub to_nexus: String,
    /// Nexus whose reference series this catchment is disaggregated from.
    pub reference_nexus: String,
    /// Land-cover class code -> areal fraction.
    pub land_cover: BTreeMap<u16, f64>,
    /// Average saturated hydraulic conductivity.
    pub conductivity: f64,
    pub reach: ReachGeometry,
}

/// One downstream branch of a nexus record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub catchment: String,
    /// Share of the flow entering this branch; required at diffluences.
    #[serde(default)]
    pub fraction: Option<f64>,
}

/// Nexus as delivered by hydrofabric ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NexusRecord {
    pub id: String,
    #[serde(default)]
    pub downstream: Vec<BranchRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catchment {
    pub id: String,
    pub area_km2: f64,
    pub to_nexus: NexusIdx,
    pub reference_nexus: NexusIdx,
    pub land_cover: BTreeMap<u16, f64>,
    pub conductivity: f64,
    pub reach: ReachGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch {
    pub catchment: CatchmentIdx,
    pub fraction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nexus {
    pub id: String,
    pub branches: SmallVec<[Branch; 1]>,
}

/// A resolved downstream edge: target catchment and share of flow.
pub type Edge = (CatchmentIdx, f64);

/// Ordered reaches from a catchment (own reach first) to its reference
/// nexus, with the share of the catchment's water following this path.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPath {
    pub share: f64,
    pub reaches: Vec<CatchmentIdx>,
}

#[derive(Debug)]
pub struct Network {
    catchments: Vec<Catchment>,
    nexuses: Vec<Nexus>,
    catchment_index: HashMap<String, CatchmentIdx>,
    nexus_index: HashMap<String, NexusIdx>,
    policy: DiffluencePolicy,
    downstream: Vec<SmallVec<[Edge; 1]>>,
    upstream: Vec<SmallVec<[CatchmentIdx; 4]>>,
    order: Vec<CatchmentIdx>,
    cumulative_area: Vec<f64>,
    cohorts: Vec<Vec<CatchmentIdx>>,
}

impl Network {
    /// Build and validate the network.
    ///
    /// Fails on duplicate or dangling identifiers, invalid areas or reach
    /// geometry, unresolvable diffluences, cycles, and catchments whose
    /// reference nexus is not downstream of them.
    pub fn build(
        catchments: Vec<CatchmentRecord>,
        nexuses: Vec<NexusRecord>,
        policy: DiffluencePolicy,
    ) -> Result<Self> {
        let mut nexus_index = HashMap::with_capacity(nexuses.len());
        for (i, n) in nexuses.iter().enumerate() {
            if nexus_index.insert(n.id.clone(), NexusIdx(i)).is_some() {
                return Err(DisaggError::invalid_input(&n.id, "duplicate nexus id"));
            }
        }
        let mut catchment_index = HashMap::with_capacity(catchments.len());
        for (i, c) in catchments.iter().enumerate() {
            if catchment_index.insert(c.id.clone(), CatchmentIdx(i)).is_some() {
                return Err(DisaggError::invalid_input(&c.id, "duplicate catchment id"));
            }
        }

        let lookup_nexus = |id: &str| {
            nexus_index
                .get(id)
                .copied()
                .ok_or_else(|| DisaggError::UnknownEntity {
                    kind: "nexus",
                    id: id.to_string(),
                })
        };

        let mut arena = Vec::with_capacity(catchments.len());
        for rec in catchments {
            if !(rec.area_km2.is_finite() && rec.area_km2 >= 0.0) {
                return Err(DisaggError::invalid_input(
                    &rec.id,
                    format!("area must be finite and >= 0, got {}", rec.area_km2),
                ));
            }
            rec.reach.validate(&rec.id)?;
            arena.push(Catchment {
                to_nexus: lookup_nexus(&rec.to_nexus)?,
                reference_nexus: lookup_nexus(&rec.reference_nexus)?,
                id: rec.id,
                area_km2: rec.area_km2,
                land_cover: rec.land_cover,
                conductivity: rec.conductivity,
                reach: rec.reach,
            });
        }

        let mut nexus_arena = Vec::with_capacity(nexuses.len());
        for rec in nexuses {
            let mut branches = SmallVec::new();
            for b in &rec.downstream {
                let catchment = catchment_index.get(&b.catchment).copied().ok_or_else(|| {
                    DisaggError::UnknownEntity {
                        kind: "catchment",
                        id: b.catchment.clone(),
                    }
                })?;
                branches.push(Branch {
                    catchment,
                    fraction: b.fraction,
                });
            }
            nexus_arena.push(Nexus {
                id: rec.id,
                branches,
            });
        }

        let mut network = Self {
            catchments: arena,
            nexuses: nexus_arena,
            catchment_index,
            nexus_index,
            policy,
            downstream: Vec::new(),
            upstream: Vec::new(),
            order: Vec::new(),
            cumulative_area: Vec::new(),
            cohorts: Vec::new(),
        };
        network.resolve_edges()?;
        network.sort_topologically()?;
        network.check_references()?;
        network.accumulate_area();
        network.assign_cohorts();

        info!(
            catchments = network.catchments.len(),
            nexuses = network.nexuses.len(),
            dendritic = network.is_dendritic(),
            "built drainage network"
        );
        Ok(network)
    }

    /// Resolve each catchment's outlet nexus into weighted downstream edges.
    fn resolve_edges(&mut self) -> Result<()> {
        let n = self.catchments.len();
        let mut downstream: Vec<SmallVec<[Edge; 1]>> = Vec::with_capacity(n);
        let mut upstream: Vec<SmallVec<[CatchmentIdx; 4]>> = vec![SmallVec::new(); n];

        for (i, c) in self.catchments.iter().enumerate() {
            let nexus = &self.nexuses[c.to_nexus.0];
            let edges = self.resolve_branches(&c.id, nexus)?;
            for &(d, _) in &edges {
                upstream[d.0].push(CatchmentIdx(i));
            }
            downstream.push(edges);
        }

        self.downstream = downstream;
        self.upstream = upstream;
        Ok(())
    }

    fn resolve_branches(&self, catchment: &str, nexus: &Nexus) -> Result<SmallVec<[Edge; 1]>> {
        match nexus.branches.len() {
            0 => return Ok(SmallVec::new()),
            1 => return Ok(smallvec![(nexus.branches[0].catchment, 1.0)]),
            _ => {}
        }

        let unresolved = |reason: &str| DisaggError::NonDendriticUnresolved {
            catchment: catchment.to_string(),
            nexus: nexus.id.clone(),
            reason: reason.to_string(),
        };

        if self.policy == DiffluencePolicy::Reject {
            return Err(unresolved("diffluence policy is 'reject'"));
        }

        let mut fractions = Vec::with_capacity(nexus.branches.len());
        for b in &nexus.branches {
            match b.fraction {
                Some(f) if f.is_finite() && f > 0.0 && f <= 1.0 => fractions.push(f),
                Some(f) => {
                    return Err(DisaggError::invalid_input(
                        &nexus.id,
                        format!("branch fraction must lie in (0, 1], got {f}"),
                    ))
                }
                None => return Err(unresolved("branch fractions are not declared")),
            }
        }
        let total: f64 = fractions.iter().sum();
        if (total - 1.0).abs() > BRANCH_SUM_TOLERANCE {
            return Err(DisaggError::invalid_input(
                &nexus.id,
                format!("branch fractions sum to {total}, expected 1"),
            ));
        }

        let edges = match self.policy {
            DiffluencePolicy::DominantBranch => {
                let mut best = 0;
                for (i, &f) in fractions.iter().enumerate() {
                    if f > fractions[best] {
                        best = i;
                    }
                }
                smallvec![(nexus.branches[best].catchment, 1.0)]
            }
            DiffluencePolicy::SplitByFraction => nexus
                .branches
                .iter()
                .zip(&fractions)
                .map(|(b, &f)| (b.catchment, f))
                .collect(),
            DiffluencePolicy::Reject => unreachable!("rejected above"),
        };
        Ok(edges)
    }

    /// Kahn's algorithm over the resolved edges.
    fn sort_topologically(&mut self) -> Result<()> {
        let n = self.catchments.len();
        let mut remaining: Vec<usize> = self.upstream.iter().map(|u| u.len()).collect();
        let mut ready: VecDeque<CatchmentIdx> = (0..n)
            .filter(|&i| remaining[i] == 0)
            .map(CatchmentIdx)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(c) = ready.pop_front() {
            order.push(c);
            for &(d, _) in &self.downstream[c.0] {
                remaining[d.0] -= 1;
                if remaining[d.0] == 0 {
                    ready.push_back(d);
                }
            }
        }

        if order.len() < n {
            let on_cycle = self.find_cycle_member(&remaining);
            return Err(DisaggError::CycleDetected {
                catchment: self.catchments[on_cycle.0].id.clone(),
            });
        }

        self.order = order;
        Ok(())
    }

    /// Walk upstream through unprocessed catchments until one repeats.
    ///
    /// Every unprocessed catchment still has an unprocessed upstream
    /// neighbour, so the walk must close a loop.
    fn find_cycle_member(&self, remaining: &[usize]) -> CatchmentIdx {
        let start = remaining
            .iter()
            .position(|&r| r > 0)
            .map(CatchmentIdx)
            .unwrap_or(CatchmentIdx(0));
        let mut seen = vec![false; self.catchments.len()];
        let mut current = start;
        while !seen[current.0] {
            seen[current.0] = true;
            match self.upstream[current.0]
                .iter()
                .find(|u| remaining[u.0] > 0)
            {
                Some(&u) => current = u,
                None => break,
            }
        }
        current
    }

    /// One upstream-to-downstream pass: A_cum = A_inc + Σ share · A_cum(upstream).
    /// Every catchment must drain into its reference nexus.
    fn check_references(&self) -> Result<()> {
        for &c in &self.order {
            self.downstream_paths(c)?;
        }
        Ok(())
    }

    fn accumulate_area(&mut self) {
        let mut acc: Vec<f64> = self.catchments.iter().map(|c| c.area_km2).collect();
        for &c in &self.order {
            let a = acc[c.0];
            for &(d, share) in &self.downstream[c.0] {
                acc[d.0] += share * a;
            }
        }
        self.cumulative_area = acc;
    }

    fn assign_cohorts(&mut self) {
        let mut cohorts = vec![Vec::new(); self.nexuses.len()];
        for &c in &self.order {
            cohorts[self.catchments[c.0].reference_nexus.0].push(c);
        }
        for (i, members) in cohorts.iter().enumerate() {
            if !members.is_empty() {
                debug!(nexus = %self.nexuses[i].id, members = members.len(), "cohort");
            }
        }
        self.cohorts = cohorts;
    }

    // -- Accessors --

    pub fn len(&self) -> usize {
        self.catchments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catchments.is_empty()
    }

    pub fn policy(&self) -> DiffluencePolicy {
        self.policy
    }

    pub fn catchment(&self, idx: CatchmentIdx) -> &Catchment {
        &self.catchments[idx.0]
    }

    pub fn nexus(&self, idx: NexusIdx) -> &Nexus {
        &self.nexuses[idx.0]
    }

    pub fn catchments(&self) -> &[Catchment] {
        &self.catchments
    }

    pub fn catchment_idx(&self, id: &str) -> Result<CatchmentIdx> {
        self.catchment_index
            .get(id)
            .copied()
            .ok_or_else(|| DisaggError::UnknownEntity {
                kind: "catchment",
                id: id.to_string(),
            })
    }

    pub fn nexus_idx(&self, id: &str) -> Result<NexusIdx> {
        self.nexus_index
            .get(id)
            .copied()
            .ok_or_else(|| DisaggError::UnknownEntity {
                kind: "nexus",
                id: id.to_string(),
            })
    }

    /// Catchments in upstream-first order.
    pub fn topological_order(&self) -> &[CatchmentIdx] {
        &self.order
    }

    /// Resolved downstream edges of a catchment.
    pub fn downstream(&self, idx: CatchmentIdx) -> &[Edge] {
        &self.downstream[idx.0]
    }

    /// Catchments draining directly into this one.
    pub fn upstream(&self, idx: CatchmentIdx) -> &[CatchmentIdx] {
        &self.upstream[idx.0]
    }

    /// Incremental area plus every upstream incremental area [km^2].
    pub fn cumulative_area(&self, idx: CatchmentIdx) -> f64 {
        self.cumulative_area[idx.0]
    }

    /// Catchments normalized together under `nexus`, upstream first.
    pub fn cohort(&self, nexus: NexusIdx) -> &[CatchmentIdx] {
        &self.cohorts[nexus.0]
    }

    /// Non-empty cohorts in nexus order.
    pub fn cohorts(&self) -> impl Iterator<Item = (NexusIdx, &[CatchmentIdx])> + '_ {
        self.cohorts
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_empty())
            .map(|(i, m)| (NexusIdx(i), m.as_slice()))
    }

    /// True if no nexus has more than one downstream branch.
    pub fn is_dendritic(&self) -> bool {
        self.nexuses.iter().all(|n| n.branches.len() <= 1)
    }

    /// Whether `downstream` is reachable from `upstream` (strictly).
    pub fn is_downstream_of(&self, downstream: CatchmentIdx, upstream: CatchmentIdx) -> bool {
        let mut seen = vec![false; self.catchments.len()];
        let mut stack: Vec<CatchmentIdx> = self.downstream[upstream.0].iter().map(|e| e.0).collect();
        while let Some(c) = stack.pop() {
            if c == downstream {
                return true;
            }
            if !seen[c.0] {
                seen[c.0] = true;
                stack.extend(self.downstream[c.0].iter().map(|e| e.0));
            }
        }
        false
    }

    /// For each of `members`, the positions in `members` of the members
    /// strictly downstream of it, ascending.
    ///
    /// One pass over the reverse topological order, carrying a bit mask
    /// over `members` per catchment.
    pub fn downstream_within(&self, members: &[CatchmentIdx]) -> Vec<Vec<usize>> {
        let words = members.len().div_ceil(64);
        let mut position = vec![None; self.catchments.len()];
        for (k, c) in members.iter().enumerate() {
            position[c.0] = Some(k);
        }

        let mut below: Vec<Vec<u64>> = vec![Vec::new(); self.catchments.len()];
        for &c in self.order.iter().rev() {
            let mut mask = vec![0u64; words];
            for &(d, _) in &self.downstream[c.0] {
                if let Some(k) = position[d.0] {
                    mask[k / 64] |= 1u64 << (k % 64);
                }
                for (w, &b) in mask.iter_mut().zip(&below[d.0]) {
                    *w |= b;
                }
            }
            below[c.0] = mask;
        }

        members
            .iter()
            .map(|c| {
                let mask = &below[c.0];
                (0..members.len())
                    .filter(|&k| (mask[k / 64] >> (k % 64)) & 1 == 1)
                    .collect()
            })
            .collect()
    }

    /// Every path from `idx` to its reference nexus.
    ///
    /// A single path unless the policy splits diffluences.
    pub fn downstream_paths(&self, idx: CatchmentIdx) -> Result<Vec<FlowPath>> {
        let target = self.catchments[idx.0].reference_nexus;
        let mut paths = Vec::new();
        let mut stack = vec![(idx, 1.0, Vec::new())];

        while let Some((c, share, mut reaches)) = stack.pop() {
            reaches.push(c);
            if self.catchments[c.0].to_nexus == target {
                paths.push(FlowPath { share, reaches });
                continue;
            }
            let edges = &self.downstream[c.0];
            if edges.is_empty() {
                return Err(DisaggError::NexusNotDownstream {
                    catchment: self.catchments[idx.0].id.clone(),
                    nexus: self.nexuses[target.0].id.clone(),
                });
            }
            for &(d, s) in edges.iter().rev() {
                stack.push((d, share * s, reaches.clone()));
            }
        }

        Ok(paths)
    }

    /// The path from `idx` to its reference nexus; the dominant one when
    /// the water splits.
    pub fn downstream_path(&self, idx: CatchmentIdx) -> Result<FlowPath> {
        let mut paths = self.downstream_paths(idx)?;
        let mut best = 0;
        for (i, p) in paths.iter().enumerate() {
            if p.share > paths[best].share {
                best = i;
            }
        }
        Ok(paths.swap_remove(best))
    }
}
