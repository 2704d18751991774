//! Lagrangian water-quality segments.
//!
//! Every pipe carries a deque of (volume, concentration) plugs ordered from
//! the downstream end (front) to the upstream end (back). Tanks using the
//! plug-flow mixing models carry their own deques; a two-compartment tank
//! keeps exactly two entries (mixing zone first).

use std::collections::VecDeque;

use crate::network::Network;
use crate::types::node::MixingModel;
use crate::units::L_PER_FT3;

/// One plug of water: volume in ft3, concentration in user mass units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
    pub v: f64,
    pub c: f64,
}

#[derive(Debug, Default)]
pub(crate) struct SegmentPools {
    /// Per-link plug queues; front = downstream end for the current flow
    /// direction.
    pub link: Vec<VecDeque<Segment>>,
    /// Per-tank plug queues (FIFO/LIFO) or [mixing zone, ambient zone] (MIX2).
    pub tank: Vec<VecDeque<Segment>>,
    /// Flow direction each link's queue is oriented for: +1 means n1 -> n2.
    pub flow_dir: Vec<i8>,
    /// Tank volumes tracked along the quality clock, ft3.
    pub tank_vol: Vec<f64>,
}

impl SegmentPools {
    /// Fills every pipe with one plug at its downstream node's quality and
    /// initializes tank pools from current volume and quality.
    pub fn init(&mut self, net: &Network, node_qual: &[f64], tank_vol: &[f64]) {
        let nlinks = net.n_links();
        self.link = vec![VecDeque::new(); nlinks + 1];
        self.flow_dir = vec![1; nlinks + 1];
        for k in 1..=nlinks {
            let link = &net.links[k];
            let vol = pipe_volume(link.diam, link.len);
            if vol > 0.0 {
                self.link[k].push_back(Segment {
                    v: vol,
                    c: node_qual[link.n2 as usize],
                });
            }
        }
        let ntanks = net.n_tanks();
        self.tank = vec![VecDeque::new(); ntanks + 1];
        self.tank_vol = vec![0.0; ntanks + 1];
        for t in 1..=ntanks {
            let tank = &net.tanks[t];
            if tank.is_reservoir() {
                continue;
            }
            let v = tank_vol[t];
            self.tank_vol[t] = v;
            let c = node_qual[tank.node as usize];
            match tank.mix_model {
                MixingModel::Mix2 => {
                    let v1max = (tank.v1frac * tank.vmax).max(1.0);
                    let v1 = v.min(v1max);
                    self.tank[t].push_back(Segment { v: v1, c });
                    self.tank[t].push_back(Segment { v: v - v1, c });
                }
                MixingModel::Fifo | MixingModel::Lifo => {
                    self.tank[t].push_back(Segment { v, c });
                }
                MixingModel::Mix1 => {}
            }
        }
    }

    /// Reverses any queue whose flow direction flipped with new hydraulics.
    pub fn reorient(&mut self, flows: &[f64]) {
        for k in 1..self.link.len() {
            let dir: i8 = if flows[k] < 0.0 { -1 } else { 1 };
            if dir != self.flow_dir[k] {
                self.link[k].make_contiguous().reverse();
                self.flow_dir[k] = dir;
            }
        }
    }

    /// Removes `vol` from the downstream end of link k, returning the mass
    /// removed. When the queue runs dry the caller's fallback concentration
    /// covers the remainder.
    pub fn remove_downstream(&mut self, k: usize, vol: f64, fallback_c: f64) -> f64 {
        let mut remaining = vol;
        let mut mass = 0.0;
        let mut last_c = fallback_c;
        let queue = &mut self.link[k];
        while remaining > 0.0 {
            match queue.front_mut() {
                Some(seg) => {
                    last_c = seg.c;
                    if seg.v > remaining {
                        seg.v -= remaining;
                        mass += remaining * seg.c;
                        remaining = 0.0;
                    } else {
                        mass += seg.v * seg.c;
                        remaining -= seg.v;
                        queue.pop_front();
                    }
                }
                None => {
                    mass += remaining * last_c;
                    remaining = 0.0;
                }
            }
        }
        mass
    }

    /// Adds a plug at the upstream end of link k, merging with the existing
    /// upstream plug when the concentrations are within tolerance.
    pub fn add_upstream(&mut self, k: usize, vol: f64, c: f64, ctol: f64) {
        if vol <= 0.0 {
            return;
        }
        let queue = &mut self.link[k];
        if let Some(seg) = queue.back_mut() {
            if (seg.c - c).abs() <= ctol {
                seg.c = (seg.c * seg.v + c * vol) / (seg.v + vol);
                seg.v += vol;
                return;
            }
        }
        queue.push_back(Segment { v: vol, c });
    }

    /// Volume-weighted average concentration across a link's plugs.
    pub fn link_quality(&self, k: usize) -> f64 {
        let Some(queue) = self.link.get(k) else {
            return 0.0;
        };
        let (v, m) = queue.iter().fold((0.0, 0.0), |(v, m), s| (v + s.v, m + s.v * s.c));
        if v > 0.0 {
            m / v
        } else {
            0.0
        }
    }
}

pub(crate) fn pipe_volume(diam: f64, len: f64) -> f64 {
    std::f64::consts::PI * diam * diam / 4.0 * len
}

/// Outcome of one tank mixing update: the concentration leaving the tank.
pub(crate) struct TankUpdate {
    pub c_out: f64,
}

/// Complete-mix model: the whole tank is one stirred volume. The caller
/// advances the tracked volume by the hydraulic net inflow separately.
pub(crate) fn mix1(vol: f64, conc: &mut f64, vin: f64, massin: f64) -> TankUpdate {
    let vnew = vol + vin;
    if vnew > 0.0 {
        *conc = (*conc * vol + massin) / vnew;
    }
    TankUpdate { c_out: *conc }
}

/// Two-compartment model: inflow stirs a bounded mixing zone that overflows
/// into (and draws back from) an ambient zone.
pub(crate) fn mix2(
    zones: &mut VecDeque<Segment>,
    v1max: f64,
    vin: f64,
    massin: f64,
    vout: f64,
) -> TankUpdate {
    if zones.len() < 2 {
        zones.resize(2, Segment { v: 0.0, c: 0.0 });
    }
    let vnet = vin - vout;
    // Stir the inflow into zone 1.
    {
        let z1 = &mut zones[0];
        let vnew = z1.v + vin;
        if vnew > 0.0 {
            z1.c = (z1.c * z1.v + massin) / vnew;
            z1.v = vnew;
        }
    }
    // Outflow always drawn from zone 1.
    zones[0].v -= vout;
    if vnet > 0.0 {
        // Surplus pushes zone-1 water into zone 2.
        let excess = zones[0].v - v1max;
        if excess > 0.0 {
            let c1 = zones[0].c;
            zones[0].v = v1max;
            let z2 = &mut zones[1];
            let vnew = z2.v + excess;
            z2.c = (z2.c * z2.v + c1 * excess) / vnew;
            z2.v = vnew;
        }
    } else if zones[0].v < 0.0 {
        // Deficit pulls ambient water back into the mixing zone.
        let shortfall = -zones[0].v;
        let take = shortfall.min(zones[1].v);
        let c2 = zones[1].c;
        zones[1].v -= take;
        let z1 = &mut zones[0];
        let vnew = take;
        if vnew > 0.0 {
            z1.c = c2;
        }
        z1.v = vnew;
    }
    TankUpdate { c_out: zones[0].c }
}

/// Plug flow, first in first out: inflow joins the inlet end, outflow is
/// drawn from the outlet end.
pub(crate) fn fifo(
    queue: &mut VecDeque<Segment>,
    vin: f64,
    massin: f64,
    vout: f64,
    ctol: f64,
) -> TankUpdate {
    if vin > 0.0 {
        let cin = massin / vin;
        match queue.back_mut() {
            Some(seg) if (seg.c - cin).abs() <= ctol => {
                seg.c = (seg.c * seg.v + massin) / (seg.v + vin);
                seg.v += vin;
            }
            _ => queue.push_back(Segment { v: vin, c: cin }),
        }
    }
    let mut remaining = vout;
    let mut mass = 0.0;
    let mut last_c = queue.front().map(|s| s.c).unwrap_or(0.0);
    while remaining > 0.0 {
        match queue.front_mut() {
            Some(seg) => {
                last_c = seg.c;
                if seg.v > remaining {
                    seg.v -= remaining;
                    mass += remaining * seg.c;
                    remaining = 0.0;
                } else {
                    mass += seg.v * seg.c;
                    remaining -= seg.v;
                    queue.pop_front();
                }
            }
            None => {
                mass += remaining * last_c;
                remaining = 0.0;
            }
        }
    }
    let c_out = if vout > 0.0 { mass / vout } else { last_c };
    TankUpdate { c_out }
}

/// Plug flow, last in first out: a stack filled and drained from the top.
pub(crate) fn lifo(
    queue: &mut VecDeque<Segment>,
    vin: f64,
    massin: f64,
    vout: f64,
    ctol: f64,
) -> TankUpdate {
    if vin > 0.0 {
        let cin = massin / vin;
        match queue.back_mut() {
            Some(seg) if (seg.c - cin).abs() <= ctol => {
                seg.c = (seg.c * seg.v + massin) / (seg.v + vin);
                seg.v += vin;
            }
            _ => queue.push_back(Segment { v: vin, c: cin }),
        }
    }
    let mut remaining = vout;
    let mut mass = 0.0;
    let mut last_c = queue.back().map(|s| s.c).unwrap_or(0.0);
    while remaining > 0.0 {
        match queue.back_mut() {
            Some(seg) => {
                last_c = seg.c;
                if seg.v > remaining {
                    seg.v -= remaining;
                    mass += remaining * seg.c;
                    remaining = 0.0;
                } else {
                    mass += seg.v * seg.c;
                    remaining -= seg.v;
                    queue.pop_back();
                }
            }
            None => {
                mass += remaining * last_c;
                remaining = 0.0;
            }
        }
    }
    let c_out = if vout > 0.0 { mass / vout } else { last_c };
    TankUpdate { c_out }
}

/// Total constituent mass in a volume, in mass units (mg when concentrations
/// are mg/L).
pub(crate) fn stored_mass(vol_ft3: f64, conc: f64) -> f64 {
    vol_ft3 * L_PER_FT3 * conc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_downstream_pops_in_order() {
        let mut pools = SegmentPools {
            link: vec![VecDeque::new(), VecDeque::new()],
            tank: vec![],
            flow_dir: vec![1, 1],
            tank_vol: vec![],
        };
        pools.link[1].push_back(Segment { v: 2.0, c: 1.0 });
        pools.link[1].push_back(Segment { v: 2.0, c: 3.0 });
        let mass = pools.remove_downstream(1, 3.0, 0.0);
        assert!((mass - (2.0 * 1.0 + 1.0 * 3.0)).abs() < 1e-12);
        assert_eq!(pools.link[1].len(), 1);
        assert!((pools.link[1][0].v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn add_upstream_merges_close_concentrations() {
        let mut pools = SegmentPools {
            link: vec![VecDeque::new(), VecDeque::new()],
            tank: vec![],
            flow_dir: vec![1, 1],
            tank_vol: vec![],
        };
        pools.add_upstream(1, 1.0, 2.0, 0.01);
        pools.add_upstream(1, 1.0, 2.005, 0.01);
        assert_eq!(pools.link[1].len(), 1);
        pools.add_upstream(1, 1.0, 5.0, 0.01);
        assert_eq!(pools.link[1].len(), 2);
    }

    #[test]
    fn fifo_outflow_takes_oldest_water() {
        let mut queue = VecDeque::new();
        queue.push_back(Segment { v: 10.0, c: 1.0 });
        let update = fifo(&mut queue, 5.0, 5.0 * 4.0, 5.0, 0.001);
        // Outflow is the original c=1 water; the fresh c=4 plug queues behind.
        assert!((update.c_out - 1.0).abs() < 1e-12);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn lifo_outflow_takes_newest_water() {
        let mut queue = VecDeque::new();
        queue.push_back(Segment { v: 10.0, c: 1.0 });
        let update = lifo(&mut queue, 5.0, 5.0 * 4.0, 5.0, 0.001);
        assert!((update.c_out - 4.0).abs() < 1e-12);
    }

    #[test]
    fn mix2_overflows_into_ambient_zone() {
        let mut zones = VecDeque::new();
        zones.push_back(Segment { v: 100.0, c: 0.0 });
        zones.push_back(Segment { v: 0.0, c: 0.0 });
        // Inflow of 50 at c=2 with no outflow, zone 1 capped at 100.
        mix2(&mut zones, 100.0, 50.0, 100.0, 0.0);
        assert!((zones[0].v - 100.0).abs() < 1e-12);
        assert!((zones[1].v - 50.0).abs() < 1e-12);
    }
}
