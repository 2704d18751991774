//! Water-quality simulation: Lagrangian transport over the saved hydraulics,
//! reaction kinetics, tank mixing, source injection and mass-balance
//! accounting. The quality clock advances in substeps no larger than the
//! quality time step, reading one hydraulic period at a time from the
//! hydraulics file and writing results at each reporting interval.

pub(crate) mod react;
pub(crate) mod segment;

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::files::hydfile::HydStep;
use crate::files::outfile::{OutFileProlog, PumpEnergyRecord, LINK_VARS, NODE_VARS};
use crate::network::element::MISSING;
use crate::project::Project;
use crate::types::node::{MixingModel, SourceType};
use crate::types::options::QualityType;
use crate::units::L_PER_FT3;
use segment::stored_mass;
use tracing::{debug, info};

/// Flows smaller than this carry no quality transport, cfs.
const Q_ZERO: f64 = 1.0e-7;

/// Water-quality mass balance tallies, in constituent mass units.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MassBalance {
    pub initial: f64,
    pub inflow: f64,
    pub outflow: f64,
    pub reacted: f64,
    pub final_stored: f64,
}

impl MassBalance {
    /// Ratio of accounted-for mass to supplied mass; 1.0 is perfect.
    pub fn ratio(&self) -> f64 {
        let supplied = self.initial + self.inflow;
        let accounted = self.outflow + self.reacted + self.final_stored;
        if supplied <= 0.0 {
            if accounted <= 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            accounted / supplied
        }
    }
}

impl Project {
    /// Opens the water-quality solver. Hydraulic results must exist (saved
    /// scratch run or an external file supplied via `use_hyd_file`).
    pub(crate) fn open_qual(&mut self) -> EngineResult<()> {
        self.require_open()?;
        if self.qual.open {
            return Ok(());
        }
        if self.times.qstep == 0 {
            self.times.qstep = (self.times.hstep / 10).max(1);
        }
        self.times.qstep = self.times.qstep.min(self.times.hstep);
        self.qual.open = true;
        self.qual.initialized = false;
        Ok(())
    }

    /// Initializes quality state and, when saving, the binary output file.
    pub(crate) fn init_qual(&mut self, save: bool) -> EngineResult<()> {
        if !self.qual.open {
            return Err(ErrorCode::QualNotOpened);
        }
        if !self.hydfile.saved {
            return Err(ErrorCode::NoHydResults);
        }
        let nn = self.network.n_nodes();
        self.qual.node_qual = vec![0.0; nn + 1];
        match self.qual.qualflag {
            QualityType::Trace => {
                if self.network.node(self.qual.trace_node).is_err() {
                    return Err(ErrorCode::UndefinedTraceNode);
                }
                self.qual.node_qual[self.qual.trace_node as usize] = 100.0;
            }
            _ => {
                for i in 1..=nn {
                    self.qual.node_qual[i] = self.network.nodes[i].c0;
                }
            }
        }

        // Tank volumes for the quality clock start from initial volumes.
        let ntanks = self.network.n_tanks();
        let mut tank_vol = vec![0.0; ntanks + 1];
        for t in 1..=ntanks {
            tank_vol[t] = self.network.tanks[t].v0;
        }
        self.qual
            .seg
            .init(&self.network, &self.qual.node_qual, &tank_vol);

        self.qual.mass_balance = MassBalance::default();
        self.qual.mass_balance.initial = self.stored_mass_total();
        self.qual.snapshot = None;
        self.qual.pending = None;
        self.times.qtime = 0;
        self.times.rtime = self.times.rstart;
        self.times.nperiods = 0;
        self.hydfile.open_for_read(self.hyd_shape())?;

        if save {
            let prolog = self.build_prolog();
            self.outfile.open_for_write(&prolog)?;
        }
        self.qual.save_flag = save;
        self.qual.initialized = true;
        Ok(())
    }

    pub(crate) fn build_prolog(&self) -> OutFileProlog {
        let net = &self.network;
        OutFileProlog {
            nnodes: net.n_nodes() as i32,
            ntanks: net.n_tanks() as i32,
            nlinks: net.n_links() as i32,
            npumps: net.n_pumps() as i32,
            nvalves: net.n_valves() as i32,
            qualflag: self.qual.qualflag as i32,
            trace_node: self.qual.trace_node,
            flow_units: self.flow_units as i32,
            press_units: self.press_units as i32,
            statistic: self.times.statistic as i32,
            rstart: self.times.rstart as i32,
            rstep: self.times.rstep as i32,
            duration: self.times.duration as i32,
            title: self.title.clone(),
            node_ids: net.nodes.iter().skip(1).map(|n| n.id.clone()).collect(),
            link_ids: net.links.iter().skip(1).map(|l| l.id.clone()).collect(),
            link_nodes: net.links.iter().skip(1).map(|l| (l.n1, l.n2)).collect(),
            link_types: net
                .links
                .iter()
                .skip(1)
                .map(|l| l.link_type as i32)
                .collect(),
        }
    }

    /// Total constituent mass currently stored in pipes and tanks.
    fn stored_mass_total(&self) -> f64 {
        if self.qual.qualflag != QualityType::Chem {
            return 0.0;
        }
        let mut mass = 0.0;
        for k in 1..=self.network.n_links() {
            for seg in &self.qual.seg.link[k] {
                mass += stored_mass(seg.v, seg.c);
            }
        }
        for t in 1..=self.network.n_tanks() {
            let tank = &self.network.tanks[t];
            if tank.is_reservoir() {
                continue;
            }
            match tank.mix_model {
                MixingModel::Mix1 => {
                    mass += stored_mass(
                        self.qual.seg.tank_vol[t],
                        self.qual.node_qual[tank.node as usize],
                    );
                }
                _ => {
                    for seg in &self.qual.seg.tank[t] {
                        mass += stored_mass(seg.v, seg.c);
                    }
                }
            }
        }
        mass
    }

    /// Supplies the next solved point in time, loading hydraulics and
    /// writing report-period output as the clock crosses each boundary.
    pub(crate) fn run_qual(&mut self) -> EngineResult<u64> {
        if !self.qual.open || !self.qual.initialized {
            return Err(ErrorCode::QualNotOpened);
        }
        let t = self.times.qtime;
        if self.qual.snapshot.is_none() {
            self.load_hydraulics()?;
        } else if let Some(pending) = &self.qual.pending {
            if t >= pending.time {
                self.load_hydraulics()?;
            }
        }
        // Report-period output at each boundary crossed.
        while self.qual.save_flag
            && self.times.rtime <= t
            && self.times.rtime <= self.times.duration
        {
            self.write_output_period()?;
            self.times.rtime += self.times.rstep;
            self.times.nperiods += 1;
        }
        Ok(t)
    }

    /// Loads the next hydraulic record (and read-ahead) from the file.
    fn load_hydraulics(&mut self) -> EngineResult<()> {
        let nn = self.network.n_nodes();
        let nl = self.network.n_links();
        let step = match self.qual.pending.take() {
            Some(s) => Some(s),
            None => self.hydfile.read_step(nn, nl)?,
        };
        let step = match step {
            Some(s) => s,
            None => return Err(ErrorCode::NoHydResults),
        };
        self.qual.pending = self.hydfile.read_step(nn, nl)?;
        self.qual.seg.reorient(&step.flow);
        self.qual.snapshot = Some(step);
        Ok(())
    }

    /// End of the validity window for the loaded hydraulics.
    fn snapshot_end(&self) -> u64 {
        match &self.qual.pending {
            Some(p) => p.time,
            None => self.times.duration,
        }
    }

    /// Advances quality to the end of the current hydraulic period.
    /// Returns the time advanced over (0 once the duration is reached).
    pub(crate) fn next_qual(&mut self) -> EngineResult<u64> {
        if !self.qual.open || !self.qual.initialized {
            return Err(ErrorCode::QualNotOpened);
        }
        if self.qual.snapshot.is_none() {
            self.load_hydraulics()?;
        } else if let Some(pending) = &self.qual.pending {
            if self.times.qtime >= pending.time {
                self.load_hydraulics()?;
            }
        }
        let start = self.times.qtime;
        let stop = self.snapshot_end().min(self.times.duration);
        while self.times.qtime < stop {
            let dt = self.times.qstep.min(stop - self.times.qtime);
            self.transport(dt as f64);
            self.times.qtime += dt;
        }
        if self.times.qtime >= self.times.duration {
            self.qual.mass_balance.final_stored = self.stored_mass_total();
        }
        Ok(self.times.qtime - start)
    }

    /// Advances quality by one quality time step. Returns time remaining.
    pub(crate) fn step_qual(&mut self) -> EngineResult<u64> {
        if !self.qual.open || !self.qual.initialized {
            return Err(ErrorCode::QualNotOpened);
        }
        if self.qual.snapshot.is_none() {
            self.load_hydraulics()?;
        } else if let Some(pending) = &self.qual.pending {
            if self.times.qtime >= pending.time {
                self.load_hydraulics()?;
            }
        }
        let stop = self.snapshot_end().min(self.times.duration);
        if self.times.qtime < stop {
            let dt = self.times.qstep.min(stop - self.times.qtime);
            self.transport(dt as f64);
            self.times.qtime += dt;
        }
        let remaining = self.times.duration.saturating_sub(self.times.qtime);
        if remaining == 0 {
            self.qual.mass_balance.final_stored = self.stored_mass_total();
        }
        Ok(remaining)
    }

    /// Runs a complete water-quality analysis over the saved hydraulics.
    pub(crate) fn solve_qual(&mut self) -> EngineResult<()> {
        self.open_qual()?;
        let result = (|| {
            self.init_qual(true)?;
            loop {
                self.run_qual()?;
                let tstep = self.next_qual()?;
                if tstep == 0 {
                    break;
                }
            }
            // Final report boundary (duration itself).
            self.run_qual()?;
            self.write_epilog()?;
            Ok(())
        })();
        self.close_qual();
        result?;
        let ratio = self.qual.mass_balance.ratio();
        if self.qual.qualflag == QualityType::Chem && (ratio - 1.0).abs() > 0.01 {
            info!(ratio, "water quality mass balance deviates");
        }
        Ok(())
    }

    pub(crate) fn close_qual(&mut self) {
        self.qual.open = false;
        self.qual.initialized = false;
        self.qual.snapshot = None;
        self.qual.pending = None;
        self.hydfile.close();
    }

    // ---- transport ----------------------------------------------------

    /// One quality substep over the loaded hydraulics.
    fn transport(&mut self, dt: f64) {
        if self.qual.qualflag == QualityType::None {
            return;
        }
        self.react(dt);
        self.advect(dt);
    }

    /// Reacts every pipe segment and tank for `dt` seconds.
    fn react(&mut self, dt: f64) {
        match self.qual.qualflag {
            QualityType::Age => {
                let dh = dt / 3600.0;
                for queue in self.qual.seg.link.iter_mut().skip(1) {
                    for seg in queue.iter_mut() {
                        seg.c += dh;
                    }
                }
                for queue in self.qual.seg.tank.iter_mut().skip(1) {
                    for seg in queue.iter_mut() {
                        seg.c += dh;
                    }
                }
                for t in 1..=self.network.n_tanks() {
                    let tank = &self.network.tanks[t];
                    if !tank.is_reservoir() && tank.mix_model == MixingModel::Mix1 {
                        self.qual.node_qual[tank.node as usize] += dh;
                    }
                }
                return;
            }
            QualityType::Chem => {}
            _ => return,
        }

        let snapshot = match &self.qual.snapshot {
            Some(s) => s,
            None => return,
        };
        for k in 1..=self.network.n_links() {
            let link = &self.network.links[k];
            let kb = link.kb.unwrap_or(self.qual.kbulk);
            let kw = link.kw.unwrap_or(self.qual.kwall);
            if kb == 0.0 && kw == 0.0 {
                continue;
            }
            let kw_eff = react::wall_rate(
                kw,
                self.qual.wall_order,
                link.diam,
                snapshot.flow[k],
                self.hyd.viscos,
                self.qual.diffus,
            );
            let queue = &mut self.qual.seg.link[k];
            for seg in queue.iter_mut() {
                let c0 = seg.c;
                let mut c = react::bulk_react(c0, kb, self.qual.bulk_order, self.qual.climit, dt);
                if kw_eff != 0.0 {
                    if self.qual.wall_order == 0.0 {
                        c = (c + kw_eff * dt).max(0.0);
                    } else {
                        c *= (kw_eff * dt).exp();
                    }
                }
                self.qual.mass_balance.reacted += stored_mass(seg.v, c0 - c);
                seg.c = c;
            }
        }
        for t in 1..=self.network.n_tanks() {
            let tank = &self.network.tanks[t];
            if tank.is_reservoir() {
                continue;
            }
            let kb = tank.kb.unwrap_or(self.qual.kbulk);
            if kb == 0.0 {
                continue;
            }
            let order = self.qual.tank_order;
            let climit = self.qual.climit;
            match tank.mix_model {
                MixingModel::Mix1 => {
                    let n = tank.node as usize;
                    let c0 = self.qual.node_qual[n];
                    let c = react::bulk_react(c0, kb, order, climit, dt);
                    self.qual.mass_balance.reacted +=
                        stored_mass(self.qual.seg.tank_vol[t], c0 - c);
                    self.qual.node_qual[n] = c;
                }
                _ => {
                    for seg in self.qual.seg.tank[t].iter_mut() {
                        let c0 = seg.c;
                        let c = react::bulk_react(c0, kb, order, climit, dt);
                        self.qual.mass_balance.reacted += stored_mass(seg.v, c0 - c);
                        seg.c = c;
                    }
                }
            }
        }
    }

    /// Moves segment volumes along links, mixes at nodes, injects sources
    /// and releases new upstream segments.
    fn advect(&mut self, dt: f64) {
        let snapshot = match self.qual.snapshot.take() {
            Some(s) => s,
            None => return,
        };
        let nn = self.network.n_nodes();
        let nl = self.network.n_links();
        let mut volin = vec![0.0; nn + 1];
        let mut massin = vec![0.0; nn + 1];

        // Pull water out of the downstream end of every flowing link.
        for k in 1..=nl {
            let q = snapshot.flow[k];
            if q.abs() <= Q_ZERO {
                continue;
            }
            let link = &self.network.links[k];
            let (up, down) = if q > 0.0 {
                (link.n1 as usize, link.n2 as usize)
            } else {
                (link.n2 as usize, link.n1 as usize)
            };
            let vq = q.abs() * dt;
            let fallback = self.qual.node_qual[up];
            let mass = self.qual.seg.remove_downstream(k, vq, fallback);
            volin[down] += vq;
            massin[down] += mass;
        }

        // New nodal qualities: junctions mix their inflows, tanks apply the
        // configured mixing model, reservoirs hold their source strength.
        for i in 1..=self.network.njuncs {
            if volin[i] > 0.0 {
                self.qual.node_qual[i] = massin[i] / volin[i];
            }
        }
        for t in 1..=self.network.n_tanks() {
            let tank_node = self.network.tanks[t].node as usize;
            if self.network.tanks[t].is_reservoir() {
                if self.qual.qualflag != QualityType::Trace {
                    self.qual.node_qual[tank_node] = self.network.nodes[tank_node].c0;
                }
                // Water absorbed by a reservoir leaves the system.
                self.qual.mass_balance.outflow += massin[tank_node];
                continue;
            }
            let vnet = snapshot.demand[tank_node] * dt;
            let vout = (volin[tank_node] - vnet).max(0.0);
            let mix_model = self.network.tanks[t].mix_model;
            let update = match mix_model {
                MixingModel::Mix1 => segment::mix1(
                    self.qual.seg.tank_vol[t],
                    &mut self.qual.node_qual[tank_node],
                    volin[tank_node],
                    massin[tank_node],
                ),
                MixingModel::Mix2 => {
                    let tank = &self.network.tanks[t];
                    let v1max = (tank.v1frac * tank.vmax).max(1.0);
                    segment::mix2(
                        &mut self.qual.seg.tank[t],
                        v1max,
                        volin[tank_node],
                        massin[tank_node],
                        vout,
                    )
                }
                MixingModel::Fifo => segment::fifo(
                    &mut self.qual.seg.tank[t],
                    volin[tank_node],
                    massin[tank_node],
                    vout,
                    self.qual.ctol,
                ),
                MixingModel::Lifo => segment::lifo(
                    &mut self.qual.seg.tank[t],
                    volin[tank_node],
                    massin[tank_node],
                    vout,
                    self.qual.ctol,
                ),
            };
            self.qual.seg.tank_vol[t] = (self.qual.seg.tank_vol[t] + vnet).max(0.0);
            self.qual.node_qual[tank_node] = update.c_out;
        }

        // External sources adjust the quality leaving their node.
        self.apply_sources(&snapshot, dt);

        if self.qual.qualflag == QualityType::Trace {
            self.qual.node_qual[self.qual.trace_node as usize] = 100.0;
        }

        // Demand outflow leaves the system carrying the nodal quality.
        for i in 1..=self.network.njuncs {
            let d = snapshot.demand[i];
            if d > 0.0 {
                self.qual.mass_balance.outflow += stored_mass(d * dt, self.qual.node_qual[i]);
            }
        }

        // Release new plugs into the upstream end of every flowing link.
        for k in 1..=nl {
            let q = snapshot.flow[k];
            if q.abs() <= Q_ZERO {
                continue;
            }
            let link = &self.network.links[k];
            let up = if q > 0.0 { link.n1 } else { link.n2 } as usize;
            let c = self.qual.node_qual[up];
            // Mass released from reservoirs is new to the system.
            if self.network.tank_of_node(up as i32).map(|t| t.is_reservoir()) == Some(true) {
                self.qual.mass_balance.inflow += stored_mass(q.abs() * dt, c);
            }
            self.qual
                .seg
                .add_upstream(k, q.abs() * dt, c, self.qual.ctol);
        }

        self.qual.snapshot = Some(snapshot);
    }

    /// Source injection per node kind, tallying mass added.
    fn apply_sources(&mut self, snapshot: &HydStep, dt: f64) {
        if self.qual.qualflag != QualityType::Chem {
            return;
        }
        let t = self.times.qtime;
        for i in 1..=self.network.n_nodes() {
            let Some(source) = self.network.nodes[i].source.clone() else {
                continue;
            };
            let strength = source.c0 * self.pattern_value(source.pattern, t);
            if strength <= 0.0 {
                continue;
            }
            // Outflow volume from this node over the substep.
            let mut qout = 0.0;
            for k in 1..=self.network.n_links() {
                let link = &self.network.links[k];
                let q = snapshot.flow[k];
                if (q > Q_ZERO && link.n1 as usize == i) || (q < -Q_ZERO && link.n2 as usize == i) {
                    qout += q.abs();
                }
            }
            let volout = qout * dt;
            if volout <= 0.0 {
                continue;
            }
            let c = self.qual.node_qual[i];
            let added_mass = match source.stype {
                SourceType::Concen => {
                    // Applies to external inflow only: a junction's negative
                    // demand or a reservoir's release.
                    let external = if self.network.is_junction(i as i32) {
                        (-snapshot.demand[i]).max(0.0)
                    } else if self
                        .network
                        .tank_of_node(i as i32)
                        .map(|t| t.is_reservoir())
                        == Some(true)
                    {
                        qout
                    } else {
                        0.0
                    };
                    stored_mass(external.min(qout) * dt, strength)
                }
                SourceType::Mass => strength * dt / 60.0, // mass/min
                SourceType::Setpoint => {
                    if c < strength {
                        stored_mass(volout, strength - c)
                    } else {
                        0.0
                    }
                }
                SourceType::FlowPaced => stored_mass(volout, strength),
            };
            if added_mass > 0.0 {
                self.qual.node_qual[i] = c + added_mass / (volout * L_PER_FT3);
                self.qual.mass_balance.inflow += added_mass;
                if let Some(src) = &mut self.network.nodes[i].source {
                    src.smass = added_mass / dt;
                }
            }
        }
    }

    // ---- output -------------------------------------------------------

    /// Writes one reporting period from the loaded hydraulics and current
    /// quality, converting to user units.
    pub(crate) fn write_output_period(&mut self) -> EngineResult<()> {
        let snapshot = match self.qual.snapshot.take() {
            Some(s) => s,
            None => return Err(ErrorCode::NoHydResults),
        };
        let (node_vars, link_vars) = self.result_arrays(&snapshot);
        self.outfile.write_period(&node_vars, &link_vars)?;
        self.qual.snapshot = Some(snapshot);
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn result_arrays(
        &self,
        snapshot: &HydStep,
    ) -> ([Vec<f64>; NODE_VARS], [Vec<f64>; LINK_VARS]) {
        let nn = self.network.n_nodes();
        let nl = self.network.n_links();
        let mut demand = vec![0.0; nn + 1];
        let mut head = vec![0.0; nn + 1];
        let mut pressure = vec![0.0; nn + 1];
        let mut quality = vec![0.0; nn + 1];
        for i in 1..=nn {
            demand[i] = snapshot.demand[i] * self.ucf.flow;
            head[i] = snapshot.head[i] * self.ucf.elev;
            pressure[i] =
                (snapshot.head[i] - self.network.nodes[i].elevation) * self.ucf.pressure;
            quality[i] = self.qual.node_qual.get(i).copied().unwrap_or(0.0);
        }
        let mut flow = vec![0.0; nl + 1];
        let mut velocity = vec![0.0; nl + 1];
        let mut headloss = vec![0.0; nl + 1];
        let mut lquality = vec![0.0; nl + 1];
        let mut status = vec![0.0; nl + 1];
        let mut setting = vec![0.0; nl + 1];
        for k in 1..=nl {
            let link = &self.network.links[k];
            let q = snapshot.flow[k];
            flow[k] = q * self.ucf.flow;
            if link.diam > 0.0 {
                let area = std::f64::consts::PI * link.diam * link.diam / 4.0;
                velocity[k] = q.abs() / area * self.ucf.velocity;
            }
            headloss[k] = (snapshot.head[link.n1 as usize] - snapshot.head[link.n2 as usize])
                * self.ucf.elev;
            lquality[k] = self.qual.seg.link_quality(k);
            status[k] = snapshot.status[k].to_code() as f64;
            setting[k] = if snapshot.setting[k] == MISSING {
                0.0
            } else {
                snapshot.setting[k]
            };
        }
        (
            [demand, head, pressure, quality],
            [flow, velocity, headloss, lquality, status, setting],
        )
    }

    pub(crate) fn write_epilog(&mut self) -> EngineResult<()> {
        let mut pumps = Vec::new();
        let total_hrs = (self.times.duration as f64 / 3600.0).max(1.0);
        for p in 1..=self.network.n_pumps() {
            let pump = &self.network.pumps[p];
            let e = &pump.energy;
            let online = e.time_online.max(1e-9);
            pumps.push(PumpEnergyRecord {
                link: pump.link,
                utilization: (100.0 * e.time_online / total_hrs) as f32,
                efficiency: (e.efficiency / online) as f32,
                kw_per_flow: (e.kw_per_flow / online) as f32,
                avg_kw: (e.kw_hrs / online) as f32,
                peak_kw: e.max_kw as f32,
                cost: e.total_cost as f32,
            });
        }
        let demand_charge: f64 = self
            .network
            .pumps
            .iter()
            .skip(1)
            .map(|p| p.energy.max_kw * self.hyd.dcharge)
            .sum();
        let warnings = self.hyd.warnings.highest();
        self.outfile.write_epilog(&pumps, demand_charge, warnings)?;
        debug!(periods = self.outfile.nperiods, "output file finished");
        Ok(())
    }
}
