//! Extended-period hydraulic simulation: solver lifecycle, demand and
//! control scheduling, tank integration, time advancement and pump energy
//! accounting. The single-period solution itself lives in [`solver`].

pub(crate) mod coeffs;
pub(crate) mod smatrix;
pub(crate) mod solver;
pub(crate) mod status;

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::files::hydfile::{HydFileMode, HydFileShape};
use crate::network::element::{Status, MISSING};
use crate::project::Project;
use crate::types::analysis::InitHydOption;
use crate::types::control::ControlType;
use crate::types::link::{LinkType, PumpType};
use crate::units::SEC_PER_DAY;
use solver::GradientSolver;
use tracing::{debug, info};

/// Flow assigned to a pipe at unit velocity when (re)initializing.
fn design_flow(diam: f64) -> f64 {
    std::f64::consts::PI * diam * diam / 4.0
}

impl Project {
    pub(crate) fn hyd_shape(&self) -> HydFileShape {
        HydFileShape {
            nnodes: self.network.n_nodes() as i32,
            nlinks: self.network.n_links() as i32,
            ntanks: self.network.n_tanks() as i32,
            npumps: self.network.n_pumps() as i32,
            nvalves: self.network.n_valves() as i32,
            duration: self.times.duration as i32,
        }
    }

    /// Opens the hydraulic solver: validates the network, computes link
    /// resistances and pump curve coefficients, and sizes the state arrays.
    pub(crate) fn open_hyd(&mut self) -> EngineResult<()> {
        self.require_open()?;
        if self.hydfile.mode == HydFileMode::Use {
            return Err(ErrorCode::HydFileInUse);
        }
        if self.network.njuncs < 1 {
            return Err(ErrorCode::NotEnoughNodes);
        }
        if self.network.n_tanks() < 1 {
            return Err(ErrorCode::NoTanksOrReservoirs);
        }
        self.update_resistances();
        self.update_pump_coeffs()?;
        self.size_hyd_arrays();
        self.hyd.open = true;
        self.hyd.initialized = false;
        Ok(())
    }

    pub(crate) fn update_resistances(&mut self) {
        let form = self.hyd.headloss_form;
        for link in self.network.links.iter_mut().skip(1) {
            link.r = coeffs::resistance(link, form);
        }
    }

    fn update_pump_coeffs(&mut self) -> EngineResult<()> {
        for p in 1..=self.network.n_pumps() {
            let (hcurve, link_idx) = {
                let pump = &self.network.pumps[p];
                (pump.hcurve, pump.link)
            };
            if hcurve > 0 {
                let (x, y) = {
                    let curve = self.network.curve(hcurve)?;
                    (curve.x.clone(), curve.y.clone())
                };
                let ucf = self.ucf;
                let pump = &mut self.network.pumps[p];
                if !coeffs::fit_pump_curve(pump, &x, &y, &ucf) {
                    return Err(ErrorCode::IllegalPumpCurve);
                }
            } else {
                let pump = &self.network.pumps[p];
                if pump.ptype == PumpType::NoCurve && self.network.links[link_idx as usize].km == 0.0
                {
                    return Err(ErrorCode::NoPumpCurve);
                }
                if self.network.links[link_idx as usize].km > 0.0 {
                    self.network.pumps[p].ptype = PumpType::ConstHp;
                }
            }
        }
        Ok(())
    }

    fn size_hyd_arrays(&mut self) {
        let nn = self.network.n_nodes() + 1;
        let nl = self.network.n_links() + 1;
        let nt = self.network.n_tanks() + 1;
        self.hyd.demand = vec![0.0; nn];
        self.hyd.full_demand = vec![0.0; nn];
        self.hyd.head = vec![0.0; nn];
        self.hyd.emitter_flow = vec![0.0; nn];
        self.hyd.flow = vec![0.0; nl];
        self.hyd.status = vec![Status::Open; nl];
        self.hyd.setting = vec![MISSING; nl];
        self.hyd.tank_volume = vec![0.0; nt];
    }

    /// Initializes tank levels, link status/settings and the clock. With a
    /// save flag the hydraulics scratch file is (re)created.
    pub(crate) fn init_hyd(&mut self, flag: InitHydOption) -> EngineResult<()> {
        if !self.hyd.open {
            return Err(ErrorCode::HydNotOpened);
        }
        for i in 1..=self.network.n_nodes() {
            self.hyd.head[i] = self.network.nodes[i].elevation;
            self.hyd.emitter_flow[i] = 0.0;
        }
        for t in 1..=self.network.n_tanks() {
            let tank = &self.network.tanks[t];
            self.hyd.tank_volume[t] = tank.v0;
            self.hyd.head[tank.node as usize] = tank.h0;
        }
        for k in 1..=self.network.n_links() {
            let link = &self.network.links[k];
            self.hyd.status[k] = link.status0;
            // Kc doubles as the initial setting: speed for pumps, setpoint
            // for valves, roughness for pipes.
            self.hyd.setting[k] = link.kc;
            if link.link_type == LinkType::Pump && self.hyd.setting[k] == MISSING {
                self.hyd.setting[k] = 1.0;
            }
            if flag.reinitializes() || self.hyd.flow[k] == 0.0 {
                self.hyd.flow[k] = match link.link_type {
                    LinkType::Pump => {
                        let pump = &self.network.pumps[self.network.pump_index(k as i32)];
                        if pump.q0 > 0.0 {
                            pump.q0
                        } else {
                            design_flow(1.0)
                        }
                    }
                    _ => design_flow(link.diam.max(0.1)),
                };
            }
        }
        for p in 1..=self.network.n_pumps() {
            self.network.pumps[p].energy = Default::default();
        }
        self.times.htime = 0;
        self.times.halted = false;
        self.times.rtime = self.times.rstart;
        self.times.rtime_rule = 0;
        self.hyd.warnings.clear();
        self.hyd.iterations = 0;
        self.hyd.relative_error = 0.0;

        self.hydfile_saving = flag.saves() && self.hydfile.mode == HydFileMode::Scratch;
        if self.hydfile_saving {
            self.hydfile.open_for_write(self.hyd_shape())?;
        }
        self.hyd.initialized = true;
        Ok(())
    }

    /// Solves hydraulics for the current point in time. Returns the clock.
    pub(crate) fn run_hyd(&mut self) -> EngineResult<u64> {
        if !self.hyd.open || !self.hyd.initialized {
            return Err(ErrorCode::HydNotOpened);
        }
        self.set_demands();
        self.apply_controls();
        self.solve_period()?;
        if self.hydfile_saving {
            let t = self.times.htime;
            let hyd = &self.hyd;
            self.hydfile.write_step(
                t,
                &hyd.demand,
                &hyd.head,
                &hyd.flow,
                &hyd.status,
                &hyd.setting,
            )?;
        }
        Ok(self.times.htime)
    }

    fn solve_period(&mut self) -> EngineResult<()> {
        let Project {
            ref network,
            ref mut hyd,
            ref ucf,
            ..
        } = *self;
        GradientSolver::new(network, hyd, ucf).run()?;
        debug!(
            time = self.times.htime,
            iterations = self.hyd.iterations,
            relerr = self.hyd.relative_error,
            "hydraulic period solved"
        );
        Ok(())
    }

    /// Scales junction demands by their patterns and updates reservoir heads.
    fn set_demands(&mut self) {
        let t = self.times.htime;
        for i in 1..=self.network.njuncs {
            let mut d = 0.0;
            for demand in &self.network.nodes[i].demands {
                d += demand.base * self.pattern_value(demand.pattern, t);
            }
            d *= self.hyd.dmult;
            self.hyd.full_demand[i] = d;
            self.hyd.demand[i] = d;
        }
        for tk in 1..=self.network.n_tanks() {
            let tank = &self.network.tanks[tk];
            if tank.is_reservoir() {
                let node = tank.node as usize;
                let base = self.network.nodes[node].elevation;
                self.hyd.head[node] = base * self.pattern_value(tank.pattern, t);
            }
        }
        for k in 1..=self.network.n_links() {
            if self.network.links[k].link_type == LinkType::Pump {
                let pump = &self.network.pumps[self.network.pump_index(k as i32)];
                if pump.upat > 0 && self.hyd.status[k].is_open() {
                    self.hyd.setting[k] = self.pattern_value(pump.upat, t);
                }
            }
        }
    }

    /// Applies simple controls scheduled or triggered at the current time.
    fn apply_controls(&mut self) {
        let t = self.times.htime;
        let clock = (t + self.times.tstart) % SEC_PER_DAY as u64;
        for c in 0..self.network.controls.len() {
            let control = self.network.controls[c].clone();
            if !control.enabled {
                continue;
            }
            let fire = match control.ctype {
                ControlType::Timer => control.time == t,
                ControlType::TimeOfDay => control.time == clock,
                ControlType::LowLevel => {
                    control.node > 0
                        && self.hyd.head[control.node as usize] <= control.grade + coeffs::HTOL
                }
                ControlType::HiLevel => {
                    control.node > 0
                        && self.hyd.head[control.node as usize] >= control.grade - coeffs::HTOL
                }
            };
            if !fire {
                continue;
            }
            let k = control.link as usize;
            let status_change = self.hyd.status[k] != control.status;
            let setting_change =
                control.setting != MISSING && self.hyd.setting[k] != control.setting;
            if status_change || setting_change {
                self.hyd.status[k] = control.status;
                if control.setting != MISSING {
                    self.hyd.setting[k] = control.setting;
                }
                debug!(
                    control = c + 1,
                    link = %self.network.links[k].id,
                    "simple control fired"
                );
            }
        }
    }

    /// Advances the clock to the next event, integrating tank levels and
    /// firing rules along the way. Returns the step taken (0 at the end).
    pub(crate) fn next_hyd(&mut self) -> EngineResult<u64> {
        if !self.hyd.open || !self.hyd.initialized {
            return Err(ErrorCode::HydNotOpened);
        }
        if self.times.htime >= self.times.duration {
            if self.hydfile_saving {
                self.hydfile.saved = true;
            }
            return Ok(0);
        }
        let t0 = self.times.htime;
        let tstep = self.compute_timestep();
        let taken = if self.network.rules.is_empty() {
            self.tank_levels(tstep);
            self.times.htime += tstep;
            tstep
        } else {
            self.rule_timestep(tstep)
        };
        self.accumulate_pump_energy(taken as f64 / 3600.0, t0);
        if self.times.htime >= self.times.duration && self.hydfile_saving {
            self.hydfile.saved = true;
        }
        Ok(taken)
    }

    /// Smallest of: remaining hydraulic interval, next pattern change, next
    /// scheduled control, next tank fill/empty event.
    fn compute_timestep(&self) -> u64 {
        let t = self.times.htime;
        let mut tstep = self.times.hstep - t % self.times.hstep;
        // Next pattern period boundary.
        if self.times.pstep > 0 {
            let dt = self.times.pstep - (t + self.times.pstart) % self.times.pstep;
            if dt > 0 && dt < tstep {
                tstep = dt;
            }
        }
        // Remaining duration.
        if t + tstep > self.times.duration {
            tstep = self.times.duration - t;
        }
        let tstep = self.control_timestep(tstep);
        self.tank_timestep(tstep)
    }

    /// Time until any tank hits its minimum or maximum level at the current
    /// net inflow, capped at the candidate step.
    pub(crate) fn tank_timestep(&self, mut tstep: u64) -> u64 {
        for tk in 1..=self.network.n_tanks() {
            if let Some(dt) = self.tank_timestep_for(tk, tstep) {
                if dt < tstep {
                    tstep = dt;
                }
            }
        }
        tstep
    }

    /// Fill/empty time for a single tank, if it occurs within `tstep`.
    pub(crate) fn tank_timestep_for(&self, tk: usize, tstep: u64) -> Option<u64> {
        let tank = &self.network.tanks[tk];
        if tank.is_reservoir() {
            return None;
        }
        let q = self.hyd.demand[tank.node as usize];
        if q.abs() <= coeffs::QTOL {
            return None;
        }
        let v = self.hyd.tank_volume[tk];
        let vlim = if q > 0.0 {
            if v >= tank.vmax {
                return None;
            }
            tank.vmax
        } else {
            if v <= tank.vmin {
                return None;
            }
            tank.vmin
        };
        let dt = ((vlim - v) / q).floor() as i64 + 1;
        if dt > 0 && (dt as u64) < tstep {
            Some(dt as u64)
        } else {
            None
        }
    }

    /// Time until the next timer control or level-control crossing.
    fn control_timestep(&self, mut tstep: u64) -> u64 {
        let t = self.times.htime;
        for control in &self.network.controls {
            if !control.enabled {
                continue;
            }
            let mut dt: i64 = 0;
            match control.ctype {
                ControlType::Timer => {
                    if control.time > t {
                        dt = (control.time - t) as i64;
                    }
                }
                ControlType::TimeOfDay => {
                    let clock = (t + self.times.tstart) % SEC_PER_DAY as u64;
                    dt = control.time as i64 - clock as i64;
                    if dt <= 0 {
                        dt += SEC_PER_DAY as i64;
                    }
                }
                ControlType::LowLevel | ControlType::HiLevel => {
                    // Project tank level linearly toward the trigger grade.
                    let n = control.node;
                    if self.network.tank_index(n) > 0 {
                        let tk = self.network.tank_index(n);
                        let tank = &self.network.tanks[tk];
                        if !tank.is_reservoir() && tank.area > 0.0 {
                            let h = self.hyd.head[n as usize];
                            let q = self.hyd.demand[n as usize];
                            if q.abs() > coeffs::QTOL {
                                let dv = (control.grade - h) * tank.area;
                                let step = dv / q;
                                if step > 0.0 {
                                    dt = step.floor() as i64 + 1;
                                }
                            }
                        }
                    }
                }
            }
            if dt > 0 && (dt as u64) < tstep {
                tstep = dt as u64;
            }
        }
        tstep
    }

    /// Integrates tank volumes over a step and recomputes tank heads.
    pub(crate) fn tank_levels(&mut self, tstep: u64) {
        for tk in 1..=self.network.n_tanks() {
            let tank = &self.network.tanks[tk];
            if tank.is_reservoir() {
                continue;
            }
            let q = self.hyd.demand[tank.node as usize];
            let mut v = self.hyd.tank_volume[tk] + q * tstep as f64;
            if v > tank.vmax && !tank.can_overflow {
                v = tank.vmax;
            }
            v = v.clamp(tank.vmin, f64::MAX);
            if tank.can_overflow {
                v = v.min(tank.vmax);
            }
            self.hyd.tank_volume[tk] = v;
            self.hyd.head[tank.node as usize] =
                self.network
                    .tank_grade(tk, v, self.ucf.elev, self.ucf.volume);
        }
    }

    /// Walks rule-step boundaries across a candidate step, firing rules and
    /// stopping early when an action changes the network. Returns the time
    /// actually elapsed.
    fn rule_timestep(&mut self, tstep: u64) -> u64 {
        let rstep = if self.times.rulestep > 0 {
            self.times.rulestep
        } else {
            (self.times.hstep / 10).max(1)
        };
        let t_end = self.times.htime + tstep;
        let mut elapsed = 0u64;
        loop {
            let t = self.times.htime;
            let boundary = rstep - t % rstep;
            let dt = boundary.min(t_end - t);
            if dt == 0 {
                break;
            }
            self.tank_levels(dt);
            self.times.htime += dt;
            elapsed += dt;
            if self.times.htime % rstep == 0 {
                let actions = self.check_rules(rstep);
                if actions > 0 {
                    break;
                }
            }
            if self.times.htime >= t_end {
                break;
            }
        }
        elapsed
    }

    /// Runs a complete extended-period hydraulic analysis, saving results to
    /// the hydraulics scratch file.
    pub(crate) fn solve_hyd(&mut self) -> EngineResult<()> {
        if self.hydfile.mode == HydFileMode::Use {
            return Err(ErrorCode::HydFileInUse);
        }
        self.open_hyd()?;
        let result = (|| {
            self.init_hyd(InitHydOption::SaveAndInit)?;
            loop {
                self.run_hyd()?;
                let tstep = self.next_hyd()?;
                if tstep == 0 {
                    break;
                }
            }
            Ok(())
        })();
        self.close_hyd();
        if let Err(code) = result {
            return Err(code);
        }
        let warning = self.hyd.warnings.highest();
        if warning > 0 {
            info!(warning, "hydraulic analysis completed with warnings");
        }
        Ok(())
    }

    pub(crate) fn close_hyd(&mut self) {
        self.hyd.open = false;
        self.hyd.initialized = false;
        self.hydfile.close();
    }

    fn accumulate_pump_energy(&mut self, dt_hrs: f64, t: u64) {
        if dt_hrs <= 0.0 {
            return;
        }
        for p in 1..=self.network.n_pumps() {
            let k = self.network.pumps[p].link as usize;
            let q = self.hyd.flow[k];
            if !self.hyd.status[k].is_open() || q <= coeffs::TINY {
                continue;
            }
            let link = &self.network.links[k];
            let (n1, n2) = (link.n1 as usize, link.n2 as usize);
            let hgain = (self.hyd.head[n2] - self.hyd.head[n1]).max(0.0);
            let effic = self.pump_efficiency(p, q);
            // Water horsepower -> kW at the wire.
            let kw = q * hgain * self.hyd.spgrav * 62.4 / 550.0 * crate::units::KW_PER_HP
                / (effic / 100.0);
            let price = self.pump_price(p, t);
            let e = &mut self.network.pumps[p].energy;
            e.time_online += dt_hrs;
            e.efficiency += effic * dt_hrs;
            e.kw_hrs += kw * dt_hrs;
            if q > 0.0 {
                e.kw_per_flow += kw / (q * self.ucf.flow) * dt_hrs;
            }
            e.max_kw = e.max_kw.max(kw);
            e.total_cost += kw * dt_hrs * price;
            e.current_power = kw;
            e.current_effic = effic;
        }
    }

    pub(crate) fn pump_efficiency(&self, pump: usize, q: f64) -> f64 {
        let p = &self.network.pumps[pump];
        if p.ecurve > 0 {
            let curve = &self.network.curves[p.ecurve as usize];
            let e = curve.interpolate(q.abs() * self.ucf.flow);
            if e > 1.0 {
                return e.min(100.0);
            }
        }
        self.hyd.epump
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::node::NodeType;
    use crate::types::options::{FlowUnits, HeadLossType};

    fn project_with_tank() -> Project {
        let mut pr = Project::new().unwrap();
        pr.init(FlowUnits::Gpm, HeadLossType::HazenWilliams).unwrap();
        pr.network.add_node("J1", NodeType::Junction).unwrap();
        pr.network.add_node("T1", NodeType::Tank).unwrap();
        {
            let node_idx = pr.network.find_node("T1");
            pr.network.nodes[node_idx as usize].elevation = 100.0;
            let tank = pr.network.tank_of_node_mut(node_idx).unwrap();
            tank.area = 100.0;
            tank.hmin = 110.0;
            tank.h0 = 120.0;
            tank.hmax = 140.0;
            tank.vmin = 1000.0;
            tank.v0 = 2000.0;
            tank.vmax = 4000.0;
        }
        pr.network
            .add_link("P1", LinkType::Pipe, "J1", "T1")
            .unwrap();
        pr.times.duration = 24 * 3600;
        pr
    }

    #[test]
    fn tank_timestep_stays_within_step() {
        let mut pr = project_with_tank();
        pr.open_hyd().unwrap();
        pr.init_hyd(InitHydOption::NoSave).unwrap();
        // Fill at 1 cfs: (vmax - v0)/q = 2000 s, under the hydraulic step.
        pr.hyd.demand[2] = 1.0;
        let dt = pr.tank_timestep(3600);
        assert!(dt <= 3600);
        assert_eq!(dt, 2001);
        // Draining toward vmin: (vmin - v0)/q = 1000 s.
        pr.hyd.demand[2] = -1.0;
        assert_eq!(pr.tank_timestep(3600), 1001);
    }

    #[test]
    fn tank_levels_integrate_and_clamp() {
        let mut pr = project_with_tank();
        pr.open_hyd().unwrap();
        pr.init_hyd(InitHydOption::NoSave).unwrap();
        pr.hyd.demand[2] = 1.0;
        pr.tank_levels(1000);
        assert!((pr.hyd.tank_volume[1] - 3000.0).abs() < 1e-9);
        // Head follows volume through the cylindrical relation.
        let expect = 110.0 + (3000.0 - 1000.0) / 100.0;
        assert!((pr.hyd.head[2] - expect).abs() < 1e-9);
        // Overfill clamps at vmax.
        pr.tank_levels(100000);
        assert!((pr.hyd.tank_volume[1] - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn run_before_open_is_a_sequence_error() {
        let mut pr = project_with_tank();
        assert_eq!(pr.run_hyd(), Err(ErrorCode::HydNotOpened));
        assert_eq!(pr.next_hyd(), Err(ErrorCode::HydNotOpened));
    }
}
