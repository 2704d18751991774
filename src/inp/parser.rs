//! INP file reader. Lines are gathered per section first, then processed in
//! dependency order (units and globals before elements, elements before the
//! clauses that reference them) with unit conversion applied as values land
//! in the network.

use std::collections::HashMap;
use std::path::Path;

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::network::element::{ControlRecord, Source, Status, MISSING};
use crate::project::Project;
use crate::types::control::ControlType;
use crate::types::curve::CurveType;
use crate::types::link::LinkType;
use crate::types::node::{MixingModel, NodeType, SourceType};
use crate::types::options::{FlowUnits, HeadLossType, QualityType, StatisticType};
use crate::types::DemandModel;
use crate::units::{KW_PER_HP, MM_PER_FT};
use super::{section_kind, SectionKind};
use crate::hydraulics::coeffs::minor_loss_coeff;
use tracing::warn;

type Sections = HashMap<SectionKind, Vec<String>>;

impl Project {
    /// Parses an INP file into this (fresh) project.
    pub(crate) fn read_inp(&mut self, path: &Path) -> EngineResult<()> {
        let text =
            std::fs::read_to_string(path).map_err(|_| ErrorCode::CannotOpenInputFile)?;
        let mut sections: Sections = HashMap::new();
        let mut current: Option<SectionKind> = None;
        for raw in text.lines() {
            let line = raw.split(';').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                current = section_kind(line);
                if current.is_none() {
                    warn!(heading = line, "unknown input section skipped");
                }
                continue;
            }
            if let Some(kind) = current {
                sections.entry(kind).or_default().push(line.to_string());
            }
        }

        self.open_flag = true;
        let mut errors = 0usize;
        let mut run = |this: &mut Project, kind: SectionKind, f: fn(&mut Project, &str) -> EngineResult<()>| {
            if let Some(lines) = sections.get(&kind) {
                for line in lines {
                    if let Err(code) = f(this, line) {
                        errors += 1;
                        this.report
                            .write_message(&format!("Error {}: {line}", code.code()));
                    }
                }
            }
        };

        run(self, SectionKind::Options, Project::parse_option_line);
        run(self, SectionKind::Times, Project::parse_time_line);
        run(self, SectionKind::Patterns, Project::parse_pattern_line);
        run(self, SectionKind::Curves, Project::parse_curve_line);
        run(self, SectionKind::Junctions, Project::parse_junction_line);
        run(self, SectionKind::Reservoirs, Project::parse_reservoir_line);
        run(self, SectionKind::Tanks, Project::parse_tank_line);
        run(self, SectionKind::Pipes, Project::parse_pipe_line);
        run(self, SectionKind::Pumps, Project::parse_pump_line);
        run(self, SectionKind::Valves, Project::parse_valve_line);
        // A [DEMANDS] section replaces the base demands given on junction lines.
        if sections.contains_key(&SectionKind::Demands) {
            for node in self.network.nodes.iter_mut().skip(1) {
                node.demands.clear();
            }
        }
        run(self, SectionKind::Demands, Project::parse_demand_line);
        run(self, SectionKind::Emitters, Project::parse_emitter_line);
        run(self, SectionKind::Status, Project::parse_status_line);
        run(self, SectionKind::Controls, Project::parse_control_line);
        run(self, SectionKind::Quality, Project::parse_quality_line);
        run(self, SectionKind::Sources, Project::parse_source_line);
        run(self, SectionKind::Reactions, Project::parse_reaction_line);
        run(self, SectionKind::Mixing, Project::parse_mixing_line);
        run(self, SectionKind::Energy, Project::parse_energy_line);
        run(self, SectionKind::Report, Project::parse_report_line);
        run(self, SectionKind::Coordinates, Project::parse_coord_line);
        run(self, SectionKind::Vertices, Project::parse_vertex_line);

        if let Some(lines) = sections.get(&SectionKind::Title) {
            for (i, line) in lines.iter().take(3).enumerate() {
                self.title[i] = line.clone();
            }
        }
        if let Some(lines) = sections.get(&SectionKind::Rules) {
            for rule_text in split_rules(lines) {
                if let Err(code) = self.parse_rule(&rule_text) {
                    errors += 1;
                    self.report
                        .write_message(&format!("Error {}: in rule", code.code()));
                }
            }
        }

        // Junctions with no demand data still need one category, and
        // categories without a pattern fall back to the default pattern.
        if let Some(id) = self.hyd.def_pat_id.take() {
            self.hyd.def_pat = self.network.find_pattern(&id);
        }
        let def_pat = self.hyd.def_pat;
        for i in 1..=self.network.njuncs {
            let node = &mut self.network.nodes[i];
            if node.demands.is_empty() {
                node.demands.push(Default::default());
            }
            for demand in &mut node.demands {
                if demand.pattern == 0 {
                    demand.pattern = def_pat;
                }
            }
        }
        // The trace node may have been named before it was defined.
        if let Some(id) = self.qual.trace_node_id.take() {
            let node = self.network.find_node(&id);
            if node == 0 {
                return Err(ErrorCode::UndefinedTraceNode);
            }
            self.qual.trace_node = node;
        }
        if errors > 0 {
            return Err(ErrorCode::InputFileErrors);
        }
        Ok(())
    }

    fn parse_option_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let key = tokens[0].to_uppercase();
        let key2 = tokens.get(1).map(|t| t.to_uppercase()).unwrap_or_default();
        match key.as_str() {
            "UNITS" => {
                self.flow_units = match key2.as_str() {
                    "CFS" => FlowUnits::Cfs,
                    "GPM" => FlowUnits::Gpm,
                    "MGD" => FlowUnits::Mgd,
                    "IMGD" => FlowUnits::Imgd,
                    "AFD" => FlowUnits::Afd,
                    "LPS" => FlowUnits::Lps,
                    "LPM" => FlowUnits::Lpm,
                    "MLD" => FlowUnits::Mld,
                    "CMH" => FlowUnits::Cmh,
                    "CMD" => FlowUnits::Cmd,
                    _ => return Err(ErrorCode::IllegalOption),
                };
                self.press_units = crate::units::Ucf::default_press_units(self.flow_units);
                self.refresh_units();
            }
            "HEADLOSS" => {
                self.hyd.headloss_form = match key2.as_str() {
                    "H-W" => HeadLossType::HazenWilliams,
                    "D-W" => HeadLossType::DarcyWeisbach,
                    "C-M" => HeadLossType::ChezyManning,
                    _ => return Err(ErrorCode::IllegalOption),
                };
            }
            "QUALITY" => match key2.as_str() {
                "NONE" => self.qual.qualflag = QualityType::None,
                "AGE" => self.qual.qualflag = QualityType::Age,
                "TRACE" => {
                    self.qual.qualflag = QualityType::Trace;
                    let id = tokens.get(2).ok_or(ErrorCode::SyntaxError)?;
                    // Node may not exist yet; resolved again at initQ.
                    self.qual.chem_name = "Trace".to_string();
                    self.qual.chem_units = "percent".to_string();
                    self.qual.trace_node_id = Some(id.to_string());
                }
                "" => return Err(ErrorCode::SyntaxError),
                _ => {
                    self.qual.qualflag = QualityType::Chem;
                    self.qual.chem_name = tokens[1].to_string();
                    if let Some(units) = tokens.get(2) {
                        self.qual.chem_units = units.to_string();
                    }
                }
            },
            "VISCOSITY" => self.hyd.viscos = parse_number(tokens.last().unwrap())?,
            "DIFFUSIVITY" => self.qual.diffus = parse_number(tokens.last().unwrap())?,
            "SPECIFIC" => {
                self.hyd.spgrav = parse_number(tokens.last().unwrap())?;
                self.refresh_units();
            }
            "TRIALS" => self.hyd.max_iter = parse_number(tokens.last().unwrap())? as i32,
            "ACCURACY" => self.hyd.accuracy = parse_number(tokens.last().unwrap())?,
            "TOLERANCE" => self.qual.ctol = parse_number(tokens.last().unwrap())?,
            "EMITTER" => {
                let v = parse_number(tokens.last().unwrap())?;
                if v <= 0.0 {
                    return Err(ErrorCode::IllegalOption);
                }
                self.hyd.qexp = v;
            }
            "DEMAND" => match key2.as_str() {
                "MULTIPLIER" => self.hyd.dmult = parse_number(tokens.last().unwrap())?,
                "MODEL" => {
                    let word = tokens.last().unwrap().to_uppercase();
                    self.hyd.demand_model = if word == "PDA" {
                        DemandModel::Pda
                    } else {
                        DemandModel::Dda
                    };
                }
                _ => return Err(ErrorCode::IllegalOption),
            },
            "MINIMUM" => {
                self.hyd.pmin = parse_number(tokens.last().unwrap())? / self.ucf.pressure
            }
            "REQUIRED" => {
                self.hyd.preq = parse_number(tokens.last().unwrap())? / self.ucf.pressure
            }
            "PRESSURE" => {
                if key2 == "EXPONENT" {
                    self.hyd.pexp = parse_number(tokens.last().unwrap())?;
                }
            }
            "PATTERN" => {
                // Default demand pattern, resolved after patterns are read.
                let id = tokens.get(1).ok_or(ErrorCode::SyntaxError)?;
                self.hyd.def_pat_id = Some(id.to_string());
            }
            "UNBALANCED" => {
                if key2 == "STOP" {
                    self.hyd.extra_iter = -1;
                } else {
                    self.hyd.extra_iter = tokens
                        .last()
                        .and_then(|t| t.parse().ok())
                        .unwrap_or(0);
                }
            }
            "CHECKFREQ" => self.hyd.check_freq = parse_number(tokens.last().unwrap())? as i32,
            "MAXCHECK" => self.hyd.max_check = parse_number(tokens.last().unwrap())? as i32,
            "DAMPLIMIT" => self.hyd.damp_limit = parse_number(tokens.last().unwrap())?,
            "MAP" => {}
            _ => return Err(ErrorCode::IllegalOption),
        }
        Ok(())
    }

    fn parse_time_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let key = tokens[0].to_uppercase();
        let key2 = tokens.get(1).map(|t| t.to_uppercase()).unwrap_or_default();
        let value_tokens: &[&str] = if key2.chars().next().map(|c| c.is_ascii_alphabetic()) == Some(true)
            && !matches!(key.as_str(), "STATISTIC")
        {
            &tokens[2..]
        } else {
            &tokens[1..]
        };
        let seconds = || parse_clock(value_tokens);
        match key.as_str() {
            "DURATION" => self.times.duration = seconds()?,
            "HYDRAULIC" => self.times.hstep = seconds()?.max(1),
            "QUALITY" => self.times.qstep = seconds()?,
            "RULE" => self.times.rulestep = seconds()?,
            "PATTERN" => {
                if key2 == "START" {
                    self.times.pstart = seconds()?;
                } else {
                    self.times.pstep = seconds()?.max(1);
                }
            }
            "REPORT" => {
                if key2 == "START" {
                    self.times.rstart = seconds()?;
                } else {
                    self.times.rstep = seconds()?.max(1);
                }
            }
            "START" => self.times.tstart = seconds()? % 86400,
            "STATISTIC" => {
                self.times.statistic = match key2.as_str() {
                    "NONE" => StatisticType::Series,
                    "AVERAGED" | "AVERAGE" => StatisticType::Average,
                    "MINIMUM" => StatisticType::Minimum,
                    "MAXIMUM" => StatisticType::Maximum,
                    "RANGE" => StatisticType::Range,
                    _ => return Err(ErrorCode::IllegalOption),
                };
            }
            _ => return Err(ErrorCode::IllegalOption),
        }
        Ok(())
    }

    fn parse_pattern_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let id = tokens[0];
        let index = match self.network.find_pattern(id) {
            0 => {
                let i = self.network.add_pattern(id)?;
                self.network.patterns[i as usize].factors.clear();
                i
            }
            i => i,
        };
        for tok in &tokens[1..] {
            self.network.patterns[index as usize]
                .factors
                .push(parse_number(tok)?);
        }
        Ok(())
    }

    fn parse_curve_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        let id = tokens[0];
        let index = match self.network.find_curve(id) {
            0 => {
                let i = self.network.add_curve(id)?;
                let curve = &mut self.network.curves[i as usize];
                curve.x.clear();
                curve.y.clear();
                i
            }
            i => i,
        };
        let curve = &mut self.network.curves[index as usize];
        curve.x.push(parse_number(tokens[1])?);
        curve.y.push(parse_number(tokens[2])?);
        if !curve.is_valid() {
            return Err(ErrorCode::CurveNotIncreasing);
        }
        Ok(())
    }

    fn parse_junction_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let index = self.network.add_node(tokens[0], NodeType::Junction)?;
        let node = &mut self.network.nodes[index as usize];
        if let Some(tok) = tokens.get(1) {
            node.elevation = parse_number(tok)? / self.ucf.elev;
        }
        if let Some(tok) = tokens.get(2) {
            let base = parse_number(tok)? / self.ucf.flow;
            let pattern = tokens
                .get(3)
                .map(|p| self.network.find_pattern(p))
                .unwrap_or(0);
            let node = &mut self.network.nodes[index as usize];
            node.demands.clear();
            node.demands.push(crate::network::element::DemandRecord {
                base,
                pattern,
                name: String::new(),
            });
        }
        Ok(())
    }

    fn parse_reservoir_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let index = self.network.add_node(tokens[0], NodeType::Reservoir)?;
        if let Some(tok) = tokens.get(1) {
            self.network.nodes[index as usize].elevation = parse_number(tok)? / self.ucf.elev;
        }
        if let Some(pat) = tokens.get(2) {
            let p = self.network.find_pattern(pat);
            self.network.tank_of_node_mut(index).unwrap().pattern = p;
        }
        Ok(())
    }

    /// `ID elev initLvl minLvl maxLvl diam minVol [volCurve] [overflow]`
    fn parse_tank_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            return Err(ErrorCode::SyntaxError);
        }
        let index = self.network.add_node(tokens[0], NodeType::Tank)?;
        let elev = parse_number(tokens[1])? / self.ucf.elev;
        let init_lvl = parse_number(tokens[2])? / self.ucf.elev;
        let min_lvl = parse_number(tokens[3])? / self.ucf.elev;
        let max_lvl = parse_number(tokens[4])? / self.ucf.elev;
        let diam = parse_number(tokens[5])? / self.ucf.elev;
        let min_vol = tokens
            .get(6)
            .map(parse_number_ref)
            .transpose()?
            .unwrap_or(0.0)
            / self.ucf.volume;
        let vcurve = match tokens.get(7) {
            Some(&"*") | None => 0,
            Some(id) => self.network.find_curve(id),
        };
        let can_overflow = tokens
            .get(8)
            .map(|t| t.to_uppercase() == "YES")
            .unwrap_or(false);

        if min_lvl > init_lvl || init_lvl > max_lvl {
            return Err(ErrorCode::IllegalTankLevels);
        }
        self.network.nodes[index as usize].elevation = elev;
        let elev_ucf = self.ucf.elev;
        let vol_ucf = self.ucf.volume;
        let tk = self.network.tank_index(index);
        {
            let tank = &mut self.network.tanks[tk];
            tank.area = std::f64::consts::PI * diam * diam / 4.0;
            tank.hmin = elev + min_lvl;
            tank.h0 = elev + init_lvl;
            tank.hmax = elev + max_lvl;
            tank.vcurve = vcurve;
            tank.vmin = if min_vol > 0.0 { min_vol } else { 0.0 };
            tank.can_overflow = can_overflow;
        }
        // Derive the volume range through the (possibly curved) geometry.
        if vcurve == 0 && min_vol == 0.0 {
            let tank = &mut self.network.tanks[tk];
            tank.vmin = tank.area * min_lvl;
        }
        let hmin = self.network.tanks[tk].hmin;
        let h0 = self.network.tanks[tk].h0;
        let hmax = self.network.tanks[tk].hmax;
        self.network.tanks[tk].v0 = self.network.tank_volume(tk, h0, elev_ucf, vol_ucf);
        self.network.tanks[tk].vmax = self.network.tank_volume(tk, hmax, elev_ucf, vol_ucf);
        if vcurve > 0 {
            let vmin = self.network.tank_volume(tk, hmin, elev_ucf, vol_ucf);
            self.network.tanks[tk].vmin = vmin;
        }
        Ok(())
    }

    fn parse_pipe_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            return Err(ErrorCode::SyntaxError);
        }
        let index = self
            .network
            .add_link(tokens[0], LinkType::Pipe, tokens[1], tokens[2])?;
        let len = parse_number(tokens[3])? / self.ucf.elev;
        let diam = parse_number(tokens[4])? / self.ucf.diam;
        let mut kc = parse_number(tokens[5])?;
        if self.hyd.headloss_form == HeadLossType::DarcyWeisbach {
            kc /= if self.flow_units.is_si() { MM_PER_FT } else { 1000.0 };
        }
        let km_user = tokens.get(6).map(parse_number_ref).transpose()?.unwrap_or(0.0);
        let status = tokens.get(7).map(|t| t.to_uppercase());
        let link = &mut self.network.links[index as usize];
        link.len = len;
        link.diam = diam;
        link.kc = kc;
        link.km = minor_loss_coeff(km_user, diam);
        match status.as_deref() {
            Some("CV") => link.link_type = LinkType::CvPipe,
            Some("CLOSED") => link.status0 = Status::Closed,
            Some("OPEN") | None => {}
            Some(_) => return Err(ErrorCode::SyntaxError),
        }
        Ok(())
    }

    fn parse_pump_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(ErrorCode::SyntaxError);
        }
        let index = self
            .network
            .add_link(tokens[0], LinkType::Pump, tokens[1], tokens[2])?;
        let pump_idx = self.network.pump_index(index);
        let mut i = 3;
        while i < tokens.len() {
            let keyword = tokens[i];
            let value = tokens.get(i + 1).ok_or(ErrorCode::SyntaxError)?;
            match keyword.to_uppercase().as_str() {
                "HEAD" => {
                    let c = self.network.find_curve(value);
                    if c == 0 {
                        return Err(ErrorCode::UndefinedCurve);
                    }
                    self.network.curves[c as usize].ctype = CurveType::PumpCurve;
                    self.network.pumps[pump_idx].hcurve = c;
                }
                "POWER" => {
                    let p = parse_number(value)?;
                    let kw = if self.flow_units.is_si() { p } else { p * KW_PER_HP };
                    self.network.links[index as usize].km = kw;
                    self.network.pumps[pump_idx].ptype =
                        crate::types::link::PumpType::ConstHp;
                }
                "SPEED" => {
                    self.network.links[index as usize].kc = parse_number(value)?;
                }
                "PATTERN" => {
                    let p = self.network.find_pattern(value);
                    if p == 0 {
                        return Err(ErrorCode::UndefinedPattern);
                    }
                    self.network.pumps[pump_idx].upat = p;
                }
                _ => return Err(ErrorCode::SyntaxError),
            }
            i += 2;
        }
        Ok(())
    }

    fn parse_valve_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            return Err(ErrorCode::SyntaxError);
        }
        let vtype = match tokens[4].to_uppercase().as_str() {
            "PRV" => LinkType::Prv,
            "PSV" => LinkType::Psv,
            "PBV" => LinkType::Pbv,
            "FCV" => LinkType::Fcv,
            "TCV" => LinkType::Tcv,
            "GPV" => LinkType::Gpv,
            _ => return Err(ErrorCode::SyntaxError),
        };
        let index = self
            .network
            .add_link(tokens[0], vtype, tokens[1], tokens[2])?;
        let diam = parse_number(tokens[3])? / self.ucf.diam;
        let setting = match vtype {
            LinkType::Gpv => {
                let c = self.network.find_curve(tokens[5]);
                if c == 0 {
                    return Err(ErrorCode::UndefinedCurve);
                }
                self.network.curves[c as usize].ctype = CurveType::HLossCurve;
                c as f64
            }
            LinkType::Prv | LinkType::Psv | LinkType::Pbv => {
                parse_number(tokens[5])? / self.ucf.pressure
            }
            LinkType::Fcv => parse_number(tokens[5])? / self.ucf.flow,
            _ => parse_number(tokens[5])?,
        };
        let km_user = tokens.get(6).map(parse_number_ref).transpose()?.unwrap_or(0.0);
        let link = &mut self.network.links[index as usize];
        link.diam = diam;
        link.kc = setting;
        link.km = minor_loss_coeff(km_user, diam);
        link.status0 = Status::Active;
        Ok(())
    }

    fn parse_demand_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ErrorCode::SyntaxError);
        }
        let node = self.network.find_node(tokens[0]);
        if node == 0 {
            return Err(ErrorCode::UndefinedNode);
        }
        if !self.network.is_junction(node) {
            return Err(ErrorCode::UndefinedNode);
        }
        let base = parse_number(tokens[1])? / self.ucf.flow;
        let pattern = tokens
            .get(2)
            .map(|p| self.network.find_pattern(p))
            .unwrap_or(0);
        self.network.nodes[node as usize]
            .demands
            .push(crate::network::element::DemandRecord {
                base,
                pattern,
                name: String::new(),
            });
        Ok(())
    }

    fn parse_emitter_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ErrorCode::SyntaxError);
        }
        let node = self.network.find_node(tokens[0]);
        if node == 0 || !self.network.is_junction(node) {
            return Err(ErrorCode::UndefinedNode);
        }
        let c = parse_number(tokens[1])?;
        if c < 0.0 {
            return Err(ErrorCode::IllegalNodeProperty);
        }
        self.network.nodes[node as usize].ke =
            c * self.ucf.pressure.powf(self.hyd.qexp) / self.ucf.flow;
        Ok(())
    }

    fn parse_status_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ErrorCode::SyntaxError);
        }
        let link = self.network.find_link(tokens[0]);
        if link == 0 {
            return Err(ErrorCode::UndefinedLink);
        }
        let word = tokens[1].to_uppercase();
        let lt = self.network.links[link as usize].link_type;
        match word.as_str() {
            "OPEN" => {
                self.network.links[link as usize].status0 = Status::Open;
                if lt.is_valve() {
                    // A forced-open valve abandons its setting.
                    self.network.links[link as usize].kc = MISSING;
                }
            }
            "CLOSED" => {
                if lt == LinkType::CvPipe {
                    return Err(ErrorCode::IllegalCvControl);
                }
                self.network.links[link as usize].status0 = Status::Closed;
            }
            _ => {
                // A numeric entry is a pump speed or valve setting.
                let v = parse_number(tokens[1])?;
                let internal = self.action_setting_to_internal(link, v);
                let l = &mut self.network.links[link as usize];
                l.kc = internal;
                if lt.is_valve() {
                    l.status0 = Status::Active;
                }
            }
        }
        Ok(())
    }

    /// `LINK id status IF NODE id ABOVE/BELOW value` or
    /// `LINK id status AT TIME t` / `AT CLOCKTIME c [AM|PM]`
    fn parse_control_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 || tokens[0].to_uppercase() != "LINK" {
            return Err(ErrorCode::SyntaxError);
        }
        let link = self.network.find_link(tokens[1]);
        if link == 0 {
            return Err(ErrorCode::UndefinedLink);
        }
        if self.network.links[link as usize].link_type == LinkType::CvPipe {
            return Err(ErrorCode::IllegalCvControl);
        }
        let (status, setting) = self.parse_control_action(link, tokens[2])?;
        let word = tokens[3].to_uppercase();
        let control = if word == "IF" {
            let node = self.network.find_node(tokens[5]);
            if node == 0 {
                return Err(ErrorCode::UndefinedNode);
            }
            let relation = tokens.get(6).ok_or(ErrorCode::SyntaxError)?.to_uppercase();
            let value = parse_number(tokens.get(7).ok_or(ErrorCode::SyntaxError)?)?;
            let is_junction = self.network.is_junction(node);
            let grade = if is_junction {
                self.network.nodes[node as usize].elevation + value / self.ucf.pressure
            } else {
                self.network.nodes[node as usize].elevation + value / self.ucf.elev
            };
            let ctype = match relation.as_str() {
                "BELOW" => ControlType::LowLevel,
                "ABOVE" => ControlType::HiLevel,
                _ => return Err(ErrorCode::SyntaxError),
            };
            ControlRecord {
                ctype,
                link,
                node,
                status,
                setting,
                grade,
                time: 0,
                enabled: true,
            }
        } else if word == "AT" {
            let what = tokens[4].to_uppercase();
            let time = parse_clock(&tokens[5..])?;
            let ctype = match what.as_str() {
                "TIME" => ControlType::Timer,
                "CLOCKTIME" => ControlType::TimeOfDay,
                _ => return Err(ErrorCode::SyntaxError),
            };
            ControlRecord {
                ctype,
                link,
                node: 0,
                status,
                setting,
                grade: 0.0,
                time,
                enabled: true,
            }
        } else {
            return Err(ErrorCode::SyntaxError);
        };
        self.network.add_control(control)?;
        Ok(())
    }

    fn parse_control_action(&self, link: i32, word: &str) -> EngineResult<(Status, f64)> {
        match word.to_uppercase().as_str() {
            "OPEN" => Ok((Status::Open, MISSING)),
            "CLOSED" => Ok((Status::Closed, MISSING)),
            _ => {
                let v = parse_number(word)?;
                let internal = self.action_setting_to_internal(link, v);
                let lt = self.network.links[link as usize].link_type;
                let status = if lt.is_valve() {
                    Status::Active
                } else {
                    Status::Open
                };
                Ok((status, internal))
            }
        }
    }

    fn parse_quality_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ErrorCode::SyntaxError);
        }
        let node = self.network.find_node(tokens[0]);
        if node == 0 {
            return Err(ErrorCode::UndefinedNode);
        }
        self.network.nodes[node as usize].c0 = parse_number(tokens[1])?;
        Ok(())
    }

    fn parse_source_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        let node = self.network.find_node(tokens[0]);
        if node == 0 {
            return Err(ErrorCode::UndefinedNode);
        }
        let stype = match tokens[1].to_uppercase().as_str() {
            "CONCEN" => SourceType::Concen,
            "MASS" => SourceType::Mass,
            "SETPOINT" => SourceType::Setpoint,
            "FLOWPACED" => SourceType::FlowPaced,
            _ => return Err(ErrorCode::SyntaxError),
        };
        let c0 = parse_number(tokens[2])?;
        let pattern = tokens
            .get(3)
            .map(|p| self.network.find_pattern(p))
            .unwrap_or(0);
        self.network.nodes[node as usize].source = Some(Source {
            stype,
            c0,
            pattern,
            smass: 0.0,
        });
        Ok(())
    }

    fn parse_reaction_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        let key = tokens[0].to_uppercase();
        let key2 = tokens[1].to_uppercase();
        let value = parse_number(tokens[2])?;
        let per_sec = value / crate::units::SEC_PER_DAY;
        match (key.as_str(), key2.as_str()) {
            ("ORDER", "BULK") => self.qual.bulk_order = value,
            ("ORDER", "WALL") => self.qual.wall_order = value,
            ("ORDER", "TANK") => self.qual.tank_order = value,
            ("GLOBAL", "BULK") => self.qual.kbulk = per_sec,
            ("GLOBAL", "WALL") => self.qual.kwall = per_sec,
            ("LIMITING", "POTENTIAL") => self.qual.climit = value,
            ("BULK", _) => {
                let link = self.network.find_link(tokens[1]);
                if link == 0 {
                    return Err(ErrorCode::UndefinedLink);
                }
                self.network.links[link as usize].kb = Some(per_sec);
            }
            ("WALL", _) => {
                let link = self.network.find_link(tokens[1]);
                if link == 0 {
                    return Err(ErrorCode::UndefinedLink);
                }
                self.network.links[link as usize].kw = Some(per_sec);
            }
            ("TANK", _) => {
                let node = self.network.find_node(tokens[1]);
                match self.network.tank_of_node_mut(node) {
                    Some(tank) => tank.kb = Some(per_sec),
                    None => return Err(ErrorCode::UndefinedNode),
                }
            }
            _ => return Err(ErrorCode::SyntaxError),
        }
        Ok(())
    }

    fn parse_mixing_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(ErrorCode::SyntaxError);
        }
        let node = self.network.find_node(tokens[0]);
        let model = match tokens[1].to_uppercase().as_str() {
            "MIXED" => MixingModel::Mix1,
            "2COMP" => MixingModel::Mix2,
            "FIFO" => MixingModel::Fifo,
            "LIFO" => MixingModel::Lifo,
            _ => return Err(ErrorCode::SyntaxError),
        };
        let frac = tokens.get(2).map(parse_number_ref).transpose()?.unwrap_or(1.0);
        match self.network.tank_of_node_mut(node) {
            Some(tank) => {
                tank.mix_model = model;
                tank.v1frac = frac.clamp(0.0, 1.0).max(1.0e-4);
                Ok(())
            }
            None => Err(ErrorCode::UndefinedNode),
        }
    }

    fn parse_energy_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        match tokens[0].to_uppercase().as_str() {
            "GLOBAL" => match tokens[1].to_uppercase().as_str() {
                "EFFICIENCY" | "EFFIC" => self.hyd.epump = parse_number(tokens[2])?,
                "PRICE" => self.hyd.eprice = parse_number(tokens[2])?,
                "PATTERN" => self.hyd.epat = self.network.find_pattern(tokens[2]),
                _ => return Err(ErrorCode::IllegalEnergyData),
            },
            "DEMAND" => self.hyd.dcharge = parse_number(tokens[2])?,
            "PUMP" => {
                if tokens.len() < 4 {
                    return Err(ErrorCode::IllegalEnergyData);
                }
                let link = self.network.find_link(tokens[1]);
                let p = self.network.pump_index(link);
                if p == 0 {
                    return Err(ErrorCode::UndefinedPump);
                }
                match tokens[2].to_uppercase().as_str() {
                    "EFFICIENCY" | "EFFIC" => {
                        let c = self.network.find_curve(tokens[3]);
                        if c == 0 {
                            return Err(ErrorCode::NoEfficiencyCurve);
                        }
                        self.network.curves[c as usize].ctype = CurveType::EfficCurve;
                        self.network.pumps[p].ecurve = c;
                    }
                    "PRICE" => self.network.pumps[p].ecost = parse_number(tokens[3])?,
                    "PATTERN" => {
                        self.network.pumps[p].epat = self.network.find_pattern(tokens[3])
                    }
                    _ => return Err(ErrorCode::IllegalEnergyData),
                }
            }
            _ => return Err(ErrorCode::IllegalEnergyData),
        }
        Ok(())
    }

    fn parse_report_line(&mut self, line: &str) -> EngineResult<()> {
        // Unknown report keywords are tolerated.
        let _ = self.report.set_option(line);
        Ok(())
    }

    fn parse_coord_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        let node = self.network.find_node(tokens[0]);
        if node == 0 {
            return Err(ErrorCode::UndefinedNode);
        }
        let x = parse_number(tokens[1])?;
        let y = parse_number(tokens[2])?;
        self.network.nodes[node as usize].coords = Some((x, y));
        Ok(())
    }

    fn parse_vertex_line(&mut self, line: &str) -> EngineResult<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        let link = self.network.find_link(tokens[0]);
        if link == 0 {
            return Err(ErrorCode::UndefinedLink);
        }
        let x = parse_number(tokens[1])?;
        let y = parse_number(tokens[2])?;
        self.network.links[link as usize].vertices.push((x, y));
        Ok(())
    }
}

fn parse_number(token: &str) -> EngineResult<f64> {
    token.parse().map_err(|_| ErrorCode::IllegalNumericValue)
}

fn parse_number_ref(token: &&str) -> EngineResult<f64> {
    parse_number(token)
}

/// Parses `hh:mm[:ss]`, a decimal value with optional units word, or a
/// decimal-hours value with AM/PM, into seconds.
pub(crate) fn parse_clock(tokens: &[&str]) -> EngineResult<u64> {
    if tokens.is_empty() {
        return Err(ErrorCode::SyntaxError);
    }
    let word = tokens[0];
    let qualifier = tokens.get(1).map(|t| t.to_uppercase());
    let seconds: f64 = if word.contains(':') {
        let mut parts = word.split(':');
        let h: f64 = parts
            .next()
            .unwrap()
            .parse()
            .map_err(|_| ErrorCode::IllegalNumericValue)?;
        let m: f64 = parts.next().unwrap_or("0").parse().unwrap_or(0.0);
        let s: f64 = parts.next().unwrap_or("0").parse().unwrap_or(0.0);
        h * 3600.0 + m * 60.0 + s
    } else {
        let v: f64 = word.parse().map_err(|_| ErrorCode::IllegalNumericValue)?;
        match qualifier.as_deref() {
            Some("SECONDS") | Some("SEC") => v,
            Some("MINUTES") | Some("MIN") => v * 60.0,
            Some("DAYS") | Some("DAY") => v * 86400.0,
            Some("AM") | Some("PM") => v * 3600.0,
            // Hours are the default for bare values.
            _ => v * 3600.0,
        }
    };
    let mut seconds = seconds;
    match qualifier.as_deref() {
        Some("PM") if seconds < 12.0 * 3600.0 => seconds += 12.0 * 3600.0,
        Some("AM") if seconds >= 12.0 * 3600.0 => seconds -= 12.0 * 3600.0,
        _ => {}
    }
    Ok(seconds.round() as u64)
}

/// Groups `[RULES]` section lines into one text block per RULE keyword.
fn split_rules(lines: &[String]) -> Vec<String> {
    let mut rules = Vec::new();
    let mut current = String::new();
    for line in lines {
        if line.to_uppercase().starts_with("RULE") && !current.is_empty() {
            rules.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        rules.push(current);
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_parsing() {
        assert_eq!(parse_clock(&["24:00"]).unwrap(), 86400);
        assert_eq!(parse_clock(&["1:30:30"]).unwrap(), 5430);
        assert_eq!(parse_clock(&["2"]).unwrap(), 7200);
        assert_eq!(parse_clock(&["90", "MINUTES"]).unwrap(), 5400);
        assert_eq!(parse_clock(&["6", "PM"]).unwrap(), 18 * 3600);
    }

    #[test]
    fn rules_split_on_keyword() {
        let lines: Vec<String> = [
            "RULE 1",
            "IF SYSTEM TIME > 0",
            "THEN PUMP P1 STATUS = OPEN",
            "RULE 2",
            "IF SYSTEM TIME > 0",
            "THEN PUMP P1 STATUS = CLOSED",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let rules = split_rules(&lines);
        assert_eq!(rules.len(), 2);
        assert!(rules[0].contains("RULE 1"));
        assert!(rules[1].contains("RULE 2"));
    }
}
