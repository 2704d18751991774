//! Canonical INP writer: serializes the network so that reading the output
//! back reproduces the same project state.

use std::fmt::Write as _;
use std::path::Path;

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::hydraulics::coeffs::minor_loss_user;
use crate::network::element::{Status, MISSING};
use crate::project::Project;
use crate::types::control::ControlType;
use crate::types::link::LinkType;
use crate::types::node::{MixingModel, SourceType};
use crate::types::options::{HeadLossType, QualityType, StatisticType};
use crate::types::DemandModel;
use crate::units::{KW_PER_HP, MM_PER_FT, SEC_PER_DAY};

fn clock(seconds: u64) -> String {
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

impl Project {
    /// Writes the network to an INP file.
    pub(crate) fn write_inp(&self, path: &Path) -> EngineResult<()> {
        let mut out = String::new();
        self.write_sections(&mut out);
        std::fs::write(path, out).map_err(|_| ErrorCode::CannotOpenInputFile)
    }

    fn write_sections(&self, out: &mut String) {
        let net = &self.network;
        let ucf = &self.ucf;

        let _ = writeln!(out, "[TITLE]");
        for line in self.title.iter().filter(|l| !l.is_empty()) {
            let _ = writeln!(out, "{line}");
        }

        let _ = writeln!(out, "\n[JUNCTIONS]");
        for i in 1..=net.njuncs {
            let node = &net.nodes[i];
            let _ = writeln!(out, "{}\t{:.4}", node.id, node.elevation * ucf.elev);
        }

        let _ = writeln!(out, "\n[RESERVOIRS]");
        for t in 1..=net.n_tanks() {
            let tank = &net.tanks[t];
            if !tank.is_reservoir() {
                continue;
            }
            let node = &net.nodes[tank.node as usize];
            let pat = pattern_id(net, tank.pattern);
            let _ = writeln!(out, "{}\t{:.4}\t{}", node.id, node.elevation * ucf.elev, pat);
        }

        let _ = writeln!(out, "\n[TANKS]");
        for t in 1..=net.n_tanks() {
            let tank = &net.tanks[t];
            if tank.is_reservoir() {
                continue;
            }
            let node = &net.nodes[tank.node as usize];
            let el = node.elevation;
            let diam = (4.0 * tank.area / std::f64::consts::PI).sqrt();
            let vcurve = if tank.vcurve > 0 {
                curve_id(net, tank.vcurve)
            } else if tank.can_overflow {
                // Placeholder keeps the overflow flag in its own column.
                "*"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{}{}",
                node.id,
                el * ucf.elev,
                (tank.h0 - el) * ucf.elev,
                (tank.hmin - el) * ucf.elev,
                (tank.hmax - el) * ucf.elev,
                diam * ucf.elev,
                tank.vmin * ucf.volume,
                vcurve,
                if tank.can_overflow { "\tYES" } else { "" },
            );
        }

        let _ = writeln!(out, "\n[PIPES]");
        for k in 1..=net.n_links() {
            let link = &net.links[k];
            if !link.link_type.is_pipe() {
                continue;
            }
            let mut kc = link.kc;
            if self.hyd.headloss_form == HeadLossType::DarcyWeisbach {
                kc *= if self.flow_units.is_si() { MM_PER_FT } else { 1000.0 };
            }
            let status = if link.link_type == LinkType::CvPipe {
                "CV"
            } else if link.status0 == Status::Closed {
                "CLOSED"
            } else {
                "Open"
            };
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{}",
                link.id,
                net.nodes[link.n1 as usize].id,
                net.nodes[link.n2 as usize].id,
                link.len * ucf.elev,
                link.diam * ucf.diam,
                kc,
                minor_loss_user(link.km, link.diam),
                status,
            );
        }

        let _ = writeln!(out, "\n[PUMPS]");
        for p in 1..=net.n_pumps() {
            let pump = &net.pumps[p];
            let link = &net.links[pump.link as usize];
            let mut props = String::new();
            if pump.hcurve > 0 {
                let _ = write!(props, "\tHEAD {}", net.curves[pump.hcurve as usize].id);
            } else if link.km > 0.0 {
                let power = if self.flow_units.is_si() {
                    link.km
                } else {
                    link.km / KW_PER_HP
                };
                let _ = write!(props, "\tPOWER {power:.4}");
            }
            if link.kc != 1.0 && link.kc != MISSING {
                let _ = write!(props, "\tSPEED {:.4}", link.kc);
            }
            if pump.upat > 0 {
                let _ = write!(props, "\tPATTERN {}", net.patterns[pump.upat as usize].id);
            }
            let _ = writeln!(
                out,
                "{}\t{}\t{}{}",
                link.id,
                net.nodes[link.n1 as usize].id,
                net.nodes[link.n2 as usize].id,
                props,
            );
        }

        let _ = writeln!(out, "\n[VALVES]");
        for v in 1..=net.n_valves() {
            let link = &net.links[net.valves[v].link as usize];
            let vtype = match link.link_type {
                LinkType::Prv => "PRV",
                LinkType::Psv => "PSV",
                LinkType::Pbv => "PBV",
                LinkType::Fcv => "FCV",
                LinkType::Tcv => "TCV",
                _ => "GPV",
            };
            let setting = match link.link_type {
                LinkType::Gpv => curve_id(net, link.kc as i32).to_string(),
                _ if link.kc == MISSING => "0".to_string(),
                _ => format!(
                    "{:.4}",
                    self.action_setting_to_user(net.valves[v].link, link.kc)
                ),
            };
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{:.4}\t{}\t{}\t{:.4}",
                link.id,
                net.nodes[link.n1 as usize].id,
                net.nodes[link.n2 as usize].id,
                link.diam * ucf.diam,
                vtype,
                setting,
                minor_loss_user(link.km, link.diam),
            );
        }

        let _ = writeln!(out, "\n[DEMANDS]");
        for i in 1..=net.njuncs {
            for demand in &net.nodes[i].demands {
                if demand.base == 0.0 && demand.pattern == 0 {
                    continue;
                }
                let _ = writeln!(
                    out,
                    "{}\t{:.6}\t{}",
                    net.nodes[i].id,
                    demand.base * ucf.flow,
                    pattern_id(net, demand.pattern),
                );
            }
        }

        let _ = writeln!(out, "\n[STATUS]");
        for k in 1..=net.n_links() {
            let link = &net.links[k];
            if link.link_type.is_pipe() {
                continue;
            }
            if link.status0 == Status::Closed {
                let _ = writeln!(out, "{}\tCLOSED", link.id);
            } else if link.link_type.is_valve() && link.kc == MISSING {
                let _ = writeln!(out, "{}\tOPEN", link.id);
            }
        }

        let _ = writeln!(out, "\n[PATTERNS]");
        for p in 1..=net.n_patterns() {
            let pattern = &net.patterns[p];
            for chunk in pattern.factors.chunks(6) {
                let values: Vec<String> = chunk.iter().map(|v| format!("{v:.4}")).collect();
                let _ = writeln!(out, "{}\t{}", pattern.id, values.join("\t"));
            }
        }

        let _ = writeln!(out, "\n[CURVES]");
        for c in 1..=net.n_curves() {
            let curve = &net.curves[c];
            for (x, y) in curve.x.iter().zip(&curve.y) {
                let _ = writeln!(out, "{}\t{:.6}\t{:.6}", curve.id, x, y);
            }
        }

        let _ = writeln!(out, "\n[CONTROLS]");
        for control in &net.controls {
            let link = &net.links[control.link as usize];
            let action = if control.setting != MISSING {
                format!(
                    "{:.4}",
                    self.action_setting_to_user(control.link, control.setting)
                )
            } else if control.status == Status::Closed {
                "CLOSED".to_string()
            } else {
                "OPEN".to_string()
            };
            match control.ctype {
                ControlType::LowLevel | ControlType::HiLevel => {
                    let node = &net.nodes[control.node as usize];
                    let relation = if control.ctype == ControlType::LowLevel {
                        "BELOW"
                    } else {
                        "ABOVE"
                    };
                    let value = if net.is_junction(control.node) {
                        (control.grade - node.elevation) * ucf.pressure
                    } else {
                        (control.grade - node.elevation) * ucf.elev
                    };
                    let _ = writeln!(
                        out,
                        "LINK {} {} IF NODE {} {} {:.4}",
                        link.id, action, node.id, relation, value
                    );
                }
                ControlType::Timer => {
                    let _ = writeln!(
                        out,
                        "LINK {} {} AT TIME {}",
                        link.id,
                        action,
                        clock(control.time)
                    );
                }
                ControlType::TimeOfDay => {
                    let _ = writeln!(
                        out,
                        "LINK {} {} AT CLOCKTIME {}",
                        link.id,
                        action,
                        clock(control.time)
                    );
                }
            }
        }

        let _ = writeln!(out, "\n[RULES]");
        for rule in &net.rules {
            let _ = writeln!(out, "RULE {}", rule.label);
            for (i, premise) in rule.premises.iter().enumerate() {
                let _ = writeln!(out, "{}", self.format_premise(premise, i == 0));
            }
            for (i, action) in rule.then_actions.iter().enumerate() {
                let kw = if i == 0 { "THEN" } else { "AND" };
                let _ = writeln!(out, "{} {}", kw, self.format_action(action));
            }
            for (i, action) in rule.else_actions.iter().enumerate() {
                let kw = if i == 0 { "ELSE" } else { "AND" };
                let _ = writeln!(out, "{} {}", kw, self.format_action(action));
            }
            if rule.priority > 0.0 {
                let _ = writeln!(out, "PRIORITY {}", rule.priority);
            }
        }

        let _ = writeln!(out, "\n[EMITTERS]");
        for i in 1..=net.njuncs {
            let node = &net.nodes[i];
            if node.ke > 0.0 {
                let c = node.ke * ucf.flow / ucf.pressure.powf(self.hyd.qexp);
                let _ = writeln!(out, "{}\t{:.6}", node.id, c);
            }
        }

        let _ = writeln!(out, "\n[QUALITY]");
        for i in 1..=net.n_nodes() {
            if net.nodes[i].c0 != 0.0 {
                let _ = writeln!(out, "{}\t{:.6}", net.nodes[i].id, net.nodes[i].c0);
            }
        }

        let _ = writeln!(out, "\n[SOURCES]");
        for i in 1..=net.n_nodes() {
            if let Some(source) = &net.nodes[i].source {
                let stype = match source.stype {
                    SourceType::Concen => "CONCEN",
                    SourceType::Mass => "MASS",
                    SourceType::Setpoint => "SETPOINT",
                    SourceType::FlowPaced => "FLOWPACED",
                };
                let _ = writeln!(
                    out,
                    "{}\t{}\t{:.6}\t{}",
                    net.nodes[i].id,
                    stype,
                    source.c0,
                    pattern_id(net, source.pattern),
                );
            }
        }

        let _ = writeln!(out, "\n[REACTIONS]");
        let _ = writeln!(out, "ORDER BULK {}", self.qual.bulk_order);
        let _ = writeln!(out, "ORDER WALL {}", self.qual.wall_order);
        let _ = writeln!(out, "ORDER TANK {}", self.qual.tank_order);
        let _ = writeln!(out, "GLOBAL BULK {:.6}", self.qual.kbulk * SEC_PER_DAY);
        let _ = writeln!(out, "GLOBAL WALL {:.6}", self.qual.kwall * SEC_PER_DAY);
        if self.qual.climit > 0.0 {
            let _ = writeln!(out, "LIMITING POTENTIAL {:.6}", self.qual.climit);
        }
        for k in 1..=net.n_links() {
            if let Some(kb) = net.links[k].kb {
                let _ = writeln!(out, "BULK {} {:.6}", net.links[k].id, kb * SEC_PER_DAY);
            }
            if let Some(kw) = net.links[k].kw {
                let _ = writeln!(out, "WALL {} {:.6}", net.links[k].id, kw * SEC_PER_DAY);
            }
        }
        for t in 1..=net.n_tanks() {
            if let Some(kb) = net.tanks[t].kb {
                let id = &net.nodes[net.tanks[t].node as usize].id;
                let _ = writeln!(out, "TANK {} {:.6}", id, kb * SEC_PER_DAY);
            }
        }

        let _ = writeln!(out, "\n[MIXING]");
        for t in 1..=net.n_tanks() {
            let tank = &net.tanks[t];
            if tank.is_reservoir() || tank.mix_model == MixingModel::Mix1 {
                continue;
            }
            let model = match tank.mix_model {
                MixingModel::Mix2 => "2COMP",
                MixingModel::Fifo => "FIFO",
                MixingModel::Lifo => "LIFO",
                MixingModel::Mix1 => unreachable!(),
            };
            let _ = writeln!(
                out,
                "{}\t{}\t{:.4}",
                net.nodes[tank.node as usize].id, model, tank.v1frac
            );
        }

        let _ = writeln!(out, "\n[ENERGY]");
        let _ = writeln!(out, "GLOBAL EFFICIENCY {:.4}", self.hyd.epump);
        let _ = writeln!(out, "GLOBAL PRICE {:.4}", self.hyd.eprice);
        if self.hyd.epat > 0 {
            let _ = writeln!(out, "GLOBAL PATTERN {}", net.patterns[self.hyd.epat as usize].id);
        }
        let _ = writeln!(out, "DEMAND CHARGE {:.4}", self.hyd.dcharge);
        for p in 1..=net.n_pumps() {
            let pump = &net.pumps[p];
            let id = &net.links[pump.link as usize].id;
            if pump.ecurve > 0 {
                let _ = writeln!(out, "PUMP {} EFFIC {}", id, net.curves[pump.ecurve as usize].id);
            }
            if pump.ecost != MISSING && pump.ecost != 0.0 {
                let _ = writeln!(out, "PUMP {} PRICE {:.4}", id, pump.ecost);
            }
            if pump.epat > 0 {
                let _ = writeln!(out, "PUMP {} PATTERN {}", id, net.patterns[pump.epat as usize].id);
            }
        }

        let _ = writeln!(out, "\n[TIMES]");
        let _ = writeln!(out, "DURATION {}", clock(self.times.duration));
        let _ = writeln!(out, "HYDRAULIC TIMESTEP {}", clock(self.times.hstep));
        let _ = writeln!(out, "QUALITY TIMESTEP {}", clock(self.times.qstep));
        let _ = writeln!(out, "PATTERN TIMESTEP {}", clock(self.times.pstep));
        let _ = writeln!(out, "PATTERN START {}", clock(self.times.pstart));
        let _ = writeln!(out, "REPORT TIMESTEP {}", clock(self.times.rstep));
        let _ = writeln!(out, "REPORT START {}", clock(self.times.rstart));
        let _ = writeln!(out, "RULE TIMESTEP {}", clock(self.times.rulestep));
        let _ = writeln!(out, "START CLOCKTIME {}", clock(self.times.tstart));
        let statistic = match self.times.statistic {
            StatisticType::Series => "NONE",
            StatisticType::Average => "AVERAGED",
            StatisticType::Minimum => "MINIMUM",
            StatisticType::Maximum => "MAXIMUM",
            StatisticType::Range => "RANGE",
        };
        let _ = writeln!(out, "STATISTIC {statistic}");

        let _ = writeln!(out, "\n[OPTIONS]");
        let units = match self.flow_units {
            crate::types::options::FlowUnits::Cfs => "CFS",
            crate::types::options::FlowUnits::Gpm => "GPM",
            crate::types::options::FlowUnits::Mgd => "MGD",
            crate::types::options::FlowUnits::Imgd => "IMGD",
            crate::types::options::FlowUnits::Afd => "AFD",
            crate::types::options::FlowUnits::Lps => "LPS",
            crate::types::options::FlowUnits::Lpm => "LPM",
            crate::types::options::FlowUnits::Mld => "MLD",
            crate::types::options::FlowUnits::Cmh => "CMH",
            crate::types::options::FlowUnits::Cmd => "CMD",
        };
        let _ = writeln!(out, "UNITS {units}");
        let headloss = match self.hyd.headloss_form {
            HeadLossType::HazenWilliams => "H-W",
            HeadLossType::DarcyWeisbach => "D-W",
            HeadLossType::ChezyManning => "C-M",
        };
        let _ = writeln!(out, "HEADLOSS {headloss}");
        match self.qual.qualflag {
            QualityType::None => {
                let _ = writeln!(out, "QUALITY NONE");
            }
            QualityType::Age => {
                let _ = writeln!(out, "QUALITY AGE");
            }
            QualityType::Trace => {
                let id = net
                    .node(self.qual.trace_node)
                    .map(|n| n.id.clone())
                    .unwrap_or_default();
                let _ = writeln!(out, "QUALITY TRACE {id}");
            }
            QualityType::Chem => {
                let _ = writeln!(
                    out,
                    "QUALITY {} {}",
                    self.qual.chem_name, self.qual.chem_units
                );
            }
        }
        let _ = writeln!(out, "VISCOSITY {:.6}", self.hyd.viscos);
        let _ = writeln!(out, "DIFFUSIVITY {:.6}", self.qual.diffus);
        let _ = writeln!(out, "SPECIFIC GRAVITY {:.6}", self.hyd.spgrav);
        let _ = writeln!(out, "TRIALS {}", self.hyd.max_iter);
        let _ = writeln!(out, "ACCURACY {:e}", self.hyd.accuracy);
        let _ = writeln!(out, "TOLERANCE {:e}", self.qual.ctol);
        let _ = writeln!(out, "EMITTER EXPONENT {:.4}", self.hyd.qexp);
        let _ = writeln!(out, "DEMAND MULTIPLIER {:.4}", self.hyd.dmult);
        if self.hyd.demand_model == DemandModel::Pda {
            let _ = writeln!(out, "DEMAND MODEL PDA");
            let _ = writeln!(out, "MINIMUM PRESSURE {:.4}", self.hyd.pmin * ucf.pressure);
            let _ = writeln!(out, "REQUIRED PRESSURE {:.4}", self.hyd.preq * ucf.pressure);
            let _ = writeln!(out, "PRESSURE EXPONENT {:.4}", self.hyd.pexp);
        }
        if self.hyd.def_pat > 0 {
            let _ = writeln!(out, "PATTERN {}", net.patterns[self.hyd.def_pat as usize].id);
        }

        let _ = writeln!(out, "\n[COORDINATES]");
        for i in 1..=net.n_nodes() {
            if let Some((x, y)) = net.nodes[i].coords {
                let _ = writeln!(out, "{}\t{:.6}\t{:.6}", net.nodes[i].id, x, y);
            }
        }

        let _ = writeln!(out, "\n[VERTICES]");
        for k in 1..=net.n_links() {
            for (x, y) in &net.links[k].vertices {
                let _ = writeln!(out, "{}\t{:.6}\t{:.6}", net.links[k].id, x, y);
            }
        }

        let _ = writeln!(out, "\n[END]");
    }

    fn format_premise(&self, premise: &crate::types::rule::Premise, first: bool) -> String {
        use crate::types::rule::{LogicalOperator, RuleObject, RuleStatus, RuleVariable};
        let logop = if first {
            "IF"
        } else {
            match premise.logical_operator {
                LogicalOperator::Or => "OR",
                _ => "AND",
            }
        };
        let (object, id) = match premise.rule_object {
            RuleObject::System => ("SYSTEM", String::new()),
            RuleObject::Node => (
                "NODE",
                self.network.nodes[premise.object_index as usize].id.clone(),
            ),
            RuleObject::Link => (
                "LINK",
                self.network.links[premise.object_index as usize].id.clone(),
            ),
        };
        let variable = match premise.variable {
            RuleVariable::Demand => "DEMAND",
            RuleVariable::Head => "HEAD",
            RuleVariable::Grade => "GRADE",
            RuleVariable::Level => "LEVEL",
            RuleVariable::Pressure => "PRESSURE",
            RuleVariable::Flow => "FLOW",
            RuleVariable::Status => "STATUS",
            RuleVariable::Setting => "SETTING",
            RuleVariable::Power => "POWER",
            RuleVariable::Time => "TIME",
            RuleVariable::ClockTime => "CLOCKTIME",
            RuleVariable::FillTime => "FILLTIME",
            RuleVariable::DrainTime => "DRAINTIME",
        };
        let relop = match premise.rule_operator {
            crate::types::rule::RuleOperator::Eq => "=",
            crate::types::rule::RuleOperator::Ne => "<>",
            crate::types::rule::RuleOperator::Le => "<=",
            crate::types::rule::RuleOperator::Ge => ">=",
            crate::types::rule::RuleOperator::Lt => "<",
            crate::types::rule::RuleOperator::Gt => ">",
            crate::types::rule::RuleOperator::Is => "IS",
            crate::types::rule::RuleOperator::Not => "NOT",
            crate::types::rule::RuleOperator::Below => "BELOW",
            crate::types::rule::RuleOperator::Above => "ABOVE",
        };
        let value = match premise.status {
            Some(RuleStatus::IsOpen) => "OPEN".to_string(),
            Some(RuleStatus::IsClosed) => "CLOSED".to_string(),
            Some(RuleStatus::IsActive) => "ACTIVE".to_string(),
            None => format!("{:.4}", self.premise_to_user(premise.variable, premise.value)),
        };
        if id.is_empty() {
            format!("{logop} {object} {variable} {relop} {value}")
        } else {
            format!("{logop} {object} {id} {variable} {relop} {value}")
        }
    }

    fn format_action(&self, action: &crate::types::rule::ActionClause) -> String {
        use crate::types::rule::RuleStatus;
        let id = &self.network.links[action.link_index as usize].id;
        if let Some(status) = action.status {
            let word = match status {
                RuleStatus::IsOpen => "OPEN",
                RuleStatus::IsClosed => "CLOSED",
                RuleStatus::IsActive => "ACTIVE",
            };
            format!("LINK {id} STATUS = {word}")
        } else {
            let setting = action.setting.unwrap_or(0.0);
            format!(
                "LINK {id} SETTING = {:.4}",
                self.action_setting_to_user(action.link_index, setting)
            )
        }
    }
}

fn pattern_id<'a>(net: &'a crate::network::Network, pattern: i32) -> &'a str {
    if pattern > 0 {
        &net.patterns[pattern as usize].id
    } else {
        ""
    }
}

fn curve_id<'a>(net: &'a crate::network::Network, curve: i32) -> &'a str {
    if curve > 0 {
        &net.curves[curve as usize].id
    } else {
        ""
    }
}
