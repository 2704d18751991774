//! Rule-based controls: the multi-line rule parser, the premise evaluator
//! and the priority-resolved action queue fired every rule step during the
//! hydraulic loop.

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::network::element::{Status, MISSING};
use crate::project::Project;
use crate::types::link::LinkType;
use crate::types::rule::{
    ActionClause, LogicalOperator, Premise, RuleObject, RuleOperator, RuleStatus, RuleVariable,
};
use crate::units::SEC_PER_DAY;
use tracing::debug;

/// A rule as stored on the network: label, priority and the three clause
/// lists. Premise/action values are kept in internal units.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleData {
    pub label: String,
    pub priority: f64,
    pub premises: Vec<Premise>,
    pub then_actions: Vec<ActionClause>,
    pub else_actions: Vec<ActionClause>,
}

impl RuleData {
    pub fn references_node(&self, node: i32) -> bool {
        self.premises
            .iter()
            .any(|p| p.rule_object == RuleObject::Node && p.object_index == node)
    }

    pub fn references_link(&self, link: i32) -> bool {
        self.premises
            .iter()
            .any(|p| p.rule_object == RuleObject::Link && p.object_index == link)
            || self.then_actions.iter().any(|a| a.link_index == link)
            || self.else_actions.iter().any(|a| a.link_index == link)
    }

    /// Drops premises that reference a deleted node.
    pub fn purge_node(&mut self, node: i32) {
        self.premises
            .retain(|p| !(p.rule_object == RuleObject::Node && p.object_index == node));
    }

    /// Drops premises and actions that reference a deleted link.
    pub fn purge_link(&mut self, link: i32) {
        self.premises
            .retain(|p| !(p.rule_object == RuleObject::Link && p.object_index == link));
        self.then_actions.retain(|a| a.link_index != link);
        self.else_actions.retain(|a| a.link_index != link);
    }

    /// A rule stripped of all premises or all THEN actions can never fire.
    pub fn is_degenerate(&self) -> bool {
        self.premises.is_empty() || self.then_actions.is_empty()
    }

    pub fn shift_node_index(&mut self, at: i32, delta: i32) {
        for p in &mut self.premises {
            if p.rule_object == RuleObject::Node && p.object_index >= at {
                p.object_index += delta;
            }
        }
    }

    pub fn shift_link_index(&mut self, at: i32, delta: i32) {
        for p in &mut self.premises {
            if p.rule_object == RuleObject::Link && p.object_index >= at {
                p.object_index += delta;
            }
        }
        for a in self.then_actions.iter_mut().chain(&mut self.else_actions) {
            if a.link_index >= at {
                a.link_index += delta;
            }
        }
    }
}

// ---- parsing ----------------------------------------------------------

enum Section {
    Premises,
    Then,
    Else,
}

impl Project {
    /// Parses multi-line rule text (`RULE id / IF ... / THEN ... [/ ELSE
    /// ...] [/ PRIORITY n]`) and appends the rule to the network.
    pub(crate) fn parse_rule(&mut self, text: &str) -> EngineResult<()> {
        let mut rule = RuleData::default();
        let mut section = Section::Premises;
        let mut seen_if = false;
        for raw in text.lines() {
            let line = raw.split(';').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let keyword = tokens[0].to_uppercase();
            match keyword.as_str() {
                "RULE" => {
                    rule.label = tokens.get(1).unwrap_or(&"").to_string();
                }
                "IF" => {
                    seen_if = true;
                    rule.premises
                        .push(self.parse_premise(&tokens[1..], LogicalOperator::If)?);
                }
                "AND" => match section {
                    Section::Premises => rule
                        .premises
                        .push(self.parse_premise(&tokens[1..], LogicalOperator::And)?),
                    Section::Then => rule.then_actions.push(self.parse_action(&tokens[1..])?),
                    Section::Else => rule.else_actions.push(self.parse_action(&tokens[1..])?),
                },
                "OR" => {
                    if !matches!(section, Section::Premises) {
                        return Err(ErrorCode::MisplacedRuleClause);
                    }
                    rule.premises
                        .push(self.parse_premise(&tokens[1..], LogicalOperator::Or)?);
                }
                "THEN" => {
                    if !seen_if {
                        return Err(ErrorCode::MisplacedRuleClause);
                    }
                    section = Section::Then;
                    rule.then_actions.push(self.parse_action(&tokens[1..])?);
                }
                "ELSE" => {
                    if rule.then_actions.is_empty() {
                        return Err(ErrorCode::MisplacedRuleClause);
                    }
                    section = Section::Else;
                    rule.else_actions.push(self.parse_action(&tokens[1..])?);
                }
                "PRIORITY" => {
                    rule.priority = tokens
                        .get(1)
                        .and_then(|v| v.parse().ok())
                        .ok_or(ErrorCode::SyntaxError)?;
                }
                _ => return Err(ErrorCode::MisplacedRuleClause),
            }
        }
        if rule.is_degenerate() {
            return Err(ErrorCode::SyntaxError);
        }
        if rule.label.is_empty() {
            rule.label = format!("{}", self.network.rules.len() + 1);
        }
        self.network.rules.push(rule);
        Ok(())
    }

    /// `<object> <id> <variable> <relop> <value|status>`
    fn parse_premise(&self, tokens: &[&str], logop: LogicalOperator) -> EngineResult<Premise> {
        if tokens.len() < 4 {
            return Err(ErrorCode::SyntaxError);
        }
        let obj_word = tokens[0].to_uppercase();
        let (rule_object, consumed) = match obj_word.as_str() {
            "SYSTEM" => (RuleObject::System, 1),
            "NODE" | "JUNCTION" | "RESERVOIR" | "TANK" => (RuleObject::Node, 2),
            "LINK" | "PIPE" | "PUMP" | "VALVE" => (RuleObject::Link, 2),
            _ => return Err(ErrorCode::SyntaxError),
        };
        let object_index = if rule_object == RuleObject::System {
            0
        } else {
            let id = tokens[1];
            match rule_object {
                RuleObject::Node => {
                    let i = self.network.find_node(id);
                    if i == 0 {
                        return Err(ErrorCode::UndefinedNode);
                    }
                    i
                }
                _ => {
                    let i = self.network.find_link(id);
                    if i == 0 {
                        return Err(ErrorCode::UndefinedLink);
                    }
                    i
                }
            }
        };
        let rest = &tokens[consumed..];
        if rest.len() < 3 {
            return Err(ErrorCode::SyntaxError);
        }
        let variable = parse_variable(&rest[0].to_uppercase()).ok_or(ErrorCode::SyntaxError)?;
        let rule_operator = parse_operator(&rest[1].to_uppercase()).ok_or(ErrorCode::SyntaxError)?;
        let value_word = rest[2].to_uppercase();
        let (status, value) = match value_word.as_str() {
            "OPEN" => (Some(RuleStatus::IsOpen), MISSING),
            "CLOSED" => (Some(RuleStatus::IsClosed), MISSING),
            "ACTIVE" => (Some(RuleStatus::IsActive), MISSING),
            _ => {
                let v = if variable == RuleVariable::ClockTime || variable == RuleVariable::Time {
                    parse_time(&rest[2..]).ok_or(ErrorCode::SyntaxError)?
                } else {
                    rest[2].parse().map_err(|_| ErrorCode::IllegalNumericValue)?
                };
                (None, self.premise_to_internal(variable, v))
            }
        };
        Ok(Premise {
            logical_operator: logop,
            rule_object,
            object_index,
            variable,
            rule_operator,
            status,
            value,
        })
    }

    /// `<link-kind> <id> STATUS|SETTING IS|= <value|status>`
    fn parse_action(&self, tokens: &[&str]) -> EngineResult<ActionClause> {
        if tokens.len() < 4 {
            return Err(ErrorCode::SyntaxError);
        }
        let id = tokens[1];
        let link_index = self.network.find_link(id);
        if link_index == 0 {
            return Err(ErrorCode::UndefinedLink);
        }
        let attr = tokens[2].to_uppercase();
        let mut value_idx = 3;
        if matches!(tokens[3].to_uppercase().as_str(), "IS" | "=" | "TO") {
            value_idx = 4;
        }
        let word = tokens
            .get(value_idx)
            .ok_or(ErrorCode::SyntaxError)?
            .to_uppercase();
        match attr.as_str() {
            "STATUS" => {
                let status = match word.as_str() {
                    "OPEN" => RuleStatus::IsOpen,
                    "CLOSED" => RuleStatus::IsClosed,
                    "ACTIVE" => RuleStatus::IsActive,
                    _ => return Err(ErrorCode::SyntaxError),
                };
                Ok(ActionClause {
                    link_index,
                    status: Some(status),
                    setting: None,
                })
            }
            "SETTING" => {
                let v: f64 = word.parse().map_err(|_| ErrorCode::IllegalNumericValue)?;
                Ok(ActionClause {
                    link_index,
                    status: None,
                    setting: Some(self.action_setting_to_internal(link_index, v)),
                })
            }
            _ => Err(ErrorCode::SyntaxError),
        }
    }

    /// Converts a user-facing premise value to internal units.
    pub(crate) fn premise_to_internal(&self, variable: RuleVariable, v: f64) -> f64 {
        match variable {
            RuleVariable::Demand | RuleVariable::Flow => v / self.ucf.flow,
            RuleVariable::Head | RuleVariable::Grade | RuleVariable::Level => v / self.ucf.elev,
            RuleVariable::Pressure => v / self.ucf.pressure,
            _ => v,
        }
    }

    pub(crate) fn premise_to_user(&self, variable: RuleVariable, v: f64) -> f64 {
        match variable {
            RuleVariable::Demand | RuleVariable::Flow => v * self.ucf.flow,
            RuleVariable::Head | RuleVariable::Grade | RuleVariable::Level => v * self.ucf.elev,
            RuleVariable::Pressure => v * self.ucf.pressure,
            _ => v,
        }
    }

    pub(crate) fn action_setting_to_internal(&self, link: i32, v: f64) -> f64 {
        match self.network.links[link as usize].link_type {
            LinkType::Prv | LinkType::Psv | LinkType::Pbv => v / self.ucf.pressure,
            LinkType::Fcv => v / self.ucf.flow,
            _ => v, // pump speed, TCV loss coefficient
        }
    }

    pub(crate) fn action_setting_to_user(&self, link: i32, v: f64) -> f64 {
        match self.network.links[link as usize].link_type {
            LinkType::Prv | LinkType::Psv | LinkType::Pbv => v * self.ucf.pressure,
            LinkType::Fcv => v * self.ucf.flow,
            _ => v,
        }
    }

    // ---- evaluation ---------------------------------------------------

    /// Evaluates every rule against current state and applies the winning
    /// actions. Returns the number of link changes made.
    pub(crate) fn check_rules(&mut self, dt: u64) -> usize {
        let nrules = self.network.rules.len();
        // Queued actions: (rule index, action). Later-queued actions from
        // higher-priority rules displace same-link actions.
        let mut queue: Vec<(usize, ActionClause)> = Vec::new();
        for r in 0..nrules {
            let fired = self.evaluate_premises(r, dt);
            let rule = &self.network.rules[r];
            let actions = if fired {
                rule.then_actions.clone()
            } else {
                rule.else_actions.clone()
            };
            for action in actions {
                // Higher priority claims the link; ties keep the earlier rule.
                let mut discarded = false;
                let priority = self.network.rules[r].priority;
                queue.retain(|(qr, qa)| {
                    if qa.link_index != action.link_index {
                        return true;
                    }
                    if priority > self.network.rules[*qr].priority {
                        false
                    } else {
                        discarded = true;
                        true
                    }
                });
                if !discarded {
                    queue.push((r, action));
                }
            }
        }

        let mut changes = 0;
        for (r, action) in queue {
            let k = action.link_index as usize;
            let mut changed = false;
            if let Some(status) = action.status {
                let new = match status {
                    RuleStatus::IsOpen => Status::Open,
                    RuleStatus::IsClosed => Status::Closed,
                    RuleStatus::IsActive => Status::Active,
                };
                if self.hyd.status[k] != new {
                    self.hyd.status[k] = new;
                    changed = true;
                }
            }
            if let Some(setting) = action.setting {
                if self.hyd.setting[k] != setting {
                    self.hyd.setting[k] = setting;
                    changed = true;
                }
            }
            if changed {
                changes += 1;
                debug!(
                    rule = %self.network.rules[r].label,
                    link = %self.network.links[k].id,
                    "rule action applied"
                );
            }
        }
        changes
    }

    /// Left-to-right evaluation with AND binding tighter than OR: the premise
    /// list is an OR of AND-groups.
    fn evaluate_premises(&self, rule: usize, dt: u64) -> bool {
        let premises = &self.network.rules[rule].premises;
        let mut group_true = true;
        for premise in premises {
            if premise.logical_operator == LogicalOperator::Or {
                if group_true {
                    return true;
                }
                group_true = self.check_premise(premise, dt);
            } else {
                group_true = group_true && self.check_premise(premise, dt);
            }
        }
        group_true
    }

    fn check_premise(&self, premise: &Premise, dt: u64) -> bool {
        if let Some(status) = premise.status {
            return self.check_status_premise(premise, status);
        }
        let actual = match self.premise_variable_value(premise) {
            Some(v) => v,
            None => return false,
        };
        let target = premise.value;
        // Equality on the time variables means "crossed within the last rule
        // interval", otherwise a boundary landing between evaluations would
        // never match.
        if matches!(
            premise.variable,
            RuleVariable::Time | RuleVariable::ClockTime
        ) && matches!(premise.rule_operator, RuleOperator::Eq | RuleOperator::Is)
        {
            let window = dt as f64;
            let mut diff = actual - target;
            if premise.variable == RuleVariable::ClockTime && diff < 0.0 {
                diff += SEC_PER_DAY;
            }
            return diff >= 0.0 && diff < window;
        }
        match premise.rule_operator {
            RuleOperator::Eq | RuleOperator::Is => (actual - target).abs() < 1e-9,
            RuleOperator::Ne | RuleOperator::Not => (actual - target).abs() >= 1e-9,
            RuleOperator::Le => actual <= target,
            RuleOperator::Ge => actual >= target,
            RuleOperator::Lt | RuleOperator::Below => actual < target,
            RuleOperator::Gt | RuleOperator::Above => actual > target,
        }
    }

    fn check_status_premise(&self, premise: &Premise, status: RuleStatus) -> bool {
        if premise.rule_object != RuleObject::Link {
            return false;
        }
        let k = premise.object_index as usize;
        let actual = self.hyd.status[k];
        let holds = match status {
            RuleStatus::IsOpen => actual.is_open() && actual != Status::Active,
            RuleStatus::IsClosed => !actual.is_open(),
            RuleStatus::IsActive => actual == Status::Active,
        };
        match premise.rule_operator {
            RuleOperator::Ne | RuleOperator::Not => !holds,
            _ => holds,
        }
    }

    fn premise_variable_value(&self, premise: &Premise) -> Option<f64> {
        let i = premise.object_index as usize;
        match premise.rule_object {
            RuleObject::System => match premise.variable {
                RuleVariable::Time => Some(self.times.htime as f64),
                RuleVariable::ClockTime => Some(self.times.clock_time() as f64),
                _ => None,
            },
            RuleObject::Node => match premise.variable {
                RuleVariable::Demand => Some(self.hyd.demand[i]),
                RuleVariable::Head | RuleVariable::Grade => Some(self.hyd.head[i]),
                RuleVariable::Pressure => {
                    Some(self.hyd.head[i] - self.network.nodes[i].elevation)
                }
                RuleVariable::Level => {
                    Some(self.hyd.head[i] - self.network.nodes[i].elevation)
                }
                RuleVariable::FillTime | RuleVariable::DrainTime => {
                    let tk = self.network.tank_index(i as i32);
                    if tk == 0 {
                        return None;
                    }
                    let tank = &self.network.tanks[tk];
                    let q = self.hyd.demand[i];
                    if q.abs() < 1e-9 {
                        return None;
                    }
                    let v = self.hyd.tank_volume[tk];
                    let target = if premise.variable == RuleVariable::FillTime {
                        tank.vmax
                    } else {
                        tank.vmin
                    };
                    Some(((target - v) / q).max(0.0))
                }
                _ => None,
            },
            RuleObject::Link => match premise.variable {
                RuleVariable::Flow => Some(self.hyd.flow[i].abs()),
                RuleVariable::Setting => Some(self.hyd.setting[i]),
                RuleVariable::Power => {
                    let p = self.network.pump_index(i as i32);
                    if p == 0 {
                        return None;
                    }
                    Some(self.network.pumps[p].energy.current_power)
                }
                _ => None,
            },
        }
    }
}

fn parse_variable(word: &str) -> Option<RuleVariable> {
    Some(match word {
        "DEMAND" => RuleVariable::Demand,
        "HEAD" => RuleVariable::Head,
        "GRADE" => RuleVariable::Grade,
        "LEVEL" => RuleVariable::Level,
        "PRESSURE" => RuleVariable::Pressure,
        "FLOW" => RuleVariable::Flow,
        "STATUS" => RuleVariable::Status,
        "SETTING" => RuleVariable::Setting,
        "POWER" => RuleVariable::Power,
        "TIME" => RuleVariable::Time,
        "CLOCKTIME" => RuleVariable::ClockTime,
        "FILLTIME" => RuleVariable::FillTime,
        "DRAINTIME" => RuleVariable::DrainTime,
        _ => return None,
    })
}

fn parse_operator(word: &str) -> Option<RuleOperator> {
    Some(match word {
        "=" => RuleOperator::Eq,
        "<>" => RuleOperator::Ne,
        "<=" => RuleOperator::Le,
        ">=" => RuleOperator::Ge,
        "<" => RuleOperator::Lt,
        ">" => RuleOperator::Gt,
        "IS" => RuleOperator::Is,
        "NOT" => RuleOperator::Not,
        "BELOW" => RuleOperator::Below,
        "ABOVE" => RuleOperator::Above,
        _ => return None,
    })
}

/// Parses `7200`, `2.5` (decimal hours for clock times with AM/PM), `hh:mm`
/// or `hh:mm:ss`, with an optional AM/PM token following. Returns seconds.
fn parse_time(tokens: &[&str]) -> Option<f64> {
    let word = tokens[0];
    let ampm = tokens.get(1).map(|s| s.to_uppercase());
    let mut seconds: f64 = if word.contains(':') {
        let mut parts = word.split(':');
        let h: f64 = parts.next()?.parse().ok()?;
        let m: f64 = parts.next().unwrap_or("0").parse().ok()?;
        let s: f64 = parts.next().unwrap_or("0").parse().ok()?;
        h * 3600.0 + m * 60.0 + s
    } else {
        let v: f64 = word.parse().ok()?;
        if ampm.is_some() {
            v * 3600.0
        } else {
            v
        }
    };
    match ampm.as_deref() {
        Some("PM") => {
            if seconds < 12.0 * 3600.0 {
                seconds += 12.0 * 3600.0;
            }
        }
        Some("AM") => {
            if seconds >= 12.0 * 3600.0 {
                seconds -= 12.0 * 3600.0;
            }
        }
        Some(_) => return None,
        None => {}
    }
    Some(seconds % SEC_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::node::NodeType;
    use crate::types::options::{FlowUnits, HeadLossType};

    fn rule_project() -> Project {
        let mut pr = Project::new().unwrap();
        pr.init(FlowUnits::Gpm, HeadLossType::HazenWilliams).unwrap();
        pr.network.add_node("J1", NodeType::Junction).unwrap();
        pr.network.add_node("T1", NodeType::Tank).unwrap();
        {
            let t = pr.network.find_node("T1");
            pr.network.nodes[t as usize].elevation = 0.0;
            let tank = pr.network.tank_of_node_mut(t).unwrap();
            tank.area = 100.0;
            tank.hmin = 0.0;
            tank.h0 = 50.0;
            tank.hmax = 60.0;
            tank.vmax = 6000.0;
        }
        pr.network
            .add_link("PU1", LinkType::Pump, "J1", "T1")
            .unwrap();
        pr.open_hyd().ok();
        pr.size_for_test();
        pr
    }

    impl Project {
        fn size_for_test(&mut self) {
            let nn = self.network.n_nodes() + 1;
            let nl = self.network.n_links() + 1;
            self.hyd.demand = vec![0.0; nn];
            self.hyd.full_demand = vec![0.0; nn];
            self.hyd.head = vec![0.0; nn];
            self.hyd.emitter_flow = vec![0.0; nn];
            self.hyd.flow = vec![0.0; nl];
            self.hyd.status = vec![Status::Open; nl];
            self.hyd.setting = vec![1.0; nl];
            self.hyd.tank_volume = vec![0.0; self.network.n_tanks() + 1];
        }
    }

    const RULE_TEXT: &str = "RULE R1\nIF TANK T1 LEVEL BELOW 10\nTHEN PUMP PU1 STATUS = OPEN\nELSE PUMP PU1 STATUS = CLOSED";

    #[test]
    fn parses_if_then_else() {
        let mut pr = rule_project();
        pr.parse_rule(RULE_TEXT).unwrap();
        let rule = &pr.network.rules[0];
        assert_eq!(rule.label, "R1");
        assert_eq!(rule.premises.len(), 1);
        assert_eq!(rule.then_actions.len(), 1);
        assert_eq!(rule.else_actions.len(), 1);
        assert_eq!(rule.premises[0].rule_operator, RuleOperator::Below);
    }

    #[test]
    fn else_branch_closes_pump_above_level() {
        let mut pr = rule_project();
        pr.parse_rule(RULE_TEXT).unwrap();
        // Tank level 50: premise false, ELSE fires.
        pr.hyd.head[2] = 50.0;
        let changes = pr.check_rules(300);
        assert_eq!(changes, 1);
        assert_eq!(pr.hyd.status[1], Status::Closed);

        // Drain below 10: THEN fires, pump reopens.
        pr.hyd.head[2] = 5.0;
        let changes = pr.check_rules(300);
        assert_eq!(changes, 1);
        assert_eq!(pr.hyd.status[1], Status::Open);
    }

    #[test]
    fn higher_priority_wins_shared_link() {
        let mut pr = rule_project();
        pr.parse_rule("RULE A\nIF SYSTEM TIME >= 0\nTHEN PUMP PU1 STATUS = CLOSED\nPRIORITY 1")
            .unwrap();
        pr.parse_rule("RULE B\nIF SYSTEM TIME >= 0\nTHEN PUMP PU1 STATUS = OPEN\nPRIORITY 2")
            .unwrap();
        pr.hyd.status[1] = Status::Closed;
        pr.check_rules(300);
        assert_eq!(pr.hyd.status[1], Status::Open);
        // Swap definition order: priority still decides.
        pr.network.rules.reverse();
        pr.hyd.status[1] = Status::Closed;
        pr.check_rules(300);
        assert_eq!(pr.hyd.status[1], Status::Open);
    }

    #[test]
    fn clock_time_parses_am_pm() {
        assert_eq!(parse_time(&["7:30"]), Some(27000.0));
        assert_eq!(parse_time(&["7:30", "PM"]), Some(27000.0 + 43200.0));
        assert_eq!(parse_time(&["12", "AM"]), Some(0.0));
        assert_eq!(parse_time(&["3600"]), Some(3600.0));
    }

    #[test]
    fn deleting_node_purges_rules() {
        let mut pr = rule_project();
        pr.parse_rule(RULE_TEXT).unwrap();
        pr.network
            .delete_node(2, crate::types::ActionCodeType::Unconditional)
            .unwrap();
        // Rule lost its only premise along with the tank: rule removed.
        assert!(pr.network.rules.is_empty());
    }
}
