//! Rule Based Control-related API methods for EPANET.
//!
//! This module contains methods for getting and adding rule based controls.

use crate::epanet_error::*;
use crate::types::rule::{ActionClause, Premise, Rule};
use crate::EPANET;

/// ## Rule Based Control APIs
impl EPANET {
    /// Parses multi-line rule text and appends the rule to the project.
    pub fn add_rule(&mut self, rule: &str) -> Result<()> {
        check_error_with_context(
            self.project.parse_rule(rule),
            "Failed to parse rule text".to_string(),
        )
    }

    /// Deletes a rule, shifting higher rule indices down by one.
    pub fn delete_rule(&mut self, index: i32) -> Result<()> {
        self.rule_slot(index)?;
        self.project.network.rules.remove(index as usize - 1);
        Ok(())
    }

    /// Retrieves a complete rule: premises, THEN/ELSE actions and priority.
    pub fn get_rule(&self, index: i32) -> Result<Rule> {
        let rule = &self.project.network.rules[self.rule_slot(index)?];
        let else_actions = if rule.else_actions.is_empty() {
            None
        } else {
            Some(
                rule.else_actions
                    .iter()
                    .map(|a| self.action_to_user(a))
                    .collect(),
            )
        };
        Ok(Rule {
            rule_id: rule.label.clone(),
            premises: rule
                .premises
                .iter()
                .map(|p| self.premise_to_user_clause(p))
                .collect(),
            then_actions: rule
                .then_actions
                .iter()
                .map(|a| self.action_to_user(a))
                .collect(),
            else_actions,
            priority: if rule.priority > 0.0 {
                Some(rule.priority)
            } else {
                None
            },
            enabled: true,
        })
    }

    pub fn get_rule_id(&self, index: i32) -> Result<String> {
        Ok(self.project.network.rules[self.rule_slot(index)?]
            .label
            .clone())
    }

    pub fn set_rule_priority(&mut self, index: i32, priority: f64) -> Result<()> {
        let slot = self.rule_slot(index)?;
        self.project.network.rules[slot].priority = priority;
        Ok(())
    }

    pub fn get_premise(&self, rule_index: i32, premise_index: i32) -> Result<Premise> {
        let rule = &self.project.network.rules[self.rule_slot(rule_index)?];
        let premise = rule
            .premises
            .get(premise_index as usize - 1)
            .ok_or(ErrorCode::UndefinedRuleClause)?;
        Ok(self.premise_to_user_clause(premise))
    }

    /// Replaces a premise; the value arrives in user units.
    pub fn set_premise(&mut self, rule_index: i32, premise_index: i32, premise: Premise) -> Result<()> {
        let slot = self.rule_slot(rule_index)?;
        let internal = Premise {
            value: self.project.premise_to_internal(premise.variable, premise.value),
            ..premise
        };
        let rule = &mut self.project.network.rules[slot];
        let target = rule
            .premises
            .get_mut(premise_index as usize - 1)
            .ok_or(ErrorCode::UndefinedRuleClause)?;
        *target = internal;
        Ok(())
    }

    pub fn get_then_action(&self, rule_index: i32, action_index: i32) -> Result<ActionClause> {
        let rule = &self.project.network.rules[self.rule_slot(rule_index)?];
        let action = rule
            .then_actions
            .get(action_index as usize - 1)
            .ok_or(ErrorCode::UndefinedRuleClause)?;
        Ok(self.action_to_user(action))
    }

    pub fn set_then_action(
        &mut self,
        rule_index: i32,
        action_index: i32,
        action: ActionClause,
    ) -> Result<()> {
        let internal = self.action_to_internal(action)?;
        let slot = self.rule_slot(rule_index)?;
        let rule = &mut self.project.network.rules[slot];
        let target = rule
            .then_actions
            .get_mut(action_index as usize - 1)
            .ok_or(ErrorCode::UndefinedRuleClause)?;
        *target = internal;
        Ok(())
    }

    /// Retrieves an ELSE action. Reads from the ELSE list (the reference
    /// implementation reads THEN here; see the release notes).
    pub fn get_else_action(&self, rule_index: i32, action_index: i32) -> Result<ActionClause> {
        let rule = &self.project.network.rules[self.rule_slot(rule_index)?];
        let action = rule
            .else_actions
            .get(action_index as usize - 1)
            .ok_or(ErrorCode::UndefinedRuleClause)?;
        Ok(self.action_to_user(action))
    }

    pub fn set_else_action(
        &mut self,
        rule_index: i32,
        action_index: i32,
        action: ActionClause,
    ) -> Result<()> {
        let internal = self.action_to_internal(action)?;
        let slot = self.rule_slot(rule_index)?;
        let rule = &mut self.project.network.rules[slot];
        let target = rule
            .else_actions
            .get_mut(action_index as usize - 1)
            .ok_or(ErrorCode::UndefinedRuleClause)?;
        *target = internal;
        Ok(())
    }

    fn rule_slot(&self, index: i32) -> EngineResult<usize> {
        if index < 1 || index as usize > self.project.network.rules.len() {
            return Err(ErrorCode::UndefinedRule);
        }
        Ok(index as usize - 1)
    }

    fn premise_to_user_clause(&self, premise: &Premise) -> Premise {
        Premise {
            value: self
                .project
                .premise_to_user(premise.variable, premise.value),
            ..premise.clone()
        }
    }

    fn action_to_user(&self, action: &ActionClause) -> ActionClause {
        ActionClause {
            setting: action
                .setting
                .map(|s| self.project.action_setting_to_user(action.link_index, s)),
            ..action.clone()
        }
    }

    fn action_to_internal(&self, action: ActionClause) -> EngineResult<ActionClause> {
        self.project.network.link(action.link_index)?;
        Ok(ActionClause {
            setting: action
                .setting
                .map(|s| self.project.action_setting_to_internal(action.link_index, s)),
            ..action
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::types::rule::{RuleOperator, RuleStatus};
    use rstest::rstest;

    const RULE: &str = "RULE LOWTANK\nIF TANK 2 LEVEL BELOW 110\nTHEN PUMP 9 STATUS = OPEN\nELSE PUMP 9 STATUS = CLOSED\nPRIORITY 2";

    #[rstest]
    fn test_add_get_rule(mut ph: EPANET) {
        ph.add_rule(RULE).unwrap();
        assert_eq!(
            ph.get_count(crate::types::CountType::RuleCount).unwrap(),
            1
        );
        let rule = ph.get_rule(1).unwrap();
        assert_eq!(rule.rule_id, "LOWTANK");
        assert_eq!(rule.premises.len(), 1);
        assert_eq!(rule.premises[0].rule_operator, RuleOperator::Below);
        assert!(approx_eq(rule.premises[0].value, 110.0, 1e-9));
        assert_eq!(rule.then_actions.len(), 1);
        assert_eq!(rule.priority, Some(2.0));
    }

    #[rstest]
    fn else_action_reads_else_list(mut ph: EPANET) {
        ph.add_rule(RULE).unwrap();
        let action = ph.get_else_action(1, 1).unwrap();
        assert_eq!(action.status, Some(RuleStatus::IsClosed));
        // The THEN list says OPEN; ELSE must not echo it.
        let then = ph.get_then_action(1, 1).unwrap();
        assert_eq!(then.status, Some(RuleStatus::IsOpen));
    }

    #[rstest]
    fn premise_round_trips_in_user_units(mut ph: EPANET) {
        ph.add_rule(RULE).unwrap();
        let mut premise = ph.get_premise(1, 1).unwrap();
        premise.value = 95.0;
        ph.set_premise(1, 1, premise).unwrap();
        assert!(approx_eq(ph.get_premise(1, 1).unwrap().value, 95.0, 1e-9));
    }

    #[rstest]
    fn missing_clause_is_258(mut ph: EPANET) {
        ph.add_rule(RULE).unwrap();
        assert_eq!(
            ph.get_premise(1, 9).unwrap_err(),
            EPANETError::from(258)
        );
        assert_eq!(ph.get_rule(5).unwrap_err(), EPANETError::from(257));
    }

    #[rstest]
    fn delete_rule_shifts_down(mut ph: EPANET) {
        ph.add_rule(RULE).unwrap();
        ph.add_rule("RULE R2\nIF SYSTEM CLOCKTIME >= 6 AM\nTHEN PUMP 9 STATUS = OPEN")
            .unwrap();
        ph.delete_rule(1).unwrap();
        assert_eq!(ph.get_rule_id(1).unwrap(), "R2");
    }
}
