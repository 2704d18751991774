//! Topology mutation with referential integrity.
//!
//! Adding a junction inserts it at `njuncs + 1`, shifting every tank and
//! reservoir up by one; deleting any element shifts its higher-indexed peers
//! down. Each operation rewrites every cross-reference (hash tables, link
//! endpoints, tank back-links, control and rule clauses) before returning, so
//! a caller observes consistent indices immediately. All preconditions are
//! validated before the first write, which keeps each call transactional.

use super::element::{ControlRecord, CurveData, Link, Node, Pattern, Pump, Tank, Valve};
use super::Network;
use crate::epanet_error::{EngineResult, ErrorCode};
use crate::types::link::{LinkType, PumpType};
use crate::types::node::NodeType;
use crate::types::{valid_id, ActionCodeType};
use tracing::debug;

/// Rewrites a stored element index after an insertion at `at` (delta +1)
/// or a deletion of `at` (delta -1). Indices below `at` are untouched.
fn shift_index(index: &mut i32, at: i32, delta: i32) {
    if *index >= at {
        *index += delta;
    }
}

impl Network {
    pub fn add_node(&mut self, id: &str, node_type: NodeType) -> EngineResult<i32> {
        if !valid_id(id) {
            return Err(ErrorCode::IllegalId);
        }
        if self.find_node(id) > 0 {
            return Err(ErrorCode::DuplicateId);
        }

        let index = match node_type {
            NodeType::Junction => {
                let at = self.njuncs as i32 + 1;
                let mut node = Node {
                    id: id.to_string(),
                    node_type,
                    ..Node::default()
                };
                // A fresh junction carries one zero-demand category.
                node.demands.push(Default::default());
                self.nodes.insert(at as usize, node);
                self.njuncs += 1;
                for v in self.node_table.values_mut() {
                    shift_index(v, at, 1);
                }
                for tank in self.tanks.iter_mut().skip(1) {
                    shift_index(&mut tank.node, at, 1);
                }
                for link in self.links.iter_mut().skip(1) {
                    shift_index(&mut link.n1, at, 1);
                    shift_index(&mut link.n2, at, 1);
                }
                for control in &mut self.controls {
                    shift_index(&mut control.node, at, 1);
                }
                for rule in &mut self.rules {
                    rule.shift_node_index(at, 1);
                }
                at
            }
            NodeType::Reservoir | NodeType::Tank => {
                let at = self.n_nodes() as i32 + 1;
                self.nodes.push(Node {
                    id: id.to_string(),
                    node_type,
                    ..Node::default()
                });
                let mut tank = Tank {
                    node: at,
                    ..Tank::default()
                };
                if node_type == NodeType::Tank {
                    // Unit-area cylinder until the caller supplies real data.
                    tank.area = 1.0;
                    tank.v0 = 0.0;
                    tank.vmin = 0.0;
                    tank.vmax = 0.0;
                }
                self.tanks.push(tank);
                at
            }
        };
        self.node_table.insert(id.to_string(), index);
        debug!(id, index, ?node_type, "added node");
        Ok(index)
    }

    /// Deletes a node. With `Conditional`, refuses when the node still has
    /// connecting links (259) or appears in a control or rule (261). With
    /// `Unconditional`, connecting links are deleted and referencing
    /// controls/rules purged.
    pub fn delete_node(&mut self, index: i32, action_code: ActionCodeType) -> EngineResult<()> {
        self.node(index)?;
        let attached = self.links_at_node(index);
        if action_code == ActionCodeType::Conditional {
            if !attached.is_empty() {
                return Err(ErrorCode::NodeHasLinks);
            }
            if self.node_in_controls(index) {
                return Err(ErrorCode::ControlledElementUndeletable);
            }
        }
        // Highest first so earlier deletions don't renumber the rest.
        let mut attached = attached;
        attached.sort_unstable_by(|a, b| b.cmp(a));
        for link in attached {
            self.delete_link(link, ActionCodeType::Unconditional)?;
        }

        let id = self.nodes[index as usize].id.clone();
        self.nodes.remove(index as usize);
        if self.is_junction(index) {
            self.njuncs -= 1;
        } else {
            let t = index as usize - self.njuncs;
            self.tanks.remove(t);
        }
        self.node_table.remove(&id);
        for v in self.node_table.values_mut() {
            shift_index(v, index, -1);
        }
        for tank in self.tanks.iter_mut().skip(1) {
            shift_index(&mut tank.node, index, -1);
        }
        for link in self.links.iter_mut().skip(1) {
            shift_index(&mut link.n1, index, -1);
            shift_index(&mut link.n2, index, -1);
        }
        self.controls.retain(|c| c.node != index);
        for control in &mut self.controls {
            shift_index(&mut control.node, index, -1);
        }
        self.rules.retain_mut(|r| {
            r.purge_node(index);
            !r.is_degenerate()
        });
        for rule in &mut self.rules {
            rule.shift_node_index(index, -1);
        }
        debug!(id, index, "deleted node");
        Ok(())
    }

    pub fn add_link(
        &mut self,
        id: &str,
        link_type: LinkType,
        from_node: &str,
        to_node: &str,
    ) -> EngineResult<i32> {
        if !valid_id(id) {
            return Err(ErrorCode::IllegalId);
        }
        if self.find_link(id) > 0 {
            return Err(ErrorCode::DuplicateId);
        }
        let n1 = self.find_node(from_node);
        let n2 = self.find_node(to_node);
        if n1 == 0 || n2 == 0 {
            return Err(ErrorCode::UndefinedNode);
        }
        if n1 == n2 {
            return Err(ErrorCode::SameStartEndNodes);
        }
        self.valve_check(0, link_type, n1, n2)?;

        let index = self.n_links() as i32 + 1;
        let mut link = Link {
            id: id.to_string(),
            link_type,
            n1,
            n2,
            ..Link::default()
        };
        match link_type {
            LinkType::Pipe | LinkType::CvPipe => {
                self.npipes += 1;
                link.diam = 10.0 / 12.0; // 10 in
                link.len = 330.0;
            }
            LinkType::Pump => {
                link.diam = 0.0;
                link.len = 0.0;
                link.kc = 1.0; // relative speed
                self.pumps.push(Pump {
                    link: index,
                    ptype: PumpType::NoCurve,
                    ..Pump::default()
                });
            }
            _ => {
                link.diam = 10.0 / 12.0;
                link.len = 0.0;
                link.kc = 0.0;
                self.valves.push(Valve { link: index });
            }
        }
        self.links.push(link);
        self.link_table.insert(id.to_string(), index);
        debug!(id, index, ?link_type, "added link");
        Ok(index)
    }

    /// Deletes a link. With `Conditional`, refuses when the link appears in a
    /// control or rule (261); with `Unconditional`, those are purged.
    pub fn delete_link(&mut self, index: i32, action_code: ActionCodeType) -> EngineResult<()> {
        let link_type = self.link(index)?.link_type;
        if action_code == ActionCodeType::Conditional && self.link_in_controls(index) {
            return Err(ErrorCode::ControlledElementUndeletable);
        }

        match link_type {
            LinkType::Pipe | LinkType::CvPipe => self.npipes -= 1,
            LinkType::Pump => {
                let p = self.pump_index(index);
                self.pumps.remove(p);
            }
            _ => {
                let v = self.valve_index(index);
                self.valves.remove(v);
            }
        }
        let id = self.links[index as usize].id.clone();
        self.links.remove(index as usize);
        self.link_table.remove(&id);
        for v in self.link_table.values_mut() {
            shift_index(v, index, -1);
        }
        for pump in self.pumps.iter_mut().skip(1) {
            shift_index(&mut pump.link, index, -1);
        }
        for valve in self.valves.iter_mut().skip(1) {
            shift_index(&mut valve.link, index, -1);
        }
        self.controls.retain(|c| c.link != index);
        for control in &mut self.controls {
            shift_index(&mut control.link, index, -1);
        }
        self.rules.retain_mut(|r| {
            r.purge_link(index);
            !r.is_degenerate()
        });
        for rule in &mut self.rules {
            rule.shift_link_index(index, -1);
        }
        debug!(id, index, "deleted link");
        Ok(())
    }

    pub fn set_node_id(&mut self, index: i32, id: &str) -> EngineResult<()> {
        self.node(index)?;
        if !valid_id(id) {
            return Err(ErrorCode::IllegalId);
        }
        let existing = self.find_node(id);
        if existing == index {
            return Ok(());
        }
        if existing > 0 {
            return Err(ErrorCode::DuplicateId);
        }
        let old = std::mem::replace(&mut self.nodes[index as usize].id, id.to_string());
        self.node_table.remove(&old);
        self.node_table.insert(id.to_string(), index);
        Ok(())
    }

    pub fn set_link_id(&mut self, index: i32, id: &str) -> EngineResult<()> {
        self.link(index)?;
        if !valid_id(id) {
            return Err(ErrorCode::IllegalId);
        }
        let existing = self.find_link(id);
        if existing == index {
            return Ok(());
        }
        if existing > 0 {
            return Err(ErrorCode::DuplicateId);
        }
        let old = std::mem::replace(&mut self.links[index as usize].id, id.to_string());
        self.link_table.remove(&old);
        self.link_table.insert(id.to_string(), index);
        Ok(())
    }

    pub fn set_link_nodes(&mut self, index: i32, n1: i32, n2: i32) -> EngineResult<()> {
        let link_type = self.link(index)?.link_type;
        self.node(n1)?;
        self.node(n2)?;
        if n1 == n2 {
            return Err(ErrorCode::SameStartEndNodes);
        }
        self.valve_check(index, link_type, n1, n2)?;
        let link = &mut self.links[index as usize];
        link.n1 = n1;
        link.n2 = n2;
        Ok(())
    }

    /// Changes a link's type. Within the pipe family this is an in-place flag
    /// change; otherwise the link is deleted and re-added with the same ID and
    /// end nodes, so the link may receive a new index (returned).
    pub fn set_link_type(
        &mut self,
        index: i32,
        new_type: LinkType,
        action_code: ActionCodeType,
    ) -> EngineResult<i32> {
        let link = self.link(index)?;
        let old_type = link.link_type;
        if old_type == new_type {
            return Ok(index);
        }
        if old_type.is_pipe() && new_type.is_pipe() {
            self.links[index as usize].link_type = new_type;
            return Ok(index);
        }
        let (id, n1, n2) = {
            let l = &self.links[index as usize];
            (l.id.clone(), l.n1, l.n2)
        };
        self.valve_check(index, new_type, n1, n2)?;
        if action_code == ActionCodeType::Conditional && self.link_in_controls(index) {
            return Err(ErrorCode::ControlledElementUndeletable);
        }
        self.delete_link(index, ActionCodeType::Unconditional)?;
        let from = self.nodes[n1 as usize].id.clone();
        let to = self.nodes[n2 as usize].id.clone();
        self.add_link(&id, new_type, &from, &to)
    }

    pub fn add_pattern(&mut self, id: &str) -> EngineResult<i32> {
        if !valid_id(id) {
            return Err(ErrorCode::IllegalId);
        }
        if self.find_pattern(id) > 0 {
            return Err(ErrorCode::DuplicateId);
        }
        self.patterns.push(Pattern {
            id: id.to_string(),
            factors: vec![1.0],
            comment: String::new(),
        });
        Ok(self.n_patterns() as i32)
    }

    /// Deletes a time pattern, zeroing references to it and shifting higher
    /// pattern indices down in demands, sources, tanks and pumps.
    pub fn delete_pattern(&mut self, index: i32) -> EngineResult<()> {
        self.pattern(index)?;
        self.patterns.remove(index as usize);
        let fix = |p: &mut i32| {
            if *p == index {
                *p = 0;
            } else if *p > index {
                *p -= 1;
            }
        };
        for node in self.nodes.iter_mut().skip(1) {
            for demand in &mut node.demands {
                fix(&mut demand.pattern);
            }
            if let Some(source) = &mut node.source {
                fix(&mut source.pattern);
            }
        }
        for tank in self.tanks.iter_mut().skip(1) {
            fix(&mut tank.pattern);
        }
        for pump in self.pumps.iter_mut().skip(1) {
            fix(&mut pump.upat);
            fix(&mut pump.epat);
        }
        Ok(())
    }

    pub fn add_curve(&mut self, id: &str) -> EngineResult<i32> {
        if !valid_id(id) {
            return Err(ErrorCode::IllegalId);
        }
        if self.find_curve(id) > 0 {
            return Err(ErrorCode::DuplicateId);
        }
        self.curves.push(CurveData {
            id: id.to_string(),
            x: vec![0.0],
            y: vec![0.0],
            ..CurveData::default()
        });
        Ok(self.n_curves() as i32)
    }

    pub fn delete_curve(&mut self, index: i32) -> EngineResult<()> {
        self.curve(index)?;
        self.curves.remove(index as usize);
        let fix = |c: &mut i32| {
            if *c == index {
                *c = 0;
            } else if *c > index {
                *c -= 1;
            }
        };
        for tank in self.tanks.iter_mut().skip(1) {
            fix(&mut tank.vcurve);
        }
        for pump in self.pumps.iter_mut().skip(1) {
            fix(&mut pump.hcurve);
            fix(&mut pump.ecurve);
        }
        Ok(())
    }

    pub fn add_control(&mut self, control: ControlRecord) -> EngineResult<i32> {
        self.link(control.link)?;
        if control.node > 0 {
            self.node(control.node)?;
        }
        if self.links[control.link as usize].link_type == LinkType::CvPipe {
            return Err(ErrorCode::IllegalCvControl);
        }
        self.controls.push(control);
        Ok(self.controls.len() as i32)
    }

    pub fn delete_control(&mut self, index: i32) -> EngineResult<()> {
        if index < 1 || index as usize > self.controls.len() {
            return Err(ErrorCode::UndefinedControl);
        }
        self.controls.remove(index as usize - 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::control::ControlType;
    use crate::types::node::NodeType::{Junction, Tank};

    fn control_on(link: i32) -> ControlRecord {
        ControlRecord {
            ctype: ControlType::Timer,
            link,
            node: 0,
            status: super::super::element::Status::Closed,
            setting: 0.0,
            grade: 0.0,
            time: 3600,
            enabled: true,
        }
    }

    #[test]
    fn junction_insert_shifts_tanks() {
        let mut net = Network::new();
        net.add_node("J1", Junction).unwrap();
        net.add_node("T1", Tank).unwrap();
        net.add_link("P1", LinkType::Pipe, "J1", "T1").unwrap();
        assert_eq!((net.links[1].n1, net.links[1].n2), (1, 2));

        net.add_node("J2", Junction).unwrap();
        assert_eq!(net.find_node("J2"), 2);
        assert_eq!(net.find_node("T1"), 3);
        assert_eq!((net.links[1].n1, net.links[1].n2), (1, 3));
        assert_eq!(net.tanks[1].node, 3);
    }

    #[test]
    fn conditional_delete_respects_references() {
        let mut net = Network::new();
        net.add_node("J1", Junction).unwrap();
        net.add_node("J2", Junction).unwrap();
        let p1 = net.add_link("P1", LinkType::Pipe, "J1", "J2").unwrap();
        net.add_control(control_on(p1)).unwrap();

        assert_eq!(
            net.delete_link(p1, ActionCodeType::Conditional),
            Err(ErrorCode::ControlledElementUndeletable)
        );
        assert_eq!(net.n_links(), 1);

        net.delete_link(p1, ActionCodeType::Unconditional).unwrap();
        assert_eq!(net.n_links(), 0);
        assert!(net.controls.is_empty());
    }

    #[test]
    fn node_delete_removes_attached_links() {
        let mut net = Network::new();
        net.add_node("J1", Junction).unwrap();
        net.add_node("J2", Junction).unwrap();
        net.add_node("J3", Junction).unwrap();
        net.add_link("P1", LinkType::Pipe, "J1", "J2").unwrap();
        net.add_link("P2", LinkType::Pipe, "J2", "J3").unwrap();

        assert_eq!(
            net.delete_node(2, ActionCodeType::Conditional),
            Err(ErrorCode::NodeHasLinks)
        );
        net.delete_node(2, ActionCodeType::Unconditional).unwrap();
        assert_eq!(net.n_nodes(), 2);
        assert_eq!(net.n_links(), 0);
        assert_eq!(net.find_node("J3"), 2);
    }

    #[test]
    fn rename_rejects_collision() {
        let mut net = Network::new();
        net.add_node("J1", Junction).unwrap();
        net.add_node("J2", Junction).unwrap();
        assert_eq!(net.set_node_id(1, "J2"), Err(ErrorCode::DuplicateId));
        net.set_node_id(1, "J9").unwrap();
        assert_eq!(net.find_node("J9"), 1);
        assert_eq!(net.find_node("J1"), 0);
    }

    #[test]
    fn link_type_change_preserves_id_and_nodes() {
        let mut net = Network::new();
        net.add_node("J1", Junction).unwrap();
        net.add_node("J2", Junction).unwrap();
        let p1 = net.add_link("P1", LinkType::Pipe, "J1", "J2").unwrap();

        // Within the pipe family the index is stable.
        let same = net
            .set_link_type(p1, LinkType::CvPipe, ActionCodeType::Unconditional)
            .unwrap();
        assert_eq!(same, p1);

        let new_index = net
            .set_link_type(p1, LinkType::Tcv, ActionCodeType::Unconditional)
            .unwrap();
        let link = net.link(new_index).unwrap();
        assert_eq!(link.id, "P1");
        assert_eq!((link.n1, link.n2), (1, 2));
        assert_eq!(net.n_valves(), 1);
        assert_eq!(net.npipes, 0);
    }
}
