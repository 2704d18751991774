//! The network store: topology, element properties and ID lookup.
//!
//! Element vectors are 1-indexed with slot 0 reserved as a sentinel.
//! Junctions occupy `1..=njuncs`; tanks and reservoirs follow, and the tank
//! side-record for node `i` is always `tanks[i - njuncs]`.

pub(crate) mod element;
pub(crate) mod mutation;

use crate::epanet_error::{EngineResult, ErrorCode};
use crate::rules::RuleData;
use crate::types::node::NodeType;
use crate::types::CountType;
use element::{ControlRecord, CurveData, Link, Node, Pattern, Pump, Tank, Valve};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub(crate) struct Network {
    pub nodes: Vec<Node>,
    pub tanks: Vec<Tank>,
    pub links: Vec<Link>,
    pub pumps: Vec<Pump>,
    pub valves: Vec<Valve>,
    pub patterns: Vec<Pattern>,
    pub curves: Vec<CurveData>,
    pub controls: Vec<ControlRecord>,
    pub rules: Vec<RuleData>,
    pub njuncs: usize,
    pub npipes: usize,
    pub node_table: FxHashMap<String, i32>,
    pub link_table: FxHashMap<String, i32>,
}

impl Network {
    pub fn new() -> Self {
        Network {
            nodes: vec![Node::default()],
            tanks: vec![Tank::default()],
            links: vec![Link::default()],
            pumps: vec![Pump::default()],
            valves: vec![Valve::default()],
            patterns: vec![Pattern::default()],
            curves: vec![CurveData::default()],
            controls: Vec::new(),
            rules: Vec::new(),
            njuncs: 0,
            npipes: 0,
            node_table: FxHashMap::default(),
            link_table: FxHashMap::default(),
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn n_tanks(&self) -> usize {
        self.tanks.len() - 1
    }

    pub fn n_links(&self) -> usize {
        self.links.len() - 1
    }

    pub fn n_pumps(&self) -> usize {
        self.pumps.len() - 1
    }

    pub fn n_valves(&self) -> usize {
        self.valves.len() - 1
    }

    pub fn n_patterns(&self) -> usize {
        self.patterns.len() - 1
    }

    pub fn n_curves(&self) -> usize {
        self.curves.len() - 1
    }

    pub fn count(&self, count_type: CountType) -> i32 {
        let n = match count_type {
            CountType::NodeCount => self.n_nodes(),
            CountType::TankCount => self.n_tanks(),
            CountType::LinkCount => self.n_links(),
            CountType::PatternCount => self.n_patterns(),
            CountType::CurveCount => self.n_curves(),
            CountType::ControlCount => self.controls.len(),
            CountType::RuleCount => self.rules.len(),
        };
        n as i32
    }

    /// Index of the node with the given ID, or 0 if none.
    pub fn find_node(&self, id: &str) -> i32 {
        self.node_table.get(id).copied().unwrap_or(0)
    }

    /// Index of the link with the given ID, or 0 if none.
    pub fn find_link(&self, id: &str) -> i32 {
        self.link_table.get(id).copied().unwrap_or(0)
    }

    /// Patterns and curves are few; a linear scan stands in for a hash table.
    pub fn find_pattern(&self, id: &str) -> i32 {
        self.patterns
            .iter()
            .skip(1)
            .position(|p| p.id == id)
            .map(|p| p as i32 + 1)
            .unwrap_or(0)
    }

    pub fn find_curve(&self, id: &str) -> i32 {
        self.curves
            .iter()
            .skip(1)
            .position(|c| c.id == id)
            .map(|c| c as i32 + 1)
            .unwrap_or(0)
    }

    pub fn node(&self, index: i32) -> EngineResult<&Node> {
        if index < 1 || index as usize > self.n_nodes() {
            return Err(ErrorCode::UndefinedNode);
        }
        Ok(&self.nodes[index as usize])
    }

    pub fn node_mut(&mut self, index: i32) -> EngineResult<&mut Node> {
        if index < 1 || index as usize > self.n_nodes() {
            return Err(ErrorCode::UndefinedNode);
        }
        Ok(&mut self.nodes[index as usize])
    }

    pub fn link(&self, index: i32) -> EngineResult<&Link> {
        if index < 1 || index as usize > self.n_links() {
            return Err(ErrorCode::UndefinedLink);
        }
        Ok(&self.links[index as usize])
    }

    pub fn link_mut(&mut self, index: i32) -> EngineResult<&mut Link> {
        if index < 1 || index as usize > self.n_links() {
            return Err(ErrorCode::UndefinedLink);
        }
        Ok(&mut self.links[index as usize])
    }

    pub fn pattern(&self, index: i32) -> EngineResult<&Pattern> {
        if index < 1 || index as usize > self.n_patterns() {
            return Err(ErrorCode::UndefinedPattern);
        }
        Ok(&self.patterns[index as usize])
    }

    pub fn pattern_mut(&mut self, index: i32) -> EngineResult<&mut Pattern> {
        if index < 1 || index as usize > self.n_patterns() {
            return Err(ErrorCode::UndefinedPattern);
        }
        Ok(&mut self.patterns[index as usize])
    }

    pub fn curve(&self, index: i32) -> EngineResult<&CurveData> {
        if index < 1 || index as usize > self.n_curves() {
            return Err(ErrorCode::UndefinedCurve);
        }
        Ok(&self.curves[index as usize])
    }

    pub fn curve_mut(&mut self, index: i32) -> EngineResult<&mut CurveData> {
        if index < 1 || index as usize > self.n_curves() {
            return Err(ErrorCode::UndefinedCurve);
        }
        Ok(&mut self.curves[index as usize])
    }

    pub fn is_junction(&self, node: i32) -> bool {
        node >= 1 && (node as usize) <= self.njuncs
    }

    /// Tank side-record index for a node, or 0 if the node is a junction.
    pub fn tank_index(&self, node: i32) -> usize {
        if self.is_junction(node) || node < 1 || node as usize > self.n_nodes() {
            0
        } else {
            node as usize - self.njuncs
        }
    }

    pub fn tank_of_node(&self, node: i32) -> Option<&Tank> {
        let t = self.tank_index(node);
        if t == 0 {
            None
        } else {
            Some(&self.tanks[t])
        }
    }

    pub fn tank_of_node_mut(&mut self, node: i32) -> Option<&mut Tank> {
        let t = self.tank_index(node);
        if t == 0 {
            None
        } else {
            Some(&mut self.tanks[t])
        }
    }

    /// Pump side-record index for a link, or 0 if the link is not a pump.
    pub fn pump_index(&self, link: i32) -> usize {
        self.pumps
            .iter()
            .skip(1)
            .position(|p| p.link == link)
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    pub fn valve_index(&self, link: i32) -> usize {
        self.valves
            .iter()
            .skip(1)
            .position(|v| v.link == link)
            .map(|v| v + 1)
            .unwrap_or(0)
    }

    /// Node type from position in the node array plus the tank record.
    pub fn node_type(&self, index: i32) -> EngineResult<NodeType> {
        self.node(index)?;
        if self.is_junction(index) {
            Ok(NodeType::Junction)
        } else if self.tanks[self.tank_index(index)].is_reservoir() {
            Ok(NodeType::Reservoir)
        } else {
            Ok(NodeType::Tank)
        }
    }

    /// Tank volume at a given head, using the volume curve when present.
    /// Volume curves are stored in user units; the caller supplies the
    /// elevation and volume conversion factors.
    pub fn tank_volume(&self, tank: usize, head: f64, elev_ucf: f64, vol_ucf: f64) -> f64 {
        let tk = &self.tanks[tank];
        let el = self.nodes[tk.node as usize].elevation;
        if tk.vcurve == 0 {
            tk.vmin + (head - tk.hmin) * tk.area
        } else {
            let curve = &self.curves[tk.vcurve as usize];
            curve.interpolate((head - el) * elev_ucf) / vol_ucf
        }
    }

    /// Inverse of [`Self::tank_volume`]: head at a given volume.
    pub fn tank_grade(&self, tank: usize, volume: f64, elev_ucf: f64, vol_ucf: f64) -> f64 {
        let tk = &self.tanks[tank];
        let el = self.nodes[tk.node as usize].elevation;
        if tk.vcurve == 0 {
            if tk.area == 0.0 {
                tk.hmin
            } else {
                tk.hmin + (volume - tk.vmin) / tk.area
            }
        } else {
            let curve = &self.curves[tk.vcurve as usize];
            // Invert the monotone volume curve by interpolating y -> x.
            let inverted = element::CurveData {
                id: String::new(),
                ctype: curve.ctype,
                x: curve.y.clone(),
                y: curve.x.clone(),
                comment: String::new(),
            };
            el + inverted.interpolate(volume * vol_ucf) / elev_ucf
        }
    }

    /// Enforces valve placement rules: PRV/PSV/FCV endpoints must both be
    /// junctions, and no two such valves may share an end-node.
    pub fn valve_check(
        &self,
        link_index: i32,
        link_type: crate::types::link::LinkType,
        n1: i32,
        n2: i32,
    ) -> EngineResult<()> {
        use crate::types::link::LinkType::{Fcv, Prv, Psv};
        if !matches!(link_type, Prv | Psv | Fcv) {
            return Ok(());
        }
        if !self.is_junction(n1) || !self.is_junction(n2) {
            return Err(ErrorCode::IllegalValveConnection);
        }
        for (k, other) in self.links.iter().enumerate().skip(1) {
            if k as i32 == link_index || !matches!(other.link_type, Prv | Psv | Fcv) {
                continue;
            }
            if other.n1 == n1 || other.n1 == n2 || other.n2 == n1 || other.n2 == n2 {
                return Err(ErrorCode::SharedValveConnection);
            }
        }
        Ok(())
    }

    /// Whether a node appears in any simple control or rule clause.
    pub fn node_in_controls(&self, node: i32) -> bool {
        self.controls.iter().any(|c| c.node == node)
            || self.rules.iter().any(|r| r.references_node(node))
    }

    /// Whether a link appears in any simple control or rule clause.
    pub fn link_in_controls(&self, link: i32) -> bool {
        self.controls.iter().any(|c| c.link == link)
            || self.rules.iter().any(|r| r.references_link(link))
    }

    /// Links attached to a node.
    pub fn links_at_node(&self, node: i32) -> Vec<i32> {
        self.links
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, l)| l.n1 == node || l.n2 == node)
            .map(|(k, _)| k as i32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::link::LinkType;
    use crate::types::node::NodeType;

    #[test]
    fn empty_network_counts() {
        let net = Network::new();
        assert_eq!(net.n_nodes(), 0);
        assert_eq!(net.n_links(), 0);
        assert_eq!(net.count(CountType::NodeCount), 0);
        assert_eq!(net.find_node("nope"), 0);
    }

    #[test]
    fn junction_tank_partition() {
        let mut net = Network::new();
        net.add_node("J1", NodeType::Junction).unwrap();
        net.add_node("T1", NodeType::Tank).unwrap();
        assert!(net.is_junction(1));
        assert!(!net.is_junction(2));
        assert_eq!(net.tank_index(2), 1);
        assert_eq!(net.node_type(2).unwrap(), NodeType::Tank);
    }

    #[test]
    fn valve_check_rejects_tank_endpoints() {
        let mut net = Network::new();
        net.add_node("J1", NodeType::Junction).unwrap();
        net.add_node("T1", NodeType::Tank).unwrap();
        assert_eq!(
            net.valve_check(0, LinkType::Prv, 1, 2),
            Err(ErrorCode::IllegalValveConnection)
        );
        assert_eq!(net.valve_check(0, LinkType::Tcv, 1, 2), Ok(()));
    }
}
