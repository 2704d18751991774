//! Link-related API methods for EPANET.
//!
//! This module contains methods for adding, deleting, and querying links.

use crate::epanet_error::*;
use crate::hydraulics::coeffs::{minor_loss_coeff, minor_loss_user, resistance};
use crate::network::element::{Status, MISSING};
use crate::types::link::{LinkProperty, LinkStatusType, LinkType, PumpStateType, PumpType};
use crate::types::options::HeadLossType;
use crate::types::ActionCodeType;
use crate::units::{KW_PER_HP, MM_PER_FT, SEC_PER_DAY};
use crate::EPANET;
use num_traits::FromPrimitive;

/// ## Link APIs
impl EPANET {
    /// Adds a new link between two existing nodes. PRV/PSV/FCV placement is
    /// validated (219/220) before anything is inserted.
    pub fn add_link(
        &mut self,
        id: &str,
        link_type: LinkType,
        from_node: &str,
        to_node: &str,
    ) -> Result<i32> {
        let result = self
            .project
            .require_solvers_closed()
            .and_then(|_| self.project.network.add_link(id, link_type, from_node, to_node));
        check_error_with_context(
            result,
            format!("Failed to add {link_type:?} link {id} from {from_node} to {to_node}"),
        )
    }

    /// Deletes a link. A conditional delete is refused with 261 while any
    /// control or rule references the link; an unconditional delete purges
    /// them.
    pub fn delete_link(&mut self, index: i32, action_code: ActionCodeType) -> Result<()> {
        let result = self
            .project
            .require_solvers_closed()
            .and_then(|_| self.project.network.delete_link(index, action_code));
        check_error_with_context(
            result,
            format!("Failed to delete link {index} with action code {action_code:?}"),
        )
    }

    pub fn get_link_index(&self, id: &str) -> Result<i32> {
        match self.project.network.find_link(id) {
            0 => Err(EPANETError::from(ErrorCode::UndefinedLink)
                .with_context(format!("no link named {id}"))),
            index => Ok(index),
        }
    }

    pub fn get_link_id(&self, index: i32) -> Result<String> {
        Ok(self.project.network.link(index)?.id.clone())
    }

    pub fn set_link_id(&mut self, index: i32, id: &str) -> Result<()> {
        check_error_with_context(
            self.project.network.set_link_id(index, id),
            format!("Failed to rename link {index} to {id}"),
        )
    }

    pub fn get_link_type(&self, index: i32) -> Result<LinkType> {
        Ok(self.project.network.link(index)?.link_type)
    }

    /// Changes a link's type, preserving its ID and end nodes. Outside the
    /// pipe family this reindexes the link; the new index is returned.
    pub fn set_link_type(
        &mut self,
        index: i32,
        link_type: LinkType,
        action_code: ActionCodeType,
    ) -> Result<i32> {
        let result = self
            .project
            .require_solvers_closed()
            .and_then(|_| self.project.network.set_link_type(index, link_type, action_code));
        check_error_with_context(
            result,
            format!("Failed to change link {index} to {link_type:?}"),
        )
    }

    /// The indexes of a link's start and end nodes.
    pub fn get_link_nodes(&self, index: i32) -> Result<(i32, i32)> {
        let link = self.project.network.link(index)?;
        Ok((link.n1, link.n2))
    }

    pub fn set_link_nodes(&mut self, index: i32, node1: i32, node2: i32) -> Result<()> {
        check_error_with_context(
            self.project.network.set_link_nodes(index, node1, node2),
            format!("Failed to set end nodes of link {index}"),
        )
    }

    /// Retrieves a property value for a link, converted to user units.
    pub fn get_link_value(&self, index: i32, property: LinkProperty) -> Result<f64> {
        let pr = &self.project;
        let net = &pr.network;
        let link = net.link(index)?;
        let ucf = &pr.ucf;
        let k = index as usize;
        let value = match property {
            LinkProperty::Diameter => link.diam * ucf.diam,
            LinkProperty::Length => link.len * ucf.elev,
            LinkProperty::Roughness => {
                if link.link_type.is_pipe() && pr.hyd.headloss_form == HeadLossType::DarcyWeisbach
                {
                    link.kc * if pr.flow_units.is_si() { MM_PER_FT } else { 1000.0 }
                } else {
                    link.kc
                }
            }
            LinkProperty::MinorLoss => minor_loss_user(link.km, link.diam),
            LinkProperty::InitStatus => (link.status0.is_open() as i32) as f64,
            LinkProperty::InitSetting => {
                if link.link_type.is_pipe() {
                    self.get_link_value(index, LinkProperty::Roughness)?
                } else if link.kc == MISSING {
                    0.0
                } else {
                    self.project.action_setting_to_user(index, link.kc)
                }
            }
            LinkProperty::KBulk => link.kb.unwrap_or(pr.qual.kbulk) * SEC_PER_DAY,
            LinkProperty::KWall => link.kw.unwrap_or(pr.qual.kwall) * SEC_PER_DAY,
            LinkProperty::Flow => self.sim_link(&pr.hyd.flow, k)? * ucf.flow,
            LinkProperty::Velocity => {
                let q = self.sim_link(&pr.hyd.flow, k)?.abs();
                if link.diam > 0.0 {
                    let area = std::f64::consts::PI * link.diam * link.diam / 4.0;
                    q / area * ucf.velocity
                } else {
                    0.0
                }
            }
            LinkProperty::HeadLoss => {
                let h1 = self.sim_link(&pr.hyd.head, link.n1 as usize)?;
                let h2 = self.sim_link(&pr.hyd.head, link.n2 as usize)?;
                (h1 - h2) * ucf.elev
            }
            LinkProperty::Status => {
                let status = match pr.hyd.status.get(k) {
                    Some(s) => *s,
                    None => link.status0,
                };
                (status.as_public() as i32) as f64
            }
            LinkProperty::Setting => {
                let setting = match pr.hyd.setting.get(k) {
                    Some(s) => *s,
                    None => link.kc,
                };
                if setting == MISSING {
                    0.0
                } else if link.link_type.is_pipe() {
                    self.get_link_value(index, LinkProperty::Roughness)?
                } else {
                    self.project.action_setting_to_user(index, setting)
                }
            }
            LinkProperty::Energy => {
                let p = self.pump_record(index)?;
                net.pumps[p].energy.current_power
            }
            LinkProperty::LinkQual => pr.qual.seg.link_quality(k),
            LinkProperty::LinkPattern => {
                let p = self.pump_record(index)?;
                net.pumps[p].upat as f64
            }
            LinkProperty::PumpState => {
                self.pump_record(index)?;
                let state = match pr.hyd.status.get(k) {
                    Some(Status::XHead) => PumpStateType::PumpXHead,
                    Some(Status::XFlow) => PumpStateType::PumpXFlow,
                    Some(s) if s.is_open() => PumpStateType::PumpOpen,
                    _ => PumpStateType::PumpClosed,
                };
                (state as i32) as f64
            }
            LinkProperty::PumpEffic => {
                let p = self.pump_record(index)?;
                net.pumps[p].energy.current_effic
            }
            LinkProperty::PumpPower => {
                self.pump_record(index)?;
                if pr.flow_units.is_si() {
                    link.km
                } else {
                    link.km / KW_PER_HP
                }
            }
            LinkProperty::PumpHCurve => {
                let p = self.pump_record(index)?;
                net.pumps[p].hcurve as f64
            }
            LinkProperty::PumpECurve => {
                let p = self.pump_record(index)?;
                net.pumps[p].ecurve as f64
            }
            LinkProperty::PumpECost => {
                let p = self.pump_record(index)?;
                let cost = net.pumps[p].ecost;
                if cost == MISSING {
                    0.0
                } else {
                    cost
                }
            }
            LinkProperty::PumpEPat => {
                let p = self.pump_record(index)?;
                net.pumps[p].epat as f64
            }
            LinkProperty::GPVCurve => {
                if link.link_type != LinkType::Gpv {
                    return Err(ErrorCode::IllegalParameterCode.into());
                }
                link.kc
            }
        };
        Ok(value)
    }

    /// Sets a property value for a link, converting from user units.
    pub fn set_link_value(&mut self, index: i32, property: LinkProperty, value: f64) -> Result<()> {
        let result = self.set_link_value_inner(index, property, value);
        check_error_with_context(
            result,
            format!("Failed to set {property:?} = {value} on link {index}"),
        )
    }

    fn set_link_value_inner(
        &mut self,
        index: i32,
        property: LinkProperty,
        value: f64,
    ) -> EngineResult<()> {
        let ucf = self.project.ucf;
        let k = index as usize;
        let link_type = self.project.network.link(index)?.link_type;
        match property {
            LinkProperty::Diameter => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalLinkProperty);
                }
                let form = self.project.hyd.headloss_form;
                let link = self.project.network.link_mut(index)?;
                let km_user = minor_loss_user(link.km, link.diam);
                link.diam = value / ucf.diam;
                link.km = minor_loss_coeff(km_user, link.diam);
                link.r = resistance(link, form);
            }
            LinkProperty::Length => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalLinkProperty);
                }
                let form = self.project.hyd.headloss_form;
                let link = self.project.network.link_mut(index)?;
                link.len = value / ucf.elev;
                link.r = resistance(link, form);
            }
            LinkProperty::Roughness => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalLinkProperty);
                }
                let form = self.project.hyd.headloss_form;
                let si = self.project.flow_units.is_si();
                let link = self.project.network.link_mut(index)?;
                let mut kc = value;
                if link.link_type.is_pipe() && form == HeadLossType::DarcyWeisbach {
                    kc /= if si { MM_PER_FT } else { 1000.0 };
                }
                link.kc = kc;
                link.r = resistance(link, form);
            }
            LinkProperty::MinorLoss => {
                if value < 0.0 {
                    return Err(ErrorCode::IllegalLinkProperty);
                }
                let link = self.project.network.link_mut(index)?;
                link.km = minor_loss_coeff(value, link.diam);
            }
            LinkProperty::InitStatus => {
                if link_type == LinkType::CvPipe {
                    return Err(ErrorCode::IllegalCvControl);
                }
                self.project.network.link_mut(index)?.status0 = if value == 0.0 {
                    Status::Closed
                } else if link_type.is_valve() {
                    Status::Active
                } else {
                    Status::Open
                };
            }
            LinkProperty::InitSetting => {
                let internal = if link_type.is_pipe() {
                    return self.set_link_value_inner(index, LinkProperty::Roughness, value);
                } else {
                    self.project.action_setting_to_internal(index, value)
                };
                self.project.network.link_mut(index)?.kc = internal;
            }
            LinkProperty::KBulk => {
                self.project.network.link_mut(index)?.kb = Some(value / SEC_PER_DAY);
            }
            LinkProperty::KWall => {
                self.project.network.link_mut(index)?.kw = Some(value / SEC_PER_DAY);
            }
            LinkProperty::Status => {
                if link_type == LinkType::CvPipe {
                    return Err(ErrorCode::IllegalCvControl);
                }
                let status = if value == 0.0 {
                    Status::Closed
                } else {
                    Status::Open
                };
                if self.project.hyd.initialized {
                    self.project.hyd.status[k] = status;
                } else {
                    self.project.network.link_mut(index)?.status0 = status;
                }
            }
            LinkProperty::Setting => {
                let internal = if link_type.is_pipe() {
                    return self.set_link_value_inner(index, LinkProperty::Roughness, value);
                } else {
                    self.project.action_setting_to_internal(index, value)
                };
                if self.project.hyd.initialized {
                    self.project.hyd.setting[k] = internal;
                    if link_type.is_valve() {
                        self.project.hyd.status[k] = Status::Active;
                    }
                } else {
                    self.project.network.link_mut(index)?.kc = internal;
                }
            }
            LinkProperty::LinkPattern => {
                let pattern = value as i32;
                if pattern != 0 {
                    self.project.network.pattern(pattern)?;
                }
                let p = self.pump_record(index)?;
                self.project.network.pumps[p].upat = pattern;
            }
            LinkProperty::PumpPower => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalLinkProperty);
                }
                let p = self.pump_record(index)?;
                let kw = if self.project.flow_units.is_si() {
                    value
                } else {
                    value * KW_PER_HP
                };
                self.project.network.links[k].km = kw;
                self.project.network.pumps[p].ptype = PumpType::ConstHp;
                self.project.network.pumps[p].hcurve = 0;
            }
            LinkProperty::PumpHCurve => {
                let curve = value as i32;
                if curve != 0 {
                    self.project.network.curve(curve)?;
                }
                let p = self.pump_record(index)?;
                self.project.network.pumps[p].hcurve = curve;
                if curve == 0 {
                    self.project.network.pumps[p].ptype = PumpType::NoCurve;
                }
            }
            LinkProperty::PumpECurve => {
                let curve = value as i32;
                if curve != 0 {
                    self.project.network.curve(curve)?;
                }
                let p = self.pump_record(index)?;
                self.project.network.pumps[p].ecurve = curve;
            }
            LinkProperty::PumpECost => {
                let p = self.pump_record(index)?;
                self.project.network.pumps[p].ecost = value;
            }
            LinkProperty::PumpEPat => {
                let pattern = value as i32;
                if pattern != 0 {
                    self.project.network.pattern(pattern)?;
                }
                let p = self.pump_record(index)?;
                self.project.network.pumps[p].epat = pattern;
            }
            LinkProperty::GPVCurve => {
                if link_type != LinkType::Gpv {
                    return Err(ErrorCode::IllegalParameterCode);
                }
                let curve = value as i32;
                if curve != 0 {
                    self.project.network.curve(curve)?;
                }
                self.project.network.links[k].kc = curve as f64;
            }
            _ => return Err(ErrorCode::IllegalParameterCode),
        }
        Ok(())
    }

    /// Sets length, diameter, roughness and minor loss of a pipe in one call.
    pub fn set_pipe_data(
        &mut self,
        index: i32,
        length: f64,
        diameter: f64,
        roughness: f64,
        minor_loss: f64,
    ) -> Result<()> {
        if !self.project.network.link(index)?.link_type.is_pipe() {
            return Err(ErrorCode::UndefinedLink.into());
        }
        self.set_link_value(index, LinkProperty::Length, length)?;
        self.set_link_value(index, LinkProperty::Diameter, diameter)?;
        self.set_link_value(index, LinkProperty::Roughness, roughness)?;
        self.set_link_value(index, LinkProperty::MinorLoss, minor_loss)
    }

    /// The type of curve a pump runs on.
    pub fn get_pump_type(&self, index: i32) -> Result<PumpType> {
        let p = self.pump_record(index)?;
        Ok(self.project.network.pumps[p].ptype)
    }

    pub fn get_vertex_count(&self, index: i32) -> Result<i32> {
        Ok(self.project.network.link(index)?.vertices.len() as i32)
    }

    pub fn get_vertex(&self, index: i32, vertex: i32) -> Result<(f64, f64)> {
        let link = self.project.network.link(index)?;
        if vertex < 1 || vertex as usize > link.vertices.len() {
            return Err(ErrorCode::IllegalVertices.into());
        }
        Ok(link.vertices[vertex as usize - 1])
    }

    pub fn set_vertices(&mut self, index: i32, vertices: &[(f64, f64)]) -> Result<()> {
        self.project.network.link_mut(index)?.vertices = vertices.to_vec();
        Ok(())
    }

    /// The public open/closed view of a link's current status.
    pub fn get_link_status(&self, index: i32) -> Result<LinkStatusType> {
        let value = self.get_link_value(index, LinkProperty::Status)?;
        LinkStatusType::from_i32(value as i32).ok_or_else(|| ErrorCode::IllegalParameterCode.into())
    }

    fn pump_record(&self, index: i32) -> EngineResult<usize> {
        self.project.network.link(index)?;
        match self.project.network.pump_index(index) {
            0 => Err(ErrorCode::UndefinedPump),
            p => Ok(p),
        }
    }

    fn sim_link(&self, array: &[f64], k: usize) -> EngineResult<f64> {
        array.get(k).copied().ok_or(ErrorCode::NoResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::types::link::LinkProperty::*;
    use crate::types::node::NodeType::Junction;
    use crate::types::ActionCodeType::{Conditional, Unconditional};
    use rstest::rstest;

    #[rstest]
    fn pipe_properties(ph: EPANET) {
        let index = ph.get_link_index("10").unwrap();
        assert!(approx_eq(ph.get_link_value(index, Diameter).unwrap(), 18.0, 1e-6));
        assert!(approx_eq(ph.get_link_value(index, Length).unwrap(), 10530.0, 1e-6));
        assert!(approx_eq(ph.get_link_value(index, Roughness).unwrap(), 100.0, 1e-6));
    }

    #[rstest]
    fn diameter_change_preserves_minor_loss(mut ph: EPANET) {
        let index = ph.get_link_index("10").unwrap();
        ph.set_link_value(index, MinorLoss, 2.5).unwrap();
        ph.set_link_value(index, Diameter, 12.0).unwrap();
        assert!(approx_eq(ph.get_link_value(index, MinorLoss).unwrap(), 2.5, 1e-9));
    }

    #[rstest]
    fn conditional_delete_blocked_by_control(mut ph_close: EPANET) {
        ph_close.add_node("J1", Junction).unwrap();
        ph_close.add_node("J2", Junction).unwrap();
        let p1 = ph_close
            .add_link("P1", LinkType::Pipe, "J1", "J2")
            .unwrap();
        ph_close
            .add_control(crate::types::ControlType::Timer, p1, 1.0, 0, 3600.0, true)
            .unwrap();

        let result = ph_close.delete_link(p1, Conditional);
        assert_eq!(result.unwrap_err(), EPANETError::from(261));
        assert!(ph_close.get_link_index("P1").is_ok());

        ph_close.delete_link(p1, Unconditional).unwrap();
        assert!(ph_close.get_link_index("P1").is_err());
        assert_eq!(
            ph_close
                .get_count(crate::types::CountType::ControlCount)
                .unwrap(),
            0
        );
    }

    #[rstest]
    fn valve_placement_rules(mut ph_close: EPANET) {
        ph_close.add_node("J1", Junction).unwrap();
        ph_close.add_node("J2", Junction).unwrap();
        ph_close.add_node("J3", Junction).unwrap();
        ph_close
            .add_link("V1", LinkType::Prv, "J1", "J2")
            .unwrap();
        // A second pressure valve sharing an end node is rejected.
        let result = ph_close.add_link("V2", LinkType::Psv, "J2", "J3");
        assert_eq!(result.unwrap_err(), EPANETError::from(220));
        // A throttle valve is fine.
        assert!(ph_close.add_link("V3", LinkType::Tcv, "J2", "J3").is_ok());
    }

    #[rstest]
    fn cv_status_is_protected(mut ph_close: EPANET) {
        ph_close.add_node("J1", Junction).unwrap();
        ph_close.add_node("J2", Junction).unwrap();
        let p1 = ph_close
            .add_link("P1", LinkType::Pipe, "J1", "J2")
            .unwrap();
        let p1 = ph_close
            .set_link_type(p1, LinkType::CvPipe, Unconditional)
            .unwrap();
        let result = ph_close.set_link_value(p1, Status, 0.0);
        assert_eq!(result.unwrap_err(), EPANETError::from(207));
    }

    #[rstest]
    fn same_end_nodes_rejected(mut ph_close: EPANET) {
        ph_close.add_node("J1", Junction).unwrap();
        let result = ph_close.add_link("P1", LinkType::Pipe, "J1", "J1");
        assert_eq!(result.unwrap_err(), EPANETError::from(222));
    }
}
