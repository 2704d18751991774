//! Node-related API methods for EPANET.
//!
//! This module contains methods for adding, deleting, and querying nodes.

use crate::epanet_error::*;
use crate::network::element::Source;
use crate::types::node::{MixingModel, NodeProperty, NodeType, SourceType};
use crate::types::ActionCodeType;
use crate::units::SEC_PER_DAY;
use crate::EPANET;
use num_traits::FromPrimitive;

/// ## Node APIs
impl EPANET {
    /// Adds a new node to the EPANET model.
    ///
    /// This function creates and adds a new node to the EPANET model with
    /// the specified ID and type. After the node is added, it returns the
    /// index of the newly created node in the model.
    ///
    /// # Parameters
    /// - `id`: The unique identifier for the new node. This should be a
    ///   valid string and unique within the model.
    /// - `node_type`: The type of the node, represented by the [`NodeType`]
    ///   enum. The node type determines the functionality and behavior of
    ///   the node (e.g., junction, reservoir).
    ///
    /// # Returns
    /// A [`Result<i32>`] which:
    /// - `Ok(i32)` contains the 1-based index of the newly created node.
    /// - `Err(EPANETError)` contains an error if the node addition fails,
    ///   wrapping the error code and additional context about the operation.
    ///
    /// # Implementation Details
    /// A junction is inserted after the existing junctions, shifting every
    /// tank and reservoir index up by one; tanks and reservoirs append at
    /// the end. Every cross-reference (hash tables, link endpoints, controls
    /// and rule clauses) is rewritten before the call returns, so the new
    /// index is visible immediately through every other API.
    ///
    /// # Errors
    /// - 252 if the ID is not a legal identifier.
    /// - 215 if the ID already names a node.
    /// - 262 if a solver is open.
    ///
    /// # See Also
    /// - [`NodeType`] for possible node types.
    pub fn add_node(&mut self, id: &str, node_type: NodeType) -> Result<i32> {
        let result = self
            .project
            .require_solvers_closed()
            .and_then(|_| self.project.network.add_node(id, node_type));
        check_error_with_context(
            result,
            format!("Failed to add node of type {node_type:?} with id {id}"),
        )
    }

    /// Deletes a node from the project.
    ///
    /// With [`ActionCodeType::Conditional`] the deletion is refused when the
    /// node still has connecting links (259) or appears in any control or
    /// rule (261). With [`ActionCodeType::Unconditional`] connecting links
    /// are deleted and referencing controls and rules are purged. The
    /// water-quality trace node can never be deleted (260).
    pub fn delete_node(&mut self, index: i32, action_code: ActionCodeType) -> Result<()> {
        let result = self.project.require_solvers_closed().and_then(|_| {
            if index == self.project.qual.trace_node {
                return Err(ErrorCode::TraceNodeUndeletable);
            }
            self.project.network.delete_node(index, action_code)?;
            let trace = &mut self.project.qual.trace_node;
            if *trace > index {
                *trace -= 1;
            }
            Ok(())
        });
        check_error_with_context(
            result,
            format!("Failed to delete node {index} with action code {action_code:?}"),
        )
    }

    /// Retrieves the index of a node given its ID.
    pub fn get_node_index(&self, id: &str) -> Result<i32> {
        match self.project.network.find_node(id) {
            0 => Err(EPANETError::from(ErrorCode::UndefinedNode)
                .with_context(format!("no node named {id}"))),
            index => Ok(index),
        }
    }

    /// Gets a node id given an index
    pub fn get_node_id(&self, index: i32) -> Result<String> {
        Ok(self.project.network.node(index)?.id.clone())
    }

    /// Renames a node, keeping every index-based reference valid.
    pub fn set_node_id(&mut self, index: i32, id: &str) -> Result<()> {
        check_error_with_context(
            self.project.network.set_node_id(index, id),
            format!("Failed to rename node {index} to {id}"),
        )
    }

    pub fn get_node_type(&self, index: i32) -> Result<NodeType> {
        Ok(self.project.network.node_type(index)?)
    }

    /// Retrieves a property value for a node, converted to the project's
    /// user units.
    pub fn get_node_value(&self, index: i32, property: NodeProperty) -> Result<f64> {
        let pr = &self.project;
        let net = &pr.network;
        let node = net.node(index)?;
        let ucf = &pr.ucf;
        let i = index as usize;
        let tk = net.tank_index(index);
        let value = match property {
            NodeProperty::Elevation => node.elevation * ucf.elev,
            NodeProperty::BaseDemand => match node.demands.last() {
                Some(d) => d.base * ucf.flow,
                None => 0.0,
            },
            NodeProperty::Pattern => match node.demands.last() {
                Some(d) => d.pattern as f64,
                None => 0.0,
            },
            NodeProperty::Emitter => {
                node.ke * ucf.flow / ucf.pressure.powf(pr.hyd.qexp)
            }
            NodeProperty::InitQual => node.c0,
            NodeProperty::SourceQual => self.source(index)?.c0,
            NodeProperty::SourcePat => self.source(index)?.pattern as f64,
            NodeProperty::SourceType => self.source(index)?.stype as i32 as f64,
            NodeProperty::SourceMass => self.source(index)?.smass * 60.0,
            NodeProperty::TankLevel => {
                if tk == 0 {
                    return Err(ErrorCode::NotATank.into());
                }
                let head = match pr.hyd.head.get(i) {
                    Some(h) => *h,
                    None => net.tanks[tk].h0,
                };
                (head - node.elevation) * ucf.elev
            }
            NodeProperty::Demand => self.sim_value(&pr.hyd.demand, i)? * ucf.flow,
            NodeProperty::Head => self.sim_value(&pr.hyd.head, i)? * ucf.elev,
            NodeProperty::Pressure => {
                (self.sim_value(&pr.hyd.head, i)? - node.elevation) * ucf.pressure
            }
            NodeProperty::Quality => self.sim_value(&pr.qual.node_qual, i).unwrap_or(node.c0),
            NodeProperty::EmitterFlow => self.sim_value(&pr.hyd.emitter_flow, i)? * ucf.flow,
            NodeProperty::FullDemand => self.sim_value(&pr.hyd.full_demand, i)? * ucf.flow,
            NodeProperty::DemandDeficit => {
                let full = self.sim_value(&pr.hyd.full_demand, i)?;
                let delivered =
                    self.sim_value(&pr.hyd.demand, i)? - self.sim_value(&pr.hyd.emitter_flow, i)?;
                (full - delivered) * ucf.flow
            }
            NodeProperty::InitVolume => self.tank(index)?.v0 * ucf.volume,
            NodeProperty::MixModel => self.tank(index)?.mix_model as i32 as f64,
            NodeProperty::MixZoneVol => {
                let tank = self.tank(index)?;
                tank.v1frac * tank.vmax * ucf.volume
            }
            NodeProperty::TankDiam => {
                let tank = self.tank(index)?;
                (4.0 * tank.area / std::f64::consts::PI).sqrt() * ucf.elev
            }
            NodeProperty::MinVolume => self.tank(index)?.vmin * ucf.volume,
            NodeProperty::MaxVolume => self.tank(index)?.vmax * ucf.volume,
            NodeProperty::VolCurve => self.tank(index)?.vcurve as f64,
            NodeProperty::MinLevel => {
                let tank = self.tank(index)?;
                (tank.hmin - node.elevation) * ucf.elev
            }
            NodeProperty::MaxLevel => {
                let tank = self.tank(index)?;
                (tank.hmax - node.elevation) * ucf.elev
            }
            NodeProperty::MixFraction => self.tank(index)?.v1frac,
            NodeProperty::TankKBulk => match self.tank(index)?.kb {
                Some(kb) => kb * SEC_PER_DAY,
                None => pr.qual.kbulk * SEC_PER_DAY,
            },
            NodeProperty::TankVolume => {
                if tk == 0 {
                    return Err(ErrorCode::NotATank.into());
                }
                match pr.hyd.tank_volume.get(tk) {
                    Some(v) => v * ucf.volume,
                    None => net.tanks[tk].v0 * ucf.volume,
                }
            }
            NodeProperty::CanOverflow => self.tank(index)?.can_overflow as i32 as f64,
        };
        Ok(value)
    }

    /// Sets a property value for a node, converting from user units.
    pub fn set_node_value(&mut self, index: i32, property: NodeProperty, value: f64) -> Result<()> {
        let result = self.set_node_value_inner(index, property, value);
        check_error_with_context(
            result,
            format!("Failed to set {property:?} = {value} on node {index}"),
        )
    }

    fn set_node_value_inner(
        &mut self,
        index: i32,
        property: NodeProperty,
        value: f64,
    ) -> EngineResult<()> {
        let pr = &mut self.project;
        pr.network.node(index)?;
        let ucf = pr.ucf;
        let i = index as usize;
        match property {
            NodeProperty::Elevation => {
                let new_el = value / ucf.elev;
                let old_el = pr.network.nodes[i].elevation;
                pr.network.nodes[i].elevation = new_el;
                // Tank levels ride on the elevation.
                if let Some(tank) = pr.network.tank_of_node_mut(index) {
                    let delta = new_el - old_el;
                    tank.h0 += delta;
                    tank.hmin += delta;
                    tank.hmax += delta;
                }
            }
            NodeProperty::BaseDemand => {
                if !pr.network.is_junction(index) {
                    return Err(ErrorCode::IllegalNodeProperty);
                }
                let base = value / ucf.flow;
                match pr.network.nodes[i].demands.last_mut() {
                    Some(demand) => demand.base = base,
                    None => pr.network.nodes[i].demands.push(
                        crate::network::element::DemandRecord {
                            base,
                            pattern: 0,
                            name: String::new(),
                        },
                    ),
                }
            }
            NodeProperty::Pattern => {
                let pattern = value as i32;
                if pattern != 0 {
                    pr.network.pattern(pattern)?;
                }
                match pr.network.nodes[i].demands.last_mut() {
                    Some(demand) => demand.pattern = pattern,
                    None => return Err(ErrorCode::UndefinedDemand),
                }
            }
            NodeProperty::Emitter => {
                if value < 0.0 {
                    return Err(ErrorCode::IllegalNodeProperty);
                }
                pr.network.nodes[i].ke = value * ucf.pressure.powf(pr.hyd.qexp) / ucf.flow;
            }
            NodeProperty::InitQual => {
                if value < 0.0 {
                    return Err(ErrorCode::IllegalNodeProperty);
                }
                pr.network.nodes[i].c0 = value;
            }
            NodeProperty::SourceQual | NodeProperty::SourcePat | NodeProperty::SourceType => {
                if property != NodeProperty::SourceType && value < 0.0 {
                    return Err(ErrorCode::IllegalNodeProperty);
                }
                if property == NodeProperty::SourcePat && value as i32 != 0 {
                    pr.network.pattern(value as i32)?;
                }
                let source = pr.network.nodes[i].source.get_or_insert(Source {
                    stype: SourceType::Concen,
                    c0: 0.0,
                    pattern: 0,
                    smass: 0.0,
                });
                match property {
                    NodeProperty::SourceQual => source.c0 = value,
                    NodeProperty::SourcePat => source.pattern = value as i32,
                    _ => {
                        source.stype = SourceType::from_i32(value as i32)
                            .ok_or(ErrorCode::IllegalParameterCode)?;
                    }
                }
            }
            NodeProperty::TankLevel => {
                let el = pr.network.nodes[i].elevation;
                let (elev_ucf, vol_ucf) = (ucf.elev, ucf.volume);
                let tk = pr.network.tank_index(index);
                if tk == 0 {
                    return Err(ErrorCode::NotATank);
                }
                let h0 = el + value / ucf.elev;
                if h0 < pr.network.tanks[tk].hmin || h0 > pr.network.tanks[tk].hmax {
                    return Err(ErrorCode::IllegalTankLevels);
                }
                pr.network.tanks[tk].h0 = h0;
                pr.network.tanks[tk].v0 = pr.network.tank_volume(tk, h0, elev_ucf, vol_ucf);
            }
            NodeProperty::TankDiam => {
                if value <= 0.0 {
                    return Err(ErrorCode::IllegalNodeProperty);
                }
                let d = value / ucf.elev;
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].area = std::f64::consts::PI * d * d / 4.0;
                self.update_tank_volumes(tk);
            }
            NodeProperty::MinVolume => {
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].vmin = value / ucf.volume;
                self.update_tank_volumes(tk);
            }
            NodeProperty::VolCurve => {
                let curve = value as i32;
                if curve != 0 {
                    self.project.network.curve(curve)?;
                }
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].vcurve = curve;
                self.update_tank_volumes(tk);
            }
            NodeProperty::MinLevel => {
                let tk = self.require_tank(index)?;
                let el = self.project.network.nodes[i].elevation;
                let tank = &mut self.project.network.tanks[tk];
                let hmin = el + value / ucf.elev;
                if hmin > tank.h0 || hmin > tank.hmax {
                    return Err(ErrorCode::IllegalTankLevels);
                }
                tank.hmin = hmin;
                self.update_tank_volumes(tk);
            }
            NodeProperty::MaxLevel => {
                let tk = self.require_tank(index)?;
                let el = self.project.network.nodes[i].elevation;
                let tank = &mut self.project.network.tanks[tk];
                let hmax = el + value / ucf.elev;
                if hmax < tank.h0 || hmax < tank.hmin {
                    return Err(ErrorCode::IllegalTankLevels);
                }
                tank.hmax = hmax;
                self.update_tank_volumes(tk);
            }
            NodeProperty::MixModel => {
                let model =
                    MixingModel::from_i32(value as i32).ok_or(ErrorCode::IllegalParameterCode)?;
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].mix_model = model;
            }
            NodeProperty::MixFraction => {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ErrorCode::IllegalNodeProperty);
                }
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].v1frac = value.max(1.0e-4);
            }
            NodeProperty::TankKBulk => {
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].kb = Some(value / SEC_PER_DAY);
            }
            NodeProperty::CanOverflow => {
                let tk = self.require_tank(index)?;
                self.project.network.tanks[tk].can_overflow = value != 0.0;
            }
            _ => return Err(ErrorCode::IllegalParameterCode),
        }
        Ok(())
    }

    /// Sets elevation, base demand and demand pattern of a junction in one
    /// call.
    pub fn set_junction_data(
        &mut self,
        index: i32,
        elevation: f64,
        base_demand: f64,
        pattern: &str,
    ) -> Result<()> {
        if !self.project.network.is_junction(index) {
            return Err(ErrorCode::UndefinedNode.into());
        }
        let pattern_index = if pattern.is_empty() {
            0
        } else {
            match self.project.network.find_pattern(pattern) {
                0 => return Err(ErrorCode::UndefinedPattern.into()),
                p => p,
            }
        };
        self.set_node_value(index, NodeProperty::Elevation, elevation)?;
        self.set_node_value(index, NodeProperty::BaseDemand, base_demand)?;
        self.set_node_value(index, NodeProperty::Pattern, pattern_index as f64)?;
        Ok(())
    }

    /// Sets the geometry and initial state of a tank in one call. Values in
    /// user units; a zero volume curve name keeps the cylindrical shape.
    #[allow(clippy::too_many_arguments)]
    pub fn set_tank_data(
        &mut self,
        index: i32,
        elevation: f64,
        init_level: f64,
        min_level: f64,
        max_level: f64,
        diameter: f64,
        min_volume: f64,
        volume_curve: &str,
    ) -> Result<()> {
        let result = (|| -> EngineResult<()> {
            let tk = self.require_tank(index)?;
            if min_level > init_level || init_level > max_level {
                return Err(ErrorCode::IllegalTankLevels);
            }
            let ucf = self.project.ucf;
            let vcurve = if volume_curve.is_empty() {
                0
            } else {
                match self.project.network.find_curve(volume_curve) {
                    0 => return Err(ErrorCode::UndefinedCurve),
                    c => c,
                }
            };
            let el = elevation / ucf.elev;
            let node_idx = self.project.network.tanks[tk].node as usize;
            self.project.network.nodes[node_idx].elevation = el;
            let d = diameter / ucf.elev;
            let tank = &mut self.project.network.tanks[tk];
            tank.area = std::f64::consts::PI * d * d / 4.0;
            tank.h0 = el + init_level / ucf.elev;
            tank.hmin = el + min_level / ucf.elev;
            tank.hmax = el + max_level / ucf.elev;
            tank.vmin = min_volume / ucf.volume;
            tank.vcurve = vcurve;
            self.update_tank_volumes(tk);
            Ok(())
        })();
        check_error_with_context(result, format!("Failed to set tank data on node {index}"))
    }

    pub fn get_coord(&self, index: i32) -> Result<(f64, f64)> {
        match self.project.network.node(index)?.coords {
            Some(xy) => Ok(xy),
            None => Err(ErrorCode::NoCoordinates.into()),
        }
    }

    pub fn set_coord(&mut self, index: i32, x: f64, y: f64) -> Result<()> {
        self.project.network.node_mut(index)?.coords = Some((x, y));
        Ok(())
    }

    // ---- helpers ------------------------------------------------------

    fn source(&self, index: i32) -> EngineResult<&Source> {
        self.project.network.nodes[index as usize]
            .source
            .as_ref()
            .ok_or(ErrorCode::UndefinedSource)
    }

    fn tank(&self, index: i32) -> EngineResult<&crate::network::element::Tank> {
        let tk = self.project.network.tank_index(index);
        if tk == 0 {
            return Err(ErrorCode::NotATank);
        }
        Ok(&self.project.network.tanks[tk])
    }

    fn require_tank(&self, index: i32) -> EngineResult<usize> {
        self.project.network.node(index)?;
        match self.project.network.tank_index(index) {
            0 => Err(ErrorCode::NotATank),
            tk => Ok(tk),
        }
    }

    /// Re-derives a tank's volume range after a geometry change.
    fn update_tank_volumes(&mut self, tk: usize) {
        let ucf = self.project.ucf;
        let net = &mut self.project.network;
        let (hmin, h0, hmax, vcurve) = {
            let t = &net.tanks[tk];
            (t.hmin, t.h0, t.hmax, t.vcurve)
        };
        if vcurve == 0 {
            let vmin = net.tanks[tk].vmin;
            let area = net.tanks[tk].area;
            net.tanks[tk].v0 = vmin + (h0 - hmin) * area;
            net.tanks[tk].vmax = vmin + (hmax - hmin) * area;
        } else {
            net.tanks[tk].vmin = net.tank_volume(tk, hmin, ucf.elev, ucf.volume);
            net.tanks[tk].v0 = net.tank_volume(tk, h0, ucf.elev, ucf.volume);
            net.tanks[tk].vmax = net.tank_volume(tk, hmax, ucf.elev, ucf.volume);
        }
    }

    fn sim_value(&self, array: &[f64], i: usize) -> EngineResult<f64> {
        array.get(i).copied().ok_or(ErrorCode::NoResults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::types::node::NodeProperty::*;
    use crate::types::node::NodeType::{Junction, Reservoir, Tank};
    use crate::types::ActionCodeType::Unconditional;
    use rstest::rstest;

    #[rstest]
    fn add_delete_nodes(mut ph_close: EPANET) {
        assert!(ph_close.add_node("N2", Junction).is_ok());
        assert!(ph_close.add_node("N4", Tank).is_ok());
        assert!(ph_close.add_node("N3", Reservoir).is_ok());
        assert!(ph_close.add_node("N1", Junction).is_ok());

        // Junctions pack before tanks: N1 landed at index 2.
        assert_eq!(ph_close.get_node_index("N1").unwrap(), 2);
        for id in ["N2", "N4", "N3", "N1"] {
            let index = ph_close.get_node_index(id).unwrap();
            assert!(ph_close.delete_node(index, Unconditional).is_ok());
        }
        assert_eq!(ph_close.get_count(crate::types::CountType::NodeCount).unwrap(), 0);
    }

    #[rstest]
    fn node_validate_id(mut ph: EPANET) {
        assert!(ph.add_node("N2", Junction).is_ok());

        let result = ph.add_node("N 3", Junction);
        assert_eq!(result.unwrap_err(), EPANETError::from(252));
        let result = ph.add_node("\"N3", Junction);
        assert_eq!(result.unwrap_err(), EPANETError::from(252));
        let result = ph.add_node("N;3", Junction);
        assert_eq!(result.unwrap_err(), EPANETError::from(252));

        let index = ph.get_node_index("N2").expect("Node 'N2' should exist");
        let result = ph.set_node_id(index, "N;2");
        assert_eq!(result.unwrap_err(), EPANETError::from(252));
    }

    #[rstest]
    fn node_junction_properties(ph: EPANET) {
        let index = ph.get_node_index("11").unwrap();
        assert_eq!(ph.get_node_value(index, Elevation).unwrap(), 710.0);
        assert!(approx_eq(
            ph.get_node_value(index, BaseDemand).unwrap(),
            150.0,
            1e-6
        ));
        assert_eq!(ph.get_node_value(index, Pattern).unwrap(), 1.0);
        assert_eq!(ph.get_node_value(index, Emitter).unwrap(), 0.0);
        assert_eq!(ph.get_node_value(index, InitQual).unwrap(), 0.5);
    }

    #[rstest]
    fn node_tank_properties(ph: EPANET) {
        let index = ph.get_node_index("2").unwrap();
        assert_eq!(ph.get_node_value(index, Elevation).unwrap(), 850.0);
        assert!(approx_eq(ph.get_node_value(index, TankLevel).unwrap(), 120.0, 1e-6));
        assert!(approx_eq(ph.get_node_value(index, MinLevel).unwrap(), 100.0, 1e-6));
        assert!(approx_eq(ph.get_node_value(index, MaxLevel).unwrap(), 150.0, 1e-6));
        assert!(approx_eq(ph.get_node_value(index, TankDiam).unwrap(), 50.5, 1e-6));
        assert!(approx_eq(
            ph.get_node_value(index, MinVolume).unwrap(),
            200296.167,
            1e-1
        ));
    }

    #[rstest]
    fn renumbering_shifts_endpoints(mut ph_close: EPANET) {
        ph_close.add_node("J1", Junction).unwrap();
        ph_close.add_node("T1", Tank).unwrap();
        ph_close.set_node_value(2, TankDiam, 100.0).unwrap();
        let p1 = ph_close
            .add_link("P1", crate::types::link::LinkType::Pipe, "J1", "T1")
            .unwrap();
        assert_eq!(ph_close.get_link_nodes(p1).unwrap(), (1, 2));

        ph_close.add_node("J2", Junction).unwrap();
        assert_eq!(ph_close.get_link_nodes(p1).unwrap(), (1, 3));
        assert_eq!(ph_close.get_node_index("T1").unwrap(), 3);
    }

    #[rstest]
    fn emitter_round_trips_through_exponent_change(mut ph: EPANET) {
        use crate::types::options::AnalysisOption::EmitExpon;
        let index = ph.get_node_index("11").unwrap();
        ph.set_node_value(index, Emitter, 1.5).unwrap();
        ph.set_option(EmitExpon, 0.8).unwrap();
        assert!(approx_eq(ph.get_node_value(index, Emitter).unwrap(), 1.5, 1e-9));
    }

    #[rstest]
    fn source_requires_existing_record(ph: EPANET) {
        let index = ph.get_node_index("11").unwrap();
        let result = ph.get_node_value(index, SourceQual);
        assert_eq!(result.unwrap_err(), EPANETError::from(240));
    }

    /// Hash tables stay consistent with indices through every mutation.
    #[rstest]
    fn id_index_round_trip_after_mutations(mut ph: EPANET) {
        ph.add_node("JX", Junction).unwrap();
        let deleted = ph.get_node_index("22").unwrap();
        ph.delete_node(deleted, Unconditional).unwrap();
        let n = ph.get_count(crate::types::CountType::NodeCount).unwrap();
        for i in 1..=n {
            let id = ph.get_node_id(i).unwrap();
            assert_eq!(ph.get_node_index(&id).unwrap(), i);
        }
        let l = ph.get_count(crate::types::CountType::LinkCount).unwrap();
        for k in 1..=l {
            let id = ph.get_link_id(k).unwrap();
            assert_eq!(ph.get_link_index(&id).unwrap(), k);
        }
    }
}
