//! Demand-related API methods for EPANET.
//!
//! A junction carries an ordered list of demand categories; the primary
//! category is the last entry, and the 1-based `demand_index` walks the list
//! in storage order.

use crate::epanet_error::*;
use crate::network::element::DemandRecord;
use crate::types::demand::{DemandModel, DemandModelInfo};
use crate::EPANET;

/// ## Demand APIs
impl EPANET {
    pub fn get_demand_model(&self) -> Result<DemandModelInfo> {
        let hyd = &self.project.hyd;
        let ucf = &self.project.ucf;
        Ok(DemandModelInfo {
            demand_type: hyd.demand_model,
            pressure_min: hyd.pmin * ucf.pressure,
            pressure_required: hyd.preq * ucf.pressure,
            pressure_exponent: hyd.pexp,
        })
    }

    /// Switches between demand-driven and pressure-driven analysis. Under
    /// PDA the minimum pressure must lie below the required pressure.
    pub fn set_demand_model(&mut self, model: DemandModelInfo) -> Result<()> {
        if model.demand_type == DemandModel::Pda {
            if model.pressure_min >= model.pressure_required {
                return Err(ErrorCode::IllegalPdaLimits.into());
            }
            if model.pressure_exponent <= 0.0 {
                return Err(ErrorCode::IllegalPdaLimits.into());
            }
        }
        let ucf = self.project.ucf;
        let hyd = &mut self.project.hyd;
        hyd.demand_model = model.demand_type;
        hyd.pmin = model.pressure_min / ucf.pressure;
        hyd.preq = model.pressure_required / ucf.pressure;
        hyd.pexp = model.pressure_exponent;
        Ok(())
    }

    /// Appends a demand category, which becomes the node's new primary.
    pub fn add_demand(
        &mut self,
        node_index: i32,
        base_demand: f64,
        demand_pattern: &str,
        demand_name: &str,
    ) -> Result<()> {
        if !self.project.network.is_junction(node_index) {
            self.project.network.node(node_index)?;
            return Err(ErrorCode::IllegalNodeProperty.into());
        }
        let pattern = if demand_pattern.is_empty() {
            0
        } else {
            match self.project.network.find_pattern(demand_pattern) {
                0 => return Err(ErrorCode::UndefinedPattern.into()),
                p => p,
            }
        };
        let base = base_demand / self.project.ucf.flow;
        self.project.network.nodes[node_index as usize]
            .demands
            .push(DemandRecord {
                base,
                pattern,
                name: demand_name.to_string(),
            });
        Ok(())
    }

    /// Removes one demand category; the last category of a junction cannot
    /// be deleted.
    pub fn delete_demand(&mut self, node_index: i32, demand_index: i32) -> Result<()> {
        let d = self.demand_slot(node_index, demand_index)?;
        let demands = &mut self.project.network.nodes[node_index as usize].demands;
        if demands.len() == 1 {
            return Err(ErrorCode::UndefinedDemand.into());
        }
        demands.remove(d);
        Ok(())
    }

    /// Finds the 1-based index of a named demand category.
    pub fn get_demand_index(&self, node_index: i32, demand_name: &str) -> Result<i32> {
        let node = self.project.network.node(node_index)?;
        node.demands
            .iter()
            .position(|d| d.name == demand_name)
            .map(|p| p as i32 + 1)
            .ok_or_else(|| ErrorCode::UndefinedDemand.into())
    }

    pub fn get_demand_count(&self, node_index: i32) -> Result<i32> {
        Ok(self.project.network.node(node_index)?.demands.len() as i32)
    }

    pub fn get_base_demand(&self, node_index: i32, demand_index: i32) -> Result<f64> {
        let d = self.demand_slot(node_index, demand_index)?;
        Ok(self.project.network.nodes[node_index as usize].demands[d].base
            * self.project.ucf.flow)
    }

    pub fn set_base_demand(&mut self, node_index: i32, demand_index: i32, demand: f64) -> Result<()> {
        let d = self.demand_slot(node_index, demand_index)?;
        let base = demand / self.project.ucf.flow;
        self.project.network.nodes[node_index as usize].demands[d].base = base;
        Ok(())
    }

    pub fn get_demand_pattern(&self, node_index: i32, demand_index: i32) -> Result<i32> {
        let d = self.demand_slot(node_index, demand_index)?;
        Ok(self.project.network.nodes[node_index as usize].demands[d].pattern)
    }

    pub fn set_demand_pattern(
        &mut self,
        node_index: i32,
        demand_index: i32,
        pattern_index: i32,
    ) -> Result<()> {
        let d = self.demand_slot(node_index, demand_index)?;
        if pattern_index != 0 {
            self.project.network.pattern(pattern_index)?;
        }
        self.project.network.nodes[node_index as usize].demands[d].pattern = pattern_index;
        Ok(())
    }

    pub fn get_demand_name(&self, node_index: i32, demand_index: i32) -> Result<String> {
        let d = self.demand_slot(node_index, demand_index)?;
        Ok(self.project.network.nodes[node_index as usize].demands[d]
            .name
            .clone())
    }

    pub fn set_demand_name(
        &mut self,
        node_index: i32,
        demand_index: i32,
        name: &str,
    ) -> Result<()> {
        let d = self.demand_slot(node_index, demand_index)?;
        self.project.network.nodes[node_index as usize].demands[d].name = name.to_string();
        Ok(())
    }

    fn demand_slot(&self, node_index: i32, demand_index: i32) -> EngineResult<usize> {
        let node = self.project.network.node(node_index)?;
        if demand_index < 1 || demand_index as usize > node.demands.len() {
            return Err(ErrorCode::UndefinedDemand);
        }
        Ok(demand_index as usize - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use crate::types::node::NodeProperty;
    use rstest::rstest;

    #[rstest]
    fn primary_category_is_last(ph_single_node: (EPANET, i32)) {
        let (mut ph, node) = ph_single_node;
        ph.set_base_demand(node, 1, 10.0).unwrap();
        ph.add_demand(node, 25.0, "", "industrial").unwrap();

        assert_eq!(ph.get_demand_count(node).unwrap(), 2);
        // The freshly appended category governs BASEDEMAND.
        assert!(approx_eq(
            ph.get_node_value(node, NodeProperty::BaseDemand).unwrap(),
            25.0,
            1e-9
        ));
        assert_eq!(ph.get_demand_index(node, "industrial").unwrap(), 2);
    }

    #[rstest]
    fn last_category_is_undeletable(ph_single_node: (EPANET, i32)) {
        let (mut ph, node) = ph_single_node;
        assert_eq!(
            ph.delete_demand(node, 1).unwrap_err(),
            EPANETError::from(253)
        );
        ph.add_demand(node, 5.0, "", "extra").unwrap();
        ph.delete_demand(node, 1).unwrap();
        assert_eq!(ph.get_demand_count(node).unwrap(), 1);
        assert_eq!(ph.get_demand_name(node, 1).unwrap(), "extra");
    }

    #[rstest]
    fn pda_model_validates_limits(mut ph: EPANET) {
        let result = ph.set_demand_model(DemandModelInfo {
            demand_type: DemandModel::Pda,
            pressure_min: 20.0,
            pressure_required: 10.0,
            pressure_exponent: 0.5,
        });
        assert_eq!(result.unwrap_err(), EPANETError::from(208));

        ph.set_demand_model(DemandModelInfo {
            demand_type: DemandModel::Pda,
            pressure_min: 0.0,
            pressure_required: 20.0,
            pressure_exponent: 0.5,
        })
        .unwrap();
        let info = ph.get_demand_model().unwrap();
        assert_eq!(info.demand_type, DemandModel::Pda);
        assert!(approx_eq(info.pressure_required, 20.0, 1e-9));
    }
}
