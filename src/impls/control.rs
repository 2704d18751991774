//! Simple Control-related API methods for EPANET.
//!
//! This module contains methods for getting and adding simple controls.

use crate::epanet_error::*;
use crate::network::element::{ControlRecord, Status, MISSING};
use crate::types::control::{Control, ControlType};
use crate::EPANET;

/// ## Simple Control APIs
impl EPANET {
    pub fn get_control(&self, index: i32) -> Result<Control> {
        let record = self.control_record(index)?;
        let (setting, level) = self.control_to_user(record);
        Ok(Control {
            index,
            control_type: record.ctype,
            link_index: record.link,
            setting,
            node_index: record.node,
            level,
            enabled: record.enabled,
        })
    }

    /// Applies edited fields of a previously fetched control.
    pub fn update_control(&mut self, control: &Control) -> Result<()> {
        let record = self.control_from_user(
            control.control_type,
            control.link_index,
            control.setting,
            control.node_index,
            control.level,
            control.enabled,
        )?;
        self.control_record(control.index)?;
        self.project.network.controls[control.index as usize - 1] = record;
        Ok(())
    }

    pub fn delete_control(&mut self, control: Control) -> Result<()> {
        self.delete_control_by_index(control.index())
    }

    pub fn add_control(
        &mut self,
        control_type: ControlType,
        link_index: i32,
        setting: f64,
        node_index: i32,
        level: f64,
        enabled: bool,
    ) -> Result<Control> {
        let record =
            self.control_from_user(control_type, link_index, setting, node_index, level, enabled)?;
        let index = check_error_with_context(
            self.project.network.add_control(record),
            format!("Failed to add control on link {link_index}"),
        )?;
        Ok(Control {
            index,
            control_type,
            link_index,
            setting,
            node_index,
            level,
            enabled,
        })
    }

    pub fn delete_control_by_index(&mut self, index: i32) -> Result<()> {
        Ok(self.project.network.delete_control(index)?)
    }

    pub fn get_control_enabled(&self, control_index: i32) -> Result<bool> {
        Ok(self.control_record(control_index)?.enabled)
    }

    pub fn set_control_enabled(&mut self, control_index: i32, enabled: bool) -> Result<()> {
        self.control_record(control_index)?;
        self.project.network.controls[control_index as usize - 1].enabled = enabled;
        Ok(())
    }

    fn control_record(&self, index: i32) -> EngineResult<&ControlRecord> {
        if index < 1 || index as usize > self.project.network.controls.len() {
            return Err(ErrorCode::UndefinedControl);
        }
        Ok(&self.project.network.controls[index as usize - 1])
    }

    /// Builds an internal control record from user-facing values: the
    /// setting in link units, the level as pressure (junctions), water level
    /// (tanks) or seconds (time-based controls).
    fn control_from_user(
        &self,
        control_type: ControlType,
        link_index: i32,
        setting: f64,
        node_index: i32,
        level: f64,
        enabled: bool,
    ) -> Result<ControlRecord> {
        let net = &self.project.network;
        net.link(link_index)?;
        let ucf = &self.project.ucf;
        // A negative setting means open/closed rather than a numeric value.
        let (status, internal_setting) = if setting < 0.0 {
            (
                if setting < -1.5 { Status::Closed } else { Status::Open },
                MISSING,
            )
        } else if net.links[link_index as usize].link_type.is_valve() {
            (
                Status::Active,
                self.project.action_setting_to_internal(link_index, setting),
            )
        } else if setting == 0.0 {
            (Status::Closed, MISSING)
        } else {
            (
                Status::Open,
                self.project.action_setting_to_internal(link_index, setting),
            )
        };
        let record = match control_type {
            ControlType::Timer | ControlType::TimeOfDay => ControlRecord {
                ctype: control_type,
                link: link_index,
                node: 0,
                status,
                setting: internal_setting,
                grade: 0.0,
                time: level as u64,
                enabled,
            },
            _ => {
                net.node(node_index)?;
                let elevation = net.nodes[node_index as usize].elevation;
                let grade = if net.is_junction(node_index) {
                    elevation + level / ucf.pressure
                } else {
                    elevation + level / ucf.elev
                };
                ControlRecord {
                    ctype: control_type,
                    link: link_index,
                    node: node_index,
                    status,
                    setting: internal_setting,
                    grade,
                    time: 0,
                    enabled,
                }
            }
        };
        Ok(record)
    }

    fn control_to_user(&self, record: &ControlRecord) -> (f64, f64) {
        let net = &self.project.network;
        let ucf = &self.project.ucf;
        let setting = if record.setting == MISSING {
            if record.status == Status::Closed {
                0.0
            } else {
                1.0
            }
        } else {
            self.project
                .action_setting_to_user(record.link, record.setting)
        };
        let level = match record.ctype {
            ControlType::Timer | ControlType::TimeOfDay => record.time as f64,
            _ => {
                let elevation = net.nodes[record.node as usize].elevation;
                if net.is_junction(record.node) {
                    (record.grade - elevation) * ucf.pressure
                } else {
                    (record.grade - elevation) * ucf.elev
                }
            }
        };
        (setting, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_utils::fixtures::*;
    use rstest::*;

    #[rstest]
    fn net1_controls_round_trip(ph: EPANET) {
        // Net1 opens pump 9 when the tank drops below 110 ft.
        let control = ph.get_control(1).unwrap();
        assert_eq!(control.control_type, ControlType::LowLevel);
        assert_eq!(
            control.link_index,
            ph.get_link_index("9").unwrap()
        );
        assert!(approx_eq(control.level, 110.0, 1e-4));
    }

    #[rstest]
    fn add_update_delete_control(mut ph: EPANET) {
        let link = ph.get_link_index("10").unwrap();
        let mut control = ph
            .add_control(ControlType::Timer, link, 0.0, 0, 7200.0, true)
            .unwrap();
        assert_eq!(control.index(), 3);

        control.level = 3600.0;
        ph.update_control(&control).unwrap();
        assert_eq!(ph.get_control(3).unwrap().level, 3600.0);

        ph.set_control_enabled(3, false).unwrap();
        assert!(!ph.get_control_enabled(3).unwrap());

        ph.delete_control_by_index(3).unwrap();
        assert_eq!(
            ph.get_control(3).unwrap_err(),
            EPANETError::from(241)
        );
    }
}
