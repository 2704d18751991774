use num_derive::FromPrimitive;

/// A struct for holding simple control information.
#[derive(Debug, Clone)]
pub struct Control {
    /// EPANET project index of the control.
    pub(crate) index: i32,
    /// The control type. (see [`ControlType`])
    pub control_type: ControlType,
    /// The index of the link to control starting from 1.
    pub link_index: i32,
    /// Control setting applied to the link.
    pub setting: f64,
    /// The index of the node used to control the link.
    /// 0 for [`ControlType::Timer`] and [`ControlType::TimeOfDay`].
    pub node_index: i32,
    /// Action level (tank level, junction pressure, or time in seconds) that triggers the control.
    pub level: f64,
    /// Enabled status of the control.
    pub enabled: bool,
}

impl Control {
    /// Returns the EPANET project index of the control.
    pub fn index(&self) -> i32 {
        self.index
    }
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum ControlType {
    /// Act when pressure or tank level drops below a setpoint
    LowLevel = 0,
    /// Act when pressure or tank level rises above a setpoint
    HiLevel = 1,
    /// Act at a prescribed elapsed amount of time
    Timer = 2,
    /// Act at a particular time of day
    TimeOfDay = 3,
}
