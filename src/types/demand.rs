use num_derive::FromPrimitive;

/// One demand category attached to a junction.
///
/// A junction carries an ordered list of these; the primary category is the
/// last entry of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct Demand {
    /// Baseline demand in the project's flow units.
    pub base_demand: f64,
    /// Time pattern index (0 = none).
    pub pattern: i32,
    /// Category label, empty if unnamed.
    pub name: String,
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum DemandModel {
    Dda = 0, // Demand driven analysis
    Pda = 1, // Pressure driven analysis
}

/// Demand model parameters, as returned by [`crate::EPANET::get_demand_model`].
pub struct DemandModelInfo {
    pub demand_type: DemandModel,
    pub pressure_min: f64,
    pub pressure_required: f64,
    pub pressure_exponent: f64,
}
