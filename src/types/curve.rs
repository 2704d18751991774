use num_derive::FromPrimitive;

/// A snapshot of a data curve in an EPANET project.
///
/// Returned by [`crate::EPANET::get_curve`]; mutations go through the
/// per-point and per-curve setters on the project handle.
#[derive(Debug, Clone)]
pub struct Curve {
    /// EPANET project index of the curve
    pub(crate) index: i32,
    /// Curve ID
    pub id: String,
    /// Curve type of type [`CurveType`]
    pub curve_type: CurveType,
    /// Curve points given as a vector of (x, y) tuples
    pub points: Vec<(f64, f64)>,
}

impl Curve {
    /// Returns the EPANET project index of the curve
    pub fn index(&self) -> i32 {
        self.index
    }
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum CurveType {
    /// Tank volume vs. depth curve
    VolumeCurve = 0,
    /// Pump head vs. flow curve
    PumpCurve = 1,
    /// Pump efficiency vs. flow curve
    EfficCurve = 2,
    /// Valve head loss vs. flow curve
    HLossCurve = 3,
    /// Generic curve
    GenericCurve = 4,
}
