use num_derive::FromPrimitive;
#[cfg(test)]
use strum_macros::EnumIter;

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum FlowUnits {
    Cfs = 0,  // Cubic feet per second
    Gpm = 1,  // Gallons per minute
    Mgd = 2,  // Million gallons per day
    Imgd = 3, // Imperial million gallons per day
    Afd = 4,  // Acre-feet per day
    Lps = 5,  // Liters per second
    Lpm = 6,  // Liters per minute
    Mld = 7,  // Million liters per day
    Cmh = 8,  // Cubic meters per hour
    Cmd = 9,  // Cubic meters per day
}

impl FlowUnits {
    /// Whether this flow unit implies SI (metric) reporting units.
    pub fn is_si(self) -> bool {
        matches!(
            self,
            FlowUnits::Lps | FlowUnits::Lpm | FlowUnits::Mld | FlowUnits::Cmh | FlowUnits::Cmd
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum PressUnits {
    Psi = 0,    // Pounds per square inch
    Kpa = 1,    // Kilopascals
    Meters = 2, // Meters
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum HeadLossType {
    HazenWilliams = 0, // Hazen-Williams
    DarcyWeisbach = 1, // Darcy-Weisbach
    ChezyManning = 2,  // Chezy-Manning
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum QualityType {
    None = 0,  // No quality analysis
    Chem = 1,  // Chemical fate and transport
    Age = 2,   // Water age analysis
    Trace = 3, // Source tracing analysis
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum StatisticType {
    Series = 0,  // Report all time series points
    Average = 1, // Report average value over simulation period
    Minimum = 2, // Report minimum value over simulation period
    Maximum = 3, // Report maximum value over simulation period
    Range = 4,   // Report maximum - minimum over simulation period
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive, Default)]
#[repr(i32)]
pub enum StatusReport {
    #[default]
    NoReport = 0,     // No status reporting
    NormalReport = 1, // Normal level of status reporting
    FullReport = 2,   // Full level of status reporting
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum AnalysisOption {
    Trials = 0,         // Maximum trials allowed for hydraulic convergence
    Accuracy = 1,       // Total normalized flow change for hydraulic convergence
    Tolerance = 2,      // Water quality tolerance
    EmitExpon = 3,      // Exponent in emitter discharge formula
    DemandMult = 4,     // Global demand multiplier
    HeadError = 5,      // Maximum head loss error for hydraulic convergence
    FlowChange = 6,     // Maximum flow change for hydraulic convergence
    HeadLossForm = 7,   // Head loss formula
    GlobalEffic = 8,    // Global pump efficiency (percent)
    GlobalPrice = 9,    // Global energy price per KWH
    GlobalPattern = 10, // Index of a global energy price pattern
    DemandCharge = 11,  // Energy charge per max. KW usage
    SpGravity = 12,     // Specific gravity
    SpViscos = 13,      // Specific viscosity (relative to water at 20 deg C)
    Unbalanced = 14,    // Extra trials allowed if hydraulics don't converge
    CheckFreq = 15,     // Frequency of hydraulic status checks
    MaxCheck = 16,      // Maximum trials for status checking
    DampLimit = 17,     // Accuracy level where solution damping begins
    SpDiffus = 18,      // Specific diffusivity (relative to chlorine at 20 deg C)
    BulkOrder = 19,     // Bulk water reaction order for pipes
    WallOrder = 20,     // Wall reaction order for pipes (either 0 or 1)
    TankOrder = 21,     // Bulk water reaction order for tanks
    ConcenLimit = 22,   // Limiting concentration for growth reactions
    DemandPattern = 23, // Index of default demand pattern
    EmitBackflow = 24,  // 1 if emitters can backflow, 0 if not
    PressUnits = 25,    // Pressure units
    StatusReport = 26,  // Type of status report to produce
}
