use crate::types::options::QualityType;
use num_derive::FromPrimitive;
#[cfg(test)]
use strum_macros::EnumIter;

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum InitHydOption {
    NoSave = 0,       // Don't save hydraulics; don't re-initialize flows
    Save = 1,         // Save hydraulics to file, don't re-initialize flows
    InitFlow = 10,    // Don't save hydraulics; re-initialize flows
    SaveAndInit = 11, // Save hydraulics; re-initialize flows
}

impl InitHydOption {
    pub(crate) fn saves(self) -> bool {
        matches!(self, InitHydOption::Save | InitHydOption::SaveAndInit)
    }

    pub(crate) fn reinitializes(self) -> bool {
        matches!(self, InitHydOption::InitFlow | InitHydOption::SaveAndInit)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum TimeParameter {
    Duration = 0,      // Total simulation duration
    HydStep = 1,       // Hydraulic time step
    QualStep = 2,      // Water quality time step
    PatternStep = 3,   // Time pattern period
    PatternStart = 4,  // Time when time patterns begin
    ReportStep = 5,    // Reporting time step
    ReportStart = 6,   // Time when reporting starts
    RuleStep = 7,      // Rule-based control evaluation time step
    Statistic = 8,     // Reporting statistic code
    Periods = 9,       // Number of reporting time periods (read only)
    StartTime = 10,    // Simulation starting time of day
    HTime = 11,        // Elapsed time of current hydraulic solution (read only)
    QTime = 12,        // Elapsed time of current quality solution (read only)
    HaltFlag = 13,     // Flag indicating if the simulation was halted (read only)
    NextEvent = 14,    // Shortest time until a tank becomes empty or full (read only)
    NextEventTank = 15, // Index of tank with shortest time to become empty or full (read only)
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum TimestepEvent {
    StepReport = 0,       // Reporting interval boundary
    StepHyd = 1,          // Hydraulic step
    StepWq = 2,           // Water quality step
    StepTankEvent = 3,    // Tank fill/empty event
    StepControlEvent = 4, // Simple control activation
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum AnalysisStatistic {
    Iterations = 0,      // Number of hydraulic iterations taken
    RelativeError = 1,   // Sum of link flow changes / sum of link flows
    MaxHeadError = 2,    // Largest head loss error for links
    MaxFlowChange = 3,   // Largest flow change in links
    MassBalance = 4,     // Cumulative water quality mass balance ratio
    DeficientNodes = 5,  // Number of pressure deficient nodes
    DemandReduction = 6, // % demand reduction at pressure deficient nodes
}

/// Quality of life struct used as the return object for the
/// `time_to_next_event` API.
pub struct Event {
    pub event_type: TimestepEvent,
    pub duration: u64,
    pub element_index: i32,
}

/// Water quality analysis settings, as returned by
/// [`crate::EPANET::get_quality_info`].
pub struct QualityAnalysisInfo {
    pub quality_type: QualityType,
    pub chem_name: String,
    pub chem_units: String,
    pub trace_node_index: i32,
}
