//! Public enums and value structs for the EPANET engine API.
//!
//! Every selector enum carries the toolkit's numeric constant as its
//! discriminant and derives `FromPrimitive` so callers holding raw codes can
//! convert losslessly.

pub mod analysis;
pub mod control;
pub mod curve;
pub mod demand;
pub mod link;
pub mod node;
pub mod options;
pub mod rule;

pub use analysis::{
    AnalysisStatistic, Event, InitHydOption, QualityAnalysisInfo, TimeParameter, TimestepEvent,
};
pub use control::{Control, ControlType};
pub use curve::{Curve, CurveType};
pub use demand::{Demand, DemandModel, DemandModelInfo};
pub use link::{LinkProperty, LinkStatusType, LinkType, PumpStateType, PumpType};
pub use node::{MixingModel, NodeProperty, NodeType, SourceType};
pub use options::{
    AnalysisOption, FlowUnits, HeadLossType, PressUnits, QualityType, StatisticType, StatusReport,
};
pub use rule::{
    ActionClause, LogicalOperator, Premise, Rule, RuleObject, RuleOperator, RuleStatus,
    RuleVariable,
};

use num_derive::FromPrimitive;

/// Max number of characters in an element ID.
pub const MAX_ID_SIZE: usize = 31;
/// Max message size
pub const MAX_MSG_SIZE: usize = 255;
/// Max project title line size.
pub const MAX_TITLE_SIZE: usize = 79;

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum ObjectType {
    Node = 0,        // Nodes
    Link = 1,        // Links
    TimePattern = 2, // Time patterns
    Curve = 3,       // Data curves
    Control = 4,     // Simple controls
    Rule = 5,        // Control rules
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum CountType {
    NodeCount = 0,    // Number of nodes (junctions + tanks + reservoirs)
    TankCount = 1,    // Number of tanks and reservoirs
    LinkCount = 2,    // Number of links (pipes + pumps + valves)
    PatternCount = 3, // Number of time patterns
    CurveCount = 4,   // Number of data curves
    ControlCount = 5, // Number of simple controls
    RuleCount = 6,    // Number of rule-based controls
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum ActionCodeType {
    Unconditional = 0, // Delete all controls and rules referencing the object
    Conditional = 1,   // Cancel object deletion if it appears in controls or rules
}

/// Checks an element ID for legality: nonempty, at most [`MAX_ID_SIZE`]
/// characters, no spaces, no semicolons, no leading double quote.
pub(crate) fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_SIZE
        && !id.contains(' ')
        && !id.contains(';')
        && !id.contains('"')
}
