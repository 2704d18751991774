use num_derive::FromPrimitive;

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum RuleObject {
    Node = 6,   // Clause refers to a node
    Link = 7,   // Clause refers to a link
    System = 8, // Clause refers to a system parameter (e.g., time)
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum RuleVariable {
    Demand = 0,     // Nodal demand
    Head = 1,       // Nodal hydraulic head
    Grade = 2,      // Nodal hydraulic grade
    Level = 3,      // Tank water level
    Pressure = 4,   // Nodal pressure
    Flow = 5,       // Link flow rate
    Status = 6,     // Link status
    Setting = 7,    // Link setting
    Power = 8,      // Pump power output
    Time = 9,       // Elapsed simulation time
    ClockTime = 10, // Time of day
    FillTime = 11,  // Time to fill a tank
    DrainTime = 12, // Time to drain a tank
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum RuleOperator {
    Eq = 0,    // Equal to
    Ne = 1,    // Not equal
    Le = 2,    // Less than or equal to
    Ge = 3,    // Greater than or equal to
    Lt = 4,    // Less than
    Gt = 5,    // Greater than
    Is = 6,    // Is equal to
    Not = 7,   // Is not equal to
    Below = 8, // Is below
    Above = 9, // Is above
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum RuleStatus {
    IsOpen = 1,   // Link is open
    IsClosed = 2, // Link is closed
    IsActive = 3, // Control valve is active
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum LogicalOperator {
    If = 1,
    And = 2,
    Or = 3,
}

/// Utility struct for rule based control information.
#[derive(Debug, Clone)]
pub struct Rule {
    pub rule_id: String,
    pub premises: Vec<Premise>,
    pub then_actions: Vec<ActionClause>,
    pub else_actions: Option<Vec<ActionClause>>,
    pub priority: Option<f64>,
    pub enabled: bool,
}

/// One premise clause of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Premise {
    pub logical_operator: LogicalOperator,
    pub rule_object: RuleObject,
    pub object_index: i32,
    pub variable: RuleVariable,
    pub rule_operator: RuleOperator,
    pub status: Option<RuleStatus>,
    pub value: f64,
}

/// One THEN or ELSE action clause of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionClause {
    pub link_index: i32,
    pub status: Option<RuleStatus>,
    pub setting: Option<f64>,
}
