use num_derive::FromPrimitive;

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum LinkType {
    CvPipe = 0, // Pipe with check valve
    Pipe = 1,   // Pipe
    Pump = 2,   // Pump
    Prv = 3,    // Pressure reducing valve
    Psv = 4,    // Pressure sustaining valve
    Pbv = 5,    // Pressure breaker valve
    Fcv = 6,    // Flow control valve
    Tcv = 7,    // Throttle control valve
    Gpv = 8,    // General purpose valve
}

impl LinkType {
    /// Pipes and check-valve pipes form one family; conversions within it
    /// are an in-place flag change rather than a delete-and-re-add.
    pub fn is_pipe(self) -> bool {
        matches!(self, LinkType::CvPipe | LinkType::Pipe)
    }

    pub fn is_valve(self) -> bool {
        matches!(
            self,
            LinkType::Prv | LinkType::Psv | LinkType::Pbv | LinkType::Fcv | LinkType::Tcv | LinkType::Gpv
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum LinkProperty {
    Diameter = 0,      // Pipe/valve diameter
    Length = 1,        // Pipe length
    Roughness = 2,     // Pipe roughness coefficient
    MinorLoss = 3,     // Pipe/valve minor loss coefficient
    InitStatus = 4,    // Initial status
    InitSetting = 5,   // Initial pump speed or valve setting
    KBulk = 6,         // Bulk chemical reaction coefficient
    KWall = 7,         // Pipe wall chemical reaction coefficient
    Flow = 8,          // Current computed flow rate (read only)
    Velocity = 9,      // Current computed flow velocity (read only)
    HeadLoss = 10,     // Current computed head loss (read only)
    Status = 11,       // Current link status
    Setting = 12,      // Current link setting
    Energy = 13,       // Current computed pump energy usage (read only)
    LinkQual = 14,     // Current computed link quality (read only)
    LinkPattern = 15,  // Pump speed time pattern index
    PumpState = 16,    // Current computed pump state (read only)
    PumpEffic = 17,    // Current computed pump efficiency (read only)
    PumpPower = 18,    // Pump constant power rating
    PumpHCurve = 19,   // Pump head v. flow curve index
    PumpECurve = 20,   // Pump efficiency v. flow curve index
    PumpECost = 21,    // Pump average energy price
    PumpEPat = 22,     // Pump energy price time pattern index
    GPVCurve = 23,     // GPV head loss v. flow curve index
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum LinkStatusType {
    Closed = 0, // Link is closed
    Open = 1,   // Link is open
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum PumpStateType {
    PumpXHead = 0,  // Pump closed - cannot supply head
    PumpClosed = 2, // Pump closed
    PumpOpen = 3,   // Pump open
    PumpXFlow = 5,  // Pump open - cannot supply flow
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum PumpType {
    ConstHp = 0,   // Constant horsepower
    PowerFunc = 1, // Power function
    Custom = 2,    // User-defined custom curve
    NoCurve = 3,   // No curve
}
