//! Error reporting for the EPANET engine.
//!
//! Internally the engine works with the [`ErrorCode`] sum type; at the public
//! API boundary every failure is surfaced as an [`EPANETError`] carrying the
//! numeric toolkit code, the message from the fixed text table, and optional
//! call-site context.

use core::fmt;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

/// EPANET Result type with EPANET specific errors
pub type Result<T> = std::result::Result<T, EPANETError>;

/// Result type used inside the engine, before boundary conversion.
pub(crate) type EngineResult<T> = std::result::Result<T, ErrorCode>;

/// Numeric toolkit error codes.
///
/// Codes in the 100s are system errors, 200s are input/argument errors and
/// 300s are file errors. Warning codes (1..6) are not errors and are kept in
/// [`crate::project::Warnings`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, FromPrimitive)]
#[repr(i32)]
pub enum ErrorCode {
    #[error("insufficient memory available")]
    OutOfMemory = 101,
    #[error("no network data available")]
    NoData = 102,
    #[error("hydraulics not initialized")]
    HydNotOpened = 103,
    #[error("no hydraulics for water quality analysis")]
    NoHydResults = 104,
    #[error("water quality not initialized")]
    QualNotOpened = 105,
    #[error("no results saved to report on")]
    NoResults = 106,
    #[error("hydraulics supplied from external file")]
    HydFileInUse = 107,
    #[error("cannot use external file while hydraulics solver is active")]
    HydOpenedWhenUsingFile = 108,
    #[error("cannot solve network hydraulic equations")]
    HydSolveFailed = 110,
    #[error("cannot solve water quality transport equations")]
    QualSolveFailed = 120,

    #[error("one or more errors in input file")]
    InputFileErrors = 200,
    #[error("syntax error")]
    SyntaxError = 201,
    #[error("illegal numeric value")]
    IllegalNumericValue = 202,
    #[error("undefined node")]
    UndefinedNode = 203,
    #[error("undefined link")]
    UndefinedLink = 204,
    #[error("undefined time pattern")]
    UndefinedPattern = 205,
    #[error("undefined curve")]
    UndefinedCurve = 206,
    #[error("attempt to control a check valve")]
    IllegalCvControl = 207,
    #[error("illegal PDA pressure limits")]
    IllegalPdaLimits = 208,
    #[error("illegal node property value")]
    IllegalNodeProperty = 209,
    #[error("illegal link property value")]
    IllegalLinkProperty = 211,
    #[error("undefined trace node")]
    UndefinedTraceNode = 212,
    #[error("invalid option value")]
    IllegalOption = 213,
    #[error("duplicate ID name")]
    DuplicateId = 215,
    #[error("undefined pump")]
    UndefinedPump = 216,
    #[error("invalid pump energy data")]
    IllegalEnergyData = 217,
    #[error("illegal valve connection to tank node")]
    IllegalValveConnection = 219,
    #[error("illegal valve connection to another valve")]
    SharedValveConnection = 220,
    #[error("misplaced clause in rule")]
    MisplacedRuleClause = 221,
    #[error("link assigned same start and end nodes")]
    SameStartEndNodes = 222,
    #[error("not enough nodes in network")]
    NotEnoughNodes = 223,
    #[error("no tanks or reservoirs in network")]
    NoTanksOrReservoirs = 224,
    #[error("invalid lower/upper levels for tank")]
    IllegalTankLevels = 225,
    #[error("no head curve or power rating for pump")]
    NoPumpCurve = 226,
    #[error("invalid head curve for pump")]
    IllegalPumpCurve = 227,
    #[error("nonincreasing x-values for curve")]
    CurveNotIncreasing = 230,
    #[error("network has an unconnected node")]
    UnconnectedNode = 233,
    #[error("nonexistent water quality source")]
    UndefinedSource = 240,
    #[error("nonexistent control")]
    UndefinedControl = 241,
    #[error("invalid format")]
    InvalidFormat = 250,
    #[error("code out of range")]
    IllegalParameterCode = 251,
    #[error("invalid ID name")]
    IllegalId = 252,
    #[error("nonexistent demand category")]
    UndefinedDemand = 253,
    #[error("node with no coordinates")]
    NoCoordinates = 254,
    #[error("invalid link vertices")]
    IllegalVertices = 255,
    #[error("nonexistent rule")]
    UndefinedRule = 257,
    #[error("nonexistent rule clause")]
    UndefinedRuleClause = 258,
    #[error("attempt to delete a node that still has links connected to it")]
    NodeHasLinks = 259,
    #[error("attempt to delete node assigned as a trace node")]
    TraceNodeUndeletable = 260,
    #[error("attempt to delete a node or link contained in a control")]
    ControlledElementUndeletable = 261,
    #[error("attempt to modify network structure while a solver is open")]
    SolverOpen = 262,
    #[error("node is not a tank")]
    NotATank = 263,
    #[error("no pump efficiency curve")]
    NoEfficiencyCurve = 268,

    #[error("identical file names supplied")]
    SameFileNames = 301,
    #[error("cannot open input file")]
    CannotOpenInputFile = 302,
    #[error("cannot open report file")]
    CannotOpenReportFile = 303,
    #[error("cannot open binary output file")]
    CannotOpenOutputFile = 304,
    #[error("cannot open hydraulics file")]
    CannotOpenHydFile = 305,
    #[error("hydraulics file does not match network data")]
    HydFileMismatch = 306,
    #[error("cannot read hydraulics file")]
    CannotReadHydFile = 307,
    #[error("cannot save results to binary file")]
    CannotSaveResults = 308,
    #[error("cannot save results to report file")]
    CannotWriteReport = 309,
}

impl ErrorCode {
    /// The numeric toolkit code for this error.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// EPANET Errors
#[derive(Debug, Clone)]
pub struct EPANETError {
    code: i32,
    message: String,
    context: Option<String>,
}

impl EPANETError {
    /// The numeric toolkit error code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The message from the fixed error-text table.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

/// Errors compare by toolkit code; context is diagnostic only.
impl PartialEq for EPANETError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for EPANETError {}

/// Convert a raw error code into an EPANETError
impl From<i32> for EPANETError {
    fn from(error: i32) -> Self {
        let message = match ErrorCode::from_i32(error) {
            Some(code) => code.to_string(),
            None => String::from("unknown error"),
        };
        EPANETError {
            code: error,
            message,
            context: None,
        }
    }
}

impl From<ErrorCode> for EPANETError {
    fn from(code: ErrorCode) -> Self {
        EPANETError {
            code: code.code(),
            message: code.to_string(),
            context: None,
        }
    }
}

/// Display the epanet error code
impl fmt::Display for EPANETError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EPANET Error Code {}: {}", self.code, self.message)?;
        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }
        Ok(())
    }
}

impl std::error::Error for EPANETError {}

/// Attach call-site context to a nonzero engine result.
pub(crate) fn check_error_with_context<T>(result: EngineResult<T>, context: String) -> Result<T> {
    result.map_err(|code| EPANETError::from(code).with_context(context))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        let err = EPANETError::from(203);
        assert_eq!(err.code(), 203);
        assert_eq!(err.message(), "undefined node");
        assert_eq!(err, EPANETError::from(ErrorCode::UndefinedNode));
    }

    #[test]
    fn unknown_code_still_carries_number() {
        let err = EPANETError::from(999);
        assert_eq!(err.code(), 999);
        assert_eq!(err.message(), "unknown error");
    }

    #[test]
    fn context_is_diagnostic_only() {
        let err = EPANETError::from(ErrorCode::DuplicateId).with_context("node J1".to_string());
        assert_eq!(err, EPANETError::from(215));
        assert!(err.to_string().contains("node J1"));
    }
}
