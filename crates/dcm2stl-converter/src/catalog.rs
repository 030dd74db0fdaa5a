//! Engine status codes and their meaning.
//!
//! The code table is fixed by the engine; [`ErrorCatalog`] is a total
//! lookup from any integer to a status and a stable description.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What the batch driver does after seeing a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Engine accepted the work; poll for completion and verify output.
    Proceed,
    /// The session was lost; reattach and retry once.
    Reattach,
    /// Terminal failure for this request.
    Fail,
}

/// Raw engine status, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    /// 0
    Success,
    /// 1
    GeneralError,
    /// 2
    InvalidInputFile,
    /// 3
    InvalidOutputFile,
    /// 4
    ConversionFailed,
    /// 5
    UnsupportedFormat,
    /// 6
    FileNotFound,
    /// 7
    SessionDetached,
    /// 99
    UnknownError,
    /// Any code outside the documented table.
    Undocumented(i32),
}

impl EngineStatus {
    /// Decode a raw status code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::GeneralError,
            2 => Self::InvalidInputFile,
            3 => Self::InvalidOutputFile,
            4 => Self::ConversionFailed,
            5 => Self::UnsupportedFormat,
            6 => Self::FileNotFound,
            7 => Self::SessionDetached,
            99 => Self::UnknownError,
            other => Self::Undocumented(other),
        }
    }

    /// The raw status code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::GeneralError => 1,
            Self::InvalidInputFile => 2,
            Self::InvalidOutputFile => 3,
            Self::ConversionFailed => 4,
            Self::UnsupportedFormat => 5,
            Self::FileNotFound => 6,
            Self::SessionDetached => 7,
            Self::UnknownError => 99,
            Self::Undocumented(code) => *code,
        }
    }

    /// Human-readable description. Never empty.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "Conversion accepted by the engine",
            Self::GeneralError => "General engine error",
            Self::InvalidInputFile => "Input file is missing or not readable by the engine",
            Self::InvalidOutputFile => "Output file is missing or cannot be written",
            Self::ConversionFailed => "The engine could not translate the input",
            Self::UnsupportedFormat => "Input or output format is not supported",
            Self::FileNotFound => "Input file was not found",
            Self::SessionDetached => "The calling client is not attached to the engine",
            Self::UnknownError => "The engine reported an unknown error",
            Self::Undocumented(_) => "Undocumented engine status code",
        }
    }

    /// The driver's reaction to this status.
    pub fn action(&self) -> StatusAction {
        match self {
            Self::Success => StatusAction::Proceed,
            Self::SessionDetached => StatusAction::Reattach,
            _ => StatusAction::Fail,
        }
    }

    /// Whether the engine accepted the request.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::GeneralError => write!(f, "GeneralError"),
            Self::InvalidInputFile => write!(f, "InvalidInputFile"),
            Self::InvalidOutputFile => write!(f, "InvalidOutputFile"),
            Self::ConversionFailed => write!(f, "ConversionFailed"),
            Self::UnsupportedFormat => write!(f, "UnsupportedFormat"),
            Self::FileNotFound => write!(f, "FileNotFound"),
            Self::SessionDetached => write!(f, "SessionDetached"),
            Self::UnknownError => write!(f, "UnknownError"),
            Self::Undocumented(code) => write!(f, "Undocumented({code})"),
        }
    }
}

/// Documented codes in table order.
const DOCUMENTED_CODES: [i32; 9] = [0, 1, 2, 3, 4, 5, 6, 7, 99];

/// Stateless lookup over the engine's status table.
pub struct ErrorCatalog;

impl ErrorCatalog {
    /// Decode a status code.
    pub fn lookup(code: i32) -> EngineStatus {
        EngineStatus::from_code(code)
    }

    /// Description for any status code.
    pub fn describe(code: i32) -> &'static str {
        EngineStatus::from_code(code).description()
    }

    /// All documented statuses, in table order.
    pub fn documented() -> impl Iterator<Item = EngineStatus> {
        DOCUMENTED_CODES.into_iter().map(EngineStatus::from_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_codes_have_distinct_descriptions() {
        let descriptions: Vec<_> = ErrorCatalog::documented()
            .map(|s| s.description())
            .collect();
        assert_eq!(descriptions.len(), 9);
        for d in &descriptions {
            assert!(!d.is_empty());
        }
        let mut unique = descriptions.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), descriptions.len());
    }

    #[test]
    fn test_lookup_is_stable() {
        for code in DOCUMENTED_CODES {
            assert_eq!(ErrorCatalog::describe(code), ErrorCatalog::describe(code));
            assert_eq!(ErrorCatalog::lookup(code).code(), code);
        }
    }

    #[test]
    fn test_other_codes_are_undocumented() {
        for code in [-1, 8, 14, 98, 100, i32::MAX, i32::MIN] {
            let status = ErrorCatalog::lookup(code);
            assert_eq!(status, EngineStatus::Undocumented(code));
            assert_eq!(status.code(), code);
            assert_eq!(
                ErrorCatalog::describe(code),
                "Undocumented engine status code"
            );
            assert_eq!(status.action(), StatusAction::Fail);
        }
    }

    #[test]
    fn test_actions() {
        assert_eq!(ErrorCatalog::lookup(0).action(), StatusAction::Proceed);
        assert_eq!(ErrorCatalog::lookup(7).action(), StatusAction::Reattach);
        for code in [1, 2, 3, 4, 5, 6, 99] {
            assert_eq!(ErrorCatalog::lookup(code).action(), StatusAction::Fail);
        }
    }
}
