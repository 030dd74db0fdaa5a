//! Engine status code table.

use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use dcm2stl_converter::{EngineStatus, ErrorCatalog, StatusAction};

/// One row of the status table
#[derive(Debug, Serialize, Tabled)]
struct CodeRow {
    #[tabled(rename = "Code")]
    code: i32,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Description")]
    description: &'static str,
}

impl From<EngineStatus> for CodeRow {
    fn from(status: EngineStatus) -> Self {
        Self {
            code: status.code(),
            kind: status.to_string(),
            action: match status.action() {
                StatusAction::Proceed => "poll and verify",
                StatusAction::Reattach => "reattach, retry once",
                StatusAction::Fail => "fail request",
            },
            description: status.description(),
        }
    }
}

/// Print the documented status codes
pub fn execute(format: OutputFormat) {
    let rows: Vec<CodeRow> = ErrorCatalog::documented().map(CodeRow::from).collect();
    output::print_list(&rows, format);
    if format == OutputFormat::Table {
        println!("Any other code: {}", ErrorCatalog::describe(-1));
    }
}
