//! Shared protocol types for communication between quotegen and the Windows
//! bridge process that drives Excel through COM.
//!
//! The protocol is JSON-over-stdio: one JSON object per line in each direction.
//! Diagnostics from the bridge go to stderr and never share the channel.

use serde::{Deserialize, Serialize};

/// Excel's `XlFixedFormatType` value for PDF output
pub const XL_TYPE_PDF: i32 = 0;

/// A command sent from quotegen to the bridge process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Monotonically increasing request ID for correlating responses.
    pub id: u64,
    /// The command to execute.
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the client can send to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum Command {
    /// Initialize COM and start a hidden Excel.Application with alerts disabled.
    Init,

    /// Open a workbook from a file path (Windows path). Returns a workbook handle.
    OpenWorkbook { path: String },

    /// Export an open workbook as a fixed-format PDF document (Windows path).
    ExportPdf { workbook: u64, path: String },

    /// Close a workbook without saving.
    CloseWorkbook { workbook: u64 },

    /// Shut down the bridge: close all workbooks, quit Excel, uninitialize COM.
    Shutdown,
}

/// A response sent from the bridge back to quotegen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The request ID this response corresponds to.
    pub id: u64,
    /// The result of the command.
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ResponseResult {
    #[serde(rename = "ok")]
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Data returned in successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// Handle to a newly opened workbook.
    WorkbookHandle { workbook: u64 },
}

impl Response {
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            result: ResponseResult::Ok { data: None },
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: ResponseResult::Error {
                message: message.into(),
            },
        }
    }
}
