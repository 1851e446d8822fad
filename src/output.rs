//! JSON output types for CLI responses.
//!
//! Every response is a single JSON object with `status` first and a
//! `schema_version`. Errors use the same envelope with an `error` object
//! carrying the numeric code the process exits with.

use std::io::{self, Write};
use std::path::PathBuf;

use mendtool_core::error::{MendError, OutputErrorCode};
use mendtool_core::pool::PoolStats;
use serde::Serialize;

use crate::mine::MineSummary;
use crate::orchestrator::RepairSummary;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

/// Response for `mend repair`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairResponse {
    pub status: String,
    pub schema_version: String,
    #[serde(flatten)]
    pub summary: RepairSummary,
}

impl RepairResponse {
    pub fn new(summary: RepairSummary) -> Self {
        RepairResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            summary,
        }
    }
}

/// Response for `mend mine`.
#[derive(Debug, Clone, Serialize)]
pub struct MineResponse {
    pub status: String,
    pub schema_version: String,
    pub pool: PathBuf,
    #[serde(flatten)]
    pub summary: MineSummary,
}

impl MineResponse {
    pub fn new(pool: PathBuf, summary: MineSummary) -> Self {
        MineResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            pool,
            summary,
        }
    }
}

/// Response for `mend pool stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatsResponse {
    pub status: String,
    pub schema_version: String,
    pub pool: PathBuf,
    pub stats: PoolStats,
}

impl PoolStatsResponse {
    pub fn new(pool: PathBuf, stats: PoolStats) -> Self {
        PoolStatsResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            pool,
            stats,
        }
    }
}

/// Error details in an error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: u8,
    pub message: String,
}

impl ErrorInfo {
    pub fn from_error(err: &MendError) -> Self {
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &MendError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit<T: Serialize>(response: &T) -> serde_json::Value {
        let mut out = Vec::new();
        emit_response(response, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn error_envelope_carries_code() {
        let err = MendError::invalid_args("no change pool configured");
        let json = emit(&ErrorResponse::from_error(&err));
        assert_eq!(json["status"], "error");
        assert_eq!(json["schema_version"], SCHEMA_VERSION);
        assert_eq!(json["error"]["code"], 2);
        assert!(json["error"]["message"].as_str().unwrap().contains("no change pool"));
    }

    #[test]
    fn status_comes_first() {
        let response = MineResponse::new(PathBuf::from("pool"), MineSummary::default());
        let mut out = Vec::new();
        emit_response(&response, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("{\n  \"status\": \"ok\""));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["pairs"], 0);
        assert_eq!(json["pool"], "pool");
    }

    #[test]
    fn pool_stats_nest_counts() {
        let json = emit(&PoolStatsResponse::new(PathBuf::from("p"), PoolStats::default()));
        assert_eq!(json["stats"]["changes"], 0);
    }
}
