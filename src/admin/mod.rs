#![forbid(unsafe_code)]

//! Store administration.
//!
//! Verification scans every entity history and interval chain and reports
//! anything that contradicts the ledger rules. It never repairs.

mod verify;

/// Store integrity verification.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyLevel, VerifyReport, VerifySeverity};
