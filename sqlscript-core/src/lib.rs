//! Core types and pipeline stages for SQL Server script generation.
//!
//! This crate turns a live SQL Server database into a single executable
//! T-SQL script that recreates its schema and data. It is shared by the
//! `generatescript` binary and by tests that drive the pipeline against
//! catalog fixtures.
//!
//! # Pipeline
//! 1. [`connection::SqlServerConnection`] opens the session and reads the
//!    catalog snapshot ([`models::Database`])
//! 2. [`enumeration`] selects tables, then indexes, then foreign keys
//! 3. [`scripting::Scripter`] drives a [`scripting::ScriptEngine`] over the
//!    selected objects
//! 4. [`assembly`] filters statements and appends batch separators
//! 5. [`writer::ScriptWriter`] writes the UTF-8 script atomically
//!
//! # Security
//! - Passwords never appear in errors or logs
//!   ([`error::redact_connection_string`])
//! - All database access is read-only

pub mod assembly;
pub mod catalog;
pub mod connection;
pub mod enumeration;
pub mod error;
pub mod logging;
pub mod models;
pub mod options;
pub mod scripting;
pub mod writer;

// Re-export commonly used types
pub use assembly::{ExclusionRule, ExclusionRules, Script, assemble_script};
pub use connection::SqlServerConnection;
pub use enumeration::{Enumeration, SkipEvent, enumerate_objects};
pub use error::{GenerateScriptError, Result};
pub use models::{Database, ObjectId, Table};
pub use options::{ScriptOptions, SqlServerVersion};
pub use scripting::mssql::SqlServerScriptEngine;
pub use scripting::{ScriptEngine, Scripter};
pub use writer::ScriptWriter;
