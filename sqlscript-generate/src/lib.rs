//! Pipeline orchestration for the `generatescript` binary.
//!
//! Exposed as a library so the argument handling and the enumerate,
//! script and assemble sequence can be tested without a server.

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;
use sqlscript_core::error::redact_connection_string;
use sqlscript_core::{
    Database, Enumeration, ExclusionRules, GenerateScriptError, Result, Script, ScriptEngine,
    ScriptOptions, ScriptWriter, Scripter, SqlServerConnection, SqlServerScriptEngine,
    assemble_script, enumerate_objects,
};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Printed for any invocation without exactly two arguments.
pub const USAGE: &str = "Missing arguments:\n\
generatescript \"server=.;database=test_db;user=sa;password=password\" \"c:\\temp\\script.sql\"";

/// CLI argument structure
#[derive(Parser)]
#[command(name = "generatescript")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// ADO.NET-style connection string (credentials are redacted in logs)
    #[arg(allow_hyphen_values = true)]
    pub connection_string: String,

    /// Destination of the generated script
    #[arg(allow_hyphen_values = true)]
    pub output: PathBuf,
}

/// Parses the process arguments, program name included.
///
/// # Errors
/// Returns a usage error unless exactly two arguments follow the program
/// name.
pub fn parse_args<I, T>(args: I) -> Result<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if args.len() != 3 {
        return Err(GenerateScriptError::usage(USAGE));
    }
    Cli::try_parse_from(args).map_err(|_| GenerateScriptError::usage(USAGE))
}

/// Counts reported after a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub tables: usize,
    pub indexes: usize,
    pub foreign_keys: usize,
    pub skipped: usize,
    pub statements: usize,
    pub excluded: usize,
}

/// Enumerates objects and assembles the script through `engine`.
///
/// # Errors
/// Enumeration errors when `database` is missing, script generation errors
/// from the engine.
pub async fn generate_script<E: ScriptEngine>(
    database: Option<&Database>,
    engine: E,
    options: ScriptOptions,
    rules: &ExclusionRules,
) -> Result<(Script, Enumeration)> {
    let enumeration = enumerate_objects(database)?;
    for skip in &enumeration.skipped {
        warn!("{}", skip);
    }

    info!("Setting script options");
    let mut scripter = Scripter::new(engine, options);

    info!("Building script");
    let script = assemble_script(scripter.enum_script(&enumeration.objects), rules).await?;

    Ok((script, enumeration))
}

/// Connected database the generator reads its catalog and data from.
#[async_trait]
pub trait ScriptSource: Send + Sized {
    /// Engine scripting objects of a loaded catalog over this session.
    type Engine<'a>: ScriptEngine
    where
        Self: 'a;

    /// Reads the catalog snapshot of the session's database.
    ///
    /// # Errors
    /// Connection or enumeration errors from the catalog queries.
    async fn load_database(&mut self) -> Result<Database>;

    fn script_engine<'a>(&'a mut self, database: &'a Database) -> Self::Engine<'a>;

    /// Closes the session.
    ///
    /// # Errors
    /// Returns a connection error if the close was not acknowledged.
    async fn disconnect(self) -> Result<()>;
}

#[async_trait]
impl ScriptSource for SqlServerConnection {
    type Engine<'a>
        = SqlServerScriptEngine<'a>
    where
        Self: 'a;

    async fn load_database(&mut self) -> Result<Database> {
        SqlServerConnection::load_database(self).await
    }

    fn script_engine<'a>(&'a mut self, database: &'a Database) -> SqlServerScriptEngine<'a> {
        SqlServerScriptEngine::new(self, database)
    }

    async fn disconnect(self) -> Result<()> {
        SqlServerConnection::disconnect(self).await
    }
}

/// Runs the whole generation for parsed arguments.
///
/// The output location is validated before connecting.
///
/// # Errors
/// Any stage failure, mapped to its [`GenerateScriptError`] kind.
pub async fn run(cli: Cli) -> Result<RunSummary> {
    let connection_string = Zeroizing::new(cli.connection_string);
    info!("Target: {}", redact_connection_string(&connection_string));
    info!("Output: {}", cli.output.display());

    let writer = ScriptWriter::prepare(&cli.output)?;
    let connection = SqlServerConnection::connect(&connection_string).await?;
    run_session(connection, writer).await
}

/// Scripts the session's database into `writer`, then closes the session.
///
/// The session is closed whatever the outcome; a failed close is only
/// logged and never replaces the generation result.
///
/// # Errors
/// The first failure of catalog loading, scripting or writing.
pub async fn run_session<S: ScriptSource>(
    mut source: S,
    writer: ScriptWriter,
) -> Result<RunSummary> {
    let result = generate_from(&mut source, writer).await;

    if let Err(e) = source.disconnect().await {
        warn!("{}", error_report(&e));
    }
    result
}

async fn generate_from<S: ScriptSource>(
    source: &mut S,
    writer: ScriptWriter,
) -> Result<RunSummary> {
    let database = source.load_database().await?;
    info!("Scripting database {}", database.name);

    let engine = source.script_engine(&database);
    let (script, enumeration) = generate_script(
        Some(&database),
        engine,
        ScriptOptions::deployment(),
        &ExclusionRules::default(),
    )
    .await?;

    info!("Writing script to disk");
    let output = writer.commit(&script)?;

    Ok(RunSummary {
        output,
        tables: enumeration.table_count,
        indexes: enumeration.index_count,
        foreign_keys: enumeration.foreign_key_count,
        skipped: enumeration.skipped.len(),
        statements: script.statement_count(),
        excluded: script.excluded_count(),
    })
}

/// Error message followed by its chain of causes.
pub fn error_report(error: &GenerateScriptError) -> String {
    let mut report = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        report.push_str(": ");
        report.push_str(&cause.to_string());
        source = cause.source();
    }
    report
}
