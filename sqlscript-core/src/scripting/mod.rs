//! Scripting engine abstraction.
//!
//! [`ScriptEngine`] is the single seam between orchestration and the code
//! that turns catalog objects into T-SQL. [`Scripter`] pairs an engine with
//! the run's [`ScriptOptions`] and exposes the generated statements as a lazy
//! stream.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{Stream, stream};

use crate::Result;
use crate::models::ObjectId;
use crate::options::ScriptOptions;

pub mod mssql;

/// Turns catalog objects into SQL statements.
///
/// Implementations return the statements for one object, in execution
/// order, one logical statement per element.
#[async_trait]
pub trait ScriptEngine: Send {
    /// Scripts a single object.
    ///
    /// # Errors
    /// Returns a script generation error if the object cannot be found or
    /// cannot be expressed under the given options.
    async fn script_object(
        &mut self,
        object: &ObjectId,
        options: &ScriptOptions,
    ) -> Result<Vec<String>>;

    /// Name of the database being scripted, used for `USE` statements.
    fn database_name(&self) -> &str;
}

/// Engine plus immutable options for one run.
pub struct Scripter<E> {
    engine: E,
    options: ScriptOptions,
}

struct Cursor<'a, E> {
    engine: &'a mut E,
    options: &'a ScriptOptions,
    objects: std::slice::Iter<'a, ObjectId>,
    pending: VecDeque<String>,
}

impl<E: ScriptEngine> Scripter<E> {
    pub fn new(engine: E, options: ScriptOptions) -> Self {
        Self { engine, options }
    }

    /// Streams the statements for `objects` in order.
    ///
    /// The stream is single-pass: each object is scripted when the previous
    /// object's statements have been consumed.
    pub fn enum_script<'a>(
        &'a mut self,
        objects: &'a [ObjectId],
    ) -> impl Stream<Item = Result<String>> + 'a {
        let mut pending = VecDeque::new();
        if self.options.include_database_context {
            pending.push_back(format!(
                "USE {}",
                mssql::quote_identifier(self.engine.database_name())
            ));
        }

        let cursor = Cursor {
            engine: &mut self.engine,
            options: &self.options,
            objects: objects.iter(),
            pending,
        };

        stream::try_unfold(cursor, next_statement)
    }
}

async fn next_statement<'a, E: ScriptEngine>(
    mut cursor: Cursor<'a, E>,
) -> Result<Option<(String, Cursor<'a, E>)>> {
    loop {
        if let Some(statement) = cursor.pending.pop_front() {
            return Ok(Some((statement, cursor)));
        }
        let Some(object) = cursor.objects.next() else {
            return Ok(None);
        };
        let statements = cursor.engine.script_object(object, cursor.options).await?;
        cursor.pending.extend(statements);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::GenerateScriptError;
    use futures::executor::block_on;
    use futures::TryStreamExt;

    /// Engine that records which objects were requested.
    struct RecordingEngine {
        requested: Vec<ObjectId>,
    }

    #[async_trait]
    impl ScriptEngine for RecordingEngine {
        async fn script_object(
            &mut self,
            object: &ObjectId,
            _options: &ScriptOptions,
        ) -> Result<Vec<String>> {
            self.requested.push(object.clone());
            match object {
                ObjectId::Table { name, .. } if name == "Broken" => {
                    Err(GenerateScriptError::script("cannot resolve dependency"))
                }
                ObjectId::Table { name, .. } => Ok(vec![
                    format!("CREATE TABLE [dbo].[{name}]"),
                    format!("INSERT [dbo].[{name}] ([Id]) VALUES (1)"),
                ]),
                _ => Ok(Vec::new()),
            }
        }

        fn database_name(&self) -> &str {
            "shop"
        }
    }

    #[test]
    fn test_enum_script_flattens_in_order() {
        let mut scripter = Scripter::new(
            RecordingEngine { requested: Vec::new() },
            ScriptOptions::deployment(),
        );
        let objects = vec![
            ObjectId::table("dbo", "A"),
            ObjectId::index("dbo", "A", "IX_A"),
            ObjectId::table("dbo", "B"),
        ];

        let statements: Vec<String> =
            block_on(scripter.enum_script(&objects).try_collect()).unwrap();
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE [dbo].[A]",
                "INSERT [dbo].[A] ([Id]) VALUES (1)",
                "CREATE TABLE [dbo].[B]",
                "INSERT [dbo].[B] ([Id]) VALUES (1)",
            ]
        );
    }

    #[test]
    fn test_enum_script_is_lazy() {
        let mut scripter = Scripter::new(
            RecordingEngine { requested: Vec::new() },
            ScriptOptions::deployment(),
        );
        let objects = vec![ObjectId::table("dbo", "A"), ObjectId::table("dbo", "B")];

        block_on(async {
            let statements = scripter.enum_script(&objects);
            futures::pin_mut!(statements);
            let first = statements.try_next().await.unwrap();
            assert_eq!(first.as_deref(), Some("CREATE TABLE [dbo].[A]"));
        });
        assert_eq!(scripter.engine.requested, vec![ObjectId::table("dbo", "A")]);
    }

    #[test]
    fn test_enum_script_stops_at_first_error() {
        let mut scripter = Scripter::new(
            RecordingEngine { requested: Vec::new() },
            ScriptOptions::deployment(),
        );
        let objects = vec![ObjectId::table("dbo", "Broken"), ObjectId::table("dbo", "B")];

        let result: Result<Vec<String>> = block_on(scripter.enum_script(&objects).try_collect());
        assert!(result.is_err());
        assert_eq!(scripter.engine.requested.len(), 1);
    }

    #[test]
    fn test_database_context_statement_comes_first() {
        let mut options = ScriptOptions::deployment();
        options.include_database_context = true;
        let mut scripter = Scripter::new(RecordingEngine { requested: Vec::new() }, options);

        let statements: Vec<String> = block_on(scripter.enum_script(&[]).try_collect()).unwrap();
        assert_eq!(statements, vec!["USE [shop]"]);
    }
}
