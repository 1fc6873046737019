//! Script assembly: exclusion filtering and batch separation.

use futures::{Stream, TryStreamExt, pin_mut};
use tracing::{debug, info};

use crate::Result;

/// Line emitted after every statement.
pub const BATCH_SEPARATOR: &str = "GO";

/// What happens to a statement matched by an [`ExclusionRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionAction {
    /// Leave the statement out of the script
    Drop,
}

/// Statement-prefix rule applied to every generated statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRule {
    pub prefix: String,
    pub action: ExclusionAction,
    /// Short description used in the skip message
    pub label: String,
}

impl ExclusionRule {
    pub fn drop_prefix(prefix: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            action: ExclusionAction::Drop,
            label: label.into(),
        }
    }

    pub fn matches(&self, statement: &str) -> bool {
        statement.starts_with(&self.prefix)
    }
}

/// Ordered set of exclusion rules; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRules {
    rules: Vec<ExclusionRule>,
}

impl Default for ExclusionRules {
    /// Drops server-registration rows that must not be replayed on a new
    /// deployment.
    fn default() -> Self {
        Self::none().with_rule(ExclusionRule::drop_prefix(
            "INSERT [dbo].[umbracoServer]",
            "umbracoServer insert",
        ))
    }
}

impl ExclusionRules {
    /// A rule set that keeps every statement.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: ExclusionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    /// First rule matching the statement.
    pub fn matching(&self, statement: &str) -> Option<&ExclusionRule> {
        self.rules.iter().find(|rule| rule.matches(statement))
    }
}

/// Assembled script text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    text: String,
    statements: usize,
    excluded: usize,
}

impl Script {
    /// Appends a statement followed by the batch separator line.
    pub fn push_statement(&mut self, statement: &str) {
        self.text.push_str(statement);
        self.text.push('\n');
        self.text.push_str(BATCH_SEPARATOR);
        self.text.push('\n');
        self.statements = self.statements.saturating_add(1);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of statements written to the script.
    pub fn statement_count(&self) -> usize {
        self.statements
    }

    /// Number of statements dropped by exclusion rules.
    pub fn excluded_count(&self) -> usize {
        self.excluded
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Drains a statement stream into a [`Script`], applying exclusion rules.
///
/// # Errors
/// The first error yielded by the stream aborts assembly; no partial script
/// is returned.
pub async fn assemble_script<S>(statements: S, rules: &ExclusionRules) -> Result<Script>
where
    S: Stream<Item = Result<String>>,
{
    pin_mut!(statements);

    let mut script = Script::default();
    while let Some(statement) = statements.try_next().await? {
        match rules.matching(&statement) {
            Some(rule) => match rule.action {
                ExclusionAction::Drop => {
                    info!("Ignoring {}", rule.label);
                    script.excluded = script.excluded.saturating_add(1);
                }
            },
            None => {
                debug!("Appending statement {}", script.statements.saturating_add(1));
                script.push_statement(&statement);
            }
        }
    }

    Ok(script)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::GenerateScriptError;
    use futures::executor::block_on;
    use futures::stream;
    use proptest::prelude::*;

    fn assemble(statements: Vec<&str>, rules: &ExclusionRules) -> Result<Script> {
        let items: Vec<Result<String>> = statements
            .into_iter()
            .map(|statement| Ok(statement.to_string()))
            .collect();
        block_on(assemble_script(stream::iter(items), rules))
    }

    #[test]
    fn test_statements_are_followed_by_go() {
        let script = assemble(
            vec![
                "CREATE TABLE [dbo].[A]([Id] [int] NOT NULL)",
                "INSERT [dbo].[A] ([Id]) VALUES (1)",
            ],
            &ExclusionRules::default(),
        )
        .unwrap();

        assert_eq!(
            script.as_str(),
            "CREATE TABLE [dbo].[A]([Id] [int] NOT NULL)\nGO\n\
             INSERT [dbo].[A] ([Id]) VALUES (1)\nGO\n"
        );
        assert_eq!(script.statement_count(), 2);
    }

    #[test]
    fn test_umbraco_server_rows_are_dropped() {
        let script = assemble(
            vec![
                "INSERT [dbo].[umbracoServer] ([id], [address]) VALUES (1, N'http://web01')",
                "INSERT [dbo].[umbracoNode] ([id]) VALUES (-1)",
            ],
            &ExclusionRules::default(),
        )
        .unwrap();

        assert!(!script.as_str().contains("umbracoServer"));
        assert!(script.as_str().contains("umbracoNode"));
        assert_eq!(script.excluded_count(), 1);
    }

    #[test]
    fn test_prefix_match_is_anchored() {
        let script = assemble(
            vec!["SET IDENTITY_INSERT [dbo].[umbracoServer] ON"],
            &ExclusionRules::default(),
        )
        .unwrap();
        assert_eq!(script.statement_count(), 1);
    }

    #[test]
    fn test_additional_rules() {
        let rules = ExclusionRules::default()
            .with_rule(ExclusionRule::drop_prefix("INSERT [dbo].[cmsLock]", "cmsLock insert"));
        let script = assemble(vec!["INSERT [dbo].[cmsLock] ([id]) VALUES (1)"], &rules).unwrap();
        assert!(script.is_empty());
        assert_eq!(rules.rules().len(), 2);
    }

    #[test]
    fn test_empty_stream_produces_empty_script() {
        let script = assemble(Vec::new(), &ExclusionRules::default()).unwrap();
        assert!(script.is_empty());
        assert_eq!(script.statement_count(), 0);
    }

    #[test]
    fn test_engine_error_aborts_assembly() {
        let items = vec![
            Ok("CREATE TABLE [dbo].[A]([Id] [int] NULL)".to_string()),
            Err(GenerateScriptError::script("cannot resolve dependency")),
            Ok("CREATE TABLE [dbo].[B]([Id] [int] NULL)".to_string()),
        ];
        let result = block_on(assemble_script(stream::iter(items), &ExclusionRules::default()));
        assert!(matches!(result, Err(GenerateScriptError::ScriptGeneration { .. })));
    }

    proptest! {
        #[test]
        fn prop_every_kept_statement_is_followed_by_go(
            statements in prop::collection::vec(
                prop_oneof![
                    "[A-Za-z0-9 (),\\[\\]]{1,40}",
                    "[A-Za-z0-9 ]{0,20}"
                        .prop_map(|tail| format!("INSERT [dbo].[umbracoServer] {tail}")),
                ],
                0..20,
            )
        ) {
            let refs: Vec<&str> = statements.iter().map(String::as_str).collect();
            let script = assemble(refs, &ExclusionRules::default()).unwrap();

            let kept: Vec<&String> = statements
                .iter()
                .filter(|s| !s.starts_with("INSERT [dbo].[umbracoServer]"))
                .collect();

            let expected: String = kept.iter().map(|s| format!("{s}\nGO\n")).collect();
            prop_assert_eq!(script.as_str(), expected.as_str());
            prop_assert_eq!(script.statement_count(), kept.len());
            prop_assert_eq!(script.excluded_count(), statements.len().saturating_sub(kept.len()));
        }
    }
}
