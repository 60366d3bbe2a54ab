//! Special commands hosts can dispatch by name.
//!
//! | Command | Arguments |
//! |---------|-----------|
//! | `snippets.applyTypingSnippet` | `{ uri, line, character, sequence }` |
//! | `snippets.resolveImports` | `{ uri, range?, imports }` |
//! | `snippets.reloadRules` | settings object, optional |
//! | `snippets.clearCaches` | none |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower_lsp::lsp_types::{Position, Range, Url};
use tracing::info;

use crate::config::Settings;
use crate::engine::SnippetEngine;
use crate::error::{EngineError, Result};
use crate::host::EditorHost;
use crate::rules::{ImportSpec, RuleKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCommand {
    ApplyTypingSnippet,
    ResolveImports,
    ReloadRules,
    ClearCaches,
}

impl SpecialCommand {
    pub const ALL: [SpecialCommand; 4] = [
        SpecialCommand::ApplyTypingSnippet,
        SpecialCommand::ResolveImports,
        SpecialCommand::ReloadRules,
        SpecialCommand::ClearCaches,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpecialCommand::ApplyTypingSnippet => "snippets.applyTypingSnippet",
            SpecialCommand::ResolveImports => "snippets.resolveImports",
            SpecialCommand::ReloadRules => "snippets.reloadRules",
            SpecialCommand::ClearCaches => "snippets.clearCaches",
        }
    }
}

impl fmt::Display for SpecialCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpecialCommand {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        SpecialCommand::ALL
            .into_iter()
            .find(|command| command.name() == s)
            .ok_or_else(|| EngineError::UnknownCommand(s.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyTypingArgs {
    uri: Url,
    line: u32,
    character: u32,
    sequence: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveImportsArgs {
    uri: Url,
    #[serde(default)]
    range: Option<Range>,
    imports: BTreeMap<String, ImportSpec>,
}

fn first_arg<T: DeserializeOwned>(args: &[Value]) -> Result<T> {
    let value = args.first().cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(value)?)
}

impl SnippetEngine {
    /// Run the special command `name`; unknown names fail this invocation only.
    pub async fn execute_special(
        &self,
        host: &dyn EditorHost,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        let command: SpecialCommand = name.parse()?;
        info!("Executing {}", command);
        match command {
            SpecialCommand::ApplyTypingSnippet => {
                let args: ApplyTypingArgs = first_arg(args)?;
                let (id, rule) = self
                    .rules()
                    .find(RuleKind::Sequence, &args.sequence)
                    .ok_or_else(|| EngineError::UnknownSnippet {
                        kind: RuleKind::Sequence.label(),
                        name: args.sequence.clone(),
                    })?;
                let document = host
                    .document(&args.uri)
                    .ok_or_else(|| EngineError::DocumentNotOpen(args.uri.to_string()))?;
                let context = self.context(document, Position::new(args.line, args.character));
                let plan = crate::compile::compile(id, &rule, &context);
                let report = self.accept(host, &args.uri, &plan).await?;
                Ok(json!({ "applied": plan.inserts_text(), "imports": report }))
            }
            SpecialCommand::ResolveImports => {
                let args: ResolveImportsArgs = first_arg(args)?;
                let diagnostics = self.subscribe_diagnostics();
                let range = match args.range {
                    Some(range) => range,
                    None => {
                        let document = host.document(&args.uri);
                        let lines = document.map_or(0, |d| d.line_count() as u32);
                        Range::new(Position::new(0, 0), Position::new(lines, 0))
                    }
                };
                let report = self
                    .resolve_imports(host, &args.uri, range, args.imports, diagnostics)
                    .await;
                Ok(serde_json::to_value(report)?)
            }
            SpecialCommand::ReloadRules => {
                let table = match args.first() {
                    Some(value) if !value.is_null() => {
                        let mut settings = Settings::from_value(value.clone())?;
                        settings.apply_env_overrides();
                        self.reload(settings)
                    }
                    _ => self.rebuild(),
                };
                Ok(json!({
                    "generation": table.generation(),
                    "rules": table.len(),
                    "rejected": table.rejected(),
                }))
            }
            SpecialCommand::ClearCaches => {
                self.clear_caches();
                Ok(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_round_trip() {
        for command in SpecialCommand::ALL {
            assert_eq!(command.name().parse::<SpecialCommand>().unwrap(), command);
        }
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let err = "snippets.explode".parse::<SpecialCommand>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownCommand(name) if name == "snippets.explode"));
    }
}
