//! The editor side of the engine: where edits land and commands run.

use std::sync::Arc;

use tower_lsp::lsp_types::{Range, TextEdit, Url};

use crate::compile::snippet::render_plain;
use crate::document::TextDocument;
use crate::error::Result;
use crate::rules::SideEffectCommand;

#[async_trait::async_trait]
pub trait EditorHost: Send + Sync {
    /// Current snapshot of an open document.
    fn document(&self, uri: &Url) -> Option<Arc<dyn TextDocument>>;

    async fn apply_edits(&self, uri: &Url, edits: Vec<TextEdit>) -> Result<()>;

    /// Insert snippet-syntax text over `range` together with `additional` edits.
    ///
    /// Hosts without a snippet engine keep this default, which inserts the
    /// text every field would show by default.
    async fn insert_snippet(
        &self,
        uri: &Url,
        range: Range,
        snippet: &str,
        additional: Vec<TextEdit>,
    ) -> Result<()> {
        let mut edits = vec![TextEdit {
            range,
            new_text: render_plain(snippet),
        }];
        edits.extend(additional);
        self.apply_edits(uri, edits).await
    }

    async fn execute_command(&self, command: &SideEffectCommand) -> Result<()>;

    /// Non-blocking, user-visible warning.
    fn show_warning(&self, message: &str);
}
