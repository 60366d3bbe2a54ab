//! Document-backed snippet variable resolver.

use tower_lsp::lsp_types::Position;

use crate::document::TextDocument;
use crate::matching::locations::is_word_char;

pub struct DocumentVariables<'a> {
    document: &'a dyn TextDocument,
    position: Position,
}

impl<'a> DocumentVariables<'a> {
    pub fn new(document: &'a dyn TextDocument, position: Position) -> Self {
        Self { document, position }
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        let path = self.document.path();
        match name {
            "TM_FILEPATH" => path.map(|p| p.to_string_lossy().to_string()),
            "TM_DIRECTORY" => path.and_then(|p| p.parent().map(|d| d.to_string_lossy().to_string())),
            "TM_FILENAME" => path.and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string())),
            "TM_FILENAME_BASE" => {
                path.and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            }
            "TM_LINE_INDEX" => Some(self.position.line.to_string()),
            "TM_LINE_NUMBER" => Some((self.position.line + 1).to_string()),
            "TM_CURRENT_LINE" => self.document.line(self.position.line as usize),
            "TM_CURRENT_WORD" => {
                let line = self.document.line(self.position.line as usize)?;
                Some(word_at(&line, self.position.character as usize))
            }
            _ => None,
        }
    }
}

fn word_at(line: &str, column: usize) -> String {
    let chars: Vec<char> = line.chars().collect();
    let column = column.min(chars.len());
    let is_word = |c: &char| is_word_char(*c);
    let start = chars[..column].iter().rposition(|c| !is_word(c)).map_or(0, |i| i + 1);
    let end = chars[column..].iter().position(|c| !is_word(c)).map_or(chars.len(), |i| column + i);
    chars[start..end].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RopeDocument;
    use tower_lsp::lsp_types::Url;

    #[test]
    fn test_path_and_line_variables() {
        let doc = RopeDocument::new(
            Url::parse("file:///work/src/button.tsx").unwrap(),
            "typescriptreact",
            1,
            "a\nconst label = 1",
        );
        let vars = DocumentVariables::new(&doc, Position::new(1, 8));
        assert_eq!(vars.resolve("TM_FILENAME").as_deref(), Some("button.tsx"));
        assert_eq!(vars.resolve("TM_FILENAME_BASE").as_deref(), Some("button"));
        assert_eq!(vars.resolve("TM_DIRECTORY").as_deref(), Some("/work/src"));
        assert_eq!(vars.resolve("TM_LINE_NUMBER").as_deref(), Some("2"));
        assert_eq!(vars.resolve("TM_CURRENT_LINE").as_deref(), Some("const label = 1"));
        assert_eq!(vars.resolve("TM_CURRENT_WORD").as_deref(), Some("label"));
        assert_eq!(vars.resolve("CLIPBOARD"), None);
    }

    #[test]
    fn test_untitled_document_has_no_path_variables() {
        let doc = RopeDocument::new(Url::parse("untitled:Untitled-1").unwrap(), "javascript", 1, "");
        let vars = DocumentVariables::new(&doc, Position::new(0, 0));
        assert_eq!(vars.resolve("TM_FILENAME"), None);
        assert_eq!(vars.resolve("TM_LINE_INDEX").as_deref(), Some("0"));
    }

    #[test]
    fn test_current_word_includes_dollar() {
        assert_eq!(word_at("const $el = 1", 8), "$el");
        assert_eq!(word_at("x = café", 6), "caf");
    }
}
