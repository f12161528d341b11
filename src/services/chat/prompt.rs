use std::path::PathBuf;

use serde_json::Value;

use crate::error::AppError;

/// 指示文書の区切り
const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

const CATALOG_HEADING: &str = "## Available Blocks in Organization";

const DEFAULT_INSTRUCTIONS: &str = "\
# Connect+ Copilot

You are Connect+ Copilot, an assistant for building and inspecting data pipelines \
(dataflows) in Connect+.

- Only help with Connect+ topics: blocks, block configuration, and dataflows.
- Use the provided functions to look up blocks, read block metadata, and create or \
inspect dataflows. Never invent block ids or dataflow ids.
- A dataflow is a linear pipeline: a source block, optional transformation blocks, \
and a destination block.
- Before creating a dataflow, confirm the name and the ordered list of blocks with \
the user.
- When a function returns an error, explain it plainly and suggest what the user can do.";

/// システムプロンプトの元になる指示テキスト（起動時に一度だけ読み込む）
#[derive(Debug, Clone)]
pub struct Instructions {
    text: String,
}

impl Instructions {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Reads and joins the given documents; the built-in text is used when none are given.
    pub fn load(paths: &[PathBuf]) -> Result<Self, AppError> {
        if paths.is_empty() {
            return Ok(Self::default());
        }

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let text = std::fs::read_to_string(path).map_err(|e| {
                AppError::Internal(format!(
                    "Failed to load instructions from {}: {e}",
                    path.display()
                ))
            })?;
            documents.push(text);
        }
        tracing::info!(documents = documents.len(), "instructions loaded");
        Ok(Self::new(documents.join(DOCUMENT_SEPARATOR)))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 指示テキスト + (あれば) 組織のブロック一覧
    pub fn system_prompt(&self, catalog: Option<&Value>) -> String {
        match catalog {
            Some(catalog) => {
                let pretty = serde_json::to_string_pretty(catalog)
                    .unwrap_or_else(|_| catalog.to_string());
                format!("{}{DOCUMENT_SEPARATOR}{CATALOG_HEADING}\n\n{pretty}", self.text)
            }
            None => self.text.clone(),
        }
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTIONS)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn catalog_is_appended_as_pretty_json() {
        let instructions = Instructions::new("Be helpful.");
        let prompt = instructions.system_prompt(Some(&json!([{ "id": 71 }])));
        assert_eq!(
            prompt,
            "Be helpful.\n\n---\n\n## Available Blocks in Organization\n\n[\n  {\n    \"id\": 71\n  }\n]"
        );
    }

    #[test]
    fn prompt_without_catalog_is_the_bare_text() {
        let instructions = Instructions::new("Be helpful.");
        assert_eq!(instructions.system_prompt(None), "Be helpful.");
    }

    #[test]
    fn documents_are_joined_in_order() {
        let dir = std::env::temp_dir().join(format!("copilot-instructions-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("copilot.md");
        let second = dir.join("dataflow.md");
        std::fs::File::create(&first).unwrap().write_all(b"# Copilot").unwrap();
        std::fs::File::create(&second).unwrap().write_all(b"# Dataflows").unwrap();

        let instructions = Instructions::load(&[first, second]).unwrap();
        assert_eq!(instructions.text(), "# Copilot\n\n---\n\n# Dataflows");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_document_is_a_startup_error() {
        let err = Instructions::load(&[PathBuf::from("/nonexistent/copilot.md")]).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn no_paths_falls_back_to_builtin_text() {
        let instructions = Instructions::load(&[]).unwrap();
        assert!(instructions.text().contains("Connect+"));
    }
}
