//! Prompt Store
//!
//! System prompts live as markdown files under `<dir>/<namespace>/<name>.md`
//! so they can be edited without a rebuild. Reads go to disk on every
//! lookup; prompt files are tiny and rarely hit.

use std::path::PathBuf;

use tracing::debug;

#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Prompt text, or `None` when the file does not exist or is unreadable.
    pub fn get(&self, namespace: &str, name: &str) -> Option<String> {
        let path = self.dir.join(namespace).join(format!("{}.md", name));
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text.trim_end().to_string()),
            Err(e) => {
                debug!("prompt {} not available: {}", path.display(), e);
                None
            }
        }
    }
}
