//! State remembered between runs, kept apart from user-edited config.
//!
//! ```toml
//! [rewrite]
//! last_prompt = "add error handling"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use eca_utils::{AtomicWriteOptions, atomic_write, recover_bak_file};

const REWRITE_TABLE: &str = "rewrite";
const LAST_PROMPT_KEY: &str = "last_prompt";

#[must_use]
pub fn state_path() -> Option<PathBuf> {
    crate::eca_home().map(|home| home.join("state.toml"))
}

/// The prompt entered for the previous rewrite, if any.
#[must_use]
pub fn load_last_prompt() -> Option<String> {
    read_last_prompt(&state_path()?)
}

/// Remember `prompt` as the default for the next rewrite.
pub fn persist_last_prompt(prompt: &str) -> io::Result<()> {
    let path = state_path().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Could not determine state path")
    })?;
    write_last_prompt(&path, prompt)
}

pub(crate) fn read_last_prompt(path: &Path) -> Option<String> {
    recover_bak_file(path);
    let content = fs::read_to_string(path).ok()?;
    let doc = match content.parse::<toml_edit::DocumentMut>() {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(path = %path.display(), "Ignoring unreadable state file: {err}");
            return None;
        }
    };
    doc.get(REWRITE_TABLE)?
        .get(LAST_PROMPT_KEY)?
        .as_str()
        .filter(|prompt| !prompt.is_empty())
        .map(str::to_owned)
}

/// Uses `toml_edit` so anything else in the file survives untouched.
pub(crate) fn write_last_prompt(path: &Path, prompt: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if !doc
        .get(REWRITE_TABLE)
        .is_some_and(toml_edit::Item::is_table_like)
    {
        if doc.contains_key(REWRITE_TABLE) {
            tracing::warn!(
                path = %path.display(),
                "Replacing non-table `{REWRITE_TABLE}` entry in state file"
            );
        }
        doc[REWRITE_TABLE] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[REWRITE_TABLE][LAST_PROMPT_KEY] = toml_edit::value(prompt);

    atomic_write(path, doc.to_string().as_bytes(), AtomicWriteOptions::default())
}
