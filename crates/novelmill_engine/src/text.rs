use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use scraper::Html;

use crate::persist::{ensure_dir, PersistError};

/// Append-only flat text output: the whole novel goes into one file, one
/// block per chapter.
pub struct FlatTextSink {
    path: PathBuf,
}

impl FlatTextSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one chapter as `{title}\n\n{paragraphs}\n\n\n\n`, one line per
    /// non-empty paragraph. Fragments are markup; tags are stripped here.
    pub fn append_chapter(&self, title: &str, fragments: &[String]) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }

        let mut body = String::new();
        for fragment in fragments {
            let text = fragment_text(fragment);
            if !text.is_empty() {
                body.push_str(&text);
                body.push('\n');
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write!(file, "{title}\n\n{body}\n\n\n\n")?;
        Ok(())
    }
}

fn fragment_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    doc.root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}
