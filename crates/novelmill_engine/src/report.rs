use std::path::{Path, PathBuf};

use serde_json::json;

use crate::persist::{write_atomic, PersistError};
use crate::pipeline::{RunSummary, StopReason};

/// Write `run_report.json` next to the output: chapter count, stop reason,
/// and one record per downloaded chapter.
pub fn write_run_report(dir: &Path, summary: &RunSummary) -> Result<PathBuf, PersistError> {
    let stop = match &summary.stop {
        StopReason::EndOfChain => "end-of-chain".to_string(),
        StopReason::ChapterLimit => "chapter-limit".to_string(),
        StopReason::FetchFailed(err) => format!("fetch-failed: {err}"),
    };
    let report = json!({
        "chapter_count": summary.chapters.len(),
        "stopped": stop,
        "chapters": summary.chapters.iter().map(|chapter| {
            json!({
                "id": chapter.id,
                "title": chapter.title,
                "href": chapter.href,
                "url": chapter.url,
            })
        }).collect::<Vec<_>>(),
    });

    let path = dir.join("run_report.json");
    write_atomic(&path, &report.to_string())?;
    Ok(path)
}
