use std::time::Duration;

use mill_logging::{get_chapter_ordinal, mill_info, mill_warn, set_chapter_ordinal};
use thiserror::Error;
use url::Url;

use crate::archive::EpubArchive;
use crate::chapter_id::ChapterId;
use crate::decode::{decode_page, DecodeError};
use crate::extract::{ExtractError, SiteExtractor};
use crate::fetch::Fetcher;
use crate::persist::PersistError;
use crate::text::FlatTextSink;
use crate::types::FetchError;
use crate::writer::{write_chapter, WriteError};

/// Everything the driver loop needs for one run.
pub struct DownloadPlan<'a> {
    pub start_url: String,
    /// Stop after this many chapters; `None` follows the chain to its end.
    pub max_chapters: Option<usize>,
    /// Pause between chapter fetches, to stay polite with the site.
    pub fetch_delay: Option<Duration>,
    pub fetcher: &'a dyn Fetcher,
    pub extractor: &'a dyn SiteExtractor,
}

/// Where extracted chapters go.
pub enum ChapterSink<'a> {
    Epub(&'a mut EpubArchive),
    FlatText(&'a FlatTextSink),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedChapter {
    pub id: String,
    pub title: String,
    /// Package-relative path of the content document; `None` in flat-text mode.
    pub href: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The last page had no next-chapter link.
    EndOfChain,
    /// The requested chapter cap was reached.
    ChapterLimit,
    /// A fetch failed; everything before it is intact.
    FetchFailed(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub chapters: Vec<DownloadedChapter>,
    pub stop: StopReason,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("flat text append failed: {0}")]
    Text(#[from] PersistError),
    #[error("fetched page has unusable final url: {0}")]
    BadPageUrl(String),
}

/// Walk the chapter chain: fetch, decode, extract, write, register, then
/// follow the next-chapter link, strictly one chapter at a time.
///
/// A fetch failure ends the run gracefully: the sink keeps every chapter
/// processed so far and the failure is reported in the summary. Extraction
/// and write failures are errors; skipping a chapter mid-chain would leave a
/// hole nothing downstream could account for.
pub async fn run_chain(
    plan: DownloadPlan<'_>,
    sink: &mut ChapterSink<'_>,
) -> Result<RunSummary, PipelineError> {
    let mut chapters: Vec<DownloadedChapter> = Vec::new();
    let mut next = Some(plan.start_url.clone());

    while let Some(current) = next {
        if let Some(limit) = plan.max_chapters {
            if chapters.len() >= limit {
                return Ok(RunSummary {
                    chapters,
                    stop: StopReason::ChapterLimit,
                });
            }
        }
        if let Some(delay) = plan.fetch_delay {
            if !chapters.is_empty() {
                tokio::time::sleep(delay).await;
            }
        }
        set_chapter_ordinal(chapters.len() as u64 + 1);

        let output = match plan.fetcher.fetch(&current).await {
            Ok(output) => output,
            Err(err) => {
                mill_warn!(
                    "fetch failed for chapter {} at {current}: {err}; stopping chain",
                    get_chapter_ordinal()
                );
                return Ok(RunSummary {
                    chapters,
                    stop: StopReason::FetchFailed(err),
                });
            }
        };

        let decoded = decode_page(&output.bytes, output.metadata.content_type.as_deref())?;
        let page_url = Url::parse(&output.metadata.final_url)
            .map_err(|err| PipelineError::BadPageUrl(err.to_string()))?;
        let page = plan.extractor.extract(&decoded.html, &page_url)?;

        match sink {
            ChapterSink::Epub(archive) => {
                let record = write_chapter(archive, &page.title, &page.fragments)?;
                mill_info!("chapter {} \"{}\" -> {}", record.id, page.title, record.href);
                chapters.push(DownloadedChapter {
                    id: record.id,
                    title: page.title,
                    href: Some(record.href),
                    url: current,
                });
            }
            ChapterSink::FlatText(text_sink) => {
                text_sink.append_chapter(&page.title, &page.fragments)?;
                let id = ChapterId::derive(&page.title).to_string();
                mill_info!("chapter {id} \"{}\" appended", page.title);
                chapters.push(DownloadedChapter {
                    id,
                    title: page.title,
                    href: None,
                    url: current,
                });
            }
        }

        next = page.next_url;
    }

    Ok(RunSummary {
        chapters,
        stop: StopReason::EndOfChain,
    })
}
