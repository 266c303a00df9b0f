//! Novelmill engine: chapter-chain download pipeline and EPUB assembly.
mod archive;
mod chapter_id;
mod decode;
mod extract;
mod fetch;
mod filename;
mod package;
mod persist;
mod pipeline;
mod report;
mod text;
mod types;
mod writer;

pub use archive::{
    ArchiveError, ChapterRecord, EpubArchive, ManifestEntry, NavEntry, SerializedPackage,
    SpineEntry, CHAPTER_MEDIA_TYPE,
};
pub use chapter_id::ChapterId;
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use extract::{
    ChapterPage, ExtractError, NovelInfo, NovelfullExtractor, ReadwnExtractor, SiteExtractor,
};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use filename::chapter_filename;
pub use package::{package_epub, PackageError};
pub use persist::{ensure_dir, write_atomic, write_atomic_bytes, PersistError};
pub use pipeline::{
    run_chain, ChapterSink, DownloadPlan, DownloadedChapter, PipelineError, RunSummary, StopReason,
};
pub use report::write_run_report;
pub use text::FlatTextSink;
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput};
pub use writer::{build_chapter_document, write_chapter, WriteError};
