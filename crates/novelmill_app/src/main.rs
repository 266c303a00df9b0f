mod logging;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mill_logging::{mill_info, mill_warn};
use novelmill_engine::{
    decode_page, package_epub, run_chain, write_atomic_bytes, write_run_report, ChapterSink,
    DownloadPlan, EpubArchive, FetchSettings, Fetcher, FlatTextSink, NovelfullExtractor,
    ReadwnExtractor, ReqwestFetcher, SiteExtractor, StopReason,
};
use url::Url;

/// Pause between chapter fetches. The sites throttle rapid-fire clients.
const FETCH_DELAY: Duration = Duration::from_secs(1);

enum OutputMode {
    Epub,
    FlatText,
}

fn main() {
    logging::initialize(logging::LogDestination::Both);
    if let Err(err) = run() {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let title = prompt("Novel title")?;
    if title.is_empty() {
        bail!("a novel title is required");
    }
    let start_url = prompt("Initial chapter URL")?;
    println!("1 - Epub");
    println!("2 - txt");
    let mode = match prompt("Option")?.as_str() {
        "1" => OutputMode::Epub,
        "2" => OutputMode::FlatText,
        other => bail!("unknown option {other:?}"),
    };
    let max_chapters = parse_chapter_cap(&prompt("Chapters to download (number or 'all')")?);

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let extractor = extractor_for(&start_url);
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    let summary = match mode {
        OutputMode::Epub => {
            let package_root = PathBuf::from(&title);
            let mut archive = EpubArchive::create(&package_root, title.as_str())
                .context("failed to prepare the package directory")?;
            enrich_archive(&runtime, &fetcher, extractor.as_ref(), &start_url, &mut archive);
            let plan = DownloadPlan {
                start_url,
                max_chapters,
                fetch_delay: Some(FETCH_DELAY),
                fetcher: &fetcher,
                extractor: extractor.as_ref(),
            };
            let summary = runtime
                .block_on(run_chain(plan, &mut ChapterSink::Epub(&mut archive)))
                .context("download failed")?;
            archive
                .finalize()
                .context("failed to finalize the package")?;

            let output = PathBuf::from(format!("{title}.epub"));
            package_epub(&package_root, &output).context("failed to package the epub")?;
            mill_info!("wrote {}", output.display());
            summary
        }
        OutputMode::FlatText => {
            let sink = FlatTextSink::new(format!("{title}.txt"));
            let plan = DownloadPlan {
                start_url,
                max_chapters,
                fetch_delay: Some(FETCH_DELAY),
                fetcher: &fetcher,
                extractor: extractor.as_ref(),
            };
            let summary = runtime
                .block_on(run_chain(plan, &mut ChapterSink::FlatText(&sink)))
                .context("download failed")?;
            mill_info!("wrote {}", sink.path().display());
            summary
        }
    };

    if summary.chapters.is_empty() {
        mill_warn!("no chapters were downloaded");
    } else {
        mill_info!("downloaded {} chapters", summary.chapters.len());
    }
    if let StopReason::FetchFailed(err) = &summary.stop {
        // Already logged by the driver loop; the output up to the failure
        // is complete, so this is still a normal exit.
        mill_warn!("chain ended early: {err}");
    }

    let report_path = write_run_report(Path::new("."), &summary)
        .context("failed to write the run report")?;
    mill_info!("run report at {}", report_path.display());
    Ok(())
}

/// Best-effort package enrichment: follow the first chapter page's link to
/// the novel's main page and pull the author and cover image from there.
/// Anything that fails along the way is logged and leaves the package
/// un-enriched; the chapter chain does not depend on it.
fn enrich_archive(
    runtime: &tokio::runtime::Runtime,
    fetcher: &ReqwestFetcher,
    extractor: &dyn SiteExtractor,
    start_url: &str,
    archive: &mut EpubArchive,
) {
    let (html, page_url) = match fetch_decoded(runtime, fetcher, start_url) {
        Ok(page) => page,
        Err(err) => {
            mill_warn!("skipping package enrichment: {err:#}");
            return;
        }
    };
    let Some(main_url) = extractor.novel_main_url(&html, &page_url) else {
        return;
    };
    let (html, page_url) = match fetch_decoded(runtime, fetcher, &main_url) {
        Ok(page) => page,
        Err(err) => {
            mill_warn!("skipping package enrichment: {err:#}");
            return;
        }
    };

    let info = extractor.novel_info(&html, &page_url);
    if let Some(author) = info.author {
        mill_info!("author: {author}");
        archive.set_author(author);
    }
    if let Some(cover_url) = info.cover_url {
        if let Err(err) = download_cover(runtime, &cover_url, archive) {
            mill_warn!("skipping cover image: {err:#}");
        }
    }
}

fn fetch_decoded(
    runtime: &tokio::runtime::Runtime,
    fetcher: &ReqwestFetcher,
    url: &str,
) -> Result<(String, Url)> {
    let output = runtime.block_on(fetcher.fetch(url))?;
    let decoded = decode_page(&output.bytes, output.metadata.content_type.as_deref())?;
    let page_url = Url::parse(&output.metadata.final_url)?;
    Ok((decoded.html, page_url))
}

/// Download the cover into `OEBPS/Images/` and register it on the manifest.
/// The file is on disk before the manifest learns about it, like chapters.
fn download_cover(
    runtime: &tokio::runtime::Runtime,
    cover_url: &str,
    archive: &mut EpubArchive,
) -> Result<()> {
    let fetcher = ReqwestFetcher::new(FetchSettings {
        allowed_content_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
        ..FetchSettings::default()
    });
    let output = runtime.block_on(fetcher.fetch(cover_url))?;
    let (ext, media_type) = match output.metadata.content_type.as_deref() {
        Some(ct) if ct.starts_with("image/png") => ("png", "image/png"),
        _ => ("jpg", "image/jpeg"),
    };
    let href = format!("Images/cover.{ext}");
    write_atomic_bytes(&archive.root().join("OEBPS").join(&href), &output.bytes)?;
    archive.register_cover(&href, media_type)?;
    mill_info!("cover image at {href}");
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// "all" or an empty answer follows the chain to its end; anything that does
/// not parse as a positive number gets a warning and does the same.
fn parse_chapter_cap(answer: &str) -> Option<usize> {
    if answer.is_empty() || answer.eq_ignore_ascii_case("all") {
        return None;
    }
    match answer.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            mill_warn!("invalid chapter count {answer:?}, downloading all available chapters");
            None
        }
    }
}

/// Pick the site driver from the starting URL's host. Novelfull is the
/// default; readwn-family hosts get the readwn driver.
fn extractor_for(start_url: &str) -> Box<dyn SiteExtractor> {
    let host = Url::parse(start_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    if host.contains("readwn") || host.contains("wuxia") {
        mill_info!("using the readwn site driver for {host}");
        Box::new(ReadwnExtractor)
    } else {
        mill_info!("using the novelfull site driver for {host}");
        Box::new(NovelfullExtractor)
    }
}
