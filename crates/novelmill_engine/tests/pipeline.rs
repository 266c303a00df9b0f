use std::fs;
use std::io::Read;

use chrono::{TimeZone, Utc};
use novelmill_engine::{
    package_epub, run_chain, write_run_report, ChapterSink, DownloadPlan, EpubArchive, FailureKind,
    FetchSettings, FlatTextSink, NovelfullExtractor, PipelineError, ReqwestFetcher, StopReason,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn novelfull_page(title: &str, next_href: Option<&str>, paragraphs: &[&str]) -> String {
    let next_link = next_href
        .map(|href| format!(r#"<a id="next_chap" href="{href}">Next</a>"#))
        .unwrap_or_default();
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{p}</p>"))
        .collect();
    format!(
        r##"<html><body><div class="col-xs-12"><h2><a href="#">{title}</a></h2><div id="chapter-content">{body}</div>{next_link}</div></body></html>"##
    )
}

async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

/// Three linked chapters, then a page that 404s: the archive must hold
/// exactly three entries and still package.
#[tokio::test]
async fn fetch_failure_leaves_a_packageable_archive() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/ch1",
        novelfull_page("Chapter 1", Some("/ch2"), &["One."]),
    )
    .await;
    mount_page(
        &server,
        "/ch2",
        novelfull_page("Chapter 2", Some("/ch3"), &["Two."]),
    )
    .await;
    mount_page(
        &server,
        "/ch3",
        novelfull_page("Chapter 3", Some("/ch4"), &["Three."]),
    )
    .await;
    // /ch4 is not mounted; wiremock answers 404.

    let temp = TempDir::new().unwrap();
    let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut archive =
        EpubArchive::create_with_modified(temp.path().join("book"), "My Novel", modified).unwrap();

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let extractor = NovelfullExtractor;
    let plan = DownloadPlan {
        start_url: format!("{}/ch1", server.uri()),
        max_chapters: None,
        fetch_delay: None,
        fetcher: &fetcher,
        extractor: &extractor,
    };

    let summary = run_chain(plan, &mut ChapterSink::Epub(&mut archive))
        .await
        .unwrap();

    match &summary.stop {
        StopReason::FetchFailed(err) => assert_eq!(err.kind, FailureKind::HttpStatus(404)),
        other => panic!("unexpected stop reason: {other:?}"),
    }
    // The failed fetch was the fourth chapter; the warn line reports that
    // ordinal, which the loop had set before fetching.
    assert_eq!(mill_logging::get_chapter_ordinal(), 4);
    assert_eq!(summary.chapters.len(), 3);
    let ids: Vec<&str> = summary.chapters.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["1-1", "2-2", "3-3"]);

    assert_eq!(archive.chapter_count(), 3);
    assert_eq!(archive.manifest().len(), 2 + 3);
    assert_eq!(archive.nav().len(), 3);
    archive.finalize().unwrap();

    // Still packageable: mimetype first and stored, content present.
    let epub = temp.path().join("book.epub");
    package_epub(archive.root(), &epub).unwrap();
    let mut zip = zip::ZipArchive::new(fs::File::open(&epub).unwrap()).unwrap();
    {
        let mut first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        let mut mimetype = String::new();
        first.read_to_string(&mut mimetype).unwrap();
        assert_eq!(mimetype, "application/epub+zip");
    }
    let mut opf = String::new();
    zip.by_name("OEBPS/content.opf")
        .unwrap()
        .read_to_string(&mut opf)
        .unwrap();
    assert!(opf.contains("<itemref idref=\"3-3\"/>"));
    assert!(zip.by_name("META-INF/container.xml").is_ok());

    // The run report mirrors the summary.
    let report_path = write_run_report(temp.path(), &summary).unwrap();
    let report = fs::read_to_string(report_path).unwrap();
    assert!(report.contains("\"chapter_count\":3"));
    assert!(report.contains("fetch-failed"));
}

#[tokio::test]
async fn chain_ends_when_no_next_link_remains() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/ch1",
        novelfull_page("Chapter 1", Some("/ch2"), &["One."]),
    )
    .await;
    mount_page(&server, "/ch2", novelfull_page("Chapter 2", None, &["Two."])).await;

    let temp = TempDir::new().unwrap();
    let sink = FlatTextSink::new(temp.path().join("novel.txt"));
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let extractor = NovelfullExtractor;
    let plan = DownloadPlan {
        start_url: format!("{}/ch1", server.uri()),
        max_chapters: None,
        fetch_delay: None,
        fetcher: &fetcher,
        extractor: &extractor,
    };

    let summary = run_chain(plan, &mut ChapterSink::FlatText(&sink))
        .await
        .unwrap();

    assert_eq!(summary.stop, StopReason::EndOfChain);
    assert_eq!(summary.chapters.len(), 2);
    assert_eq!(summary.chapters[0].href, None);

    let text = fs::read_to_string(sink.path()).unwrap();
    assert_eq!(text, "Chapter 1\n\nOne.\n\n\n\n\nChapter 2\n\nTwo.\n\n\n\n\n");
}

#[tokio::test]
async fn chapter_cap_stops_the_chain_early() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/ch1",
        novelfull_page("Chapter 1", Some("/ch2"), &["One."]),
    )
    .await;
    mount_page(&server, "/ch2", novelfull_page("Chapter 2", None, &["Two."])).await;

    let temp = TempDir::new().unwrap();
    let sink = FlatTextSink::new(temp.path().join("novel.txt"));
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let extractor = NovelfullExtractor;
    let plan = DownloadPlan {
        start_url: format!("{}/ch1", server.uri()),
        max_chapters: Some(1),
        fetch_delay: None,
        fetcher: &fetcher,
        extractor: &extractor,
    };

    let summary = run_chain(plan, &mut ChapterSink::FlatText(&sink))
        .await
        .unwrap();

    assert_eq!(summary.stop, StopReason::ChapterLimit);
    assert_eq!(summary.chapters.len(), 1);
}

/// A configured delay sleeps between fetches, not before the first one.
#[tokio::test]
async fn fetch_delay_paces_the_chain() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/ch1",
        novelfull_page("Chapter 1", Some("/ch2"), &["One."]),
    )
    .await;
    mount_page(&server, "/ch2", novelfull_page("Chapter 2", None, &["Two."])).await;

    let temp = TempDir::new().unwrap();
    let sink = FlatTextSink::new(temp.path().join("novel.txt"));
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let extractor = NovelfullExtractor;
    let delay = std::time::Duration::from_millis(200);
    let plan = DownloadPlan {
        start_url: format!("{}/ch1", server.uri()),
        max_chapters: None,
        fetch_delay: Some(delay),
        fetcher: &fetcher,
        extractor: &extractor,
    };

    let start = std::time::Instant::now();
    let summary = run_chain(plan, &mut ChapterSink::FlatText(&sink))
        .await
        .unwrap();

    assert_eq!(summary.chapters.len(), 2);
    // One inter-chapter gap for two chapters.
    assert!(start.elapsed() >= delay);
}

/// Two chapters whose titles carry the same numbers: the second registration
/// must fail the run rather than silently shadow the first.
#[tokio::test]
async fn duplicate_chapter_id_mid_chain_is_an_error() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/ch1",
        novelfull_page("Chapter 83", Some("/ch2"), &["One."]),
    )
    .await;
    mount_page(
        &server,
        "/ch2",
        novelfull_page("Chapter 083", None, &["Two."]),
    )
    .await;

    let temp = TempDir::new().unwrap();
    let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut archive =
        EpubArchive::create_with_modified(temp.path().join("book"), "My Novel", modified).unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let extractor = NovelfullExtractor;
    let plan = DownloadPlan {
        start_url: format!("{}/ch1", server.uri()),
        max_chapters: None,
        fetch_delay: None,
        fetcher: &fetcher,
        extractor: &extractor,
    };

    let err = run_chain(plan, &mut ChapterSink::Epub(&mut archive))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Write(_)));

    // The first chapter survives; the archive is still consistent.
    assert_eq!(archive.chapter_count(), 1);
    archive.finalize().unwrap();
}
