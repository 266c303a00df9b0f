use scraper::{ElementRef, Html, Selector};
use url::Url;

/// One chapter page as seen by the download loop: the chapter title, the
/// resolved URL of the next chapter (if the page links one), and the body as
/// an ordered list of opaque markup fragments. An empty fragment list is a
/// valid chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPage {
    pub title: String,
    pub next_url: Option<String>,
    pub fragments: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("chapter container not found ({selector})")]
    ContainerNotFound { selector: String },
    #[error("chapter title not found ({selector})")]
    TitleNotFound { selector: String },
    #[error("invalid selector: {0}")]
    BadSelector(String),
}

/// Novel-level metadata scraped from the novel's main page. Everything is
/// optional: a page that exposes none of it simply enriches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NovelInfo {
    pub author: Option<String>,
    pub cover_url: Option<String>,
}

/// One implementation per target site: given a fetched page and its URL,
/// return the chapter title, body fragments, and the next-chapter link.
///
/// Sites that link each chapter back to the novel's main page can also
/// surface that link and the metadata found there; the defaults leave the
/// package un-enriched.
pub trait SiteExtractor: Send + Sync {
    fn extract(&self, html: &str, page_url: &Url) -> Result<ChapterPage, ExtractError>;

    /// URL of the novel's main page, if the chapter page links one.
    fn novel_main_url(&self, _html: &str, _page_url: &Url) -> Option<String> {
        None
    }

    /// Author and cover image scraped from the novel's main page.
    fn novel_info(&self, _html: &str, _page_url: &Url) -> NovelInfo {
        NovelInfo::default()
    }
}

fn sel(source: &str) -> Result<Selector, ExtractError> {
    Selector::parse(source).map_err(|_| ExtractError::BadSelector(source.to_string()))
}

/// Resolve a possibly-relative href against the page URL. Placeholder hrefs
/// ("#", empty) mean there is no next chapter.
fn resolve_next(page_url: &Url, href: Option<&str>) -> Option<String> {
    let href = href?.trim();
    if href.is_empty() || href == "#" {
        return None;
    }
    page_url.join(href).ok().map(|u| u.to_string())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Extractor for novelfull-style chapter pages: the chapter lives in
/// `div.col-xs-12`, the title in its `h2 a`, the next link on `a#next_chap`,
/// and the body in `div#chapter-content` as `<p>` elements. Paragraphs whose
/// text is empty are skipped (the site pads chapters with empty `<p>` tags,
/// and ads sit in `<div>` tags, so both fall away here).
#[derive(Debug, Default, Clone, Copy)]
pub struct NovelfullExtractor;

impl SiteExtractor for NovelfullExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> Result<ChapterPage, ExtractError> {
        let doc = Html::parse_document(html);

        let container_sel = sel("div.col-xs-12")?;
        let container = doc.select(&container_sel).next().ok_or_else(|| {
            ExtractError::ContainerNotFound {
                selector: "div.col-xs-12".to_string(),
            }
        })?;

        let title_sel = sel("h2 a")?;
        let title = container
            .select(&title_sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExtractError::TitleNotFound {
                selector: "h2 a".to_string(),
            })?;

        let next_sel = sel("a#next_chap")?;
        let next_url = resolve_next(
            page_url,
            container
                .select(&next_sel)
                .next()
                .and_then(|a| a.value().attr("href")),
        );

        let para_sel = sel("div#chapter-content p")?;
        let fragments = container
            .select(&para_sel)
            .filter(|p| !element_text(*p).is_empty())
            .map(|p| p.inner_html())
            .collect();

        Ok(ChapterPage {
            title,
            next_url,
            fragments,
        })
    }
}

/// Extractor for readwn-style chapter pages: title in `span.chapter`, body
/// paragraphs in `div#article`, next link on `a[title="Read Next chapter"]`.
/// Body text is plain (the site serves paragraphs without inline markup), so
/// fragments are emitted XML-escaped. A missing title falls back to
/// "Untitled"; a missing article div yields an empty chapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadwnExtractor;

impl SiteExtractor for ReadwnExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> Result<ChapterPage, ExtractError> {
        let doc = Html::parse_document(html);

        let title_sel = sel("span.chapter")?;
        let title = doc
            .select(&title_sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let next_sel = sel(r#"a[title="Read Next chapter"]"#)?;
        let next_url = resolve_next(
            page_url,
            doc.select(&next_sel)
                .next()
                .and_then(|a| a.value().attr("href")),
        );

        let para_sel = sel("div#article p")?;
        let fragments = doc
            .select(&para_sel)
            .map(|p| uncensor(&element_text(p)))
            .filter(|t| !t.is_empty())
            .map(|t| escape_text(&t))
            .collect();

        Ok(ChapterPage {
            title,
            next_url,
            fragments,
        })
    }

    /// Chapter pages link the novel's main page from the `h1.tit` heading.
    fn novel_main_url(&self, html: &str, page_url: &Url) -> Option<String> {
        let doc = Html::parse_document(html);
        let link_sel = sel("h1.tit a").ok()?;
        let href = doc.select(&link_sel).next()?.value().attr("href")?;
        page_url.join(href.trim()).ok().map(|u| u.to_string())
    }

    /// The main page carries the author as a link into `/author/` and the
    /// cover inside `div.pic`.
    fn novel_info(&self, html: &str, page_url: &Url) -> NovelInfo {
        let doc = Html::parse_document(html);

        let author = sel(r#"a[href*="/author/"]"#).ok().and_then(|author_sel| {
            doc.select(&author_sel)
                .next()
                .map(element_text)
                .filter(|a| !a.is_empty())
        });

        let cover_url = sel("div.pic img").ok().and_then(|cover_sel| {
            doc.select(&cover_sel)
                .next()
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| page_url.join(src.trim()).ok())
                .map(|u| u.to_string())
        });

        NovelInfo { author, cover_url }
    }
}

/// The site breaks words with dot-separated "a.s.s" sequences to dodge word
/// filters; stitch them back together, case preserved.
fn uncensor(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = find_censor(rest) {
        let bytes = rest.as_bytes();
        out.push_str(&rest[..pos]);
        out.push(bytes[pos] as char);
        out.push(bytes[pos + 2] as char);
        out.push(bytes[pos + 4] as char);
        rest = &rest[pos + 5..];
    }
    out.push_str(rest);
    out
}

fn find_censor(text: &str) -> Option<usize> {
    // Matching bytes are all ASCII, so a hit is always on a char boundary.
    text.as_bytes().windows(5).position(|w| {
        w[0].eq_ignore_ascii_case(&b'a')
            && w[1] == b'.'
            && w[2].eq_ignore_ascii_case(&b's')
            && w[3] == b'.'
            && w[4].eq_ignore_ascii_case(&b's')
    })
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
