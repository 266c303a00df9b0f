use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::chapter_id::ChapterId;
use crate::persist::{ensure_dir, write_atomic, PersistError};

/// Media type written for every chapter content document.
pub const CHAPTER_MEDIA_TYPE: &str = "application/xhtml+xml";

const NAV_ID: &str = "nav";
const NAV_HREF: &str = "nav.xhtml";
const COVER_ID: &str = "cover-image";
const STYLESHEET_ID: &str = "stylesheet";
const STYLESHEET_HREF: &str = "Style/stylesheet.css";

const MIMETYPE: &str = "application/epub+zip";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLESHEET_CSS: &str = "body { margin: 5%; text-align: justify; }\n\
h2 { text-align: center; }\n\
p { text-indent: 1.25em; margin: 0; }\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub href: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub idref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub label: String,
    pub href: String,
}

/// What a successful registration hands back, for logging and the run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    pub id: String,
    pub href: String,
}

/// The rendered package and navigation documents, as written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPackage {
    pub package_doc: String,
    pub nav_doc: String,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("duplicate chapter id {id} derived from title {title:?}")]
    DuplicateChapterId { id: String, title: String },
    #[error("duplicate content path {href}")]
    DuplicateHref { href: String },
    #[error("a cover image is already registered")]
    CoverAlreadyRegistered,
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// The authoritative in-memory record of the EPUB package being built.
///
/// Creation lays down the directory skeleton and the static files; each
/// successfully extracted chapter appends exactly one manifest entry, one
/// spine entry, and one navigation entry; `finalize` renders the package and
/// navigation documents. Entries are never removed or reordered, so the
/// spine order is always the order the chapter chain was walked.
pub struct EpubArchive {
    root: PathBuf,
    title: String,
    author: Option<String>,
    modified: DateTime<Utc>,
    manifest: Vec<ManifestEntry>,
    spine: Vec<SpineEntry>,
    nav: Vec<NavEntry>,
}

impl EpubArchive {
    /// Create the package skeleton under `root` and the initial state, with
    /// the modification timestamp taken now.
    pub fn create(root: impl Into<PathBuf>, title: impl Into<String>) -> Result<Self, ArchiveError> {
        Self::create_with_modified(root, title, Utc::now())
    }

    /// Like [`EpubArchive::create`] with an explicit modification timestamp.
    /// The timestamp is fixed at construction so `finalize` output is
    /// byte-stable, and injectable here so tests can pin it.
    pub fn create_with_modified(
        root: impl Into<PathBuf>,
        title: impl Into<String>,
        modified: DateTime<Utc>,
    ) -> Result<Self, ArchiveError> {
        let root = root.into();
        for dir in ["META-INF", "OEBPS", "OEBPS/Content", "OEBPS/Style"] {
            ensure_dir(&root.join(dir))?;
        }
        write_atomic(&root.join("mimetype"), MIMETYPE)?;
        write_atomic(&root.join("META-INF/container.xml"), CONTAINER_XML)?;
        write_atomic(&root.join("OEBPS").join(STYLESHEET_HREF), STYLESHEET_CSS)?;

        let manifest = vec![
            ManifestEntry {
                id: NAV_ID.to_string(),
                href: NAV_HREF.to_string(),
                media_type: "application/xhtml+xml".to_string(),
            },
            ManifestEntry {
                id: STYLESHEET_ID.to_string(),
                href: STYLESHEET_HREF.to_string(),
                media_type: "text/css".to_string(),
            },
        ];

        Ok(Self {
            root,
            title: title.into(),
            author: None,
            modified,
            manifest,
            spine: Vec::new(),
            nav: Vec::new(),
        })
    }

    /// Record the novel's author for the package metadata (`dc:creator`).
    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = Some(author.into());
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Record a cover image that already sits at `href` (relative to
    /// `OEBPS/`) in the package directory. The manifest gains the cover
    /// item; it never enters the spine or the table of contents.
    pub fn register_cover(&mut self, href: &str, media_type: &str) -> Result<(), ArchiveError> {
        if self.manifest.iter().any(|entry| entry.id == COVER_ID) {
            return Err(ArchiveError::CoverAlreadyRegistered);
        }
        if self.manifest.iter().any(|entry| entry.href == href) {
            return Err(ArchiveError::DuplicateHref {
                href: href.to_string(),
            });
        }
        self.manifest.push(ManifestEntry {
            id: COVER_ID.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
        });
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Directory chapter content documents are written into.
    pub fn content_dir(&self) -> PathBuf {
        self.root.join("OEBPS/Content")
    }

    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    pub fn spine(&self) -> &[SpineEntry] {
        &self.spine
    }

    pub fn nav(&self) -> &[NavEntry] {
        &self.nav
    }

    pub fn chapter_count(&self) -> usize {
        self.spine.len()
    }

    /// Record one chapter: manifest entry (id derived from the title, fixed
    /// chapter media type), spine entry, navigation entry, appended in that
    /// order, all or nothing. `content_path` is relative to `OEBPS/`.
    ///
    /// Identifier collisions are rejected: the numbers in the titles are all
    /// the id is made of, and two titles with the same numbers would
    /// otherwise silently shadow each other in the manifest.
    pub fn register_chapter(
        &mut self,
        title: &str,
        content_path: &str,
    ) -> Result<ChapterRecord, ArchiveError> {
        let id = ChapterId::derive(title).to_string();
        if self.manifest.iter().any(|entry| entry.id == id) {
            return Err(ArchiveError::DuplicateChapterId {
                id,
                title: title.to_string(),
            });
        }
        if self.manifest.iter().any(|entry| entry.href == content_path) {
            return Err(ArchiveError::DuplicateHref {
                href: content_path.to_string(),
            });
        }

        self.manifest.push(ManifestEntry {
            id: id.clone(),
            href: content_path.to_string(),
            media_type: CHAPTER_MEDIA_TYPE.to_string(),
        });
        self.spine.push(SpineEntry { idref: id.clone() });
        self.nav.push(NavEntry {
            label: title.to_string(),
            href: content_path.to_string(),
        });

        Ok(ChapterRecord {
            id,
            href: content_path.to_string(),
        })
    }

    /// Render the package document and the navigation document and write
    /// both to the package directory. Idempotent: with no intervening
    /// `register_chapter`, a second call produces identical bytes.
    pub fn finalize(&self) -> Result<SerializedPackage, ArchiveError> {
        let package_doc = self.render_package_doc();
        let nav_doc = self.render_nav_doc();
        write_atomic(&self.root.join("OEBPS/content.opf"), &package_doc)?;
        write_atomic(&self.root.join("OEBPS").join(NAV_HREF), &nav_doc)?;
        Ok(SerializedPackage {
            package_doc,
            nav_doc,
        })
    }

    fn render_package_doc(&self) -> String {
        let mut opf = String::new();
        opf.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
        );
        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">urn:novelmill:{}</dc:identifier>\n",
            escape_xml(&self.title)
        ));
        opf.push_str(&format!(
            "    <dc:title>{}</dc:title>\n",
            escape_xml(&self.title)
        ));
        if let Some(author) = &self.author {
            opf.push_str(&format!(
                "    <dc:creator>{}</dc:creator>\n",
                escape_xml(author)
            ));
        }
        opf.push_str("    <dc:language>en</dc:language>\n");
        opf.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            self.modified.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        if self.manifest.iter().any(|entry| entry.id == COVER_ID) {
            // Legacy readers find the cover through this meta element.
            opf.push_str(&format!(
                "    <meta name=\"cover\" content=\"{COVER_ID}\"/>\n"
            ));
        }
        opf.push_str("  </metadata>\n  <manifest>\n");

        for entry in &self.manifest {
            // The navigation document and the cover are the two manifest
            // items that carry a properties attribute.
            let properties = if entry.id == NAV_ID {
                " properties=\"nav\""
            } else if entry.id == COVER_ID {
                " properties=\"cover-image\""
            } else {
                ""
            };
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
                escape_xml(&entry.id),
                escape_xml(&entry.href),
                escape_xml(&entry.media_type),
                properties
            ));
        }

        opf.push_str("  </manifest>\n  <spine>\n");
        for entry in &self.spine {
            opf.push_str(&format!(
                "    <itemref idref=\"{}\"/>\n",
                escape_xml(&entry.idref)
            ));
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn render_nav_doc(&self) -> String {
        let mut doc = String::new();
        doc.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
"#,
        );
        doc.push_str(&format!("  <title>{}</title>\n", escape_xml(&self.title)));
        doc.push_str(&format!(
            "  <link rel=\"stylesheet\" type=\"text/css\" href=\"{STYLESHEET_HREF}\"/>\n"
        ));
        doc.push_str("</head>\n<body>\n  <nav epub:type=\"toc\" id=\"toc\">\n");
        doc.push_str(&format!("    <h1>{}</h1>\n", escape_xml(&self.title)));
        doc.push_str("    <ol>\n");
        for entry in &self.nav {
            doc.push_str(&format!(
                "      <li><a href=\"{}\">{}</a></li>\n",
                escape_xml(&entry.href),
                escape_xml(&entry.label)
            ));
        }
        doc.push_str("    </ol>\n  </nav>\n</body>\n</html>\n");
        doc
    }
}

/// Escape text for insertion into XML content or attribute values.
pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
