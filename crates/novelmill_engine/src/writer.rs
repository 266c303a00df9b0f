use thiserror::Error;

use crate::archive::{escape_xml, ArchiveError, ChapterRecord, EpubArchive};
use crate::chapter_id::ChapterId;
use crate::filename::chapter_filename;
use crate::persist::{write_atomic, PersistError};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to persist chapter document: {0}")]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Build the chapter content document: a minimal XHTML page with an `<h2>`
/// heading for the title and one `<p>` block per body fragment. Fragments
/// are opaque markup and pass through untouched.
pub fn build_chapter_document(title: &str, fragments: &[String]) -> String {
    let mut doc = String::new();
    doc.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
"#,
    );
    doc.push_str(&format!("  <title>{}</title>\n", escape_xml(title)));
    doc.push_str(
        "  <link rel=\"stylesheet\" type=\"text/css\" href=\"../Style/stylesheet.css\"/>\n",
    );
    doc.push_str("</head>\n<body>\n");
    doc.push_str(&format!("  <h2>{}</h2>\n", escape_xml(title)));
    for fragment in fragments {
        doc.push_str(&format!("  <p>{fragment}</p>\n"));
    }
    doc.push_str("</body>\n</html>\n");
    doc
}

/// Write one chapter into the archive: build the document, persist it under
/// the content directory, then register it with the archive state.
///
/// The write happens strictly before registration, so a file on disk may
/// briefly lack a manifest entry but a manifest entry always references a
/// file that exists. On any error the archive state is unchanged.
pub fn write_chapter(
    archive: &mut EpubArchive,
    title: &str,
    fragments: &[String],
) -> Result<ChapterRecord, WriteError> {
    let id = ChapterId::derive(title);
    let filename = chapter_filename(id, title);
    let href = format!("Content/{filename}");

    let document = build_chapter_document(title, fragments);
    write_atomic(&archive.root().join("OEBPS").join(&href), &document)?;

    let record = archive.register_chapter(title, &href)?;
    Ok(record)
}
