use crate::chapter_id::ChapterId;

const MAX_TITLE_CHARS: usize = 80;

/// Deterministic chapter filename: the derived identifier, then the title
/// with every non-alphanumeric character stripped, then `.xhtml`.
///
/// The identifier prefix is what makes the name unique: distinct titles that
/// strip to the same text ("Chapter 5!" and "Chapter: 5") still differ only
/// when their numbers do, and the archive already rejects identifier
/// collisions before a second file could land.
pub fn chapter_filename(id: ChapterId, title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(MAX_TITLE_CHARS)
        .collect();
    if stripped.is_empty() {
        format!("{id}.xhtml")
    } else {
        format!("{id}-{stripped}.xhtml")
    }
}
