use std::fmt;

/// Chapter identifier derived from the decimal numbers embedded in a title.
///
/// The title is scanned left to right for maximal runs of ASCII digits:
/// - no runs: volume and chapter are both 0
/// - one run `n` ("Bla bla chapter 80"): volume and chapter are both `n`
/// - two or more runs ("Bla bla Book 1 chapter 73"): volume is the first
///   run, chapter the second, any further runs are ignored
///
/// Identifiers are only as unique as the numbers in the titles: "Chapter 83"
/// and "Chapter 083" derive the same id. The archive treats that as a
/// hard error rather than silently doubling up (see `ArchiveError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChapterId {
    pub volume: u64,
    pub chapter: u64,
}

impl ChapterId {
    /// Derives the identifier from a title. Total: every title, including
    /// the empty one, produces an identifier.
    pub fn derive(title: &str) -> Self {
        let mut first = None;
        let mut second = None;
        let mut current: Option<u64> = None;
        for c in title.chars() {
            if c.is_ascii_digit() {
                let digit = u64::from(c) - u64::from('0');
                let acc = current.unwrap_or(0);
                current = Some(acc.saturating_mul(10).saturating_add(digit));
            } else if let Some(run) = current.take() {
                if first.is_none() {
                    first = Some(run);
                } else if second.is_none() {
                    second = Some(run);
                    break;
                }
            }
        }
        if let Some(run) = current {
            if first.is_none() {
                first = Some(run);
            } else if second.is_none() {
                second = Some(run);
            }
        }

        match (first, second) {
            (None, _) => Self {
                volume: 0,
                chapter: 0,
            },
            (Some(n), None) => Self {
                volume: n,
                chapter: n,
            },
            (Some(volume), Some(chapter)) => Self { volume, chapter },
        }
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.volume, self.chapter)
    }
}
