use gitit_api::{ChangeStats, PathDiff};

/// Reduce per-path diffs to summary counts.
///
/// Every record counts as one changed file, including added files with no
/// lines and deletions of empty files.
pub fn aggregate<'a, I>(records: I) -> ChangeStats
where
    I: IntoIterator<Item = &'a PathDiff>,
{
    records.into_iter().fold(ChangeStats::ZERO, |total, record| {
        total.add(ChangeStats::new(1, record.insertions(), record.deletions()))
    })
}
