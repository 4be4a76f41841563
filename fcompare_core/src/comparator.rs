use fcompare_common::{
    CompareError, CompareRange, ComparisonResult, Difference, Result, MAX_DIFFERENCES,
};
use std::path::Path;
use tracing::{debug, error, info};

/// Outcome of comparing two already-loaded contents
#[derive(Debug, Clone, PartialEq)]
pub struct ContentComparison {
    pub identical: bool,
    pub differences: Vec<Difference>,
}

impl ContentComparison {
    pub fn identical() -> Self {
        Self {
            identical: true,
            differences: Vec::new(),
        }
    }

    pub fn from_differences(differences: Vec<Difference>) -> Self {
        Self {
            identical: differences.is_empty(),
            differences,
        }
    }
}

/// Format-specific comparison capability.
///
/// `read_content` and `compare_files` may touch the filesystem;
/// `compare_content` is pure. Only `compare_files` turns errors into
/// [`ComparisonResult::error`].
pub trait Comparator: Send + Sync {
    type Content;

    /// Format identifier this comparator was built for
    fn format_name(&self) -> &'static str;

    fn read_content(&self, path: &Path, range: &CompareRange) -> Result<Self::Content>;

    fn compare_content(
        &self,
        expected: &Self::Content,
        actual: &Self::Content,
    ) -> Result<ContentComparison>;

    fn compare_files(&self, file1: &Path, file2: &Path, range: &CompareRange) -> ComparisonResult {
        let mut result = ComparisonResult::new(file1, file2, *range);
        info!("Comparing {} files: {} and {}", self.format_name(), file1.display(), file2.display());

        let outcome = self
            .read_content(file1, range)
            .and_then(|left| Ok((left, self.read_content(file2, range)?)))
            .and_then(|(left, right)| self.compare_content(&left, &right));

        match outcome {
            Ok(comparison) => result.set_differences(comparison.identical, comparison.differences),
            Err(e) => record_failure(&mut result, &e),
        }
        result
    }
}

/// Object-safe view of a [`Comparator`], as handed out by the factory
pub trait FileComparator: Send + Sync {
    fn format_name(&self) -> &'static str;

    fn compare_files(&self, file1: &Path, file2: &Path, range: &CompareRange) -> ComparisonResult;
}

impl<C: Comparator> FileComparator for C {
    fn format_name(&self) -> &'static str {
        Comparator::format_name(self)
    }

    fn compare_files(&self, file1: &Path, file2: &Path, range: &CompareRange) -> ComparisonResult {
        Comparator::compare_files(self, file1, file2, range)
    }
}

pub(crate) fn record_failure(result: &mut ComparisonResult, err: &CompareError) {
    error!("Error during comparison: {}", err);
    result.fail(err);
}

/// Collects differences up to [`MAX_DIFFERENCES`]. Recording the last
/// allowed difference also appends the truncation marker and ends the scan.
#[derive(Debug)]
pub struct DifferenceCollector {
    differences: Vec<Difference>,
    limit: usize,
    truncated: bool,
    verbose: bool,
}

impl DifferenceCollector {
    pub fn new(verbose: bool) -> Self {
        Self::with_limit(MAX_DIFFERENCES, verbose)
    }

    pub fn with_limit(limit: usize, verbose: bool) -> Self {
        Self {
            differences: Vec::new(),
            limit,
            truncated: false,
            verbose,
        }
    }

    /// Record a difference. Returns `false` once the cap is reached and the
    /// caller should stop scanning.
    pub fn push(&mut self, difference: Difference) -> bool {
        if self.truncated {
            return false;
        }
        if self.differences.len() < self.limit {
            if self.verbose {
                debug!("{}", difference);
            }
            self.differences.push(difference);
        }
        if self.differences.len() >= self.limit {
            self.differences.push(Difference::truncated());
            self.truncated = true;
            return false;
        }
        true
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.differences.len()
    }

    pub fn finish(self) -> ContentComparison {
        ContentComparison::from_differences(self.differences)
    }
}

/// Space-separated lowercase hex, e.g. `00 01 ff`
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Open `path`, mapping a missing file to [`CompareError::NotFound`]
pub(crate) fn open_file(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| CompareError::from_io(path, e))
}

pub(crate) fn file_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| CompareError::from_io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcompare_common::{DiffType, Position};

    #[test]
    fn test_collector_caps_and_marks() {
        let mut collector = DifferenceCollector::new(false);
        for i in 0..MAX_DIFFERENCES - 1 {
            assert!(collector.push(Difference::content(Position::Line(i), "a", "b")));
        }
        assert!(!collector.is_truncated());

        assert!(!collector.push(Difference::content(Position::Line(99), "a", "b")));
        assert!(collector.is_truncated());
        assert!(!collector.push(Difference::content(Position::Line(100), "a", "b")));

        let comparison = collector.finish();
        assert!(!comparison.identical);
        assert_eq!(comparison.differences.len(), MAX_DIFFERENCES + 1);
        assert_eq!(comparison.differences.last().unwrap().diff_type, DiffType::Truncated);
    }

    #[test]
    fn test_collector_marks_as_soon_as_limit_is_reached() {
        let mut collector = DifferenceCollector::with_limit(2, false);
        assert!(collector.push(Difference::content(Position::Byte(0), "00", "01")));
        assert!(!collector.push(Difference::content(Position::Byte(8), "00", "01")));
        let comparison = collector.finish();
        assert_eq!(comparison.differences.len(), 3);
        assert!(comparison.differences[2].is_truncation_marker());
    }

    #[test]
    fn test_zero_limit_records_only_marker() {
        let mut collector = DifferenceCollector::with_limit(0, false);
        assert!(!collector.push(Difference::content(Position::Byte(0), "00", "01")));
        let comparison = collector.finish();
        assert!(!comparison.identical);
        assert_eq!(comparison.differences.len(), 1);
        assert!(comparison.differences[0].is_truncation_marker());
    }

    #[test]
    fn test_empty_collector_is_identical() {
        assert!(DifferenceCollector::new(false).finish().identical);
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x00, 0x01, 0xff]), "00 01 ff");
        assert_eq!(hex_bytes(&[]), "");
    }
}
