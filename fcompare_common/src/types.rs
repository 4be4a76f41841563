use crate::{CompareError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Maximum number of differences reported before the truncation marker
pub const MAX_DIFFERENCES: usize = 10;

/// Where a difference was found, in the terms of the compared format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Absolute byte offset (binary)
    Byte(u64),
    /// Zero-based line index (text)
    Line(usize),
    /// JSON path, record key or dataset element (structured / array)
    Path(String),
    /// Whole-file size check
    FileSize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Byte(offset) => write!(f, "byte {}", offset),
            Position::Line(line) => write!(f, "line {}", line),
            Position::Path(path) => f.write_str(path),
            Position::FileSize => f.write_str("file size"),
        }
    }
}

/// Kind of a detected difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Size,
    Content,
    Structure,
    /// Further differences exist but are not reported
    Truncated,
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffType::Size => "size",
            DiffType::Content => "content",
            DiffType::Structure => "structure",
            DiffType::Truncated => "more differences not shown",
        };
        f.write_str(name)
    }
}

/// One detected mismatch between the two inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub position: Option<Position>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub diff_type: DiffType,
}

impl Difference {
    pub fn new(
        position: Position,
        expected: impl Into<String>,
        actual: impl Into<String>,
        diff_type: DiffType,
    ) -> Self {
        Self {
            position: Some(position),
            expected: Some(expected.into()),
            actual: Some(actual.into()),
            diff_type,
        }
    }

    pub fn size(expected: u64, actual: u64) -> Self {
        Self::new(
            Position::FileSize,
            format!("{} bytes", expected),
            format!("{} bytes", actual),
            DiffType::Size,
        )
    }

    pub fn content(position: Position, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(position, expected, actual, DiffType::Content)
    }

    pub fn structure(
        position: Position,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(position, expected, actual, DiffType::Structure)
    }

    /// Terminal marker appended when the difference cap is hit
    pub fn truncated() -> Self {
        Self {
            position: None,
            expected: None,
            actual: None,
            diff_type: DiffType::Truncated,
        }
    }

    pub fn is_truncation_marker(&self) -> bool {
        self.diff_type == DiffType::Truncated
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            None => write!(f, "{}", self.diff_type),
            Some(position) => write!(
                f,
                "{} difference at {}: expected {}, actual {}",
                self.diff_type,
                position,
                self.expected.as_deref().unwrap_or("-"),
                self.actual.as_deref().unwrap_or("-"),
            ),
        }
    }
}

/// Requested window of the inputs.
///
/// Binary comparators read `start_line..end_line` as a half-open byte range and
/// ignore the columns. Text comparators read an inclusive line window and a
/// half-open column window applied to every line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRange {
    pub start_line: usize,
    pub end_line: Option<usize>,
    pub start_column: usize,
    pub end_column: Option<usize>,
}

impl CompareRange {
    /// Whole-file range
    pub fn full() -> Self {
        Self::default()
    }

    pub fn lines(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line: Some(end_line),
            ..Self::default()
        }
    }

    /// Half-open byte range; offsets that do not fit in `usize` are rejected
    pub fn bytes(start: u64, end: Option<u64>) -> Result<Self> {
        let invalid = || CompareError::InvalidRange {
            start,
            end: end.unwrap_or(start),
        };
        let start_line = usize::try_from(start).map_err(|_| invalid())?;
        let end_line = end
            .map(|end| usize::try_from(end).map_err(|_| invalid()))
            .transpose()?;

        Ok(Self {
            start_line,
            end_line,
            ..Self::default()
        })
    }

    pub fn with_columns(mut self, start_column: usize, end_column: Option<usize>) -> Self {
        self.start_column = start_column;
        self.end_column = end_column;
        self
    }

    /// Check a half-open byte range, where `end` must lie strictly after `start`
    pub fn check_byte_range(&self) -> Result<()> {
        match self.end_line {
            Some(end) if end <= self.start_line => Err(CompareError::InvalidRange {
                start: self.start_line as u64,
                end: end as u64,
            }),
            _ => Ok(()),
        }
    }

    /// Check an inclusive line window plus a half-open column window
    pub fn check_line_window(&self) -> Result<()> {
        if let Some(end) = self.end_line {
            if end < self.start_line {
                return Err(CompareError::InvalidRange {
                    start: self.start_line as u64,
                    end: end as u64,
                });
            }
        }
        if let Some(end) = self.end_column {
            if end <= self.start_column {
                return Err(CompareError::InvalidRange {
                    start: self.start_column as u64,
                    end: end as u64,
                });
            }
        }
        Ok(())
    }

    pub fn start_offset(&self) -> u64 {
        self.start_line as u64
    }

    /// Number of bytes of a `file_size`-byte file that fall inside the range
    pub fn clamp_len(&self, file_size: u64) -> u64 {
        let available = file_size.saturating_sub(self.start_offset());
        match self.end_line {
            Some(end) => available.min((end as u64).saturating_sub(self.start_offset())),
            None => available,
        }
    }
}

/// Outcome of one `compare_files` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub file1: PathBuf,
    pub file2: PathBuf,
    pub range: CompareRange,
    pub identical: bool,
    pub differences: Vec<Difference>,
    pub similarity: Option<f64>,
    pub error: Option<String>,
    pub file1_size: Option<u64>,
    pub file2_size: Option<u64>,
}

impl ComparisonResult {
    pub fn new(file1: impl Into<PathBuf>, file2: impl Into<PathBuf>, range: CompareRange) -> Self {
        Self {
            file1: file1.into(),
            file2: file2.into(),
            range,
            identical: false,
            differences: Vec::new(),
            similarity: None,
            error: None,
            file1_size: None,
            file2_size: None,
        }
    }

    /// Record a failed comparison; differences gathered so far are dropped
    pub fn fail(&mut self, error: &CompareError) {
        self.error = Some(error.to_string());
        self.identical = false;
        self.differences.clear();
    }

    pub fn set_differences(&mut self, identical: bool, differences: Vec<Difference>) {
        self.identical = identical && self.error.is_none();
        self.differences = differences;
    }

    pub fn is_truncated(&self) -> bool {
        self.differences
            .last()
            .map_or(false, Difference::is_truncation_marker)
    }
}

/// SHA-256 digest value (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Digest(pub [u8; 32]);

impl Sha256Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
