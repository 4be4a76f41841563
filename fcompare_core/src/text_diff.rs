use crate::comparator::{Comparator, ContentComparison, DifferenceCollector};
use fcompare_common::{
    CompareError, CompareRange, ComparatorConfig, Difference, Position, Result, TextEncoding,
    WhitespaceMode,
};
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::debug;

const MISSING_LINE: &str = "(missing)";

/// Lines selected from a text input, remembering where the window started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextContent {
    pub first_line: usize,
    pub lines: Vec<String>,
}

impl TextContent {
    /// Apply the line and column window of `range` to already-decoded text
    pub fn from_text(text: &str, range: &CompareRange) -> Self {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let line_count = range
            .end_line
            .map_or(usize::MAX, |end| end.checked_sub(range.start_line).map_or(0, |n| n + 1));

        let lines = normalized
            .lines()
            .skip(range.start_line)
            .take(line_count)
            .map(|line| slice_columns(line, range.start_column, range.end_column))
            .collect();

        Self {
            first_line: range.start_line,
            lines,
        }
    }
}

fn slice_columns(line: &str, start: usize, end: Option<usize>) -> String {
    match (start, end) {
        (0, None) => line.to_string(),
        (start, None) => line.chars().skip(start).collect(),
        (start, Some(end)) => line.chars().skip(start).take(end.saturating_sub(start)).collect(),
    }
}

/// Line-oriented comparator with optional line/column windowing
#[derive(Debug, Clone)]
pub struct TextComparator {
    encoding: TextEncoding,
    ignore_case: bool,
    whitespace: WhitespaceMode,
    verbose: bool,
}

impl TextComparator {
    pub fn new(config: &ComparatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encoding: config.text_encoding()?,
            ignore_case: config.ignore_case,
            whitespace: config.whitespace,
            verbose: config.verbose,
        })
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Compare two in-memory texts line by line over their full extent
    pub fn compare_strings(&self, expected: &str, actual: &str) -> ContentComparison {
        let range = CompareRange::full();
        self.diff_lines(
            &TextContent::from_text(expected, &range),
            &TextContent::from_text(actual, &range),
        )
    }

    /// Preprocess a line according to configuration options
    fn normalize<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let mut line = Cow::Borrowed(line);

        if self.ignore_case {
            line = Cow::Owned(line.to_lowercase());
        }

        match self.whitespace {
            WhitespaceMode::Exact => line,
            WhitespaceMode::IgnoreAll => {
                Cow::Owned(line.chars().filter(|c| !c.is_whitespace()).collect())
            }
            WhitespaceMode::IgnoreLeading => Cow::Owned(line.trim_start().to_string()),
            WhitespaceMode::IgnoreTrailing => Cow::Owned(line.trim_end().to_string()),
            WhitespaceMode::IgnoreChanges => {
                Cow::Owned(line.split_whitespace().collect::<Vec<_>>().join(" "))
            }
        }
    }

    fn diff_lines(&self, expected: &TextContent, actual: &TextContent) -> ContentComparison {
        let mut collector = DifferenceCollector::new(self.verbose);
        let line_count = expected.lines.len().max(actual.lines.len());

        for index in 0..line_count {
            let left = expected.lines.get(index);
            let right = actual.lines.get(index);

            let same = match (left, right) {
                (Some(l), Some(r)) => self.normalize(l) == self.normalize(r),
                _ => false,
            };
            if same {
                continue;
            }

            let difference = Difference::content(
                Position::Line(expected.first_line + index),
                left.map_or(MISSING_LINE, String::as_str),
                right.map_or(MISSING_LINE, String::as_str),
            );
            if !collector.push(difference) {
                break;
            }
        }

        collector.finish()
    }
}

impl Default for TextComparator {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            ignore_case: false,
            whitespace: WhitespaceMode::Exact,
            verbose: false,
        }
    }
}

impl Comparator for TextComparator {
    type Content = TextContent;

    fn format_name(&self) -> &'static str {
        "text"
    }

    fn read_content(&self, path: &Path, range: &CompareRange) -> Result<TextContent> {
        debug!("Reading text file: {:?} ({})", path, self.encoding);
        range.check_line_window()?;

        let bytes = fs::read(path).map_err(|e| CompareError::from_io(path, e))?;
        let text = self.encoding.decode(&bytes).map_err(|e| match e {
            CompareError::Format(msg) => {
                CompareError::Format(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        Ok(TextContent::from_text(&text, range))
    }

    fn compare_content(&self, expected: &TextContent, actual: &TextContent) -> Result<ContentComparison> {
        Ok(self.diff_lines(expected, actual))
    }
}
