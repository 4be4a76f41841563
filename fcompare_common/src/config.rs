use crate::{CompareError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_NUM_THREADS: usize = 4;
pub const DEFAULT_RTOL: f64 = 1e-5;
pub const DEFAULT_ATOL: f64 = 1e-8;

/// Matching policy of the structured comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompareMode {
    /// Compare value trees position by position
    #[default]
    #[serde(rename = "exact")]
    Exact,
    /// Match records of a top-level array by a key field, ignoring order
    #[serde(rename = "key-based", alias = "key_based")]
    KeyBased,
}

impl FromStr for CompareMode {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(CompareMode::Exact),
            "key-based" | "key_based" => Ok(CompareMode::KeyBased),
            other => Err(CompareError::Config(format!(
                "Unknown compare_mode '{}' (expected 'exact' or 'key-based')",
                other
            ))),
        }
    }
}

/// How the binary comparator computes the longest common subsequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LcsMode {
    /// Rows of the first input are split across workers which each restart the
    /// DP at zero; partial lengths are summed
    #[default]
    Partitioned,
    /// One pass over all rows; the true LCS length
    Exact,
}

impl FromStr for LcsMode {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "partitioned" => Ok(LcsMode::Partitioned),
            "exact" => Ok(LcsMode::Exact),
            other => Err(CompareError::Config(format!("Unknown lcs_mode '{}'", other))),
        }
    }
}

/// Whitespace handling options for text comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhitespaceMode {
    /// Compare whitespace exactly
    #[default]
    Exact,
    /// Ignore all whitespace
    IgnoreAll,
    /// Ignore leading whitespace
    IgnoreLeading,
    /// Ignore trailing whitespace
    IgnoreTrailing,
    /// Ignore changes in amount of whitespace
    IgnoreChanges,
}

impl FromStr for WhitespaceMode {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(WhitespaceMode::Exact),
            "ignore-all" => Ok(WhitespaceMode::IgnoreAll),
            "ignore-leading" => Ok(WhitespaceMode::IgnoreLeading),
            "ignore-trailing" => Ok(WhitespaceMode::IgnoreTrailing),
            "ignore-changes" => Ok(WhitespaceMode::IgnoreChanges),
            other => Err(CompareError::Config(format!("Unknown whitespace mode '{}'", other))),
        }
    }
}

/// Character encodings accepted for text and structured reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// UTF-8 with an optional leading byte order mark
    Utf8Sig,
    Ascii,
    Latin1,
}

impl TextEncoding {
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| CompareError::Format(format!("Invalid UTF-8 content: {}", e))),
            TextEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
                TextEncoding::Utf8.decode(body)
            }
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(pos) => Err(CompareError::Format(format!(
                    "Non-ASCII byte 0x{:02x} at offset {}",
                    bytes[pos], pos
                ))),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(TextEncoding::Utf8Sig),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(CompareError::Config(format!("Unsupported encoding '{}'", other))),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

/// Per-comparator configuration, immutable once a comparator is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComparatorConfig {
    /// Decode charset for text and structured reads
    pub encoding: String,

    /// Streaming granularity in bytes
    pub chunk_size: usize,

    /// Log every recorded difference
    pub verbose: bool,

    /// Compute the LCS similarity score (binary only)
    pub similarity: bool,

    /// Worker threads for similarity scoring
    pub num_threads: usize,

    /// LCS strategy for similarity scoring
    pub lcs_mode: LcsMode,

    /// Structured comparison policy
    pub compare_mode: CompareMode,

    /// Record identifier for key-based mode
    pub key_field: Option<String>,

    /// Case-fold lines before text comparison
    pub ignore_case: bool,

    /// Whitespace handling for text comparison
    pub whitespace: WhitespaceMode,

    /// Relative tolerance for array elements
    pub rtol: f64,

    /// Absolute tolerance for array elements
    pub atol: f64,

    /// Datasets or groups to compare (array formats)
    pub tables: Vec<String>,

    /// Regex selecting datasets to compare (array formats)
    pub table_regex: Option<String>,

    /// Element filter expression, e.g. ">100.0" or "abs>0.001"
    pub data_filter: Option<String>,

    /// Expand selected groups into their leaf datasets
    pub expand_path: bool,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            verbose: false,
            similarity: false,
            num_threads: DEFAULT_NUM_THREADS,
            lcs_mode: LcsMode::default(),
            compare_mode: CompareMode::default(),
            key_field: None,
            ignore_case: false,
            whitespace: WhitespaceMode::default(),
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
            tables: Vec::new(),
            table_regex: None,
            data_filter: None,
            expand_path: true,
        }
    }
}

impl ComparatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from a JSON options object such as
    /// `{"compare_mode": "key-based", "key_field": "id"}`
    pub fn from_options(options: serde_json::Value) -> Result<Self> {
        let config: Self = match options {
            serde_json::Value::Null => Self::default(),
            other => serde_json::from_value(other)
                .map_err(|e| CompareError::Config(format!("Invalid comparator options: {}", e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_similarity(mut self, similarity: bool) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_lcs_mode(mut self, mode: LcsMode) -> Self {
        self.lcs_mode = mode;
        self
    }

    pub fn with_compare_mode(mut self, mode: CompareMode) -> Self {
        self.compare_mode = mode;
        self
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = Some(key_field.into());
        if self.compare_mode == CompareMode::Exact {
            self.compare_mode = CompareMode::KeyBased;
        }
        self
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn with_whitespace(mut self, mode: WhitespaceMode) -> Self {
        self.whitespace = mode;
        self
    }

    pub fn with_tolerance(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_table_regex(mut self, pattern: impl Into<String>) -> Self {
        self.table_regex = Some(pattern.into());
        self
    }

    pub fn with_data_filter(mut self, filter: impl Into<String>) -> Self {
        self.data_filter = Some(filter.into());
        self
    }

    pub fn with_expand_path(mut self, expand_path: bool) -> Self {
        self.expand_path = expand_path;
        self
    }

    pub fn text_encoding(&self) -> Result<TextEncoding> {
        self.encoding.parse()
    }

    /// Reject option combinations that can never produce a valid comparator
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(CompareError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.num_threads == 0 {
            return Err(CompareError::Config("num_threads must be greater than zero".to_string()));
        }
        self.text_encoding()?;
        if self.compare_mode == CompareMode::KeyBased
            && self.key_field.as_deref().map_or(true, str::is_empty)
        {
            return Err(CompareError::Config(
                "key-based compare_mode requires a key_field".to_string(),
            ));
        }
        if !(self.rtol >= 0.0 && self.atol >= 0.0) {
            return Err(CompareError::Config("rtol and atol must be non-negative".to_string()));
        }
        Ok(())
    }
}
