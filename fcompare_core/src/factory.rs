use crate::array_diff::{ArrayBackend, ArrayComparator};
use crate::binary_diff::BinaryComparator;
use crate::comparator::FileComparator;
use crate::json_diff::{is_json_file, JsonComparator};
use crate::text_diff::TextComparator;
use fcompare_common::{CompareError, ComparatorConfig, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Format names accepted by [`ComparatorFactory::create_comparator`]
pub const SUPPORTED_FORMATS: &[&str] = &["binary", "text", "json", "h5"];

/// Builds comparators by format name.
///
/// Array containers need a registered [`ArrayBackend`]; without one, asking
/// for `h5` is a configuration error.
#[derive(Clone, Default)]
pub struct ComparatorFactory {
    array_backend: Option<Arc<dyn ArrayBackend>>,
}

impl ComparatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_array_backend(mut self, backend: Arc<dyn ArrayBackend>) -> Self {
        self.array_backend = Some(backend);
        self
    }

    pub fn has_array_backend(&self) -> bool {
        self.array_backend.is_some()
    }

    pub fn create_comparator(
        &self,
        format: &str,
        config: &ComparatorConfig,
    ) -> Result<Box<dyn FileComparator>> {
        let format = format.trim().to_lowercase();
        debug!("Creating comparator for format '{}'", format);

        match format.as_str() {
            "binary" => Ok(Box::new(BinaryComparator::new(config)?)),
            "text" => Ok(Box::new(TextComparator::new(config)?)),
            "json" => Ok(Box::new(JsonComparator::new(config)?)),
            "h5" | "hdf5" => {
                let backend = self.array_backend.clone().ok_or_else(|| {
                    CompareError::Config("No array backend registered for format 'h5'".to_string())
                })?;
                Ok(Box::new(ArrayComparator::new(config, backend)?))
            }
            other => Err(CompareError::Config(format!(
                "Unknown comparator format '{}' (supported: {})",
                other,
                SUPPORTED_FORMATS.join(", ")
            ))),
        }
    }

    /// Like [`create_comparator`](Self::create_comparator), taking loose
    /// options such as `{"key_field": "id", "compare_mode": "key-based"}`
    pub fn create_comparator_from_options(
        &self,
        format: &str,
        options: serde_json::Value,
    ) -> Result<Box<dyn FileComparator>> {
        let config = ComparatorConfig::from_options(options)?;
        self.create_comparator(format, &config)
    }
}

impl fmt::Debug for ComparatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparatorFactory")
            .field("array_backend", &self.has_array_backend())
            .finish()
    }
}

/// Create a comparator without an array backend
pub fn create_comparator(format: &str, config: &ComparatorConfig) -> Result<Box<dyn FileComparator>> {
    ComparatorFactory::new().create_comparator(format, config)
}

pub fn create_comparator_from_options(
    format: &str,
    options: serde_json::Value,
) -> Result<Box<dyn FileComparator>> {
    ComparatorFactory::new().create_comparator_from_options(format, options)
}

/// Guess the comparator format from a file extension
pub fn format_for_path(path: &Path) -> Option<&'static str> {
    if is_json_file(path) {
        return Some("json");
    }

    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "h5" | "hdf5" | "he5" => Some("h5"),
        "txt" | "log" | "csv" | "tsv" | "md" | "ini" | "cfg" | "xml" | "yaml" | "yml" | "toml"
        | "out" | "dat" => Some("text"),
        "bin" | "exe" | "so" | "dll" | "o" => Some("binary"),
        _ => None,
    }
}
