use crate::comparator::{Comparator, ContentComparison, DifferenceCollector};
use fcompare_common::{
    CompareError, CompareMode, CompareRange, ComparatorConfig, Difference, Position, Result,
    TextEncoding,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const ROOT: &str = "root";
const MISSING: &str = "(missing)";
const MAX_RENDERED_LEN: usize = 120;

/// Comparator for JSON documents.
///
/// Exact mode walks both value trees in parallel. Key-based mode treats both
/// documents as arrays of records and matches them by `key_field`, so record
/// order does not matter.
#[derive(Debug, Clone)]
pub struct JsonComparator {
    encoding: TextEncoding,
    mode: CompareMode,
    key_field: Option<String>,
    verbose: bool,
}

impl JsonComparator {
    pub fn new(config: &ComparatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encoding: config.text_encoding()?,
            mode: config.compare_mode,
            key_field: config.key_field.clone(),
            verbose: config.verbose,
        })
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    /// Compare two JSON values
    pub fn compare_values(&self, left: &JsonValue, right: &JsonValue) -> Result<ContentComparison> {
        let mut collector = DifferenceCollector::new(self.verbose);

        match (self.mode, self.key_field.as_deref()) {
            (CompareMode::KeyBased, Some(key_field)) => {
                self.diff_records(key_field, left, right, &mut collector)?;
            }
            (CompareMode::KeyBased, None) => {
                return Err(CompareError::Config(
                    "key-based compare_mode requires a key_field".to_string(),
                ));
            }
            (CompareMode::Exact, _) => {
                diff_values(ROOT, left, right, &mut collector);
            }
        }

        Ok(collector.finish())
    }

    fn diff_records(
        &self,
        key_field: &str,
        left: &JsonValue,
        right: &JsonValue,
        collector: &mut DifferenceCollector,
    ) -> Result<()> {
        let left_records = as_record_array(left, "first")?;
        let right_records = as_record_array(right, "second")?;

        let Some(left_index) = index_records(left_records, key_field, Side::Expected, collector)? else {
            return Ok(());
        };
        let Some(right_index) = index_records(right_records, key_field, Side::Actual, collector)? else {
            return Ok(());
        };
        debug!(
            "Key-based comparison on '{}': {} vs {} records",
            key_field,
            left_index.len(),
            right_index.len()
        );

        let right_lookup: HashMap<&str, &Map<String, JsonValue>> = right_index
            .iter()
            .map(|(key, record)| (key.as_str(), *record))
            .collect();

        for (key, left_record) in &left_index {
            let path = format!("{}[{}={}]", ROOT, key_field, key);
            let keep_going = match right_lookup.get(key.as_str()) {
                Some(right_record) => diff_fields(&path, left_record, right_record, collector),
                None => collector.push(Difference::structure(
                    Position::Path(path),
                    render_map(left_record),
                    MISSING,
                )),
            };
            if !keep_going {
                return Ok(());
            }
        }

        let left_keys: HashMap<&str, ()> = left_index.iter().map(|(key, _)| (key.as_str(), ())).collect();
        for (key, right_record) in &right_index {
            if left_keys.contains_key(key.as_str()) {
                continue;
            }
            let path = format!("{}[{}={}]", ROOT, key_field, key);
            if !collector.push(Difference::structure(
                Position::Path(path),
                MISSING,
                render_map(right_record),
            )) {
                return Ok(());
            }
        }

        Ok(())
    }
}

impl Default for JsonComparator {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            mode: CompareMode::Exact,
            key_field: None,
            verbose: false,
        }
    }
}

impl Comparator for JsonComparator {
    type Content = JsonValue;

    fn format_name(&self) -> &'static str {
        "json"
    }

    /// Ranges do not apply to structured documents; the whole file is parsed
    fn read_content(&self, path: &Path, _range: &CompareRange) -> Result<JsonValue> {
        debug!("Reading JSON file: {:?}", path);
        let bytes = fs::read(path).map_err(|e| CompareError::from_io(path, e))?;
        let text = self.encoding.decode(&bytes)?;

        serde_json::from_str(&text)
            .map_err(|e| CompareError::Format(format!("Invalid JSON in {}: {}", path.display(), e)))
    }

    fn compare_content(&self, left: &JsonValue, right: &JsonValue) -> Result<ContentComparison> {
        self.compare_values(left, right)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Expected,
    Actual,
}

/// Record-level problem on one side, rendered in the matching column
fn side_difference(side: Side, path: String, problem: &str, record: String) -> Difference {
    match side {
        Side::Expected => Difference::structure(Position::Path(path), record, problem),
        Side::Actual => Difference::structure(Position::Path(path), problem, record),
    }
}

fn as_record_array<'a>(value: &'a JsonValue, which: &str) -> Result<&'a [JsonValue]> {
    match value {
        JsonValue::Array(items) => Ok(items),
        other => Err(CompareError::Format(format!(
            "Key-based comparison requires a top-level array of records, but the {} document is {}",
            which,
            kind_name(other)
        ))),
    }
}

/// Index records by their key value, in document order. Returns `None` when
/// the difference cap was hit while reporting keyless or duplicate records.
fn index_records<'a>(
    records: &'a [JsonValue],
    key_field: &str,
    side: Side,
    collector: &mut DifferenceCollector,
) -> Result<Option<Vec<(String, &'a Map<String, JsonValue>)>>> {
    let mut index = Vec::with_capacity(records.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (position, record) in records.iter().enumerate() {
        let problem = match record {
            JsonValue::Object(map) => match map.get(key_field) {
                Some(key_value) => {
                    let key = key_value.to_string();
                    if seen.insert(key.clone(), position).is_some() {
                        Some((format!("{}[{}={}]", ROOT, key_field, key), "duplicate key".to_string()))
                    } else {
                        index.push((key, map));
                        None
                    }
                }
                None => Some((
                    format!("{}[{}]", ROOT, position),
                    format!("record with key field '{}'", key_field),
                )),
            },
            other => {
                return Err(CompareError::Format(format!(
                    "Key-based comparison requires object records, found {} at index {}",
                    kind_name(other),
                    position
                )));
            }
        };

        if let Some((path, problem)) = problem {
            if !collector.push(side_difference(side, path, &problem, render(record))) {
                return Ok(None);
            }
        }
    }

    Ok(Some(index))
}

fn diff_fields(
    path: &str,
    left: &Map<String, JsonValue>,
    right: &Map<String, JsonValue>,
    collector: &mut DifferenceCollector,
) -> bool {
    let right_only = right.keys().filter(|key| !left.contains_key(*key));

    for field in left.keys().chain(right_only) {
        let left_value = left.get(field);
        let right_value = right.get(field);
        let same = match (left_value, right_value) {
            (Some(l), Some(r)) => values_equal(l, r),
            _ => false,
        };
        if same {
            continue;
        }

        let difference = Difference::content(
            Position::Path(format!("{}.{}", path, field)),
            left_value.map_or_else(|| MISSING.to_string(), render),
            right_value.map_or_else(|| MISSING.to_string(), render),
        );
        if !collector.push(difference) {
            return false;
        }
    }

    true
}

/// Walk both trees, recording differences. Returns `false` once the collector
/// is full.
fn diff_values(path: &str, left: &JsonValue, right: &JsonValue, collector: &mut DifferenceCollector) -> bool {
    match (left, right) {
        (JsonValue::Object(l), JsonValue::Object(r)) => {
            for (key, left_value) in l {
                let child = format!("{}.{}", path, key);
                let keep_going = match r.get(key) {
                    Some(right_value) => diff_values(&child, left_value, right_value, collector),
                    None => collector.push(Difference::structure(
                        Position::Path(child),
                        render(left_value),
                        MISSING,
                    )),
                };
                if !keep_going {
                    return false;
                }
            }
            for (key, right_value) in r {
                if l.contains_key(key) {
                    continue;
                }
                let child = format!("{}.{}", path, key);
                if !collector.push(Difference::structure(Position::Path(child), MISSING, render(right_value))) {
                    return false;
                }
            }
            true
        }
        (JsonValue::Array(l), JsonValue::Array(r)) => {
            for (i, (left_value, right_value)) in l.iter().zip(r).enumerate() {
                let child = format!("{}[{}]", path, i);
                if !diff_values(&child, left_value, right_value, collector) {
                    return false;
                }
            }
            if l.len() != r.len() {
                return collector.push(Difference::structure(
                    Position::Path(path.to_string()),
                    format!("array of {} items", l.len()),
                    format!("array of {} items", r.len()),
                ));
            }
            true
        }
        _ if kind_name(left) != kind_name(right) => collector.push(Difference::structure(
            Position::Path(path.to_string()),
            render(left),
            render(right),
        )),
        _ if values_equal(left, right) => true,
        _ => collector.push(Difference::content(
            Position::Path(path.to_string()),
            render(left),
            render(right),
        )),
    }
}

/// Deep equality where integers and floats compare numerically
fn values_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        (JsonValue::Number(a), JsonValue::Number(b)) => {
            if let (Some(a_i), Some(b_i)) = (a.as_i64(), b.as_i64()) {
                a_i == b_i
            } else if let (Some(a_u), Some(b_u)) = (a.as_u64(), b.as_u64()) {
                a_u == b_u
            } else if let (Some(a_f), Some(b_f)) = (a.as_f64(), b.as_f64()) {
                a_f == b_f
            } else {
                false
            }
        }
        (JsonValue::String(a), JsonValue::String(b)) => a == b,
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).map_or(false, |y| values_equal(x, y)))
        }
        _ => false,
    }
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Compact JSON rendering, shortened for display
fn render(value: &JsonValue) -> String {
    let mut text = value.to_string();
    if text.chars().count() > MAX_RENDERED_LEN {
        text = text.chars().take(MAX_RENDERED_LEN).collect::<String>() + "...";
    }
    text
}

fn render_map(map: &Map<String, JsonValue>) -> String {
    render(&JsonValue::Object(map.clone()))
}

/// Check if a file path appears to be JSON based on extension
pub fn is_json_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        matches!(ext.as_str(), "json" | "geojson")
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcompare_common::{DiffType, MAX_DIFFERENCES};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn key_based(key: &str) -> JsonComparator {
        JsonComparator::new(
            &ComparatorConfig::new()
                .with_compare_mode(CompareMode::KeyBased)
                .with_key_field(key),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_json() {
        let content = r#"{"a": 1, "b": [1, 2]}"#;
        let left = create_temp_json(content);
        let right = create_temp_json(content);

        let result = JsonComparator::default().compare_files(left.path(), right.path(), &CompareRange::full());
        assert!(result.identical);
        assert!(result.differences.is_empty());
    }

    #[test]
    fn test_value_difference() {
        let left = create_temp_json(r#"{"a": 1, "b": [1, 2]}"#);
        let right = create_temp_json(r#"{"a": 2, "b": [1, 2]}"#);

        let result = JsonComparator::default().compare_files(left.path(), right.path(), &CompareRange::full());
        assert!(!result.identical);
        assert_eq!(
            result.differences,
            vec![Difference::content(Position::Path("root.a".into()), "1", "2")]
        );
    }

    #[test]
    fn test_nested_paths() {
        let comparison = JsonComparator::default()
            .compare_values(
                &json!({"user": {"tags": ["x", "y"]}}),
                &json!({"user": {"tags": ["x", "z"]}}),
            )
            .unwrap();
        assert_eq!(
            comparison.differences[0].position,
            Some(Position::Path("root.user.tags[1]".into()))
        );
    }

    #[test]
    fn test_missing_keys_are_structure() {
        let comparison = JsonComparator::default()
            .compare_values(&json!({"a": 1, "extra": true}), &json!({"a": 1, "new": null}))
            .unwrap();
        assert_eq!(comparison.differences.len(), 2);
        assert!(comparison.differences.iter().all(|d| d.diff_type == DiffType::Structure));
        assert_eq!(comparison.differences[0].actual.as_deref(), Some(MISSING));
        assert_eq!(comparison.differences[1].expected.as_deref(), Some(MISSING));
    }

    #[test]
    fn test_array_length_mismatch() {
        let comparison = JsonComparator::default()
            .compare_values(&json!([1, 2, 3]), &json!([1, 2]))
            .unwrap();
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].diff_type, DiffType::Structure);
        assert_eq!(comparison.differences[0].position, Some(Position::Path("root".into())));
    }

    #[test]
    fn test_type_mismatch_is_structure() {
        let comparison = JsonComparator::default()
            .compare_values(&json!({"a": "1"}), &json!({"a": 1}))
            .unwrap();
        assert_eq!(comparison.differences[0].diff_type, DiffType::Structure);
    }

    #[test]
    fn test_integer_and_float_equal() {
        let comparison = JsonComparator::default()
            .compare_values(&json!({"a": 1}), &json!({"a": 1.0}))
            .unwrap();
        assert!(comparison.identical);
    }

    #[test]
    fn test_tiny_float_difference_detected() {
        let comparison = JsonComparator::default()
            .compare_values(&json!({"a": 1e-20}), &json!({"a": 2e-20}))
            .unwrap();
        assert!(!comparison.identical);
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].diff_type, DiffType::Content);
        assert_eq!(comparison.differences[0].position, Some(Position::Path("root.a".into())));
    }

    #[test]
    fn test_exact_mode_is_order_sensitive() {
        let comparison = JsonComparator::default()
            .compare_values(
                &json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]),
                &json!([{"id": 2, "v": "b"}, {"id": 1, "v": "a"}]),
            )
            .unwrap();
        assert!(!comparison.identical);
    }

    #[test]
    fn test_key_based_ignores_order() {
        let left = create_temp_json(r#"[{"id":1,"v":"a"},{"id":2,"v":"b"}]"#);
        let right = create_temp_json(r#"[{"id":2,"v":"b"},{"id":1,"v":"a"}]"#);

        let result = key_based("id").compare_files(left.path(), right.path(), &CompareRange::full());
        assert!(result.identical);
    }

    #[test]
    fn test_key_based_missing_record() {
        let comparison = key_based("id")
            .compare_values(
                &json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]),
                &json!([{"id": 2, "v": "b"}]),
            )
            .unwrap();
        assert_eq!(comparison.differences.len(), 1);
        let diff = &comparison.differences[0];
        assert_eq!(diff.diff_type, DiffType::Structure);
        assert_eq!(diff.position, Some(Position::Path("root[id=1]".into())));
    }

    #[test]
    fn test_key_based_field_mismatch_and_extra_record() {
        let comparison = key_based("id")
            .compare_values(
                &json!([{"id": 1, "v": "a"}]),
                &json!([{"id": 1, "v": "b"}, {"id": 2, "v": "c"}]),
            )
            .unwrap();
        assert_eq!(comparison.differences.len(), 2);
        assert_eq!(comparison.differences[0].diff_type, DiffType::Content);
        assert_eq!(
            comparison.differences[0].position,
            Some(Position::Path("root[id=1].v".into()))
        );
        assert_eq!(comparison.differences[1].diff_type, DiffType::Structure);
        assert_eq!(comparison.differences[1].expected.as_deref(), Some(MISSING));
    }

    #[test]
    fn test_key_based_string_and_number_keys_differ() {
        let comparison = key_based("id")
            .compare_values(&json!([{"id": 1}]), &json!([{"id": "1"}]))
            .unwrap();
        assert_eq!(comparison.differences.len(), 2);
    }

    #[test]
    fn test_key_based_record_without_key() {
        let comparison = key_based("id")
            .compare_values(&json!([{"id": 1}, {"name": "x"}]), &json!([{"id": 1}]))
            .unwrap();
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].position, Some(Position::Path("root[1]".into())));
    }

    #[test]
    fn test_key_based_duplicate_key() {
        let comparison = key_based("id")
            .compare_values(&json!([{"id": 1}, {"id": 1}]), &json!([{"id": 1}]))
            .unwrap();
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].actual.as_deref(), Some("duplicate key"));
    }

    #[test]
    fn test_key_based_requires_array() {
        let err = key_based("id")
            .compare_values(&json!({"id": 1}), &json!([{"id": 1}]))
            .unwrap_err();
        assert!(matches!(err, CompareError::Format(_)));
    }

    #[test]
    fn test_key_based_requires_object_records() {
        let err = key_based("id")
            .compare_values(&json!([{"id": 1}, 2]), &json!([{"id": 1}]))
            .unwrap_err();
        assert!(matches!(err, CompareError::Format(_)));
    }

    #[test]
    fn test_key_based_without_key_field_rejected() {
        let config = ComparatorConfig::new().with_compare_mode(CompareMode::KeyBased);
        assert!(matches!(JsonComparator::new(&config), Err(CompareError::Config(_))));
    }

    #[test]
    fn test_invalid_json_sets_error() {
        let left = create_temp_json("{not json");
        let right = create_temp_json("{}");

        let result = JsonComparator::default().compare_files(left.path(), right.path(), &CompareRange::full());
        assert!(!result.identical);
        assert!(result.error.as_deref().unwrap().contains("Invalid JSON"));
    }

    #[test]
    fn test_difference_cap() {
        let left: JsonValue = (0..20).map(|i| (format!("k{}", i), json!(i))).collect::<Map<_, _>>().into();
        let right: JsonValue = (0..20).map(|i| (format!("k{}", i), json!(i + 1))).collect::<Map<_, _>>().into();

        let comparison = JsonComparator::default().compare_values(&left, &right).unwrap();
        assert_eq!(comparison.differences.len(), MAX_DIFFERENCES + 1);
        assert!(comparison.differences.last().unwrap().is_truncation_marker());
    }

    #[test]
    fn test_is_json_file() {
        assert!(is_json_file(Path::new("data.json")));
        assert!(is_json_file(Path::new("data.JSON")));
        assert!(!is_json_file(Path::new("data.txt")));
        assert!(!is_json_file(Path::new("records.jsonl")));
    }
}
