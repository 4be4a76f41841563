//! Numeric array containers (HDF5-style) compared dataset by dataset.
//!
//! Reading the container format is delegated to an [`ArrayBackend`]; this
//! module owns dataset selection, tolerance checks and element filtering.

use crate::comparator::{Comparator, ContentComparison, DifferenceCollector};
use fcompare_common::{
    CompareError, CompareRange, ComparatorConfig, Difference, Position, Result,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const MISSING: &str = "(missing)";

/// A dataset read as `f64` values in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl ArrayData {
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Self {
        Self { shape, values }
    }

    /// One-dimensional dataset
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Multi-dimensional index of a flat row-major offset
    fn unravel(&self, mut offset: usize) -> Vec<usize> {
        let mut index = vec![0; self.shape.len()];
        for (slot, dim) in index.iter_mut().zip(&self.shape).rev() {
            if *dim == 0 {
                continue;
            }
            *slot = offset % dim;
            offset /= dim;
        }
        index
    }
}

/// An opened container of datasets addressed by slash-separated paths
pub trait ArrayStore {
    /// Every leaf dataset path, e.g. `group1/data`
    fn datasets(&self) -> Result<Vec<String>>;

    fn read_dataset(&self, path: &str) -> Result<ArrayData>;
}

/// Opens array containers from disk
pub trait ArrayBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ArrayStore>>;
}

/// Datasets held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryArrayStore {
    datasets: BTreeMap<String, ArrayData>,
}

impl MemoryArrayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, path: impl Into<String>, data: ArrayData) -> Self {
        self.datasets.insert(normalize_path(&path.into()), data);
        self
    }
}

impl ArrayStore for MemoryArrayStore {
    fn datasets(&self) -> Result<Vec<String>> {
        Ok(self.datasets.keys().cloned().collect())
    }

    fn read_dataset(&self, path: &str) -> Result<ArrayData> {
        self.datasets
            .get(path)
            .cloned()
            .ok_or_else(|| CompareError::Format(format!("No dataset named '{}'", path)))
    }
}

/// Backend serving [`MemoryArrayStore`]s registered under file paths
#[derive(Debug, Clone, Default)]
pub struct MemoryArrayBackend {
    stores: HashMap<PathBuf, MemoryArrayStore>,
}

impl MemoryArrayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, path: impl Into<PathBuf>, store: MemoryArrayStore) -> Self {
        self.stores.insert(path.into(), store);
        self
    }
}

impl ArrayBackend for MemoryArrayBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn ArrayStore>> {
        match self.stores.get(path) {
            Some(store) => Ok(Box::new(store.clone())),
            None => Err(CompareError::NotFound(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl FilterOp {
    fn symbol(self) -> &'static str {
        match self {
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
        }
    }
}

/// Element predicate such as `>100.0` or `abs>0.001`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataFilter {
    absolute: bool,
    op: FilterOp,
    threshold: f64,
}

impl DataFilter {
    pub fn matches(&self, value: f64) -> bool {
        let value = if self.absolute { value.abs() } else { value };
        match self.op {
            FilterOp::Gt => value > self.threshold,
            FilterOp::Ge => value >= self.threshold,
            FilterOp::Lt => value < self.threshold,
            FilterOp::Le => value <= self.threshold,
            FilterOp::Eq => value == self.threshold,
            FilterOp::Ne => value != self.threshold,
        }
    }
}

impl FromStr for DataFilter {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CompareError::Config(format!("Invalid data_filter '{}': {}", s, reason));

        let mut rest = s.trim();
        let absolute = match rest.strip_prefix("abs") {
            Some(tail) => {
                rest = tail.trim_start();
                true
            }
            None => false,
        };

        // Two-character operators first so ">=" is not read as ">"
        let ops = [
            (">=", FilterOp::Ge),
            ("<=", FilterOp::Le),
            ("==", FilterOp::Eq),
            ("!=", FilterOp::Ne),
            (">", FilterOp::Gt),
            ("<", FilterOp::Lt),
        ];
        let (op, tail) = ops
            .iter()
            .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|tail| (*op, tail)))
            .ok_or_else(|| invalid("expected one of >, >=, <, <=, ==, !="))?;

        let threshold: f64 = tail
            .trim()
            .parse()
            .map_err(|_| invalid("threshold is not a number"))?;

        Ok(Self {
            absolute,
            op,
            threshold,
        })
    }
}

impl fmt::Display for DataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "abs")?;
        }
        write!(f, "{}{}", self.op.symbol(), self.threshold)
    }
}

/// What to compare for one selected path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    Dataset(String),
    /// Group member names only, without descending into datasets
    Listing(String),
}

/// Comparator for numeric array containers
pub struct ArrayComparator {
    backend: Arc<dyn ArrayBackend>,
    rtol: f64,
    atol: f64,
    tables: Vec<String>,
    table_regex: Option<Regex>,
    data_filter: Option<DataFilter>,
    expand_path: bool,
    verbose: bool,
}

impl ArrayComparator {
    pub fn new(config: &ComparatorConfig, backend: Arc<dyn ArrayBackend>) -> Result<Self> {
        config.validate()?;

        let table_regex = config
            .table_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| CompareError::Config(format!("Invalid table_regex: {}", e)))?;
        let data_filter = config
            .data_filter
            .as_deref()
            .map(str::parse::<DataFilter>)
            .transpose()?;

        Ok(Self {
            backend,
            rtol: config.rtol,
            atol: config.atol,
            tables: config.tables.iter().map(|t| normalize_path(t)).collect(),
            table_regex,
            data_filter,
            expand_path: config.expand_path,
            verbose: config.verbose,
        })
    }

    /// `|a - b| <= atol + rtol * |b|`, with NaN equal only to NaN
    pub fn is_close(&self, expected: f64, actual: f64) -> bool {
        if expected == actual || (expected.is_nan() && actual.is_nan()) {
            return true;
        }
        (expected - actual).abs() <= self.atol + self.rtol * actual.abs()
    }

    fn select_targets(&self, left: &[String], right: &[String]) -> Vec<Target> {
        let all: Vec<&String> = union(left, right);
        let mut targets = Vec::new();

        if self.tables.is_empty() && self.table_regex.is_none() {
            targets.extend(all.iter().map(|path| Target::Dataset((*path).clone())));
            return targets;
        }

        for table in &self.tables {
            let prefix = format!("{}/", table);
            let leaves: Vec<&String> = all.iter().copied().filter(|p| p.starts_with(&prefix)).collect();

            if all.iter().any(|p| *p == table) || leaves.is_empty() {
                targets.push(Target::Dataset(table.clone()));
            } else if self.expand_path {
                targets.extend(leaves.into_iter().map(|p| Target::Dataset(p.clone())));
            } else {
                targets.push(Target::Listing(table.clone()));
            }
        }

        if let Some(regex) = &self.table_regex {
            targets.extend(
                all.iter()
                    .filter(|p| regex.is_match(p))
                    .map(|p| Target::Dataset((*p).clone())),
            );
        }

        let mut seen = HashSet::new();
        targets.retain(|t| seen.insert(t.clone()));
        targets
    }

    fn diff_dataset(
        &self,
        path: &str,
        left: &dyn ArrayStore,
        right: &dyn ArrayStore,
        in_left: bool,
        in_right: bool,
        collector: &mut DifferenceCollector,
    ) -> Result<bool> {
        if !(in_left && in_right) {
            return Ok(collector.push(Difference::structure(
                Position::Path(path.to_string()),
                if in_left { "dataset" } else { MISSING },
                if in_right { "dataset" } else { MISSING },
            )));
        }

        let expected = left.read_dataset(path)?;
        let actual = right.read_dataset(path)?;

        if expected.shape != actual.shape || expected.values.len() != actual.values.len() {
            return Ok(collector.push(Difference::structure(
                Position::Path(path.to_string()),
                format!("shape {:?}", expected.shape),
                format!("shape {:?}", actual.shape),
            )));
        }

        let mut first_mismatch = None;
        let mut mismatches = 0usize;
        for (offset, (&a, &b)) in expected.values.iter().zip(&actual.values).enumerate() {
            if let Some(filter) = &self.data_filter {
                if !(filter.matches(a) && filter.matches(b)) {
                    continue;
                }
            }
            if !self.is_close(a, b) {
                mismatches += 1;
                first_mismatch.get_or_insert(offset);
            }
        }

        let Some(offset) = first_mismatch else {
            return Ok(true);
        };
        debug!("Dataset {}: {} mismatched elements", path, mismatches);

        let index = expected
            .unravel(offset)
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(collector.push(Difference::content(
            Position::Path(format!("{}[{}]", path, index)),
            expected.values[offset].to_string(),
            format!(
                "{} ({} of {} elements differ)",
                actual.values[offset],
                mismatches,
                expected.values.len()
            ),
        )))
    }

    fn diff_listing(
        &self,
        group: &str,
        left: &[String],
        right: &[String],
        collector: &mut DifferenceCollector,
    ) -> bool {
        let left_members = group_members(group, left);
        let right_members = group_members(group, right);
        if left_members == right_members {
            return true;
        }

        let render = |members: &[String]| {
            if members.is_empty() {
                MISSING.to_string()
            } else {
                members.join(", ")
            }
        };
        collector.push(Difference::structure(
            Position::Path(group.to_string()),
            render(&left_members),
            render(&right_members),
        ))
    }
}

impl fmt::Debug for ArrayComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayComparator")
            .field("rtol", &self.rtol)
            .field("atol", &self.atol)
            .field("tables", &self.tables)
            .field("table_regex", &self.table_regex.as_ref().map(Regex::as_str))
            .field("data_filter", &self.data_filter)
            .field("expand_path", &self.expand_path)
            .finish()
    }
}

impl Comparator for ArrayComparator {
    type Content = Box<dyn ArrayStore>;

    fn format_name(&self) -> &'static str {
        "h5"
    }

    /// Ranges do not apply to array containers
    fn read_content(&self, path: &Path, _range: &CompareRange) -> Result<Box<dyn ArrayStore>> {
        debug!("Opening array container: {:?}", path);
        self.backend.open(path)
    }

    fn compare_content(
        &self,
        expected: &Box<dyn ArrayStore>,
        actual: &Box<dyn ArrayStore>,
    ) -> Result<ContentComparison> {
        let left = expected.datasets()?;
        let right = actual.datasets()?;
        let left_set: HashSet<&str> = left.iter().map(String::as_str).collect();
        let right_set: HashSet<&str> = right.iter().map(String::as_str).collect();

        let targets = self.select_targets(&left, &right);
        debug!("Comparing {} selected array targets", targets.len());

        let mut collector = DifferenceCollector::new(self.verbose);
        for target in &targets {
            let keep_going = match target {
                Target::Dataset(path) => self.diff_dataset(
                    path,
                    &**expected,
                    &**actual,
                    left_set.contains(path.as_str()),
                    right_set.contains(path.as_str()),
                    &mut collector,
                )?,
                Target::Listing(group) => self.diff_listing(group, &left, &right, &mut collector),
            };
            if !keep_going {
                break;
            }
        }

        Ok(collector.finish())
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Left paths in order, then right-only paths
fn union<'a>(left: &'a [String], right: &'a [String]) -> Vec<&'a String> {
    let left_set: HashSet<&String> = left.iter().collect();
    left.iter()
        .chain(right.iter().filter(|p| !left_set.contains(p)))
        .collect()
}

/// Immediate member names of `group`, sorted
fn group_members(group: &str, datasets: &[String]) -> Vec<String> {
    let prefix = format!("{}/", group);
    let mut members: Vec<String> = datasets
        .iter()
        .filter_map(|p| p.strip_prefix(&prefix))
        .filter_map(|rest| rest.split('/').next())
        .map(str::to_string)
        .collect();
    members.sort();
    members.dedup();
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcompare_common::DiffType;

    fn store(datasets: &[(&str, Vec<f64>)]) -> Box<dyn ArrayStore> {
        let store = datasets.iter().fold(MemoryArrayStore::new(), |store, (path, values)| {
            store.with_dataset(*path, ArrayData::vector(values.clone()))
        });
        Box::new(store)
    }

    fn comparator(config: ComparatorConfig) -> ArrayComparator {
        ArrayComparator::new(&config, Arc::new(MemoryArrayBackend::new())).unwrap()
    }

    fn compare(
        config: ComparatorConfig,
        left: &[(&str, Vec<f64>)],
        right: &[(&str, Vec<f64>)],
    ) -> ContentComparison {
        comparator(config).compare_content(&store(left), &store(right)).unwrap()
    }

    #[test]
    fn test_identical_datasets() {
        let data = [("data", vec![1.0, 2.0, 3.0])];
        let comparison = compare(ComparatorConfig::new(), &data, &data);
        assert!(comparison.identical);
        assert!(comparison.differences.is_empty());
    }

    #[test]
    fn test_tolerance_controls_difference() {
        let left = [("data", vec![1.0])];
        let right = [("data", vec![1.0 + 2e-5])];

        let tight = compare(ComparatorConfig::new().with_tolerance(1e-5, 1e-8), &left, &right);
        assert!(!tight.identical);

        let loose = compare(ComparatorConfig::new().with_tolerance(1e-4, 1e-6), &left, &right);
        assert!(loose.identical);
    }

    #[test]
    fn test_first_mismatch_reported_with_count() {
        let comparison = compare(
            ComparatorConfig::new(),
            &[("data", vec![1.0, 2.0, 3.0, 4.0])],
            &[("data", vec![1.0, 2.5, 3.0, 4.5])],
        );
        assert_eq!(comparison.differences.len(), 1);
        let diff = &comparison.differences[0];
        assert_eq!(diff.diff_type, DiffType::Content);
        assert_eq!(diff.position, Some(Position::Path("data[1]".into())));
        assert!(diff.actual.as_deref().unwrap().contains("2 of 4"));
    }

    #[test]
    fn test_multidimensional_index() {
        let left: Box<dyn ArrayStore> = Box::new(
            MemoryArrayStore::new().with_dataset("m", ArrayData::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0])),
        );
        let right: Box<dyn ArrayStore> = Box::new(
            MemoryArrayStore::new().with_dataset("m", ArrayData::new(vec![2, 2], vec![1.0, 2.0, 9.0, 4.0])),
        );
        let comparison = comparator(ComparatorConfig::new()).compare_content(&left, &right).unwrap();
        assert_eq!(comparison.differences[0].position, Some(Position::Path("m[1, 0]".into())));
    }

    #[test]
    fn test_shape_mismatch_is_structure() {
        let comparison = compare(
            ComparatorConfig::new(),
            &[("data", vec![1.0, 2.0])],
            &[("data", vec![1.0, 2.0, 3.0])],
        );
        assert_eq!(comparison.differences[0].diff_type, DiffType::Structure);
    }

    #[test]
    fn test_table_selection_and_regex() {
        let left = [("group1/data", vec![1.0, 2.0, 3.0]), ("group2/data", vec![10.0, 20.0, 30.0])];
        let right = [("group1/data", vec![1.0, 2.0, 3.0]), ("group2/data", vec![10.0, 20.0, 31.0])];

        let only_group1 = compare(
            ComparatorConfig::new().with_tables(vec!["group1/data".into()]),
            &left,
            &right,
        );
        assert!(only_group1.identical);

        let regex_group2 = compare(ComparatorConfig::new().with_table_regex("group2/data"), &left, &right);
        assert!(!regex_group2.identical);
        assert!(regex_group2.differences.iter().any(|d| d.to_string().contains("group2/data")));
    }

    #[test]
    fn test_expand_path_toggle() {
        let left = [("parent/data", vec![1.0, 2.0, 3.0])];
        let right = [("parent/data", vec![1.0, 2.0, 4.0])];

        let no_expand = compare(
            ComparatorConfig::new()
                .with_tables(vec!["parent".into()])
                .with_expand_path(false),
            &left,
            &right,
        );
        assert!(no_expand.identical);

        let with_expand = compare(ComparatorConfig::new().with_tables(vec!["parent".into()]), &left, &right);
        assert!(!with_expand.identical);
    }

    #[test]
    fn test_group_listing_difference() {
        let comparison = compare(
            ComparatorConfig::new()
                .with_tables(vec!["parent".into()])
                .with_expand_path(false),
            &[("parent/a", vec![1.0]), ("parent/b", vec![1.0])],
            &[("parent/a", vec![1.0])],
        );
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].expected.as_deref(), Some("a, b"));
    }

    #[test]
    fn test_data_filter_behavior() {
        let left = [("demo", vec![0.0, 100.0, -0.002])];
        let right = [("demo", vec![0.0, 100.1, 0.002])];

        for (filter, expected_identical) in [(">100.0", true), (">=100.0", false), ("abs>0.001", false)] {
            let comparison = compare(ComparatorConfig::new().with_data_filter(filter), &left, &right);
            assert_eq!(comparison.identical, expected_identical, "filter {}", filter);
        }
    }

    #[test]
    fn test_missing_table_reports_structure() {
        let comparison = compare(
            ComparatorConfig::new().with_tables(vec!["exists".into()]),
            &[("exists", vec![1.0, 2.0, 3.0])],
            &[],
        );
        assert!(!comparison.identical);
        assert!(comparison.differences.iter().any(|d| d.diff_type == DiffType::Structure));
    }

    #[test]
    fn test_all_datasets_compared_by_default() {
        let comparison = compare(
            ComparatorConfig::new(),
            &[("a", vec![1.0])],
            &[("a", vec![1.0]), ("b", vec![2.0])],
        );
        assert_eq!(comparison.differences.len(), 1);
        assert_eq!(comparison.differences[0].position, Some(Position::Path("b".into())));
        assert_eq!(comparison.differences[0].expected.as_deref(), Some(MISSING));
    }

    #[test]
    fn test_nan_equals_nan() {
        let data = [("data", vec![f64::NAN, 1.0])];
        assert!(compare(ComparatorConfig::new(), &data, &data).identical);
    }

    #[test]
    fn test_parse_data_filter() {
        let filter: DataFilter = "abs >= 0.5".parse().unwrap();
        assert!(filter.matches(-0.5));
        assert!(!filter.matches(0.25));
        assert_eq!(filter.to_string(), "abs>=0.5");

        let filter: DataFilter = "!=0".parse().unwrap();
        assert!(filter.matches(1.0));
        assert!(!filter.matches(0.0));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        for bad in ["", "~5", ">abc", "abs"] {
            assert!(matches!(bad.parse::<DataFilter>(), Err(CompareError::Config(_))), "{}", bad);
        }
        let config = ComparatorConfig::new().with_data_filter("=>1");
        assert!(ArrayComparator::new(&config, Arc::new(MemoryArrayBackend::new())).is_err());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let config = ComparatorConfig::new().with_table_regex("(unclosed");
        let err = ArrayComparator::new(&config, Arc::new(MemoryArrayBackend::new())).unwrap_err();
        assert!(matches!(err, CompareError::Config(_)));
    }

    #[test]
    fn test_compare_files_through_backend() {
        let backend = MemoryArrayBackend::new()
            .with_store("a.h5", MemoryArrayStore::new().with_dataset("/x", ArrayData::vector(vec![1.0])))
            .with_store("b.h5", MemoryArrayStore::new().with_dataset("x", ArrayData::vector(vec![2.0])));
        let comparator = ArrayComparator::new(&ComparatorConfig::new(), Arc::new(backend)).unwrap();

        let result = comparator.compare_files(Path::new("a.h5"), Path::new("b.h5"), &CompareRange::full());
        assert!(!result.identical);
        assert_eq!(result.differences[0].position, Some(Position::Path("x[0]".into())));

        let missing = comparator.compare_files(Path::new("a.h5"), Path::new("nope.h5"), &CompareRange::full());
        assert!(missing.error.is_some());
    }
}
