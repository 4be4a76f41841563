pub mod comparator;
pub mod lcs;
pub mod hash;
pub mod binary_diff;
pub mod text_diff;
pub mod json_diff;
pub mod array_diff;
pub mod factory;

pub use comparator::{hex_bytes, Comparator, ContentComparison, DifferenceCollector, FileComparator};
pub use lcs::SimilarityScorer;
pub use hash::{sha256_file, sha256_reader};
pub use binary_diff::BinaryComparator;
pub use text_diff::{TextComparator, TextContent};
pub use json_diff::{is_json_file, JsonComparator};
pub use array_diff::{
    ArrayBackend, ArrayComparator, ArrayData, ArrayStore, DataFilter, MemoryArrayBackend,
    MemoryArrayStore,
};
pub use factory::{
    create_comparator, create_comparator_from_options, format_for_path, ComparatorFactory,
    SUPPORTED_FORMATS,
};
