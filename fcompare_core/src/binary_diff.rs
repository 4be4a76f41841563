use crate::comparator::{
    file_size, hex_bytes, open_file, record_failure, Comparator, ContentComparison,
    DifferenceCollector,
};
use crate::hash::sha256_file;
use crate::lcs::SimilarityScorer;
use fcompare_common::{
    CompareRange, ComparatorConfig, ComparisonResult, Difference, Position, Result,
    Sha256Digest, DEFAULT_CHUNK_SIZE, MAX_DIFFERENCES,
};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

/// Bytes of context shown on each side of a differing byte
const CONTEXT_SIZE: usize = 8;

/// Byte-level comparator.
///
/// Without similarity scoring, files are compared in lock-step chunks and
/// memory use is bounded by `chunk_size`. With similarity scoring, both ranges
/// are read whole, since the LCS needs global alignment.
#[derive(Debug)]
pub struct BinaryComparator {
    chunk_size: usize,
    verbose: bool,
    scorer: Option<SimilarityScorer>,
}

impl BinaryComparator {
    pub fn new(config: &ComparatorConfig) -> Result<Self> {
        config.validate()?;

        let scorer = if config.similarity {
            Some(SimilarityScorer::new(config.lcs_mode, config.num_threads)?)
        } else {
            None
        };

        Ok(Self {
            chunk_size: config.chunk_size,
            verbose: config.verbose,
            scorer,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn similarity_enabled(&self) -> bool {
        self.scorer.is_some()
    }

    /// Dice similarity of two in-memory contents, when scoring is enabled
    pub fn similarity(&self, content1: &[u8], content2: &[u8]) -> Option<f64> {
        self.scorer
            .as_ref()
            .map(|scorer| scorer.similarity(content1, content2))
    }

    /// SHA-256 of a whole file, independent of any comparison
    pub fn file_hash(&self, path: &Path) -> Result<Sha256Digest> {
        sha256_file(path, self.chunk_size)
    }

    /// Quick binary comparison (checks if files are identical)
    pub fn are_files_identical(&self, file1: &Path, file2: &Path) -> Result<bool> {
        if file_size(file1)? != file_size(file2)? {
            return Ok(false);
        }
        let comparison = self.stream_differences(file1, file2, &CompareRange::full(), 0)?;
        Ok(comparison.identical)
    }

    /// Chunked lock-step comparison of the requested byte range
    pub fn compare_streaming(
        &self,
        file1: &Path,
        file2: &Path,
        range: &CompareRange,
    ) -> Result<ContentComparison> {
        self.stream_differences(file1, file2, range, MAX_DIFFERENCES)
    }

    fn stream_differences(
        &self,
        file1: &Path,
        file2: &Path,
        range: &CompareRange,
        limit: usize,
    ) -> Result<ContentComparison> {
        range.check_byte_range()?;

        let mut left = open_file(file1)?;
        let mut right = open_file(file2)?;

        let start = range.start_offset();
        if start > 0 {
            left.seek(SeekFrom::Start(start))?;
            right.seek(SeekFrom::Start(start))?;
        }
        let bytes_to_read = range.end_line.map(|end| end as u64 - start);

        let mut left_buf = vec![0u8; self.chunk_size];
        let mut right_buf = vec![0u8; self.chunk_size];
        let mut collector = DifferenceCollector::with_limit(limit, self.verbose);
        let mut offset = start;
        let mut consumed = 0u64;

        loop {
            let read_size = match bytes_to_read {
                Some(total) => {
                    let remaining = total - consumed;
                    if remaining == 0 {
                        break;
                    }
                    remaining.min(self.chunk_size as u64) as usize
                }
                None => self.chunk_size,
            };

            let left_read = read_full(&mut left, &mut left_buf[..read_size])?;
            let right_read = read_full(&mut right, &mut right_buf[..read_size])?;

            if left_read == 0 && right_read == 0 {
                break;
            }

            // One side ended early
            if left_read != right_read {
                collector.push(Difference::content(
                    Position::Byte(offset),
                    format!("{} bytes in chunk", left_read),
                    format!("{} bytes in chunk", right_read),
                ));
                break;
            }

            let left_chunk = &left_buf[..left_read];
            let right_chunk = &right_buf[..right_read];
            if let Some(index) = first_mismatch(left_chunk, right_chunk) {
                let window = context_window(index, left_read);
                let difference = Difference::content(
                    Position::Byte(offset + index as u64),
                    hex_bytes(&left_chunk[window.clone()]),
                    hex_bytes(&right_chunk[window]),
                );
                if !collector.push(difference) {
                    break;
                }
            }

            offset += left_read as u64;
            consumed += left_read as u64;

            if left_read < read_size {
                break;
            }
        }

        Ok(collector.finish())
    }

    fn run(&self, result: &mut ComparisonResult, file1: &Path, file2: &Path, range: &CompareRange) -> Result<()> {
        range.check_byte_range()?;

        let size1 = file_size(file1)?;
        let size2 = file_size(file2)?;
        result.file1_size = Some(size1);
        result.file2_size = Some(size2);

        // Sizes of the requested window differ: no need to look at the bytes
        if self.scorer.is_none()
            && size1 != size2
            && range.clamp_len(size1) != range.clamp_len(size2)
        {
            debug!("Size mismatch ({} vs {} bytes), skipping content scan", size1, size2);
            result.set_differences(false, vec![Difference::size(size1, size2)]);
            return Ok(());
        }

        match &self.scorer {
            Some(scorer) => {
                debug!("Reading full content for similarity calculation");
                let content1 = self.read_content(file1, range)?;
                let content2 = self.read_content(file2, range)?;
                let comparison = self.compare_content(&content1, &content2)?;
                result.similarity = Some(scorer.similarity(&content1, &content2));
                result.set_differences(comparison.identical, comparison.differences);
            }
            None => {
                debug!("Using chunk-based streaming comparison");
                let comparison = self.compare_streaming(file1, file2, range)?;
                result.set_differences(comparison.identical, comparison.differences);
            }
        }

        Ok(())
    }
}

impl Default for BinaryComparator {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verbose: false,
            scorer: None,
        }
    }
}

impl Comparator for BinaryComparator {
    type Content = Vec<u8>;

    fn format_name(&self) -> &'static str {
        "binary"
    }

    fn read_content(&self, path: &Path, range: &CompareRange) -> Result<Vec<u8>> {
        debug!("Reading binary file: {:?}", path);
        range.check_byte_range()?;

        let mut file = open_file(path)?;
        let start = range.start_offset();
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }

        let mut content = Vec::new();
        match range.end_line {
            Some(end) => {
                file.take(end as u64 - start).read_to_end(&mut content)?;
            }
            None => {
                file.read_to_end(&mut content)?;
            }
        }
        Ok(content)
    }

    fn compare_content(&self, content1: &Vec<u8>, content2: &Vec<u8>) -> Result<ContentComparison> {
        if content1.len() != content2.len() {
            return Ok(ContentComparison::from_differences(vec![Difference::size(
                content1.len() as u64,
                content2.len() as u64,
            )]));
        }
        if content1 == content2 {
            return Ok(ContentComparison::identical());
        }

        let mut collector = DifferenceCollector::new(self.verbose);
        let chunks = content1
            .chunks(self.chunk_size)
            .zip(content2.chunks(self.chunk_size));

        for (chunk_index, (left, right)) in chunks.enumerate() {
            let Some(index) = first_mismatch(left, right) else {
                continue;
            };
            let position = chunk_index * self.chunk_size + index;
            let window = context_window(position, content1.len());
            let difference = Difference::content(
                Position::Byte(position as u64),
                hex_bytes(&content1[window.clone()]),
                hex_bytes(&content2[window]),
            );
            if !collector.push(difference) {
                break;
            }
        }

        Ok(collector.finish())
    }

    fn compare_files(&self, file1: &Path, file2: &Path, range: &CompareRange) -> ComparisonResult {
        let mut result = ComparisonResult::new(file1, file2, *range);
        info!("Comparing files: {} and {}", file1.display(), file2.display());

        if let Err(e) = self.run(&mut result, file1, file2, range) {
            record_failure(&mut result, &e);
        }
        result
    }
}

fn first_mismatch(left: &[u8], right: &[u8]) -> Option<usize> {
    left.iter().zip(right).position(|(a, b)| a != b)
}

fn context_window(position: usize, len: usize) -> std::ops::Range<usize> {
    position.saturating_sub(CONTEXT_SIZE)..(position + CONTEXT_SIZE).min(len)
}

/// Fill `buf` from `reader`, stopping early only at end of file
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
