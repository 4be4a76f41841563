//! Longest-common-subsequence length and Dice similarity for byte sequences.
//!
//! The partitioned variant splits the rows of `a` into contiguous ranges and
//! runs an independent rolling-row DP for each range against the whole of `b`.
//! Each range restarts from zero, so subsequences crossing a range boundary are
//! not aligned and the summed lengths only approximate the true LCS. The sum is
//! clamped to `min(|a|, |b|)` so the similarity stays within `[0, 1]`.

use fcompare_common::{CompareError, LcsMode, Result};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::ops::Range;
use tracing::warn;

/// Rolling-row DP over `a` against `b`; O(|a|·|b|) time, O(|b|) memory
pub fn lcs_length(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for &byte_a in a {
        for (j, &byte_b) in b.iter().enumerate() {
            current[j + 1] = if byte_a == byte_b {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Split `0..len` into `parts` contiguous ranges of `len / parts` rows; the
/// last range takes the remainder. With fewer rows than parts every leading
/// range is empty and the last one covers all rows.
pub fn partition_rows(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let chunk = len / parts;

    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i == parts - 1 { len } else { start + chunk };
            start..end
        })
        .collect()
}

/// Summed per-partition LCS lengths, computed on `pool`
pub fn partitioned_lcs_length(pool: &ThreadPool, a: &[u8], b: &[u8], parts: usize) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let ranges = partition_rows(a.len(), parts);
    let total: usize = pool.install(|| {
        ranges
            .par_iter()
            .map(|range| lcs_length(&a[range.clone()], b))
            .sum()
    });

    let bound = a.len().min(b.len());
    if total > bound {
        warn!("Partitioned LCS sum {} exceeds bound {}, clamping", total, bound);
    }
    total.min(bound)
}

/// Dice coefficient `2L / (|a| + |b|)`; two empty inputs are fully similar
pub fn dice_similarity(lcs: usize, len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 1.0;
    }
    (2 * lcs) as f64 / total as f64
}

/// Similarity scorer owning the worker pool for the partitioned strategy
pub struct SimilarityScorer {
    mode: LcsMode,
    num_threads: usize,
    pool: ThreadPool,
}

impl SimilarityScorer {
    pub fn new(mode: LcsMode, num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("fcompare-lcs-{}", i))
            .build()
            .map_err(|e| CompareError::Config(format!("Failed to build LCS worker pool: {}", e)))?;

        Ok(Self {
            mode,
            num_threads,
            pool,
        })
    }

    pub fn mode(&self) -> LcsMode {
        self.mode
    }

    pub fn lcs_length(&self, a: &[u8], b: &[u8]) -> usize {
        match self.mode {
            LcsMode::Exact => lcs_length(a, b),
            LcsMode::Partitioned => partitioned_lcs_length(&self.pool, a, b, self.num_threads),
        }
    }

    pub fn similarity(&self, a: &[u8], b: &[u8]) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        dice_similarity(self.lcs_length(a, b), a.len(), b.len())
    }
}

impl std::fmt::Debug for SimilarityScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityScorer")
            .field("mode", &self.mode)
            .field("num_threads", &self.num_threads)
            .finish()
    }
}
