//! Default bulk-copy strategies
//!
//! `scalar_copy` is the small-path strategy. `bulk_copy` is the large-path
//! strategy: with the `parallel` feature it splits big copies into chunks
//! and copies them on the rayon pool, otherwise it is a single memcpy.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum chunk length, in elements
const MIN_CHUNK_LEN: usize = 4096;

/// Minimum chunks handed to each worker
const MIN_CHUNKS_PER_THREAD: usize = 4;

/// Copies shorter than this stay on the calling thread
#[cfg(feature = "parallel")]
const PARALLEL_MIN_LEN: usize = 256 * 1024;

/// Get the number of workers a bulk copy can spread across
pub fn default_num_threads() -> usize {
    num_cpus::get()
}

/// Calculate the chunk length for splitting `total_len` elements
///
/// The result is at least `min_chunk_len` (default 4096) and rounded up to a
/// multiple of 64 elements.
pub fn calculate_chunk_len(total_len: usize, min_chunk_len: Option<usize>) -> usize {
    let min_len = min_chunk_len.unwrap_or(MIN_CHUNK_LEN).max(1);
    let total_chunks = default_num_threads().max(1) * MIN_CHUNKS_PER_THREAD;

    let chunk_len = (total_len / total_chunks).max(min_len);

    let alignment = 64;
    chunk_len.div_ceil(alignment) * alignment
}

/// Small-path copy
///
/// # Panics
///
/// Panics if `src` and `dst` differ in length.
#[inline]
pub fn scalar_copy<T: Copy>(src: &[T], dst: &mut [T]) {
    dst.copy_from_slice(src);
}

/// Large-path copy
///
/// # Panics
///
/// Panics if `src` and `dst` differ in length, like `copy_from_slice`.
/// [`CapabilityDetector::copy_with_strategy`](super::simd::CapabilityDetector::copy_with_strategy)
/// always passes equal-length slices.
pub fn bulk_copy<T: Copy + Send + Sync>(src: &[T], dst: &mut [T]) {
    assert_eq!(src.len(), dst.len(), "bulk_copy length mismatch");

    #[cfg(feature = "parallel")]
    {
        if src.len() >= PARALLEL_MIN_LEN {
            let chunk_len = calculate_chunk_len(src.len(), None);
            dst.par_chunks_mut(chunk_len)
                .zip(src.par_chunks(chunk_len))
                .for_each(|(d, s)| d.copy_from_slice(s));
            return;
        }
    }

    dst.copy_from_slice(src);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_len_calculation() {
        let small = calculate_chunk_len(1024, None);
        let huge = calculate_chunk_len(1 << 30, None);

        assert!(small >= MIN_CHUNK_LEN);
        assert!(huge >= small);
        assert_eq!(small % 64, 0);
        assert_eq!(huge % 64, 0);

        assert_eq!(calculate_chunk_len(0, Some(1)), 64);
    }

    #[test]
    fn test_scalar_copy() {
        let src = [1, 2, 3, 4];
        let mut dst = [0; 4];
        scalar_copy(&src, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_bulk_copy_large() {
        // Large enough to take the chunked path when `parallel` is enabled
        let src: Vec<f32> = (0..600_000).map(|i| i as f32 * 0.5).collect();
        let mut dst = vec![0.0f32; src.len()];

        bulk_copy(&src, &mut dst);

        assert_eq!(dst, src);
    }

    #[test]
    #[should_panic(expected = "bulk_copy length mismatch")]
    fn test_bulk_copy_length_mismatch() {
        let src = [1u8; 8];
        let mut dst = [0u8; 4];
        bulk_copy(&src, &mut dst);
    }
}
