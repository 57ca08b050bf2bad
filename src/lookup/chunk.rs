//! Partitioning of identifier lists into fixed-size, padded chunks.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::types::CHUNK_SIZE;

/// One chunk of ids, always exactly `chunk_size` long after padding.
pub type Chunk<'a> = SmallVec<[&'a str; CHUNK_SIZE]>;

/// Removes duplicate ids, keeping first-seen order.
pub fn dedup_ids<'a, I>(ids: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = FxHashSet::default();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Splits `ids` into `ceil(len / chunk_size)` chunks, padding the last one
/// with `sentinel` so every chunk has the same shape.
pub fn padded_chunks<'a>(ids: &[&'a str], chunk_size: usize, sentinel: &'a str) -> Vec<Chunk<'a>> {
    ids.chunks(chunk_size.max(1))
        .map(|slice| {
            let mut chunk: Chunk<'a> = slice.iter().copied().collect();
            chunk.resize(chunk_size.max(1), sentinel);
            chunk
        })
        .collect()
}

/// Number of chunk queries needed for `n` distinct ids.
pub fn chunk_count(n: usize, chunk_size: usize) -> usize {
    n.div_ceil(chunk_size.max(1))
}
