//! Splitting id lists into bounded batches and fetching them concurrently.

use futures::future::join_all;
use std::future::Future;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

use weather_common::{WeatherError, WeatherResult};

/// Split `ids` into contiguous chunks of at most `max_batch` elements.
///
/// Concatenating the chunks yields the input; only the last chunk may be short.
pub fn chunk_ids<T: Clone>(ids: &[T], max_batch: NonZeroUsize) -> Vec<Vec<T>> {
    ids.chunks(max_batch.get()).map(<[T]>::to_vec).collect()
}

/// A chunk whose fetch failed. Its ids are simply left unresolved.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Position of the chunk in request order
    pub index: usize,
    pub ids: Vec<String>,
    pub error: WeatherError,
}

/// Combined result of a chunked fetch.
#[derive(Debug)]
pub struct ChunkedOutcome<T> {
    /// Items from successful chunks, in chunk order
    pub items: Vec<T>,
    pub failures: Vec<ChunkFailure>,
    pub chunks: usize,
}

impl<T> ChunkedOutcome<T> {
    pub fn all_failed(&self) -> bool {
        self.chunks > 0 && self.failures.len() == self.chunks
    }
}

/// Fetch every chunk concurrently and wait for all of them.
///
/// A failing chunk is recorded and never cancels its siblings.
pub async fn fetch_in_chunks<T, F, Fut>(
    ids: &[String],
    max_batch: NonZeroUsize,
    fetch: F,
) -> ChunkedOutcome<T>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = WeatherResult<Vec<T>>>,
{
    let chunks = chunk_ids(ids, max_batch);
    let chunk_count = chunks.len();

    debug!(ids = ids.len(), chunks = chunk_count, max_batch = max_batch.get(), "Fetching in chunks");

    let results = join_all(chunks.iter().map(|chunk| fetch(chunk.clone()))).await;

    let mut outcome = ChunkedOutcome {
        items: Vec::new(),
        failures: Vec::new(),
        chunks: chunk_count,
    };

    for (index, (chunk, result)) in chunks.into_iter().zip(results).enumerate() {
        match result {
            Ok(items) => outcome.items.extend(items),
            Err(error) => {
                warn!(
                    chunk = index + 1,
                    of = chunk_count,
                    size = chunk.len(),
                    error = %error,
                    "Chunk fetch failed"
                );
                outcome.failures.push(ChunkFailure {
                    index,
                    ids: chunk,
                    error,
                });
            }
        }
    }

    outcome
}
