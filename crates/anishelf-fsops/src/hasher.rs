//! Chunked ed2k content fingerprint.
//!
//! The stream is read sequentially in [`ED2K_CHUNK_SIZE`] blocks. Each block is hashed
//! with MD4 on the blocking pool while the reader continues; at most `workers` blocks
//! are in flight, so reading waits on digest completion. Digests are reassembled by
//! chunk index, never by completion order.
//!
//! - zero bytes: no fingerprint
//! - one block (including exactly one full block): that block's digest
//! - more blocks: MD4 over the concatenated block digests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anishelf_protocol::Ed2kHash;
use md4::{Digest, Md4};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};

/// Size of one ed2k block (9,500 KiB).
pub const ED2K_CHUNK_SIZE: usize = 9_728_000;

type Listener = Arc<dyn Fn(u64) + Send + Sync>;
type BlockDigest = Arc<dyn Fn(&[u8]) -> [u8; 16] + Send + Sync>;

/// Cumulative count of bytes whose block digest completed.
#[derive(Clone, Default)]
pub struct HashProgress {
    bytes: Arc<AtomicU64>,
    listener: Option<Listener>,
}

impl HashProgress {
    /// Counter without a listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `listener` with the cumulative count after every completed block.
    #[must_use]
    pub fn with_listener(mut self, listener: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Bytes hashed so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes)
    }

    fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener(self.bytes());
        }
    }
}

impl std::fmt::Debug for HashProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashProgress")
            .field("bytes", &self.bytes())
            .finish_non_exhaustive()
    }
}

/// Computes ed2k fingerprints with a bounded pool of block workers.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    workers: usize,
    chunk_size: usize,
}

impl ContentHasher {
    /// Hasher keeping at most `workers` block digests in flight.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            chunk_size: ED2K_CHUNK_SIZE,
        }
    }

    /// Override the block size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fingerprint the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be opened or read, a worker error when a
    /// digest job fails, and [`FsOpsError::Cancelled`] when `cancel` fires first.
    pub async fn hash_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        progress: &HashProgress,
    ) -> FsOpsResult<Option<Ed2kHash>> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| FsOpsError::io("hash.open", path, source))?;
        let fingerprint = self
            .hash_stream(file, path, cancel, progress, Arc::new(md4_digest))
            .await?;
        debug!(
            path = %path.display(),
            bytes = progress.bytes(),
            fingerprint = ?fingerprint,
            "hashed file"
        );
        Ok(fingerprint)
    }

    /// Fingerprint an arbitrary async stream.
    ///
    /// # Errors
    ///
    /// See [`Self::hash_file`].
    pub async fn hash_reader<R>(
        &self,
        reader: R,
        cancel: &CancellationToken,
        progress: &HashProgress,
    ) -> FsOpsResult<Option<Ed2kHash>>
    where
        R: AsyncRead + Unpin,
    {
        self.hash_stream(reader, &PathBuf::new(), cancel, progress, Arc::new(md4_digest))
            .await
    }

    async fn hash_stream<R>(
        &self,
        mut reader: R,
        path: &Path,
        cancel: &CancellationToken,
        progress: &HashProgress,
        block_digest: BlockDigest,
    ) -> FsOpsResult<Option<Ed2kHash>>
    where
        R: AsyncRead + Unpin,
    {
        let mut jobs: JoinSet<(usize, [u8; 16])> = JoinSet::new();
        let mut digests: Vec<Option<[u8; 16]>> = Vec::new();

        loop {
            while jobs.len() >= self.workers {
                collect_next(&mut jobs, &mut digests, cancel, progress).await?;
            }

            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    jobs.abort_all();
                    return Err(FsOpsError::Cancelled { operation: "hash.read" });
                }
                read = read_chunk(&mut reader, self.chunk_size) => {
                    read.map_err(|source| FsOpsError::io("hash.read", path, source))?
                }
            };
            if chunk.is_empty() {
                break;
            }

            let index = digests.len();
            let is_last = chunk.len() < self.chunk_size;
            digests.push(None);
            let counter = progress.counter();
            let block_digest = Arc::clone(&block_digest);
            jobs.spawn_blocking(move || {
                let digest = block_digest(&chunk);
                counter.fetch_add(chunk.len() as u64, Ordering::AcqRel);
                (index, digest)
            });
            if is_last {
                break;
            }
        }

        while !jobs.is_empty() {
            collect_next(&mut jobs, &mut digests, cancel, progress).await?;
        }

        let ordered: Vec<[u8; 16]> = digests.into_iter().flatten().collect();
        Ok(match ordered.as_slice() {
            [] => None,
            [single] => Some(Ed2kHash(*single)),
            many => Some(Ed2kHash(md4_digest(&many.concat()))),
        })
    }
}

async fn collect_next(
    jobs: &mut JoinSet<(usize, [u8; 16])>,
    digests: &mut [Option<[u8; 16]>],
    cancel: &CancellationToken,
    progress: &HashProgress,
) -> FsOpsResult<()> {
    let joined = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            jobs.abort_all();
            return Err(FsOpsError::Cancelled { operation: "hash.digest" });
        }
        joined = jobs.join_next() => joined,
    };
    match joined {
        Some(Ok((index, digest))) => {
            if let Some(slot) = digests.get_mut(index) {
                *slot = Some(digest);
            }
            progress.notify();
            Ok(())
        }
        Some(Err(source)) => {
            jobs.abort_all();
            Err(FsOpsError::Worker {
                operation: "hash.digest",
                source,
            })
        }
        None => Ok(()),
    }
}

async fn read_chunk<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buffer.truncate(filled);
    Ok(buffer)
}

fn md4_digest(bytes: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md4::digest(bytes));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type TestResult<T> = anyhow::Result<T>;

    fn expected(data: &[u8], chunk: usize) -> Option<Ed2kHash> {
        let digests: Vec<[u8; 16]> = data.chunks(chunk).map(md4_digest).collect();
        match digests.as_slice() {
            [] => None,
            [single] => Some(Ed2kHash(*single)),
            many => Some(Ed2kHash(md4_digest(&many.concat()))),
        }
    }

    #[test]
    fn md4_matches_reference_vectors() {
        assert_eq!(
            Ed2kHash(md4_digest(b"")).to_hex(),
            "31d6cfe0d16ae931b73c59d7e0c089c0"
        );
        assert_eq!(
            Ed2kHash(md4_digest(b"abc")).to_hex(),
            "a448017aaf21d8525fc10ae87aa6729d"
        );
    }

    #[tokio::test]
    async fn empty_stream_has_no_fingerprint() -> TestResult<()> {
        let hasher = ContentHasher::new(2);
        let progress = HashProgress::new();
        let result = hasher
            .hash_reader(&b""[..], &CancellationToken::new(), &progress)
            .await?;
        assert_eq!(result, None);
        assert_eq!(progress.bytes(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn short_stream_is_single_digest() -> TestResult<()> {
        let hasher = ContentHasher::new(2).with_chunk_size(16);
        let data = b"abc";
        let result = hasher
            .hash_reader(&data[..], &CancellationToken::new(), &HashProgress::new())
            .await?;
        assert_eq!(result, Some(Ed2kHash(md4_digest(data))));
        Ok(())
    }

    #[tokio::test]
    async fn exactly_one_full_chunk_is_single_digest() -> TestResult<()> {
        let hasher = ContentHasher::new(2).with_chunk_size(8);
        let data = [7u8; 8];
        let result = hasher
            .hash_reader(&data[..], &CancellationToken::new(), &HashProgress::new())
            .await?;
        assert_eq!(result, Some(Ed2kHash(md4_digest(&data))));
        Ok(())
    }

    #[tokio::test]
    async fn multi_chunk_hash_is_order_preserving() -> TestResult<()> {
        let data: Vec<u8> = (0..1_000u32).map(|n| (n % 251) as u8).collect();
        for workers in [1, 3, 8] {
            let hasher = ContentHasher::new(workers).with_chunk_size(64);
            let progress = HashProgress::new();
            let result = hasher
                .hash_reader(data.as_slice(), &CancellationToken::new(), &progress)
                .await?;
            assert_eq!(result, expected(&data, 64));
            assert_eq!(progress.bytes(), 1_000);
        }
        Ok(())
    }

    #[tokio::test]
    async fn late_blocks_finishing_first_keep_index_order() -> TestResult<()> {
        let data: Vec<u8> = (0..4u8).flat_map(|index| [index; 4]).collect();
        let finished = Arc::new(Mutex::new(Vec::new()));
        let order = Arc::clone(&finished);
        let slow_early_blocks: BlockDigest = Arc::new(move |block: &[u8]| {
            let index = block.first().copied().unwrap_or_default();
            std::thread::sleep(std::time::Duration::from_millis(u64::from(3 - index) * 40));
            if let Ok(mut guard) = order.lock() {
                guard.push(index);
            }
            md4_digest(block)
        });

        let result = ContentHasher::new(4)
            .with_chunk_size(4)
            .hash_stream(
                data.as_slice(),
                Path::new("blocks"),
                &CancellationToken::new(),
                &HashProgress::new(),
                slow_early_blocks,
            )
            .await?;

        let completion = finished.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(completion.len(), 4);
        assert_ne!(completion, vec![0, 1, 2, 3]);
        assert_eq!(result, expected(&data, 4));
        Ok(())
    }

    #[tokio::test]
    async fn progress_is_monotonic() -> TestResult<()> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = HashProgress::new().with_listener(move |bytes| {
            if let Ok(mut guard) = sink.lock() {
                guard.push(bytes);
            }
        });
        let data = vec![1u8; 500];
        ContentHasher::new(4)
            .with_chunk_size(32)
            .hash_reader(data.as_slice(), &CancellationToken::new(), &progress)
            .await?;

        let values = seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        assert_eq!(values.len(), 16);
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(values.last().copied(), Some(500));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_token_aborts_hashing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = ContentHasher::new(2)
            .hash_reader(&[0u8; 64][..], &cancel, &HashProgress::new())
            .await;
        assert!(matches!(result, Err(FsOpsError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn hash_file_reports_missing_path() {
        let result = ContentHasher::new(1)
            .hash_file(
                Path::new("/nonexistent/file.mkv"),
                &CancellationToken::new(),
                &HashProgress::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(FsOpsError::Io {
                operation: "hash.open",
                ..
            })
        ));
    }
}
