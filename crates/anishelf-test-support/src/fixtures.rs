//! Test fixtures: media files on disk and a documented lookup reply.

use std::fs;
use std::path::{Path, PathBuf};

/// File mask hex used by [`SAMPLE_REPLY`].
pub const SAMPLE_FILE_MASK: &str = "7FF8FEF8";

/// Anime mask hex used by [`SAMPLE_REPLY`].
pub const SAMPLE_ANIME_MASK: &str = "C000F0C0";

/// A complete reply line for [`SAMPLE_FILE_MASK`] and [`SAMPLE_ANIME_MASK`].
pub const SAMPLE_REPLY: &str = "312498|4688|69260|4243|0||0|1|177747474|70cd93fd3981cc80a8ea6a646ff805c9|b2a7c7d591333e20495de3571b235c28|7af9b962c17ff729baeee67533e5219526cd5095|a200fe73|high|DTV|Vorbis (Ogg Vorbis)|104|H264/AVC|800|704x400|japanese|english`english`english|1560||1175472000|26|26|01|The Wings to the Sky|Sora he no Tsubasa|????|#nanoha-DamagedGoodz|Nanoha-DGz";

/// Deterministic pseudo-random bytes.
#[must_use]
pub fn media_bytes(len: usize, seed: u8) -> Vec<u8> {
    let mut state = u32::from(seed).wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state.to_le_bytes()[0]
        })
        .collect()
}

/// Write `len` deterministic bytes to `dir/name`, creating parents.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_media(dir: &Path, name: &str, len: usize, seed: u8) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, media_bytes(len, seed))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_bytes_are_deterministic_per_seed() {
        assert_eq!(media_bytes(64, 1), media_bytes(64, 1));
        assert_ne!(media_bytes(64, 1), media_bytes(64, 2));
    }

    #[test]
    fn write_media_creates_parents() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_media(dir.path(), "nested/show.mkv", 32, 7)?;
        assert_eq!(fs::read(path)?.len(), 32);
        Ok(())
    }
}
