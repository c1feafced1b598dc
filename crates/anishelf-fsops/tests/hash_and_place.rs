use std::fs;

use anishelf_config::RenameMode;
use anishelf_fsops::{ContentHasher, FsRenamer, HashProgress, PathTemplate, RenameOutcome, RenderContext};
use anishelf_protocol::{AnimeInfo, FileInfo};
use anishelf_test_support::fixtures::{media_bytes, write_media};
use md4::{Digest, Md4};
use tokio_util::sync::CancellationToken;

type TestResult<T> = anyhow::Result<T>;

fn md4(bytes: &[u8]) -> Vec<u8> {
    Md4::digest(bytes).to_vec()
}

#[tokio::test]
async fn file_hash_matches_manual_chunked_digest() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let path = write_media(dir.path(), "show.mkv", 4_500, 3)?;
    let body = media_bytes(4_500, 3);

    let progress = HashProgress::new();
    let hash = ContentHasher::new(3)
        .with_chunk_size(1_024)
        .hash_file(&path, &CancellationToken::new(), &progress)
        .await?
        .ok_or_else(|| anyhow::anyhow!("expected a fingerprint"))?;

    let concatenated: Vec<u8> = body.chunks(1_024).flat_map(md4).collect();
    assert_eq!(hash.0.to_vec(), md4(&concatenated));
    assert_eq!(progress.bytes(), 4_500);
    Ok(())
}

#[tokio::test]
async fn rendered_destination_receives_the_file() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let source = write_media(dir.path(), "incoming/[raw] ep05.mkv", 256, 9)?;
    let library = dir.path().join("library");

    let template = PathTemplate::compile("{romaji_name}/{romaji_name} - {episode_number} [{group_short_name}].{extension}")?;
    let file = FileInfo::with_id(312_498);
    let anime = AnimeInfo {
        romaji_name: Some("Sora no Woto".into()),
        episode_number: Some("05".into()),
        group_short_name: Some("Grp".into()),
        ..AnimeInfo::default()
    };
    let ctx = RenderContext {
        file: &file,
        anime: &anime,
        source: &source,
        resolution: None,
        ed2k: None,
    };

    let renamer = FsRenamer::new(&library, RenameMode::Move);
    let destination = renamer.plan(&template, &ctx)?;
    let outcome = renamer.rename(&source, &destination).await?;

    let expected = library.join("Sora no Woto/Sora no Woto - 05 [Grp].mkv");
    assert_eq!(outcome, RenameOutcome::Completed { destination: expected.clone(), mode: RenameMode::Move });
    assert_eq!(fs::read(expected)?, media_bytes(256, 9));
    assert!(!source.exists());
    Ok(())
}
