//! Offline session answering lookups from recorded replies.
//!
//! Each reply is stored with the masks it was captured under. A request whose masks
//! are covered by the recorded ones gets the reply re-projected onto its own masks; a
//! request asking for anything the recording lacks fails that request.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LookupError;
use crate::mask::{AnimeMask, FileMask, MaskFlag};
use crate::session::{AuthOutcome, Credentials, LookupReply, LookupRequest, LookupResult, LookupSession};

/// On-disk form of a replay file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayDocument {
    /// Whether logins succeed.
    #[serde(default = "default_accept_login")]
    pub accept_login: bool,
    /// Recorded replies keyed by ed2k hex.
    #[serde(default)]
    pub replies: HashMap<String, RecordedReply>,
}

/// A raw reply line and the masks that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedReply {
    /// File mask the reply was captured with.
    pub file_mask: FileMask,
    /// Anime mask the reply was captured with.
    pub anime_mask: AnimeMask,
    /// Raw pipe-delimited line.
    pub reply: String,
}

const fn default_accept_login() -> bool {
    true
}

/// [`LookupSession`] backed by a [`ReplayDocument`].
#[derive(Debug, Clone)]
pub struct ReplaySession {
    document: ReplayDocument,
}

impl ReplaySession {
    /// Wrap an in-memory document.
    #[must_use]
    pub fn new(mut document: ReplayDocument) -> Self {
        document.replies = document
            .replies
            .into_iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .collect();
        Self { document }
    }

    /// Read a replay document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Session`] when the file cannot be read or parsed.
    pub async fn load(path: &Path) -> LookupResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LookupError::session("replay.read", source))?;
        let document: ReplayDocument = serde_json::from_str(&raw)
            .map_err(|source| LookupError::session("replay.parse", source))?;
        debug!(path = %path.display(), replies = document.replies.len(), "loaded replay session");
        Ok(Self::new(document))
    }
}

#[async_trait]
impl LookupSession for ReplaySession {
    async fn authenticate(&self, _credentials: &Credentials) -> LookupResult<AuthOutcome> {
        Ok(AuthOutcome {
            success: self.document.accept_login,
            has_new_version: false,
        })
    }

    async fn lookup_by_hash(&self, request: &LookupRequest) -> LookupResult<LookupReply> {
        match self.document.replies.get(&request.ed2k.to_hex()) {
            Some(recorded) => project(recorded, &request.file_mask, &request.anime_mask).map(LookupReply::Found),
            None => Ok(LookupReply::NotFound),
        }
    }
}

type FlagKey = (usize, u8);

fn key<F>(flag: MaskFlag<F>) -> FlagKey {
    (flag.segment, flag.bit)
}

/// Rewrite `recorded` as if it had been requested with `file_mask` and `anime_mask`.
fn project(recorded: &RecordedReply, file_mask: &FileMask, anime_mask: &AnimeMask) -> LookupResult<String> {
    if recorded.file_mask == *file_mask && recorded.anime_mask == *anime_mask {
        return Ok(recorded.reply.clone());
    }
    if !recorded.file_mask.contains_all(file_mask) || !recorded.anime_mask.contains_all(anime_mask) {
        debug!(
            recorded_file = %recorded.file_mask,
            recorded_anime = %recorded.anime_mask,
            requested_file = %file_mask,
            requested_anime = %anime_mask,
            "recorded reply does not cover the request"
        );
        return Err(LookupError::request(
            "replay.mask_mismatch",
            "recorded reply lacks requested fields",
        ));
    }

    let line = recorded.reply.trim_end_matches(['\r', '\n']);
    let mut tokens = line.split('|');
    let file_id = tokens.next().unwrap_or_default();
    let file_tokens = index_tokens(recorded.file_mask.flags().map(key), &mut tokens)?;
    let anime_tokens = index_tokens(recorded.anime_mask.flags().map(key), &mut tokens)?;

    let mut projected = vec![file_id];
    pick(file_mask.flags().map(key), &file_tokens, &mut projected)?;
    pick(anime_mask.flags().map(key), &anime_tokens, &mut projected)?;
    Ok(projected.join("|"))
}

fn index_tokens<'a>(
    keys: impl Iterator<Item = FlagKey>,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> LookupResult<HashMap<FlagKey, &'a str>> {
    keys.map(|key| {
        tokens.next().map(|token| (key, token)).ok_or_else(|| {
            LookupError::request("replay.short_reply", "recorded reply has fewer tokens than its masks select")
        })
    })
    .collect()
}

fn pick<'a>(
    keys: impl Iterator<Item = FlagKey>,
    recorded: &HashMap<FlagKey, &'a str>,
    projected: &mut Vec<&'a str>,
) -> LookupResult<()> {
    for key in keys {
        let token = recorded.get(&key).ok_or_else(|| {
            LookupError::request("replay.mask_mismatch", "recorded reply lacks requested fields")
        })?;
        projected.push(*token);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{AnimeField, FileField};
    use crate::parser::ResponseParser;
    use crate::record::Ed2kHash;

    const REPLY: &str = "312498|4688|69260|4243|0||0|1|177747474|70cd93fd3981cc80a8ea6a646ff805c9|b2a7c7d591333e20495de3571b235c28|7af9b962c17ff729baeee67533e5219526cd5095|a200fe73|high|DTV|Vorbis (Ogg Vorbis)|104|H264/AVC|800|704x400|japanese|english`english`english|1560||1175472000|26|26|01|The Wings to the Sky|Sora he no Tsubasa|????|#nanoha-DamagedGoodz|Nanoha-DGz";

    fn request(hash: Ed2kHash, file_mask: FileMask, anime_mask: AnimeMask) -> LookupRequest {
        LookupRequest {
            size: 1,
            ed2k: hash,
            file_mask,
            anime_mask,
        }
    }

    fn recorded_session(hash: Ed2kHash) -> anyhow::Result<ReplaySession> {
        let recorded = RecordedReply {
            file_mask: FileMask::decode_hex("7FF8FEF8")?,
            anime_mask: AnimeMask::decode_hex("C000F0C0")?,
            reply: REPLY.to_string(),
        };
        Ok(ReplaySession::new(ReplayDocument {
            accept_login: true,
            replies: HashMap::from([(hash.to_hex(), recorded)]),
        }))
    }

    #[tokio::test]
    async fn load_answers_recorded_hashes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("replay.json");
        let hash = Ed2kHash([0x0F; 16]);
        let document = ReplayDocument {
            accept_login: true,
            replies: HashMap::from([(
                hash.to_hex().to_uppercase(),
                RecordedReply {
                    file_mask: FileMask::empty(),
                    anime_mask: AnimeMask::empty(),
                    reply: "42".to_string(),
                },
            )]),
        };
        tokio::fs::write(&path, serde_json::to_string(&document)?).await?;

        let session = ReplaySession::load(&path).await?;
        let empty = (FileMask::empty(), AnimeMask::empty());
        assert_eq!(
            session.lookup_by_hash(&request(hash, empty.0, empty.1)).await?,
            LookupReply::Found("42".into())
        );
        assert_eq!(
            session
                .lookup_by_hash(&request(Ed2kHash([0; 16]), empty.0, empty.1))
                .await?,
            LookupReply::NotFound
        );
        let outcome = session.authenticate(&Credentials::default()).await?;
        assert!(outcome.success);
        assert_eq!(session.max_in_flight(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn narrower_masks_get_a_reprojected_reply() -> anyhow::Result<()> {
        let hash = Ed2kHash([0x21; 16]);
        let session = recorded_session(hash)?;
        let file_mask = FileMask::from_fields([FileField::AnimeId, FileField::GroupId, FileField::State]);
        let anime_mask = AnimeMask::from_fields([AnimeField::EpisodeNumber, AnimeField::GroupShortName]);

        let LookupReply::Found(raw) = session
            .lookup_by_hash(&request(hash, file_mask, anime_mask))
            .await?
        else {
            anyhow::bail!("recorded hash was not found");
        };
        let parsed = ResponseParser::parse(&raw, &file_mask, &anime_mask)?;
        assert_eq!(parsed.file.file_id, Some(312_498));
        assert_eq!(parsed.file.anime_id, Some(4688));
        assert_eq!(parsed.file.episode_id, None);
        assert_eq!(parsed.file.group_id, Some(4243));
        assert_eq!(parsed.file.state, Some(1));
        assert_eq!(parsed.anime.episode_number.as_deref(), Some("01"));
        assert_eq!(parsed.anime.group_short_name.as_deref(), Some("Nanoha-DGz"));
        assert!(parsed.coercion_failures.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn masks_beyond_the_recording_fail_the_request() -> anyhow::Result<()> {
        let hash = Ed2kHash([0x22; 16]);
        let session = recorded_session(hash)?;
        let file_mask = FileMask::from_fields([FileField::AnimeId, FileField::FileType]);

        let result = session
            .lookup_by_hash(&request(hash, file_mask, AnimeMask::empty()))
            .await;
        assert!(matches!(
            result,
            Err(LookupError::Request {
                operation: "replay.mask_mismatch",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn truncated_recordings_fail_the_request() -> anyhow::Result<()> {
        let hash = Ed2kHash([0x23; 16]);
        let file_mask = FileMask::from_fields([FileField::AnimeId, FileField::EpisodeId]);
        let session = ReplaySession::new(ReplayDocument {
            accept_login: true,
            replies: HashMap::from([(
                hash.to_hex(),
                RecordedReply {
                    file_mask,
                    anime_mask: AnimeMask::empty(),
                    reply: "7|1".to_string(),
                },
            )]),
        });

        let narrower = FileMask::from_fields([FileField::AnimeId]);
        let result = session
            .lookup_by_hash(&request(hash, narrower, AnimeMask::empty()))
            .await;
        assert!(matches!(
            result,
            Err(LookupError::Request {
                operation: "replay.short_reply",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn load_failure_is_session_error() {
        let result = ReplaySession::load(Path::new("/nonexistent/replay.json")).await;
        assert!(matches!(result, Err(err) if err.is_fatal()));
    }
}
