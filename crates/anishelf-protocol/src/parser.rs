//! Turns a pipe-delimited lookup reply into typed records.
//!
//! One cursor walks the whole line: the file id first, then every set file-mask flag,
//! then every set anime-mask flag, each in reply order. Tokens that fail to coerce leave
//! their field unset and are reported as [`CoercionFailure`]s instead of errors.

use tracing::debug;

use crate::error::{ParseError, ParseResult};
use crate::mask::{AnimeMask, FieldKind, FileMask, MaskLayout, AnimeLayout, FileLayout};
use crate::record::{AnimeInfo, FieldValue, FileInfo};

/// Token that could not be coerced into its field's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    /// Field name the token was meant for.
    pub field: &'static str,
    /// Expected token type.
    pub kind: FieldKind,
    /// Zero-based token index in the reply.
    pub index: usize,
    /// Raw token.
    pub token: String,
}

/// Records decoded from a single reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Per-file record; `file_id` is always populated.
    pub file: FileInfo,
    /// Per-title record; carries the anime and episode ids from the file record.
    pub anime: AnimeInfo,
    /// Tokens left unset because they did not match their field type.
    pub coercion_failures: Vec<CoercionFailure>,
}

/// Stateless reply decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Decode `raw` using the exact masks that produced it.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedResponse`] when the file id is not an integer or
    /// the reply has fewer tokens than the masks select, and
    /// [`ParseError::UnmappedFlag`] when a mask sets a reserved bit.
    pub fn parse(raw: &str, file_mask: &FileMask, anime_mask: &AnimeMask) -> ParseResult<ParsedReply> {
        let line = raw.trim_end_matches(['\r', '\n']);
        let mut cursor = Cursor {
            tokens: line.split('|').collect(),
            index: 0,
        };

        let id_token = cursor.next()?;
        let file_id: i64 = id_token
            .parse()
            .map_err(|_| ParseError::MalformedResponse {
                reason: "file_id_not_numeric",
                index: 0,
                token: Some(id_token.to_string()),
            })?;

        let mut failures = Vec::new();
        let mut file = FileInfo::with_id(file_id);
        for flag in file_mask.flags() {
            let field = flag.field.ok_or(ParseError::UnmappedFlag {
                layout: FileLayout::NAME,
                segment: flag.segment,
                bit: flag.bit,
            })?;
            let index = cursor.index;
            let token = cursor.next()?;
            match coerce(field.kind(), token) {
                Coerced::Value(value) => file.set(field, value),
                Coerced::Absent => {}
                Coerced::Failed => failures.push(failure(field.name(), field.kind(), index, token)),
            }
        }

        let mut anime = AnimeInfo {
            anime_id: file.anime_id,
            episode_id: file.episode_id,
            ..AnimeInfo::default()
        };
        for flag in anime_mask.flags() {
            let field = flag.field.ok_or(ParseError::UnmappedFlag {
                layout: AnimeLayout::NAME,
                segment: flag.segment,
                bit: flag.bit,
            })?;
            let index = cursor.index;
            let token = cursor.next()?;
            match coerce(field.kind(), token) {
                Coerced::Value(value) => anime.set(field, value),
                Coerced::Absent => {}
                Coerced::Failed => failures.push(failure(field.name(), field.kind(), index, token)),
            }
        }

        if cursor.index < cursor.tokens.len() {
            debug!(
                file_id,
                extra = cursor.tokens.len() - cursor.index,
                "reply carried more tokens than requested"
            );
        }

        Ok(ParsedReply {
            file,
            anime,
            coercion_failures: failures,
        })
    }
}

/// Undo the server's string escaping.
#[must_use]
pub fn unescape(token: &str) -> String {
    token
        .replace("<br />", "\n")
        .replace("<br/>", "\n")
        .replace('`', "'")
        .replace('/', "|")
}

struct Cursor<'a> {
    tokens: Vec<&'a str>,
    index: usize,
}

impl<'a> Cursor<'a> {
    fn next(&mut self) -> ParseResult<&'a str> {
        let token = self
            .tokens
            .get(self.index)
            .copied()
            .ok_or(ParseError::MalformedResponse {
                reason: "missing_token",
                index: self.index,
                token: None,
            })?;
        self.index += 1;
        Ok(token)
    }
}

enum Coerced {
    Value(FieldValue),
    Absent,
    Failed,
}

fn coerce(kind: FieldKind, token: &str) -> Coerced {
    if kind == FieldKind::Text {
        return Coerced::Value(FieldValue::Text(unescape(token)));
    }
    if token.is_empty() {
        return Coerced::Absent;
    }
    let value = match kind {
        FieldKind::Bytes => hex::decode(token).ok().map(FieldValue::Bytes),
        FieldKind::Short => token.parse().ok().map(FieldValue::Short),
        FieldKind::Int => token.parse().ok().map(FieldValue::Int),
        FieldKind::Long => token.parse().ok().map(FieldValue::Long),
        FieldKind::Text => None,
    };
    value.map_or(Coerced::Failed, Coerced::Value)
}

fn failure(field: &'static str, kind: FieldKind, index: usize, token: &str) -> CoercionFailure {
    debug!(field, ?kind, index, token, "field coercion failed; leaving unset");
    CoercionFailure {
        field,
        kind,
        index,
        token: token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{AnimeField, FileField};

    const REPLY: &str = "312498|4688|69260|4243|0||0|1|177747474|70cd93fd3981cc80a8ea6a646ff805c9|b2a7c7d591333e20495de3571b235c28|7af9b962c17ff729baeee67533e5219526cd5095|a200fe73|high|DTV|Vorbis (Ogg Vorbis)|104|H264/AVC|800|704x400|japanese|english`english`english|1560||1175472000|26|26|01|The Wings to the Sky|Sora he no Tsubasa|????|#nanoha-DamagedGoodz|Nanoha-DGz";

    #[test]
    fn parses_documented_reply() -> anyhow::Result<()> {
        let file_mask = FileMask::decode_hex("7FF8FEF8")?;
        let anime_mask = AnimeMask::decode_hex("C000F0C0")?;
        let parsed = ResponseParser::parse(REPLY, &file_mask, &anime_mask)?;

        assert_eq!(parsed.file.file_id, Some(312_498));
        assert_eq!(parsed.file.anime_id, Some(4688));
        assert_eq!(parsed.file.other_episodes.as_deref(), Some(""));
        assert_eq!(parsed.file.state, Some(1));
        assert_eq!(parsed.file.size, Some(177_747_474));
        assert_eq!(parsed.file.crc32_hash, Some(vec![0xa2, 0x00, 0xfe, 0x73]));
        assert_eq!(parsed.file.video_codec.as_deref(), Some("H264|AVC"));
        assert_eq!(parsed.file.video_resolution.as_deref(), Some("704x400"));
        assert_eq!(
            parsed.file.sub_language.as_deref(),
            Some("english'english'english")
        );
        assert_eq!(parsed.file.aired_date, Some(1_175_472_000));
        assert_eq!(parsed.file.file_type, None);
        assert_eq!(parsed.anime.total_episodes, Some(26));
        assert_eq!(parsed.anime.anime_id, Some(4688));
        assert_eq!(parsed.anime.episode_number.as_deref(), Some("01"));
        assert_eq!(parsed.anime.group_short_name.as_deref(), Some("Nanoha-DGz"));
        assert!(parsed.coercion_failures.is_empty());
        Ok(())
    }

    #[test]
    fn non_numeric_file_id_is_malformed() -> anyhow::Result<()> {
        let err = ResponseParser::parse("abc|1", &FileMask::empty(), &AnimeMask::empty());
        assert!(matches!(
            err,
            Err(ParseError::MalformedResponse {
                reason: "file_id_not_numeric",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn padded_file_id_is_malformed() {
        for raw in [" 312498|1", "312498 |1", "\t312498"] {
            let err = ResponseParser::parse(raw, &FileMask::empty(), &AnimeMask::empty());
            assert!(
                matches!(
                    err,
                    Err(ParseError::MalformedResponse {
                        reason: "file_id_not_numeric",
                        index: 0,
                        ..
                    })
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn short_reply_is_malformed() {
        let mask = FileMask::from_fields([FileField::AnimeId, FileField::EpisodeId]);
        let err = ResponseParser::parse("1|2", &mask, &AnimeMask::empty());
        assert!(matches!(
            err,
            Err(ParseError::MalformedResponse {
                reason: "missing_token",
                index: 2,
                ..
            })
        ));
    }

    #[test]
    fn reserved_bit_is_unmapped() -> anyhow::Result<()> {
        let mask = FileMask::decode_hex("80")?;
        let err = ResponseParser::parse("1|x", &mask, &AnimeMask::empty());
        assert!(matches!(err, Err(ParseError::UnmappedFlag { bit: 128, .. })));
        Ok(())
    }

    #[test]
    fn coercion_failures_leave_fields_unset() -> anyhow::Result<()> {
        let file_mask = FileMask::from_fields([FileField::Size, FileField::Ed2kHash]);
        let anime_mask = AnimeMask::from_fields([AnimeField::TotalEpisodes]);
        let parsed = ResponseParser::parse("5|big|abc|", &file_mask, &anime_mask)?;

        assert_eq!(parsed.file.size, None);
        assert_eq!(parsed.file.ed2k_hash, None);
        assert_eq!(parsed.anime.total_episodes, None);
        let fields: Vec<_> = parsed.coercion_failures.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["size", "ed2k_hash"]);
        assert_eq!(parsed.coercion_failures[0].index, 1);
        Ok(())
    }

    #[test]
    fn unescape_handles_line_breaks_before_slashes() {
        assert_eq!(unescape("a<br />b<br/>c"), "a\nb\nc");
        assert_eq!(unescape("it`s a/b"), "it's a|b");
    }
}
