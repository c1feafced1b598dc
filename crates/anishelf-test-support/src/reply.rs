//! Build reply lines from records, the inverse of the response parser.

use anishelf_protocol::{AnimeInfo, AnimeMask, FieldValue, FileInfo, FileMask};

/// Encode `file` and `anime` as the line a server would send for the given masks.
///
/// Unset fields become empty tokens; reserved bits are skipped.
#[must_use]
pub fn encode_reply(file: &FileInfo, anime: &AnimeInfo, file_mask: &FileMask, anime_mask: &AnimeMask) -> String {
    let mut tokens = vec![file.file_id.map(|id| id.to_string()).unwrap_or_default()];
    tokens.extend(file_mask.fields().map(|field| token(file.get(field))));
    tokens.extend(anime_mask.fields().map(|field| token(anime.get(field))));
    tokens.join("|")
}

fn token(value: Option<FieldValue>) -> String {
    match value {
        None => String::new(),
        Some(FieldValue::Bytes(bytes)) => hex::encode(bytes),
        Some(FieldValue::Short(value)) => value.to_string(),
        Some(FieldValue::Int(value)) => value.to_string(),
        Some(FieldValue::Long(value)) => value.to_string(),
        Some(FieldValue::Text(text)) => escape(&text),
    }
}

fn escape(text: &str) -> String {
    text.replace('\n', "<br />")
        .replace('|', "/")
        .replace('\'', "`")
}
