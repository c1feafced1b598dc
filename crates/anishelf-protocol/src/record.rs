//! Sparse metadata records populated from lookup replies.
//!
//! Every field is optional: only fields selected by the request mask are attempted.
//! Field access goes through the mask field enums so parsing and merging share one
//! declared field list per record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::mask::{AnimeField, FileField};

/// Typed value of one reply token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Raw bytes decoded from hex.
    Bytes(Vec<u8>),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// Unescaped text.
    Text(String),
}

impl FieldValue {
    fn bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    const fn short(&self) -> Option<i16> {
        match self {
            Self::Short(value) => Some(*value),
            _ => None,
        }
    }

    const fn int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    const fn long(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    fn text(self) -> Option<String> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Per-file metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FileInfo {
    pub file_id: Option<i64>,
    pub anime_id: Option<i64>,
    pub episode_id: Option<i64>,
    pub group_id: Option<i64>,
    pub mylist_id: Option<i64>,
    pub other_episodes: Option<String>,
    pub is_deprecated: Option<i16>,
    pub state: Option<i16>,
    pub size: Option<i64>,
    pub ed2k_hash: Option<Vec<u8>>,
    pub md5_hash: Option<Vec<u8>>,
    pub sha1_hash: Option<Vec<u8>>,
    pub crc32_hash: Option<Vec<u8>>,
    pub video_colour_depth: Option<String>,
    pub quality: Option<String>,
    pub source: Option<String>,
    pub audio_codecs: Option<String>,
    pub audio_bitrates: Option<String>,
    pub video_codec: Option<String>,
    pub video_bitrate: Option<i32>,
    pub video_resolution: Option<String>,
    pub file_type: Option<String>,
    pub dub_language: Option<String>,
    pub sub_language: Option<String>,
    pub length_seconds: Option<i32>,
    pub description: Option<String>,
    pub aired_date: Option<i64>,
    pub anidb_file_name: Option<String>,
    pub mylist_state: Option<i16>,
    pub mylist_file_state: Option<i16>,
    pub mylist_viewed: Option<i16>,
    pub mylist_view_date: Option<i64>,
    pub mylist_storage: Option<String>,
    pub mylist_source: Option<String>,
    pub mylist_other: Option<String>,
}

impl FileInfo {
    /// Empty record for a known file id.
    #[must_use]
    pub fn with_id(file_id: i64) -> Self {
        Self {
            file_id: Some(file_id),
            ..Self::default()
        }
    }

    /// Assign a coerced value; values of the wrong kind leave the field untouched.
    pub fn set(&mut self, field: FileField, value: FieldValue) {
        match field {
            FileField::AnimeId => self.anime_id = value.long(),
            FileField::EpisodeId => self.episode_id = value.long(),
            FileField::GroupId => self.group_id = value.long(),
            FileField::MylistId => self.mylist_id = value.long(),
            FileField::OtherEpisodes => self.other_episodes = value.text(),
            FileField::IsDeprecated => self.is_deprecated = value.short(),
            FileField::State => self.state = value.short(),
            FileField::Size => self.size = value.long(),
            FileField::Ed2kHash => self.ed2k_hash = value.bytes(),
            FileField::Md5Hash => self.md5_hash = value.bytes(),
            FileField::Sha1Hash => self.sha1_hash = value.bytes(),
            FileField::Crc32Hash => self.crc32_hash = value.bytes(),
            FileField::VideoColourDepth => self.video_colour_depth = value.text(),
            FileField::Quality => self.quality = value.text(),
            FileField::Source => self.source = value.text(),
            FileField::AudioCodecs => self.audio_codecs = value.text(),
            FileField::AudioBitrates => self.audio_bitrates = value.text(),
            FileField::VideoCodec => self.video_codec = value.text(),
            FileField::VideoBitrate => self.video_bitrate = value.int(),
            FileField::VideoResolution => self.video_resolution = value.text(),
            FileField::FileType => self.file_type = value.text(),
            FileField::DubLanguage => self.dub_language = value.text(),
            FileField::SubLanguage => self.sub_language = value.text(),
            FileField::LengthSeconds => self.length_seconds = value.int(),
            FileField::Description => self.description = value.text(),
            FileField::AiredDate => self.aired_date = value.long(),
            FileField::AnidbFileName => self.anidb_file_name = value.text(),
            FileField::MylistState => self.mylist_state = value.short(),
            FileField::MylistFileState => self.mylist_file_state = value.short(),
            FileField::MylistViewed => self.mylist_viewed = value.short(),
            FileField::MylistViewDate => self.mylist_view_date = value.long(),
            FileField::MylistStorage => self.mylist_storage = value.text(),
            FileField::MylistSource => self.mylist_source = value.text(),
            FileField::MylistOther => self.mylist_other = value.text(),
        }
    }

    /// Current value of a field, if populated.
    #[must_use]
    pub fn get(&self, field: FileField) -> Option<FieldValue> {
        match field {
            FileField::AnimeId => self.anime_id.map(FieldValue::Long),
            FileField::EpisodeId => self.episode_id.map(FieldValue::Long),
            FileField::GroupId => self.group_id.map(FieldValue::Long),
            FileField::MylistId => self.mylist_id.map(FieldValue::Long),
            FileField::OtherEpisodes => self.other_episodes.clone().map(FieldValue::Text),
            FileField::IsDeprecated => self.is_deprecated.map(FieldValue::Short),
            FileField::State => self.state.map(FieldValue::Short),
            FileField::Size => self.size.map(FieldValue::Long),
            FileField::Ed2kHash => self.ed2k_hash.clone().map(FieldValue::Bytes),
            FileField::Md5Hash => self.md5_hash.clone().map(FieldValue::Bytes),
            FileField::Sha1Hash => self.sha1_hash.clone().map(FieldValue::Bytes),
            FileField::Crc32Hash => self.crc32_hash.clone().map(FieldValue::Bytes),
            FileField::VideoColourDepth => self.video_colour_depth.clone().map(FieldValue::Text),
            FileField::Quality => self.quality.clone().map(FieldValue::Text),
            FileField::Source => self.source.clone().map(FieldValue::Text),
            FileField::AudioCodecs => self.audio_codecs.clone().map(FieldValue::Text),
            FileField::AudioBitrates => self.audio_bitrates.clone().map(FieldValue::Text),
            FileField::VideoCodec => self.video_codec.clone().map(FieldValue::Text),
            FileField::VideoBitrate => self.video_bitrate.map(FieldValue::Int),
            FileField::VideoResolution => self.video_resolution.clone().map(FieldValue::Text),
            FileField::FileType => self.file_type.clone().map(FieldValue::Text),
            FileField::DubLanguage => self.dub_language.clone().map(FieldValue::Text),
            FileField::SubLanguage => self.sub_language.clone().map(FieldValue::Text),
            FileField::LengthSeconds => self.length_seconds.map(FieldValue::Int),
            FileField::Description => self.description.clone().map(FieldValue::Text),
            FileField::AiredDate => self.aired_date.map(FieldValue::Long),
            FileField::AnidbFileName => self.anidb_file_name.clone().map(FieldValue::Text),
            FileField::MylistState => self.mylist_state.map(FieldValue::Short),
            FileField::MylistFileState => self.mylist_file_state.map(FieldValue::Short),
            FileField::MylistViewed => self.mylist_viewed.map(FieldValue::Short),
            FileField::MylistViewDate => self.mylist_view_date.map(FieldValue::Long),
            FileField::MylistStorage => self.mylist_storage.clone().map(FieldValue::Text),
            FileField::MylistSource => self.mylist_source.clone().map(FieldValue::Text),
            FileField::MylistOther => self.mylist_other.clone().map(FieldValue::Text),
        }
    }

    /// Combine two partial records of the same file, preferring `self`'s populated fields.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::IdentityMismatch`] when both records carry different file ids.
    pub fn merge(&self, other: &Self) -> Result<Self, MergeError> {
        if let (Some(left), Some(right)) = (self.file_id, other.file_id)
            && left != right
        {
            return Err(MergeError::IdentityMismatch {
                record: "file_info",
                left: Some(left),
                right: Some(right),
            });
        }
        let mut merged = self.clone();
        merged.file_id = self.file_id.or(other.file_id);
        for field in FileField::ALL {
            if merged.get(field).is_none()
                && let Some(value) = other.get(field)
            {
                merged.set(field, value);
            }
        }
        Ok(merged)
    }

    /// Decoded view of the `state` bit field.
    #[must_use]
    pub fn file_state(&self) -> Option<FileState> {
        self.state.map(FileState::from_bits)
    }

    /// Parsed `video_resolution`, when present and well formed.
    #[must_use]
    pub fn resolution(&self) -> Option<Resolution> {
        self.video_resolution.as_deref()?.parse().ok()
    }
}

/// Per-title and per-episode metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AnimeInfo {
    pub anime_id: Option<i64>,
    pub episode_id: Option<i64>,
    pub total_episodes: Option<i32>,
    pub highest_episode_number: Option<i32>,
    pub year: Option<String>,
    pub kind: Option<String>,
    pub related_aid_list: Option<String>,
    pub related_aid_type: Option<String>,
    pub category_list: Option<String>,
    pub romaji_name: Option<String>,
    pub kanji_name: Option<String>,
    pub english_name: Option<String>,
    pub other_name: Option<String>,
    pub short_name_list: Option<String>,
    pub synonym_list: Option<String>,
    pub episode_number: Option<String>,
    pub episode_name: Option<String>,
    pub episode_romaji_name: Option<String>,
    pub episode_kanji_name: Option<String>,
    pub episode_rating: Option<i32>,
    pub episode_vote_count: Option<i32>,
    pub group_name: Option<String>,
    pub group_short_name: Option<String>,
    pub date_record_updated: Option<i64>,
}

impl AnimeInfo {
    /// Assign a coerced value; values of the wrong kind leave the field untouched.
    pub fn set(&mut self, field: AnimeField, value: FieldValue) {
        match field {
            AnimeField::TotalEpisodes => self.total_episodes = value.int(),
            AnimeField::HighestEpisodeNumber => self.highest_episode_number = value.int(),
            AnimeField::Year => self.year = value.text(),
            AnimeField::Kind => self.kind = value.text(),
            AnimeField::RelatedAidList => self.related_aid_list = value.text(),
            AnimeField::RelatedAidType => self.related_aid_type = value.text(),
            AnimeField::CategoryList => self.category_list = value.text(),
            AnimeField::RomajiName => self.romaji_name = value.text(),
            AnimeField::KanjiName => self.kanji_name = value.text(),
            AnimeField::EnglishName => self.english_name = value.text(),
            AnimeField::OtherName => self.other_name = value.text(),
            AnimeField::ShortNameList => self.short_name_list = value.text(),
            AnimeField::SynonymList => self.synonym_list = value.text(),
            AnimeField::EpisodeNumber => self.episode_number = value.text(),
            AnimeField::EpisodeName => self.episode_name = value.text(),
            AnimeField::EpisodeRomajiName => self.episode_romaji_name = value.text(),
            AnimeField::EpisodeKanjiName => self.episode_kanji_name = value.text(),
            AnimeField::EpisodeRating => self.episode_rating = value.int(),
            AnimeField::EpisodeVoteCount => self.episode_vote_count = value.int(),
            AnimeField::GroupName => self.group_name = value.text(),
            AnimeField::GroupShortName => self.group_short_name = value.text(),
            AnimeField::DateRecordUpdated => self.date_record_updated = value.long(),
        }
    }

    /// Current value of a field, if populated.
    #[must_use]
    pub fn get(&self, field: AnimeField) -> Option<FieldValue> {
        match field {
            AnimeField::TotalEpisodes => self.total_episodes.map(FieldValue::Int),
            AnimeField::HighestEpisodeNumber => self.highest_episode_number.map(FieldValue::Int),
            AnimeField::Year => self.year.clone().map(FieldValue::Text),
            AnimeField::Kind => self.kind.clone().map(FieldValue::Text),
            AnimeField::RelatedAidList => self.related_aid_list.clone().map(FieldValue::Text),
            AnimeField::RelatedAidType => self.related_aid_type.clone().map(FieldValue::Text),
            AnimeField::CategoryList => self.category_list.clone().map(FieldValue::Text),
            AnimeField::RomajiName => self.romaji_name.clone().map(FieldValue::Text),
            AnimeField::KanjiName => self.kanji_name.clone().map(FieldValue::Text),
            AnimeField::EnglishName => self.english_name.clone().map(FieldValue::Text),
            AnimeField::OtherName => self.other_name.clone().map(FieldValue::Text),
            AnimeField::ShortNameList => self.short_name_list.clone().map(FieldValue::Text),
            AnimeField::SynonymList => self.synonym_list.clone().map(FieldValue::Text),
            AnimeField::EpisodeNumber => self.episode_number.clone().map(FieldValue::Text),
            AnimeField::EpisodeName => self.episode_name.clone().map(FieldValue::Text),
            AnimeField::EpisodeRomajiName => self.episode_romaji_name.clone().map(FieldValue::Text),
            AnimeField::EpisodeKanjiName => self.episode_kanji_name.clone().map(FieldValue::Text),
            AnimeField::EpisodeRating => self.episode_rating.map(FieldValue::Int),
            AnimeField::EpisodeVoteCount => self.episode_vote_count.map(FieldValue::Int),
            AnimeField::GroupName => self.group_name.clone().map(FieldValue::Text),
            AnimeField::GroupShortName => self.group_short_name.clone().map(FieldValue::Text),
            AnimeField::DateRecordUpdated => self.date_record_updated.map(FieldValue::Long),
        }
    }

    /// Combine two partial records of the same title, preferring `self`'s populated fields.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::IdentityMismatch`] when both records carry different anime ids.
    pub fn merge(&self, other: &Self) -> Result<Self, MergeError> {
        if let (Some(left), Some(right)) = (self.anime_id, other.anime_id)
            && left != right
        {
            return Err(MergeError::IdentityMismatch {
                record: "anime_info",
                left: Some(left),
                right: Some(right),
            });
        }
        let mut merged = self.clone();
        merged.anime_id = self.anime_id.or(other.anime_id);
        merged.episode_id = self.episode_id.or(other.episode_id);
        for field in AnimeField::ALL {
            if merged.get(field).is_none()
                && let Some(value) = other.get(field)
            {
                merged.set(field, value);
            }
        }
        Ok(merged)
    }
}

/// Frame size of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Horizontal pixels.
    pub width: u32,
    /// Vertical pixels.
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Failure to read a `WIDTHxHEIGHT` token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("resolution token is malformed")]
pub struct ResolutionParseError {
    /// Offending token.
    pub value: String,
}

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || ResolutionParseError {
            value: value.to_string(),
        };
        let (width, height) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(malformed)?;
        let width: u32 = width.parse().map_err(|_| malformed())?;
        let height: u32 = height.parse().map_err(|_| malformed())?;
        if width == 0 || height == 0 {
            return Err(malformed());
        }
        Ok(Self { width, height })
    }
}

/// Decoded `state` bits of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// CRC matched the official release.
    pub crc_ok: bool,
    /// CRC did not match the official release.
    pub crc_err: bool,
    /// Release version, 1 when no version bit is set.
    pub version: u8,
    /// Release is flagged uncensored.
    pub uncensored: bool,
    /// Release is flagged censored.
    pub censored: bool,
}

impl FileState {
    /// Decode the raw state value.
    #[must_use]
    pub const fn from_bits(bits: i16) -> Self {
        let version = if bits & 32 != 0 {
            5
        } else if bits & 16 != 0 {
            4
        } else if bits & 8 != 0 {
            3
        } else if bits & 4 != 0 {
            2
        } else {
            1
        };
        Self {
            crc_ok: bits & 1 != 0,
            crc_err: bits & 2 != 0,
            version,
            uncensored: bits & 64 != 0,
            censored: bits & 128 != 0,
        }
    }
}

/// 128-bit ed2k fingerprint of a local file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed2kHash(pub [u8; 16]);

impl Ed2kHash {
    /// Lowercase hex form used as the lookup key.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 32-character hex fingerprint.
    #[must_use]
    pub fn from_hex(value: &str) -> Option<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(value, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for Ed2kHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed2kHash({})", self.to_hex())
    }
}

impl fmt::Display for Ed2kHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Ed2kHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed2kHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).ok_or_else(|| serde::de::Error::custom("invalid ed2k hex"))
    }
}
