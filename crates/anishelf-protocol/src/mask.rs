//! Field masks selecting which metadata fields a lookup returns.
//!
//! A mask is a fixed-width run of bytes ("segments"). Each bit of a segment selects
//! exactly one field, or is reserved. The server replies with the selected fields in
//! segment order and, within a segment, in descending bit-value order; the layout
//! tables below list every segment's `(bit, field)` pairs in that order so encoding,
//! decoding and reply parsing all share one explicit contract.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{MaskError, MaskResult};

/// Upper bound on segments across all layouts.
pub const MAX_SEGMENTS: usize = 8;

static HEX_PATTERN: OnceCell<Regex> = OnceCell::new();

/// Static description of one mask family.
pub trait MaskLayout: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Field selected by a bit of this layout.
    type Field: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Layout name used in diagnostics.
    const NAME: &'static str;

    /// Per-segment `(bit, field)` tables in descending bit order. Reserved bits are absent.
    const SEGMENTS: &'static [&'static [(u8, Self::Field)]];
}

/// Bitset over the segments of a [`MaskLayout`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldMask<L: MaskLayout> {
    segments: [u8; MAX_SEGMENTS],
    layout: PhantomData<L>,
}

/// A set bit yielded while walking a mask in reply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskFlag<F> {
    /// Zero-based segment index.
    pub segment: usize,
    /// Bit value within the segment.
    pub bit: u8,
    /// Field mapped to the bit, `None` for reserved bits.
    pub field: Option<F>,
}

impl<L: MaskLayout> FieldMask<L> {
    /// Number of segments a fully encoded mask of this layout carries.
    #[must_use]
    pub const fn width() -> usize {
        L::SEGMENTS.len()
    }

    /// Mask with no fields selected.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            segments: [0; MAX_SEGMENTS],
            layout: PhantomData,
        }
    }

    /// Build a mask selecting every listed field.
    #[must_use]
    pub fn from_fields(fields: impl IntoIterator<Item = L::Field>) -> Self {
        fields.into_iter().fold(Self::empty(), Self::with)
    }

    /// Build a mask from raw segment bytes; missing trailing segments are zero.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::InvalidMask`] when `bytes` is empty or longer than the layout.
    pub fn from_bytes(bytes: &[u8]) -> MaskResult<Self> {
        if bytes.is_empty() || bytes.len() > Self::width() {
            return Err(MaskError::InvalidMask {
                layout: L::NAME,
                segments: bytes.len(),
                max: Self::width(),
            });
        }
        let mut mask = Self::empty();
        mask.segments[..bytes.len()].copy_from_slice(bytes);
        Ok(mask)
    }

    /// Decode a hex mask string.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::Format`] for odd-length or non-hex input and
    /// [`MaskError::InvalidMask`] for an empty or over-long byte count.
    pub fn decode_hex(hex: &str) -> MaskResult<Self> {
        if hex.len() % 2 != 0 {
            return Err(MaskError::Format {
                value: hex.to_string(),
                reason: "odd_length",
            });
        }
        if hex.is_empty() {
            return Err(MaskError::InvalidMask {
                layout: L::NAME,
                segments: 0,
                max: Self::width(),
            });
        }
        let pattern = HEX_PATTERN
            .get_or_try_init(|| Regex::new(r"^[0-9a-fA-F]+$"))
            .map_err(|_| MaskError::Format {
                value: hex.to_string(),
                reason: "pattern_unavailable",
            })?;
        if !pattern.is_match(hex) {
            return Err(MaskError::Format {
                value: hex.to_string(),
                reason: "non_hex_character",
            });
        }
        let bytes = hex::decode(hex).map_err(|_| MaskError::Format {
            value: hex.to_string(),
            reason: "non_hex_character",
        })?;
        Self::from_bytes(&bytes)
    }

    /// One byte per segment, always the full layout width.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.segments[..Self::width()].to_vec()
    }

    /// Uppercase hex of [`Self::encode`].
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.encode())
    }

    /// Raw byte of a segment; out-of-range segments read as zero.
    #[must_use]
    pub fn segment(&self, index: usize) -> u8 {
        if index < Self::width() {
            self.segments[index]
        } else {
            0
        }
    }

    /// Return a copy with `field` selected.
    #[must_use]
    pub fn with(mut self, field: L::Field) -> Self {
        self.insert(field);
        self
    }

    /// Select `field`.
    pub fn insert(&mut self, field: L::Field) {
        if let Some((segment, bit)) = Self::locate(field) {
            self.segments[segment] |= bit;
        }
    }

    /// Whether `field` is selected.
    #[must_use]
    pub fn contains(&self, field: L::Field) -> bool {
        Self::locate(field).is_some_and(|(segment, bit)| self.segments[segment] & bit != 0)
    }

    /// Whether every field selected by `other` is selected here.
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }

    /// Bitwise union of two masks.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let mut merged = self;
        for (slot, extra) in merged.segments.iter_mut().zip(other.segments) {
            *slot |= extra;
        }
        merged
    }

    /// Whether no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|byte| *byte == 0)
    }

    /// Set bits in reply order: segment by segment, descending bit value.
    pub fn flags(&self) -> impl Iterator<Item = MaskFlag<L::Field>> + '_ {
        (0..Self::width()).flat_map(move |segment| {
            let byte = self.segments[segment];
            (0..8u8).rev().filter_map(move |shift| {
                let bit = 1u8 << shift;
                (byte & bit != 0).then(|| MaskFlag {
                    segment,
                    bit,
                    field: Self::field_at(segment, bit),
                })
            })
        })
    }

    /// Selected fields in reply order, skipping reserved bits.
    pub fn fields(&self) -> impl Iterator<Item = L::Field> + '_ {
        self.flags().filter_map(|flag| flag.field)
    }

    fn locate(field: L::Field) -> Option<(usize, u8)> {
        L::SEGMENTS.iter().enumerate().find_map(|(segment, table)| {
            table
                .iter()
                .find(|(_, candidate)| *candidate == field)
                .map(|(bit, _)| (segment, *bit))
        })
    }

    fn field_at(segment: usize, bit: u8) -> Option<L::Field> {
        L::SEGMENTS
            .get(segment)?
            .iter()
            .find(|(candidate, _)| *candidate == bit)
            .map(|(_, field)| *field)
    }
}

impl<L: MaskLayout> Default for FieldMask<L> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<L: MaskLayout> fmt::Debug for FieldMask<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(L::NAME).field(&self.to_hex()).finish()
    }
}

impl<L: MaskLayout> fmt::Display for FieldMask<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl<L: MaskLayout> Serialize for FieldMask<L> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, L: MaskLayout> Deserialize<'de> for FieldMask<L> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor<L>(PhantomData<L>);

        impl<L: MaskLayout> Visitor<'_> for HexVisitor<L> {
            type Value = FieldMask<L>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an even-length hex {} string", L::NAME)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                FieldMask::decode_hex(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor(PhantomData))
    }
}

/// Fields selectable in the per-file mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum FileField {
    AnimeId,
    EpisodeId,
    GroupId,
    MylistId,
    OtherEpisodes,
    IsDeprecated,
    State,
    Size,
    Ed2kHash,
    Md5Hash,
    Sha1Hash,
    Crc32Hash,
    VideoColourDepth,
    Quality,
    Source,
    AudioCodecs,
    AudioBitrates,
    VideoCodec,
    VideoBitrate,
    VideoResolution,
    FileType,
    DubLanguage,
    SubLanguage,
    LengthSeconds,
    Description,
    AiredDate,
    AnidbFileName,
    MylistState,
    MylistFileState,
    MylistViewed,
    MylistViewDate,
    MylistStorage,
    MylistSource,
    MylistOther,
}

/// Fields selectable in the per-title/episode mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum AnimeField {
    TotalEpisodes,
    HighestEpisodeNumber,
    Year,
    Kind,
    RelatedAidList,
    RelatedAidType,
    CategoryList,
    RomajiName,
    KanjiName,
    EnglishName,
    OtherName,
    ShortNameList,
    SynonymList,
    EpisodeNumber,
    EpisodeName,
    EpisodeRomajiName,
    EpisodeKanjiName,
    EpisodeRating,
    EpisodeVoteCount,
    GroupName,
    GroupShortName,
    DateRecordUpdated,
}

/// Semantic type of a field's reply token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Even-length hex decoded to raw bytes.
    Bytes,
    /// 16-bit signed integer.
    Short,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// Escaped text.
    Text,
}

impl FileField {
    /// Every file field in reply order.
    pub const ALL: [Self; 34] = [
        Self::AnimeId,
        Self::EpisodeId,
        Self::GroupId,
        Self::MylistId,
        Self::OtherEpisodes,
        Self::IsDeprecated,
        Self::State,
        Self::Size,
        Self::Ed2kHash,
        Self::Md5Hash,
        Self::Sha1Hash,
        Self::Crc32Hash,
        Self::VideoColourDepth,
        Self::Quality,
        Self::Source,
        Self::AudioCodecs,
        Self::AudioBitrates,
        Self::VideoCodec,
        Self::VideoBitrate,
        Self::VideoResolution,
        Self::FileType,
        Self::DubLanguage,
        Self::SubLanguage,
        Self::LengthSeconds,
        Self::Description,
        Self::AiredDate,
        Self::AnidbFileName,
        Self::MylistState,
        Self::MylistFileState,
        Self::MylistViewed,
        Self::MylistViewDate,
        Self::MylistStorage,
        Self::MylistSource,
        Self::MylistOther,
    ];

    /// Token type the server sends for this field.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::AnimeId
            | Self::EpisodeId
            | Self::GroupId
            | Self::MylistId
            | Self::Size
            | Self::AiredDate
            | Self::MylistViewDate => FieldKind::Long,
            Self::IsDeprecated
            | Self::State
            | Self::MylistState
            | Self::MylistFileState
            | Self::MylistViewed => FieldKind::Short,
            Self::VideoBitrate | Self::LengthSeconds => FieldKind::Int,
            Self::Ed2kHash | Self::Md5Hash | Self::Sha1Hash | Self::Crc32Hash => FieldKind::Bytes,
            _ => FieldKind::Text,
        }
    }

    /// Stable snake-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AnimeId => "anime_id",
            Self::EpisodeId => "episode_id",
            Self::GroupId => "group_id",
            Self::MylistId => "mylist_id",
            Self::OtherEpisodes => "other_episodes",
            Self::IsDeprecated => "is_deprecated",
            Self::State => "state",
            Self::Size => "size",
            Self::Ed2kHash => "ed2k_hash",
            Self::Md5Hash => "md5_hash",
            Self::Sha1Hash => "sha1_hash",
            Self::Crc32Hash => "crc32_hash",
            Self::VideoColourDepth => "video_colour_depth",
            Self::Quality => "quality",
            Self::Source => "source",
            Self::AudioCodecs => "audio_codecs",
            Self::AudioBitrates => "audio_bitrates",
            Self::VideoCodec => "video_codec",
            Self::VideoBitrate => "video_bitrate",
            Self::VideoResolution => "video_resolution",
            Self::FileType => "file_type",
            Self::DubLanguage => "dub_language",
            Self::SubLanguage => "sub_language",
            Self::LengthSeconds => "length_seconds",
            Self::Description => "description",
            Self::AiredDate => "aired_date",
            Self::AnidbFileName => "anidb_file_name",
            Self::MylistState => "mylist_state",
            Self::MylistFileState => "mylist_file_state",
            Self::MylistViewed => "mylist_viewed",
            Self::MylistViewDate => "mylist_view_date",
            Self::MylistStorage => "mylist_storage",
            Self::MylistSource => "mylist_source",
            Self::MylistOther => "mylist_other",
        }
    }
}

impl AnimeField {
    /// Every anime field in reply order.
    pub const ALL: [Self; 22] = [
        Self::TotalEpisodes,
        Self::HighestEpisodeNumber,
        Self::Year,
        Self::Kind,
        Self::RelatedAidList,
        Self::RelatedAidType,
        Self::CategoryList,
        Self::RomajiName,
        Self::KanjiName,
        Self::EnglishName,
        Self::OtherName,
        Self::ShortNameList,
        Self::SynonymList,
        Self::EpisodeNumber,
        Self::EpisodeName,
        Self::EpisodeRomajiName,
        Self::EpisodeKanjiName,
        Self::EpisodeRating,
        Self::EpisodeVoteCount,
        Self::GroupName,
        Self::GroupShortName,
        Self::DateRecordUpdated,
    ];

    /// Token type the server sends for this field.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::TotalEpisodes
            | Self::HighestEpisodeNumber
            | Self::EpisodeRating
            | Self::EpisodeVoteCount => FieldKind::Int,
            Self::DateRecordUpdated => FieldKind::Long,
            _ => FieldKind::Text,
        }
    }

    /// Stable snake-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TotalEpisodes => "total_episodes",
            Self::HighestEpisodeNumber => "highest_episode_number",
            Self::Year => "year",
            Self::Kind => "type",
            Self::RelatedAidList => "related_aid_list",
            Self::RelatedAidType => "related_aid_type",
            Self::CategoryList => "category_list",
            Self::RomajiName => "romaji_name",
            Self::KanjiName => "kanji_name",
            Self::EnglishName => "english_name",
            Self::OtherName => "other_name",
            Self::ShortNameList => "short_name_list",
            Self::SynonymList => "synonym_list",
            Self::EpisodeNumber => "episode_number",
            Self::EpisodeName => "episode_name",
            Self::EpisodeRomajiName => "episode_romaji_name",
            Self::EpisodeKanjiName => "episode_kanji_name",
            Self::EpisodeRating => "episode_rating",
            Self::EpisodeVoteCount => "episode_vote_count",
            Self::GroupName => "group_name",
            Self::GroupShortName => "group_short_name",
            Self::DateRecordUpdated => "date_record_updated",
        }
    }
}

/// Layout marker for per-file masks (5 segments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileLayout;

/// Layout marker for per-title/episode masks (4 segments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimeLayout;

impl MaskLayout for FileLayout {
    type Field = FileField;

    const NAME: &'static str = "file_mask";

    const SEGMENTS: &'static [&'static [(u8, FileField)]] = &[
        &[
            (64, FileField::AnimeId),
            (32, FileField::EpisodeId),
            (16, FileField::GroupId),
            (8, FileField::MylistId),
            (4, FileField::OtherEpisodes),
            (2, FileField::IsDeprecated),
            (1, FileField::State),
        ],
        &[
            (128, FileField::Size),
            (64, FileField::Ed2kHash),
            (32, FileField::Md5Hash),
            (16, FileField::Sha1Hash),
            (8, FileField::Crc32Hash),
            (2, FileField::VideoColourDepth),
        ],
        &[
            (128, FileField::Quality),
            (64, FileField::Source),
            (32, FileField::AudioCodecs),
            (16, FileField::AudioBitrates),
            (8, FileField::VideoCodec),
            (4, FileField::VideoBitrate),
            (2, FileField::VideoResolution),
            (1, FileField::FileType),
        ],
        &[
            (128, FileField::DubLanguage),
            (64, FileField::SubLanguage),
            (32, FileField::LengthSeconds),
            (16, FileField::Description),
            (8, FileField::AiredDate),
            (1, FileField::AnidbFileName),
        ],
        &[
            (128, FileField::MylistState),
            (64, FileField::MylistFileState),
            (32, FileField::MylistViewed),
            (16, FileField::MylistViewDate),
            (8, FileField::MylistStorage),
            (4, FileField::MylistSource),
            (2, FileField::MylistOther),
        ],
    ];
}

impl MaskLayout for AnimeLayout {
    type Field = AnimeField;

    const NAME: &'static str = "anime_mask";

    const SEGMENTS: &'static [&'static [(u8, AnimeField)]] = &[
        &[
            (128, AnimeField::TotalEpisodes),
            (64, AnimeField::HighestEpisodeNumber),
            (32, AnimeField::Year),
            (16, AnimeField::Kind),
            (8, AnimeField::RelatedAidList),
            (4, AnimeField::RelatedAidType),
            (2, AnimeField::CategoryList),
        ],
        &[
            (128, AnimeField::RomajiName),
            (64, AnimeField::KanjiName),
            (32, AnimeField::EnglishName),
            (16, AnimeField::OtherName),
            (8, AnimeField::ShortNameList),
            (4, AnimeField::SynonymList),
        ],
        &[
            (128, AnimeField::EpisodeNumber),
            (64, AnimeField::EpisodeName),
            (32, AnimeField::EpisodeRomajiName),
            (16, AnimeField::EpisodeKanjiName),
            (8, AnimeField::EpisodeRating),
            (4, AnimeField::EpisodeVoteCount),
        ],
        &[
            (128, AnimeField::GroupName),
            (64, AnimeField::GroupShortName),
            (1, AnimeField::DateRecordUpdated),
        ],
    ];
}

/// Mask over per-file fields.
pub type FileMask = FieldMask<FileLayout>;

/// Mask over per-title/episode fields.
pub type AnimeMask = FieldMask<AnimeLayout>;
