//! Destination path templates.
//!
//! A template is literal text with `{placeholder}` slots, `/` separating directories.
//! Compiling validates every slot and reports which record fields rendering needs, so
//! the lookup can request exactly those. Rendered values never introduce separators:
//! reserved characters in metadata are replaced with `_` before the path is split.

use std::fmt;
use std::path::{Path, PathBuf};

use anishelf_protocol::{AnimeField, AnimeInfo, AnimeMask, Ed2kHash, FileField, FileInfo, FileMask, Resolution};

use crate::error::{FsOpsError, FsOpsResult};

const RESERVED: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// A value slot in a path template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Placeholder {
    RomajiName,
    EnglishName,
    KanjiName,
    EpisodeNumber,
    EpisodeName,
    GroupName,
    GroupShortName,
    Year,
    Type,
    TotalEpisodes,
    AnimeId,
    EpisodeId,
    FileId,
    Crc32,
    Ed2k,
    Resolution,
    VideoCodec,
    AudioCodecs,
    Source,
    Quality,
    DubLanguage,
    SubLanguage,
    Version,
    FileType,
    Extension,
    OriginalName,
}

impl Placeholder {
    /// Every placeholder.
    pub const ALL: [Self; 26] = [
        Self::RomajiName,
        Self::EnglishName,
        Self::KanjiName,
        Self::EpisodeNumber,
        Self::EpisodeName,
        Self::GroupName,
        Self::GroupShortName,
        Self::Year,
        Self::Type,
        Self::TotalEpisodes,
        Self::AnimeId,
        Self::EpisodeId,
        Self::FileId,
        Self::Crc32,
        Self::Ed2k,
        Self::Resolution,
        Self::VideoCodec,
        Self::AudioCodecs,
        Self::Source,
        Self::Quality,
        Self::DubLanguage,
        Self::SubLanguage,
        Self::Version,
        Self::FileType,
        Self::Extension,
        Self::OriginalName,
    ];

    /// Name written between the braces.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RomajiName => "romaji_name",
            Self::EnglishName => "english_name",
            Self::KanjiName => "kanji_name",
            Self::EpisodeNumber => "episode_number",
            Self::EpisodeName => "episode_name",
            Self::GroupName => "group_name",
            Self::GroupShortName => "group_short_name",
            Self::Year => "year",
            Self::Type => "type",
            Self::TotalEpisodes => "total_episodes",
            Self::AnimeId => "anime_id",
            Self::EpisodeId => "episode_id",
            Self::FileId => "file_id",
            Self::Crc32 => "crc32",
            Self::Ed2k => "ed2k",
            Self::Resolution => "resolution",
            Self::VideoCodec => "video_codec",
            Self::AudioCodecs => "audio_codecs",
            Self::Source => "source",
            Self::Quality => "quality",
            Self::DubLanguage => "dub_language",
            Self::SubLanguage => "sub_language",
            Self::Version => "version",
            Self::FileType => "file_type",
            Self::Extension => "extension",
            Self::OriginalName => "original_name",
        }
    }

    /// Resolve a placeholder by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|placeholder| placeholder.name() == name)
    }

    /// File record field the placeholder reads, if any.
    #[must_use]
    pub const fn file_field(self) -> Option<FileField> {
        match self {
            Self::AnimeId => Some(FileField::AnimeId),
            Self::EpisodeId => Some(FileField::EpisodeId),
            Self::Crc32 => Some(FileField::Crc32Hash),
            Self::Resolution => Some(FileField::VideoResolution),
            Self::VideoCodec => Some(FileField::VideoCodec),
            Self::AudioCodecs => Some(FileField::AudioCodecs),
            Self::Source => Some(FileField::Source),
            Self::Quality => Some(FileField::Quality),
            Self::DubLanguage => Some(FileField::DubLanguage),
            Self::SubLanguage => Some(FileField::SubLanguage),
            Self::Version => Some(FileField::State),
            Self::FileType | Self::Extension => Some(FileField::FileType),
            _ => None,
        }
    }

    /// Title/episode record field the placeholder reads, if any.
    #[must_use]
    pub const fn anime_field(self) -> Option<AnimeField> {
        match self {
            Self::RomajiName => Some(AnimeField::RomajiName),
            Self::EnglishName => Some(AnimeField::EnglishName),
            Self::KanjiName => Some(AnimeField::KanjiName),
            Self::EpisodeNumber => Some(AnimeField::EpisodeNumber),
            Self::EpisodeName => Some(AnimeField::EpisodeName),
            Self::GroupName => Some(AnimeField::GroupName),
            Self::GroupShortName => Some(AnimeField::GroupShortName),
            Self::Year => Some(AnimeField::Year),
            Self::Type => Some(AnimeField::Kind),
            Self::TotalEpisodes => Some(AnimeField::TotalEpisodes),
            _ => None,
        }
    }

    fn value(self, ctx: &RenderContext<'_>) -> Option<String> {
        let file = ctx.file;
        let anime = ctx.anime;
        match self {
            Self::RomajiName => anime.romaji_name.clone(),
            Self::EnglishName => anime.english_name.clone(),
            Self::KanjiName => anime.kanji_name.clone(),
            Self::EpisodeNumber => anime.episode_number.clone(),
            Self::EpisodeName => anime.episode_name.clone(),
            Self::GroupName => anime.group_name.clone(),
            Self::GroupShortName => anime.group_short_name.clone(),
            Self::Year => anime.year.clone(),
            Self::Type => anime.kind.clone(),
            Self::TotalEpisodes => anime.total_episodes.map(|n| n.to_string()),
            Self::AnimeId => file.anime_id.or(anime.anime_id).map(|id| id.to_string()),
            Self::EpisodeId => file.episode_id.or(anime.episode_id).map(|id| id.to_string()),
            Self::FileId => file.file_id.map(|id| id.to_string()),
            Self::Crc32 => file.crc32_hash.as_deref().map(hex::encode_upper),
            Self::Ed2k => ctx.ed2k.map(|hash| hash.to_hex()),
            Self::Resolution => ctx
                .resolution
                .or_else(|| file.resolution())
                .map(|resolution| resolution.to_string()),
            Self::VideoCodec => file.video_codec.clone(),
            Self::AudioCodecs => file.audio_codecs.clone(),
            Self::Source => file.source.clone(),
            Self::Quality => file.quality.clone(),
            Self::DubLanguage => file.dub_language.clone(),
            Self::SubLanguage => file.sub_language.clone(),
            Self::Version => file
                .file_state()
                .filter(|state| state.version > 1)
                .map(|state| format!("v{}", state.version)),
            Self::FileType => file.file_type.clone(),
            Self::Extension => ctx
                .source
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .or_else(|| file.file_type.clone()),
            Self::OriginalName => ctx
                .source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a template can draw from when rendering one item.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Merged file record.
    pub file: &'a FileInfo,
    /// Merged title/episode record.
    pub anime: &'a AnimeInfo,
    /// Current location of the file.
    pub source: &'a Path,
    /// Resolved frame size.
    pub resolution: Option<Resolution>,
    /// Local fingerprint.
    pub ed2k: Option<Ed2kHash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A compiled destination template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile template text.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidTemplate`] for unknown placeholder names, a `{`
    /// without its closing brace, or a stray `}`.
    pub fn compile(text: &str) -> FsOpsResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(invalid("unclosed_placeholder", name));
                    }
                    let placeholder = Placeholder::from_name(name.trim())
                        .ok_or_else(|| invalid("unknown_placeholder", name))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(placeholder));
                }
                '}' => return Err(invalid("unmatched_brace", text.to_string())),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: text.to_string(),
            segments,
        })
    }

    /// Template text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(placeholder) => Some(*placeholder),
            Segment::Literal(_) => None,
        })
    }

    /// Record fields rendering needs from the remote lookup.
    #[must_use]
    pub fn required_masks(&self) -> (FileMask, AnimeMask) {
        let file = FileMask::from_fields(self.placeholders().filter_map(Placeholder::file_field));
        let anime = AnimeMask::from_fields(self.placeholders().filter_map(Placeholder::anime_field));
        (file, anime)
    }

    /// Render a relative destination path.
    ///
    /// Missing values render as empty text.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidInput`] when a path component renders empty or as
    /// `.`/`..`.
    pub fn render(&self, ctx: &RenderContext<'_>) -> FsOpsResult<PathBuf> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Slot(placeholder) => {
                    if let Some(value) = placeholder.value(ctx) {
                        rendered.push_str(&sanitize(&value));
                    }
                }
            }
        }

        let mut path = PathBuf::new();
        for component in rendered.split('/') {
            let component = component.trim();
            match component {
                "" => return Err(invalid_path("empty_component", &rendered)),
                "." | ".." => return Err(invalid_path("relative_component", &rendered)),
                _ => path.push(component),
            }
        }
        Ok(path)
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '\n' | '\r' | '\t' => ' ',
            ch if RESERVED.contains(&ch) => '_',
            ch => ch,
        })
        .collect()
}

fn invalid(reason: &'static str, value: String) -> FsOpsError {
    FsOpsError::InvalidTemplate {
        reason,
        value: Some(value),
    }
}

fn invalid_path(reason: &'static str, rendered: &str) -> FsOpsError {
    FsOpsError::InvalidInput {
        field: "destination",
        reason,
        value: Some(rendered.to_string()),
    }
}
