// SPDX-License-Identifier: GPL-3.0-or-later

//! Embedded tag access.
//!
//! [`TagSet`] is the slice of a file's tags this crate manages. Writing a
//! `TagSet` replaces exactly those fields: a `None`/empty field is removed from
//! the file, everything else in the file is left alone.

use lofty::config::WriteOptions;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemValue, Tag, TagItem, TagType};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pub title: Option<String>,
    pub album: Option<String>,
    pub performers: Vec<String>,
    pub genres: Vec<String>,
    pub year: Option<u32>,
    pub description: Option<String>,
    pub beats_per_minute: Option<u32>,
    /// Source video URL, used to recognise a file on later runs.
    pub comment: Option<String>,
    /// Uploader name; only written for video containers.
    pub channel: Option<String>,
    pub front_cover: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum TagContainerError {
    #[error("Tag I/O error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File has no writable tag: {0}")]
    NoWritableTag(String),
}

/// Blocking tag reader/writer. Callers on an async runtime should wrap calls in `spawn_blocking`.
pub trait TagContainer: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TagSet, TagContainerError>;
    fn write_tags(&self, path: &Path, tags: &TagSet) -> Result<(), TagContainerError>;
}

/// [`TagContainer`] backed by lofty (ID3v2, MP4 ilst, Vorbis comments, RIFF).
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagContainer;

impl TagContainer for LoftyTagContainer {
    fn read_tags(&self, path: &Path) -> Result<TagSet, TagContainerError> {
        let tagged_file = Probe::open(path)?.read()?;
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            debug!(target: "tagging", path = %path.display(), "file carries no tag");
            return Ok(TagSet::default());
        };

        Ok(TagSet {
            title: tag.title().map(|value| value.into_owned()),
            album: tag.album().map(|value| value.into_owned()),
            performers: tag.get_strings(&ItemKey::TrackArtist).map(str::to_string).collect(),
            genres: tag.get_strings(&ItemKey::Genre).map(str::to_string).collect(),
            year: tag.year(),
            description: tag.get_string(&ItemKey::Description).map(str::to_string),
            beats_per_minute: tag
                .get_string(&ItemKey::Bpm)
                .and_then(|value| value.trim().parse().ok()),
            comment: tag.comment().map(|value| value.into_owned()),
            channel: tag.get_string(&channel_key(tag.tag_type())).map(str::to_string),
            front_cover: front_cover(tag),
        })
    }

    fn write_tags(&self, path: &Path, tags: &TagSet) -> Result<(), TagContainerError> {
        let mut tagged_file = Probe::open(path)?.read()?;
        if tagged_file.primary_tag_mut().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| TagContainerError::NoWritableTag(path.display().to_string()))?;

        apply(tag, tags);
        tagged_file.save_to_path(path, WriteOptions::default())?;
        debug!(target: "tagging", path = %path.display(), "tags saved");
        Ok(())
    }
}

/// Only the front cover is managed; other pictures are left for [`apply`] to keep.
fn front_cover(tag: &Tag) -> Option<Vec<u8>> {
    tag.pictures()
        .iter()
        .find(|picture| picture.pic_type() == PictureType::CoverFront)
        .map(|picture| picture.data().to_vec())
}

fn apply(tag: &mut Tag, tags: &TagSet) {
    match &tags.title {
        Some(title) => tag.set_title(title.clone()),
        None => tag.remove_title(),
    }
    match &tags.album {
        Some(album) => tag.set_album(album.clone()),
        None => tag.remove_album(),
    }
    match tags.year {
        Some(year) => tag.set_year(year),
        None => tag.remove_year(),
    }
    match &tags.comment {
        Some(comment) => tag.set_comment(comment.clone()),
        None => tag.remove_comment(),
    }

    replace_all(tag, ItemKey::TrackArtist, &tags.performers);
    replace_all(tag, ItemKey::Genre, &tags.genres);
    replace_one(tag, ItemKey::Description, tags.description.clone());
    replace_one(tag, ItemKey::Bpm, tags.beats_per_minute.map(|bpm| bpm.to_string()));
    replace_one(tag, channel_key(tag.tag_type()), tags.channel.clone());

    tag.remove_picture_type(PictureType::CoverFront);
    if let Some(bytes) = &tags.front_cover {
        match Picture::from_reader(&mut bytes.as_slice()) {
            Ok(mut picture) => {
                picture.set_pic_type(PictureType::CoverFront);
                tag.push_picture(picture);
            }
            // A cover lofty cannot identify is dropped; the other fields are still written.
            Err(error) => warn!(target: "tagging", %error, size = bytes.len(), "cover is not a recognised image, skipping it"),
        }
    }
}

fn replace_all(tag: &mut Tag, key: ItemKey, values: &[String]) {
    tag.remove_key(&key);
    for value in values {
        tag.push(TagItem::new(key.clone(), ItemValue::Text(value.clone())));
    }
}

fn replace_one(tag: &mut Tag, key: ItemKey, value: Option<String>) {
    match value {
        Some(value) => {
            tag.insert_text(key, value);
        }
        None => tag.remove_key(&key),
    }
}

/// Free-form "Channel" item, spelled the way each container stores custom text.
fn channel_key(tag_type: TagType) -> ItemKey {
    match tag_type {
        TagType::Id3v2 => ItemKey::Unknown("TXXX:Channel".to_string()),
        TagType::Mp4Ilst => ItemKey::Unknown("----:com.apple.iTunes:Channel".to_string()),
        _ => ItemKey::Unknown("CHANNEL".to_string()),
    }
}
