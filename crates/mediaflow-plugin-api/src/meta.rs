// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Concrete tag→value maps.
//!
//! A [`Meta`] is used both as negotiated plugin configuration (derived from a
//! capability intersection) and as descriptive stream metadata (duration,
//! bitrate, codec config). Every insertion is type-checked against the tag
//! descriptor table.

use std::collections::BTreeMap;

use crate::caps::{CapValueSet, Capability};
use crate::status::Status;
use crate::tag::{validate_tag_value, Tag, TagValue};

/// An ordered tag→value map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    map: BTreeMap<Tag, TagValue>,
}

impl Meta {
    /// Empty meta.
    pub fn new() -> Self {
        Meta::default()
    }

    /// Insert a value, rejecting type mismatches.
    pub fn set(&mut self, tag: Tag, value: TagValue) -> Result<(), Status> {
        if !validate_tag_value(tag, &value) {
            return Err(Status::ErrorMismatchedType);
        }
        self.map.insert(tag, value);
        Ok(())
    }

    /// Builder-style insert; panics on a type mismatch.
    ///
    /// Intended for literal construction in plugins and tests.
    pub fn with(mut self, tag: Tag, value: TagValue) -> Self {
        self.set(tag, value)
            .unwrap_or_else(|_| panic!("type mismatch for tag {:?}", tag));
        self
    }

    /// Look up a value.
    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.map.get(&tag)
    }

    /// Look up a string value.
    pub fn get_string(&self, tag: Tag) -> Option<&str> {
        self.get(tag).and_then(TagValue::as_str)
    }

    /// Look up a `u32` value.
    pub fn get_u32(&self, tag: Tag) -> Option<u32> {
        self.get(tag).and_then(TagValue::as_u32)
    }

    /// Look up an `i64` value.
    pub fn get_i64(&self, tag: Tag) -> Option<i64> {
        self.get(tag).and_then(TagValue::as_i64)
    }

    /// Look up a `u64` value.
    pub fn get_u64(&self, tag: Tag) -> Option<u64> {
        self.get(tag).and_then(TagValue::as_u64)
    }

    /// Remove a value.
    pub fn remove(&mut self, tag: Tag) -> Option<TagValue> {
        self.map.remove(&tag)
    }

    /// Whether no tags are set.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of tags set.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Iterate over the tag/value pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &TagValue)> {
        self.map.iter()
    }

    /// Merge `other` into `self`, overwriting shared tags.
    pub fn update(&mut self, other: &Meta) {
        for (tag, value) in other.iter() {
            self.map.insert(*tag, value.clone());
        }
    }

    /// Derive a capability from this meta.
    ///
    /// The MIME tag becomes the capability MIME (wildcard when absent); every
    /// other concrete tag becomes a fixed constraint.
    pub fn to_capability(&self) -> Capability {
        let mime = self
            .get_string(Tag::Mime)
            .unwrap_or(crate::mime::ANY)
            .to_string();
        let mut capability = Capability::new(mime);
        for (tag, value) in self.iter() {
            if *tag == Tag::Mime {
                continue;
            }
            capability
                .keys
                .insert(*tag, CapValueSet::Fixed(value.clone()));
        }
        capability
    }
}

impl Capability {
    /// Concretize this capability into a meta.
    ///
    /// The MIME becomes the MIME tag; fixed constraints become values; list
    /// and range constraints contribute their first/lowest value, matching
    /// the negotiation tie-break of "first declared wins".
    pub fn to_meta(&self) -> Meta {
        let mut meta = Meta::new();
        if self.mime != crate::mime::ANY {
            let _ = meta.set(Tag::Mime, TagValue::String(self.mime.clone()));
        }
        for (tag, set) in &self.keys {
            if let Some(value) = set.any_value() {
                // values inside a capability were type-checked on entry
                let _ = meta.set(*tag, value);
            }
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;

    #[test]
    fn test_set_rejects_type_mismatch() {
        let mut meta = Meta::new();
        assert_eq!(
            meta.set(Tag::AudioSampleRate, TagValue::String("44100".into())),
            Err(Status::ErrorMismatchedType)
        );
        assert!(meta.set(Tag::AudioSampleRate, TagValue::U32(44100)).is_ok());
        assert_eq!(meta.get_u32(Tag::AudioSampleRate), Some(44100));
    }

    #[test]
    fn test_capability_round_trip() {
        let meta = Meta::new()
            .with(Tag::Mime, TagValue::String(mime::AUDIO_MPEG.into()))
            .with(Tag::AudioChannels, TagValue::U32(2))
            .with(Tag::AudioSampleRate, TagValue::U32(44100));
        let capability = meta.to_capability();
        assert_eq!(capability.mime, mime::AUDIO_MPEG);
        let back = capability.to_meta();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_update_overwrites() {
        let mut a = Meta::new().with(Tag::AudioChannels, TagValue::U32(1));
        let b = Meta::new()
            .with(Tag::AudioChannels, TagValue::U32(2))
            .with(Tag::AudioSampleRate, TagValue::U32(48000));
        a.update(&b);
        assert_eq!(a.get_u32(Tag::AudioChannels), Some(2));
        assert_eq!(a.len(), 2);
    }
}
