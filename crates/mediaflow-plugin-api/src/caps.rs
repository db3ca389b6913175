// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Port capabilities and their intersection algebra.
//!
//! A [`Capability`] describes what a port or plugin can produce or consume:
//! a MIME type plus per-tag value constraints. Negotiation intersects the
//! upstream offer with candidate plugin capabilities; an empty intersection
//! means the pair is incompatible.

use std::collections::BTreeMap;

use crate::tag::{Tag, TagValue};

/// Constraint on the values a tag may take at a port.
#[derive(Debug, Clone)]
pub enum CapValueSet {
    /// Exactly one value.
    Fixed(TagValue),
    /// One of a discrete set of values.
    List(Vec<TagValue>),
    /// Any `u32` in the inclusive range.
    IntRange {
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },
}

impl PartialEq for CapValueSet {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CapValueSet::Fixed(a), CapValueSet::Fixed(b)) => a == b,
            // lists compare as sets: negotiation does not care about order
            (CapValueSet::List(a), CapValueSet::List(b)) => {
                a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (
                CapValueSet::IntRange { min: a0, max: a1 },
                CapValueSet::IntRange { min: b0, max: b1 },
            ) => a0 == b0 && a1 == b1,
            _ => false,
        }
    }
}

impl CapValueSet {
    /// Intersect two value sets. `None` means the constraint is unsatisfiable.
    pub fn intersect(&self, other: &CapValueSet) -> Option<CapValueSet> {
        use CapValueSet::*;
        match (self, other) {
            (Fixed(a), Fixed(b)) => (a == b).then(|| Fixed(a.clone())),
            (Fixed(a), List(b)) | (List(b), Fixed(a)) => {
                b.contains(a).then(|| Fixed(a.clone()))
            }
            (Fixed(a), IntRange { min, max }) | (IntRange { min, max }, Fixed(a)) => match a {
                TagValue::U32(v) if (*min..=*max).contains(v) => Some(Fixed(a.clone())),
                _ => None,
            },
            (List(a), List(b)) => {
                let common: Vec<TagValue> =
                    a.iter().filter(|v| b.contains(v)).cloned().collect();
                (!common.is_empty()).then_some(List(common))
            }
            (List(a), IntRange { min, max }) | (IntRange { min, max }, List(a)) => {
                let common: Vec<TagValue> = a
                    .iter()
                    .filter(|v| matches!(v, TagValue::U32(x) if (*min..=*max).contains(x)))
                    .cloned()
                    .collect();
                (!common.is_empty()).then_some(List(common))
            }
            (IntRange { min: a0, max: a1 }, IntRange { min: b0, max: b1 }) => {
                let min = (*a0).max(*b0);
                let max = (*a1).min(*b1);
                (min <= max).then_some(IntRange { min, max })
            }
        }
    }

    /// A concrete value from the set, preferring the first declared one.
    pub fn any_value(&self) -> Option<TagValue> {
        match self {
            CapValueSet::Fixed(v) => Some(v.clone()),
            CapValueSet::List(values) => values.first().cloned(),
            CapValueSet::IntRange { min, .. } => Some(TagValue::U32(*min)),
        }
    }
}

/// Intersect two MIME types with `*` and `type/*` wildcards.
fn intersect_mime(a: &str, b: &str) -> Option<String> {
    if a == crate::mime::ANY {
        return Some(b.to_string());
    }
    if b == crate::mime::ANY {
        return Some(a.to_string());
    }
    if a == b {
        return Some(a.to_string());
    }
    if let Some(prefix) = a.strip_suffix("/*") {
        if b.split('/').next() == Some(prefix) {
            return Some(b.to_string());
        }
    }
    if let Some(prefix) = b.strip_suffix("/*") {
        if a.split('/').next() == Some(prefix) {
            return Some(a.to_string());
        }
    }
    None
}

/// Capability of a port or plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// MIME type, possibly a wildcard form.
    pub mime: String,
    /// Per-tag constraints.
    pub keys: BTreeMap<Tag, CapValueSet>,
}

impl Capability {
    /// Capability with a MIME type and no key constraints.
    pub fn new(mime: impl Into<String>) -> Self {
        Capability {
            mime: mime.into(),
            keys: BTreeMap::new(),
        }
    }

    /// Builder: constrain a tag to a fixed value.
    pub fn with_fixed(mut self, tag: Tag, value: TagValue) -> Self {
        self.keys.insert(tag, CapValueSet::Fixed(value));
        self
    }

    /// Builder: constrain a tag to a discrete value set.
    pub fn with_list(mut self, tag: Tag, values: Vec<TagValue>) -> Self {
        self.keys.insert(tag, CapValueSet::List(values));
        self
    }

    /// Builder: constrain a tag to a `u32` range.
    pub fn with_range(mut self, tag: Tag, min: u32, max: u32) -> Self {
        self.keys.insert(tag, CapValueSet::IntRange { min, max });
        self
    }

    /// Intersect with another capability.
    ///
    /// The result carries the narrower MIME type and, for each tag present on
    /// either side, the intersection of the constraints (a one-sided
    /// constraint carries over unchanged). `None` means incompatible.
    pub fn intersect(&self, other: &Capability) -> Option<Capability> {
        let mime = intersect_mime(&self.mime, &other.mime)?;
        let mut keys = BTreeMap::new();
        for (tag, set) in &self.keys {
            match other.keys.get(tag) {
                Some(other_set) => {
                    keys.insert(*tag, set.intersect(other_set)?);
                }
                None => {
                    keys.insert(*tag, set.clone());
                }
            }
        }
        for (tag, set) in &other.keys {
            keys.entry(*tag).or_insert_with(|| set.clone());
        }
        Some(Capability { mime, keys })
    }

    /// Whether this capability can be satisfied together with `other`.
    pub fn compatible_with(&self, other: &Capability) -> bool {
        self.intersect(other).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;
    use crate::tag::AudioSampleFormat;

    fn rate_list(rates: &[u32]) -> Vec<TagValue> {
        rates.iter().map(|r| TagValue::U32(*r)).collect()
    }

    #[test]
    fn test_intersection_is_commutative() {
        let a = Capability::new(mime::AUDIO_RAW)
            .with_list(Tag::AudioSampleRate, rate_list(&[8000, 44100, 48000]))
            .with_fixed(Tag::AudioChannels, TagValue::U32(2));
        let b = Capability::new(mime::AUDIO_RAW)
            .with_range(Tag::AudioSampleRate, 16000, 48000)
            .with_fixed(
                Tag::AudioSampleFormat,
                TagValue::SampleFormat(AudioSampleFormat::S16),
            );
        let ab = a.intersect(&b).unwrap();
        let ba = b.intersect(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(
            ab.keys.get(&Tag::AudioSampleRate),
            Some(&CapValueSet::List(rate_list(&[44100, 48000])))
        );
    }

    #[test]
    fn test_intersection_is_idempotent() {
        let a = Capability::new(mime::AUDIO_MPEG)
            .with_range(Tag::AudioSampleRate, 8000, 48000)
            .with_list(Tag::AudioChannels, rate_list(&[1, 2]));
        assert_eq!(a.intersect(&a), Some(a.clone()));
    }

    #[test]
    fn test_disjoint_mime_is_empty() {
        let a = Capability::new(mime::AUDIO_MPEG);
        let b = Capability::new(mime::VIDEO_H264);
        assert_eq!(a.intersect(&b), None);
        assert!(!a.compatible_with(&b));
    }

    #[test]
    fn test_mime_wildcards() {
        let any_audio = Capability::new(mime::AUDIO_ANY);
        let mp3 = Capability::new(mime::AUDIO_MPEG);
        assert_eq!(any_audio.intersect(&mp3).unwrap().mime, mime::AUDIO_MPEG);
        assert_eq!(mp3.intersect(&any_audio).unwrap().mime, mime::AUDIO_MPEG);
        let anything = Capability::new(mime::ANY);
        assert_eq!(anything.intersect(&mp3).unwrap().mime, mime::AUDIO_MPEG);
        assert!(Capability::new(mime::VIDEO_ANY).intersect(&mp3).is_none());
    }

    #[test]
    fn test_one_sided_keys_carry_over() {
        let a = Capability::new(mime::AUDIO_RAW).with_fixed(Tag::AudioChannels, TagValue::U32(2));
        let b = Capability::new(mime::AUDIO_RAW).with_fixed(Tag::AudioSampleRate, TagValue::U32(44100));
        let joined = a.intersect(&b).unwrap();
        assert_eq!(joined.keys.len(), 2);
    }

    #[test]
    fn test_range_intersection() {
        let a = CapValueSet::IntRange { min: 10, max: 20 };
        let b = CapValueSet::IntRange { min: 15, max: 30 };
        assert_eq!(a.intersect(&b), Some(CapValueSet::IntRange { min: 15, max: 20 }));
        let c = CapValueSet::IntRange { min: 21, max: 30 };
        assert_eq!(a.intersect(&c), None);
        assert_eq!(
            a.intersect(&CapValueSet::Fixed(TagValue::U32(12))),
            Some(CapValueSet::Fixed(TagValue::U32(12)))
        );
    }
}
