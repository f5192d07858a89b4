//! Derivative naming
//!
//! A [`ThumbnailKey`] is the SHA-256 of the canonical request, so equal
//! canonical inputs always produce the same key in any process. Storage paths
//! are either human-readable basenames
//! (`<source>_<W>x<H>_<opt1>_<opt2>_q<quality>.<ext>`) or hashed paths
//! (`ab/cd/<key>.<ext>`).
//!
//! Metadata store key format: `v{VERSION}:thumb:{kind}:{identifier}`

use crate::geometry::Geometry;
use crate::options::{names, OptionSchema, OptionSet};
use crate::source::SourceRef;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Key schema version - increment when changing the key derivation
pub const KEY_VERSION: u32 = 1;

/// Separator between key components; rejected inside every component
pub const DELIMITER: char = '\u{1f}';

/// Bytes kept verbatim in readable path segments; `.` is then written as `_`
const STEM_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.');

/// Opaque, stable identifier of one derivative
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThumbnailKey(String);

impl ThumbnailKey {
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThumbnailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    #[default]
    Readable,
    Hashed,
}

impl std::str::FromStr for NamingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "readable" => Ok(NamingStrategy::Readable),
            "hashed" => Ok(NamingStrategy::Hashed),
            other => Err(format!("unknown naming strategy '{}'", other)),
        }
    }
}

/// Derives keys and storage paths from canonical requests
#[derive(Debug, Clone)]
pub struct KeyCodec {
    schema: Arc<OptionSchema>,
    naming: NamingStrategy,
    prefix: String,
}

impl KeyCodec {
    pub fn new(schema: Arc<OptionSchema>, naming: NamingStrategy, prefix: &str) -> Self {
        Self {
            schema,
            naming,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn derive_key(
        &self,
        source: &SourceRef,
        geometry: &Geometry,
        options: &OptionSet,
    ) -> ThumbnailKey {
        let mut hasher = Sha256::new();
        hasher.update(format!("v{}", KEY_VERSION).as_bytes());
        for component in [
            source.as_str().to_string(),
            geometry.to_string(),
            options.canonical_string(),
        ] {
            hasher.update([DELIMITER as u8]);
            hasher.update(component.as_bytes());
        }
        ThumbnailKey(hex::encode(hasher.finalize()))
    }

    /// `photos/pic_jpg_240x240_crop_sharpen_q95.jpg`
    pub fn derive_basename(
        &self,
        source: &SourceRef,
        geometry: &Geometry,
        options: &OptionSet,
    ) -> String {
        let mut name = readable_stem(source);
        name.push('_');
        name.push_str(&geometry.to_string());
        for label in self.schema.labels(options) {
            name.push('_');
            name.push_str(&label);
        }
        name.push('.');
        name.push_str(extension_for(options));
        name
    }

    /// `ab/cd/<key>.<ext>`
    pub fn hashed_path(key: &ThumbnailKey, extension: &str) -> String {
        let key = key.as_str();
        format!("{}/{}/{}.{}", &key[0..2], &key[2..4], key, extension)
    }

    /// Storage path under the configured naming strategy and prefix
    pub fn storage_path(
        &self,
        key: &ThumbnailKey,
        source: &SourceRef,
        geometry: &Geometry,
        options: &OptionSet,
    ) -> String {
        let path = match self.naming {
            NamingStrategy::Readable => self.derive_basename(source, geometry, options),
            NamingStrategy::Hashed => Self::hashed_path(key, extension_for(options)),
        };
        if self.prefix.is_empty() {
            path
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    /// Metadata entry key
    /// Format: v1:thumb:meta:{key}
    pub fn meta_key(key: &ThumbnailKey) -> String {
        format!("v{}:thumb:meta:{}", KEY_VERSION, key)
    }

    /// Reverse index of derivatives for one source
    /// Format: v1:thumb:src:{sha256(source)}
    pub fn source_index_key(source: &SourceRef) -> String {
        let digest = Sha256::digest(source.as_str().as_bytes());
        format!("v{}:thumb:src:{}", KEY_VERSION, hex::encode(digest))
    }
}

/// Reversible rendering of the whole source for readable names.
///
/// Every byte other than ASCII alphanumerics, `-`, `.` and `/` is
/// percent-escaped (a literal `_` included), then `.` becomes `_`. A `/` stays
/// a path separator only between two non-empty segments; leading, trailing and
/// repeated slashes are escaped, so the stem never has an empty segment.
fn readable_stem(source: &SourceRef) -> String {
    let mut stem = String::with_capacity(source.as_str().len());
    let mut previous: Option<&str> = None;
    for segment in source.as_str().split('/') {
        if let Some(previous) = previous {
            if previous.is_empty() || segment.is_empty() {
                stem.push_str("%2F");
            } else {
                stem.push('/');
            }
        }
        stem.push_str(&utf8_percent_encode(segment, STEM_SET).to_string().replace('.', "_"));
        previous = Some(segment);
    }
    stem
}

/// File extension for the canonical `format` option
pub fn extension_for(options: &OptionSet) -> &'static str {
    match options.choice(names::FORMAT) {
        Some("PNG") => "png",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(naming: NamingStrategy, prefix: &str) -> (KeyCodec, Arc<OptionSchema>) {
        let schema = Arc::new(OptionSchema::standard(85, &["colorspace", "format"]));
        (KeyCodec::new(schema.clone(), naming, prefix), schema)
    }

    fn request(
        schema: &OptionSchema,
        source: &str,
        geometry: &str,
        tokens: &[&str],
    ) -> (SourceRef, Geometry, OptionSet) {
        let options = schema.parse(tokens).unwrap();
        let geometry = Geometry::parse(geometry).unwrap().with_options(&options);
        (SourceRef::parse(source).unwrap(), geometry, options)
    }

    #[test]
    fn test_key_is_stable_and_order_independent() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        let (s, g, a) = request(&schema, "photos/pic.jpg", "240x240", &["sharpen", "crop", "quality=95"]);
        let (_, _, b) = request(&schema, "photos/pic.jpg", "240x240", &["quality=95", "crop", "sharpen"]);

        let key_a = codec.derive_key(&s, &g, &a);
        let key_b = codec.derive_key(&s, &g, &b);
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.as_str().len(), 64);
        assert!(key_a.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_distinguishes_inputs() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        let (s, g, o) = request(&schema, "photos/pic.jpg", "240x240", &[]);
        let base = codec.derive_key(&s, &g, &o);

        let (s2, g2, o2) = request(&schema, "photos/Pic.jpg", "240x240", &[]);
        assert_ne!(base, codec.derive_key(&s2, &g2, &o2));

        let (s3, g3, o3) = request(&schema, "photos/pic.jpg", "240x", &[]);
        assert_ne!(base, codec.derive_key(&s3, &g3, &o3));

        let (s4, g4, o4) = request(&schema, "photos/pic.jpg", "240x240", &["quality=90"]);
        assert_ne!(base, codec.derive_key(&s4, &g4, &o4));
    }

    #[test]
    fn test_elided_default_keeps_key() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        let (s, g, plain) = request(&schema, "pic.jpg", "100x100", &[]);
        let (_, _, explicit) = request(&schema, "pic.jpg", "100x100", &["colorspace=RGB", "quality=85"]);
        assert_eq!(codec.derive_key(&s, &g, &plain), codec.derive_key(&s, &g, &explicit));
    }

    #[test]
    fn test_basename() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        let (s, g, o) = request(&schema, "photos/pic.jpg", "240x240", &[]);
        assert_eq!(codec.derive_basename(&s, &g, &o), "photos/pic_jpg_240x240_q85.jpg");

        let (s, g, o) = request(&schema, "photos/pic.jpg", "240x240", &["sharpen", "crop", "quality=95"]);
        assert_eq!(
            codec.derive_basename(&s, &g, &o),
            "photos/pic_jpg_240x240_crop_sharpen_q95.jpg"
        );

        let (s, g, o) = request(&schema, "pic.jpg", "x100", &["format=png", "colorspace=GRAY"]);
        assert_eq!(codec.derive_basename(&s, &g, &o), "pic_jpg_x100_colorspace-gray_q85.png");
    }

    #[test]
    fn test_basename_for_remote_source() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        let (s, g, o) = request(&schema, "https://example.com/img/a b.png?v=2", "50x", &[]);
        assert_eq!(
            codec.derive_basename(&s, &g, &o),
            "https%3A%2F%2Fexample_com/img/a%20b_png%3Fv%3D2_50x_q85.jpg"
        );
    }

    #[test]
    fn test_basenames_of_distinct_sources_differ() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        let basename = |source: &str| {
            let (s, g, o) = request(&schema, source, "240x240", &[]);
            codec.derive_basename(&s, &g, &o)
        };

        assert_eq!(basename("photos/a.jpg"), "photos/a_jpg_240x240_q85.jpg");
        assert_eq!(basename("photos/a_jpg"), "photos/a%5Fjpg_240x240_q85.jpg");

        let groups = [
            vec!["photos/a.jpg", "photos/a_jpg", "photos/a%2Ejpg", "/photos/a.jpg"],
            vec!["http://x/a.jpg", "https://x/a.jpg", "x/a.jpg"],
            vec!["https://x/img?v=1", "https://x/img?v=2", "https://x/img#v=1", "https://x/img"],
            vec!["https://x//a.jpg", "https://x/a.jpg", "https://x/%2Fa.jpg"],
        ];
        for group in groups {
            let names: std::collections::HashSet<String> =
                group.iter().map(|source| basename(source)).collect();
            assert_eq!(names.len(), group.len(), "{:?}", group);
        }
    }

    #[test]
    fn test_basename_has_no_empty_segments() {
        let (codec, schema) = codec(NamingStrategy::Readable, "");
        for source in [
            "https://cdn.example.com//photos/pic.png",
            "/photos/pic.jpg",
            "photos///pic.jpg",
            "https://cdn.example.com/photos/",
        ] {
            let (s, g, o) = request(&schema, source, "240x240", &[]);
            let name = codec.derive_basename(&s, &g, &o);
            assert!(
                name.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != ".."),
                "{}",
                name
            );
        }
        let (s, g, o) = request(&schema, "https://cdn.example.com//photos/pic.png", "240x240", &[]);
        assert_eq!(
            codec.derive_basename(&s, &g, &o),
            "https%3A%2F%2Fcdn_example_com%2F%2Fphotos/pic_png_240x240_q85.jpg"
        );
    }

    #[test]
    fn test_storage_paths() {
        let (codec, schema) = codec(NamingStrategy::Hashed, "/cache/");
        let (s, g, o) = request(&schema, "pic.jpg", "100x100", &[]);
        let key = codec.derive_key(&s, &g, &o);
        let path = codec.storage_path(&key, &s, &g, &o);
        assert_eq!(
            path,
            format!("cache/{}/{}/{}.jpg", &key.as_str()[0..2], &key.as_str()[2..4], key)
        );

        let (codec, _) = self::codec(NamingStrategy::Readable, "thumbs");
        assert_eq!(codec.storage_path(&key, &s, &g, &o), "thumbs/pic_jpg_100x100_q85.jpg");
    }

    #[test]
    fn test_cache_key_schema() {
        let key = ThumbnailKey::from_raw("abcd".to_string());
        assert_eq!(KeyCodec::meta_key(&key), "v1:thumb:meta:abcd");

        let source = SourceRef::parse("pic.jpg").unwrap();
        let index = KeyCodec::source_index_key(&source);
        assert!(index.starts_with("v1:thumb:src:"));
        assert_eq!(index.len(), "v1:thumb:src:".len() + 64);
    }

    #[test]
    fn test_naming_from_str() {
        assert_eq!("hashed".parse::<NamingStrategy>(), Ok(NamingStrategy::Hashed));
        assert_eq!("Readable".parse::<NamingStrategy>(), Ok(NamingStrategy::Readable));
        assert!("other".parse::<NamingStrategy>().is_err());
    }
}
