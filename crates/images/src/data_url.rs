//! Parsing and construction of `data:` URLs carrying base64 image payloads.
//!
//! Inline images arrive as `data:<mime-type>;base64,<payload>`. The parsed
//! form keeps the payload as text: the content hash that names the stored
//! file is computed over the base64 text itself, not the decoded bytes, so
//! filenames stay stable for byte-identical inline strings.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::{ImageError, ImageResult};

/// A parsed inline image string.
///
/// Borrows from the document value it was parsed out of; nothing is copied
/// until the payload is decoded or the filename is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUrl<'a> {
    mime: &'a str,
    payload: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Parses an inline image string of the form `data:<mime>;...,<payload>`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::MalformedDataUrl`] when the comma separating the
    /// header from the payload is missing, when the header does not start
    /// with `data:`, when no `;` terminates the media type, or when the media
    /// type has no subtype. A value that looked like an inline image but
    /// fails here must abort the save; it is never treated as a plain
    /// reference.
    pub fn parse(value: &'a str) -> ImageResult<Self> {
        let (header, payload) = value
            .split_once(',')
            .ok_or_else(|| ImageError::MalformedDataUrl("missing ',' separator".into()))?;

        let header = header
            .strip_prefix("data:")
            .ok_or_else(|| ImageError::MalformedDataUrl("missing 'data:' prefix".into()))?;

        let (mime, _parameters) = header
            .split_once(';')
            .ok_or_else(|| ImageError::MalformedDataUrl("missing ';' after media type".into()))?;

        match mime.split_once('/') {
            Some((_, subtype)) if !subtype.is_empty() => Ok(Self { mime, payload }),
            _ => Err(ImageError::MalformedDataUrl(format!(
                "media type {mime:?} has no subtype"
            ))),
        }
    }

    /// The full media type, e.g. `image/png`.
    pub fn mime(&self) -> &'a str {
        self.mime
    }

    /// The media subtype, e.g. `png`.
    pub fn subtype(&self) -> &'a str {
        match self.mime.split_once('/') {
            Some((_, subtype)) => subtype,
            None => self.mime,
        }
    }

    /// The base64 payload text, undecoded.
    pub fn payload(&self) -> &'a str {
        self.payload
    }

    /// File extension for the stored image: the media subtype, with `jpeg`
    /// shortened to `jpg`.
    pub fn extension(&self) -> &'a str {
        match self.subtype() {
            "jpeg" => "jpg",
            subtype => subtype,
        }
    }

    /// Lowercase SHA-256 hex digest of the payload text.
    ///
    /// Hashing the text rather than the decoded bytes means two payloads that
    /// differ only in padding or line wrapping hash differently; that is the
    /// established filename scheme and is kept as-is.
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.payload.as_bytes()))
    }

    /// Content-addressed filename: `<sha256hex>.<extension>`.
    pub fn filename(&self) -> String {
        format!("{}.{}", self.content_hash(), self.extension())
    }

    /// Decodes the base64 payload into image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::PayloadDecode`] if the payload is not valid
    /// standard-alphabet base64.
    pub fn decode(&self) -> ImageResult<Vec<u8>> {
        Ok(STANDARD.decode(self.payload)?)
    }
}

/// Maps a stored-file extension back to a media subtype (`jpg` → `jpeg`;
/// everything else passes through verbatim).
pub fn subtype_for_extension(extension: &str) -> &str {
    match extension {
        "jpg" => "jpeg",
        other => other,
    }
}

/// Builds the inline form of a stored image: `data:image/<subtype>;base64,<payload>`.
pub fn encode_data_url(extension: &str, bytes: &[u8]) -> String {
    format!(
        "data:image/{};base64,{}",
        subtype_for_extension(extension),
        STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_mime_and_payload() {
        let url = DataUrl::parse("data:image/png;base64,AAAA").unwrap();

        assert_eq!(url.mime(), "image/png");
        assert_eq!(url.subtype(), "png");
        assert_eq!(url.payload(), "AAAA");
        assert_eq!(url.extension(), "png");
    }

    #[test]
    fn parse_rejects_missing_comma() {
        let result = DataUrl::parse("data:image/png;base64");
        assert!(matches!(result, Err(ImageError::MalformedDataUrl(_))));
    }

    #[test]
    fn parse_rejects_missing_semicolon() {
        let result = DataUrl::parse("data:image/png,AAAA");
        assert!(matches!(result, Err(ImageError::MalformedDataUrl(_))));
    }

    #[test]
    fn parse_rejects_missing_data_prefix() {
        let result = DataUrl::parse("image/png;base64,AAAA");
        assert!(matches!(result, Err(ImageError::MalformedDataUrl(_))));
    }

    #[test]
    fn parse_rejects_media_type_without_subtype() {
        let result = DataUrl::parse("data:image;base64,AAAA");
        assert!(matches!(result, Err(ImageError::MalformedDataUrl(_))));

        let result = DataUrl::parse("data:image/;base64,AAAA");
        assert!(matches!(result, Err(ImageError::MalformedDataUrl(_))));
    }

    #[test]
    fn payload_may_be_empty() {
        let url = DataUrl::parse("data:image/png;base64,").unwrap();

        assert_eq!(url.payload(), "");
        assert_eq!(url.decode().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn jpeg_extension_is_shortened() {
        let url = DataUrl::parse("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(url.extension(), "jpg");
    }

    #[test]
    fn unusual_subtypes_pass_through() {
        let url = DataUrl::parse("data:image/svg+xml;base64,AAAA").unwrap();
        assert_eq!(url.extension(), "svg+xml");
    }

    #[test]
    fn content_hash_covers_payload_text() {
        let url = DataUrl::parse("data:image/png;base64,AAAA").unwrap();

        // sha256 of the four-character string "AAAA"
        assert_eq!(
            url.content_hash(),
            "63c1dd951ffedf6f7fd968ad4efa39b8ed584f162f46e715114ee184f8de9201"
        );
        assert_eq!(
            url.filename(),
            "63c1dd951ffedf6f7fd968ad4efa39b8ed584f162f46e715114ee184f8de9201.png"
        );
    }

    #[test]
    fn hash_is_independent_of_media_type() {
        let png = DataUrl::parse("data:image/png;base64,AAAA").unwrap();
        let gif = DataUrl::parse("data:image/gif;base64,AAAA").unwrap();

        assert_eq!(png.content_hash(), gif.content_hash());
        assert_ne!(png.filename(), gif.filename());
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let url = DataUrl::parse("data:image/png;base64,not valid!").unwrap();
        assert!(matches!(url.decode(), Err(ImageError::PayloadDecode(_))));
    }

    #[test]
    fn encode_data_url_round_trips() {
        let url = DataUrl::parse("data:image/png;base64,AAAA").unwrap();
        let bytes = url.decode().unwrap();

        assert_eq!(
            encode_data_url(url.extension(), &bytes),
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn encode_data_url_restores_jpeg_subtype() {
        assert_eq!(
            encode_data_url("jpg", &[0xFF, 0xD8, 0xFF]),
            "data:image/jpeg;base64,/9j/"
        );
    }
}
