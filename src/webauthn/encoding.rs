//! Binary-to-text encoding used on the wire.
//!
//! Everything the server emits (challenges, user handles) is base64url
//! without padding, the same alphabet WebAuthn uses inside clientDataJSON.
//! Binary fields coming from clients are decoded leniently: base64url with or
//! without padding, falling back to standard base64, since browser helper
//! libraries disagree on which one they produce.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    prelude::*,
};

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes for the wire (base64url, no padding).
pub fn encode(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a client-supplied binary field.
pub fn decode(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    URL_SAFE_LENIENT
        .decode(text)
        .or_else(|_| STANDARD_LENIENT.decode(text))
        .ok()
}

/// Canonical text form of a credential id: base64url without padding.
///
/// Ids that are not base64 at all are kept as sent, trimmed.
pub fn canonical_id(id: &str) -> String {
    match decode(id) {
        Some(bytes) if !bytes.is_empty() => encode(&bytes),
        _ => id.trim().to_string(),
    }
}
