use chardetng::EncodingDetector;
use encoding_rs::Encoding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    pub html: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
}

/// Decode a fetched page into UTF-8. Precedence: BOM, then the Content-Type
/// header charset, then chardetng detection over the raw bytes.
pub fn decode_page(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedPage, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(label) = content_type.and_then(header_charset) {
        if let Some(enc) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, enc);
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn header_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        let (key, value) = part.split_at_checked(8)?;
        if !key.eq_ignore_ascii_case("charset=") {
            return None;
        }
        let value = value.trim_matches([' ', '"', '\''].as_ref());
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedPage, DecodeError> {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: enc.name().to_string(),
            message: "decoding error".into(),
        });
    }
    Ok(DecodedPage {
        html: text.into_owned(),
        encoding_label: enc.name().to_string(),
    })
}
