use super::EnrichmentError;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::ImageFormat;
use std::io::Cursor;

/// Decode `bytes`, shrink to fit `edge`×`edge` and re-encode as a PNG
/// `data:` URI.
pub fn thumbnail_data_uri(
    bytes: &[u8],
    edge: u32,
) -> Result<String, EnrichmentError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| EnrichmentError::Decode(e.to_string()))?;
    let thumbnail = decoded.thumbnail(edge, edge);

    let mut out = Cursor::new(Vec::new());
    thumbnail
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| EnrichmentError::Processing(e.to_string()))?;

    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(out.into_inner())
    ))
}

/// Payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, EnrichmentError> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| {
            EnrichmentError::UrlResolution("malformed data uri".to_string())
        })?;
    if !header.ends_with(";base64") {
        return Err(EnrichmentError::UrlResolution(
            "only base64 data uris are supported".to_string(),
        ));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| EnrichmentError::Decode(e.to_string()))
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let buffer = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(buffer)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnails_fit_the_edge() {
        let uri = thumbnail_data_uri(&sample_png(256, 128), 32).unwrap();
        let bytes = decode_data_uri(&uri).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = thumbnail_data_uri(b"not an image", 32).unwrap_err();
        assert!(matches!(err, EnrichmentError::Decode(_)));
    }

    #[test]
    fn non_base64_data_uri_is_rejected() {
        assert!(decode_data_uri("data:text/plain,hello").is_err());
    }
}
