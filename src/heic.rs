//! HEIC/HEIF detection and conversion to JPEG
//!
//! Chat clients will not preview HEIC. Instagram often serves `.heic` names
//! whose bytes are already JPEG, so the magic bytes are checked before any
//! decoding happens.

use crate::error::DeliveryError;
use crate::media::with_extension;
use image::codecs::jpeg::JpegEncoder;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const HEIF_BRANDS: [&[u8]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];
const JPEG_QUALITY: u8 = 95;

/// HEIC by declared content type or by `ftyp` box brand
pub fn is_real_heic(data: &[u8], content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("heic") || ct.contains("heif") {
        return true;
    }
    data.len() >= 12 && &data[4..8] == b"ftyp" && HEIF_BRANDS.contains(&&data[8..12])
}

pub fn has_heic_filename(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".heic") || lower.ends_with(".heif")
}

/// Make a possibly-HEIC payload uploadable.
///
/// JPEG and PNG bytes pass through with a corrected extension; anything else
/// is decoded as HEIF and re-encoded as JPEG.
pub fn fix_heic_media(data: Vec<u8>, filename: &str) -> Result<(Vec<u8>, String), DeliveryError> {
    if data.starts_with(JPEG_MAGIC) {
        return Ok((data, with_extension(filename, "jpg")));
    }
    if data.starts_with(PNG_MAGIC) {
        return Ok((data, with_extension(filename, "png")));
    }

    let jpeg = transcode_to_jpeg(&data)?;
    Ok((jpeg, with_extension(filename, "jpg")))
}

#[cfg(feature = "heic")]
fn transcode_to_jpeg(data: &[u8]) -> Result<Vec<u8>, DeliveryError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib = LibHeif::new();
    let ctx =
        HeifContext::read_from_bytes(data).map_err(|e| DeliveryError::Transcode(e.to_string()))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| DeliveryError::Transcode(e.to_string()))?;
    // decoding straight to RGB drops any alpha channel
    let decoded = lib
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| DeliveryError::Transcode(e.to_string()))?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| {
            DeliveryError::Transcode("decoder returned no interleaved plane".to_string())
        })?;

    let row_len = plane.width as usize * 3;
    let mut rgb = Vec::with_capacity(row_len * plane.height as usize);
    for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
        rgb.extend_from_slice(&row[..row_len.min(row.len())]);
    }

    encode_jpeg(plane.width, plane.height, rgb)
}

#[cfg(not(feature = "heic"))]
fn transcode_to_jpeg(_data: &[u8]) -> Result<Vec<u8>, DeliveryError> {
    Err(DeliveryError::Transcode(
        "HEIC support is not compiled in (built without the `heic` feature)".to_string(),
    ))
}

/// Encode packed RGB8 pixels as a JPEG
pub fn encode_jpeg(width: u32, height: u32, rgb: Vec<u8>) -> Result<Vec<u8>, DeliveryError> {
    let img = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| {
            DeliveryError::Transcode("pixel buffer does not match image size".to_string())
        })?;

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| DeliveryError::Transcode(e.to_string()))?;
    Ok(out)
}
