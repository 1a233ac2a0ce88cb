//! PNG encoding for rendered figures.
//!
//! Supports two encoding modes:
//! - **Indexed PNG (color type 3)**: used when the image has ≤256 unique colors
//!   (flat shaded maps, masks, colorbars).
//! - **RGBA PNG (color type 6)**: fallback for images with >256 colors.
//!
//! Figure metadata (titles, axis labels, tick units) travels in `tEXt` chunks
//! so a saved figure stays self-describing without font rendering.

use std::collections::HashMap;
use std::io::Write;

use topoviz_common::{Result, TopovizError};

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum keyword length of a `tEXt` chunk.
const MAX_KEYWORD_LEN: usize = 79;

/// Create a PNG image with automatic format selection and `tEXt` metadata.
///
/// # Arguments
/// - `pixels`: RGBA pixel data (4 bytes per pixel)
/// - `width`: Image width in pixels
/// - `height`: Image height in pixels
/// - `text`: `(keyword, text)` pairs written as `tEXt` chunks
pub fn create_png_auto(
    pixels: &[u8],
    width: usize,
    height: usize,
    text: &[(String, String)],
) -> Result<Vec<u8>> {
    check_dimensions(pixels, width, height)?;
    match extract_palette(pixels) {
        Some((palette, indices)) => create_png_indexed(width, height, &palette, &indices, text),
        None => create_png(pixels, width, height, text),
    }
}

fn check_dimensions(pixels: &[u8], width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(TopovizError::render(format!(
            "cannot encode an empty {}x{} image",
            width, height
        )));
    }
    if pixels.len() != width * height * 4 {
        return Err(TopovizError::render(format!(
            "pixel buffer holds {} bytes, expected {} for {}x{} RGBA",
            pixels.len(),
            width * height * 4,
            width,
            height
        )));
    }
    Ok(())
}

/// Pack RGBA bytes into a u32 for faster hashing and comparison
#[inline(always)]
fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

/// Palette and per-pixel indices, or `None` past 256 colors.
fn extract_palette(pixels: &[u8]) -> Option<(Vec<(u8, u8, u8, u8)>, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<(u8, u8, u8, u8)> = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 4);

    for chunk in pixels.chunks_exact(4) {
        let packed = pack_color(chunk[0], chunk[1], chunk[2], chunk[3]);

        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push((chunk[0], chunk[1], chunk[2], chunk[3]));
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

fn write_header(png: &mut Vec<u8>, width: usize, height: usize, color_type: u8) {
    png.extend_from_slice(&PNG_SIGNATURE);

    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr_data.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr_data.push(8); // bit depth
    ihdr_data.push(color_type);
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    write_chunk(png, b"IHDR", &ihdr_data);
}

/// Write `tEXt` chunks. Keywords are Latin-1, 1..=79 bytes, no NUL.
fn write_text_chunks(png: &mut Vec<u8>, text: &[(String, String)]) -> Result<()> {
    for (keyword, value) in text {
        if keyword.is_empty()
            || keyword.len() > MAX_KEYWORD_LEN
            || !keyword.bytes().all(|b| (32..=126).contains(&b))
        {
            return Err(TopovizError::render(format!(
                "invalid PNG text keyword '{}'",
                keyword
            )));
        }
        let mut data = Vec::with_capacity(keyword.len() + 1 + value.len());
        data.extend_from_slice(keyword.as_bytes());
        data.push(0);
        // tEXt is Latin-1; characters outside it are replaced.
        data.extend(value.chars().map(|c| if (c as u32) < 256 && c != '\0' { c as u8 } else { b'?' }));
        write_chunk(png, b"tEXt", &data);
    }
    Ok(())
}

/// Create an indexed PNG (color type 3) from palette and indices.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[(u8, u8, u8, u8)],
    indices: &[u8],
    text: &[(String, String)],
) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    write_header(&mut png, width, height, 3);

    // PLTE chunk (palette)
    let mut plte_data = Vec::with_capacity(palette.len() * 3);
    for (r, g, b, _) in palette {
        plte_data.push(*r);
        plte_data.push(*g);
        plte_data.push(*b);
    }
    write_chunk(&mut png, b"PLTE", &plte_data);

    // tRNS chunk (transparency) - only if any color has alpha < 255
    if palette.iter().any(|(_, _, _, a)| *a < 255) {
        let trns_data: Vec<u8> = palette.iter().map(|(_, _, _, a)| *a).collect();
        write_chunk(&mut png, b"tRNS", &trns_data);
    }

    write_text_chunks(&mut png, text)?;

    let idat_data = deflate_scanlines(indices, width, height)?;
    write_chunk(&mut png, b"IDAT", &idat_data);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Create a PNG image from RGBA pixel data (color type 6).
///
/// This is the fallback for images with >256 unique colors.
pub fn create_png(
    pixels: &[u8],
    width: usize,
    height: usize,
    text: &[(String, String)],
) -> Result<Vec<u8>> {
    check_dimensions(pixels, width, height)?;
    let mut png = Vec::new();
    write_header(&mut png, width, height, 6);
    write_text_chunks(&mut png, text)?;

    let idat_data = deflate_scanlines(pixels, width * 4, height)?;
    write_chunk(&mut png, b"IDAT", &idat_data);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Deflate `height` scanlines of `stride` bytes for the IDAT chunk.
fn deflate_scanlines(data: &[u8], stride: usize, height: usize) -> Result<Vec<u8>> {
    // Filter byte 0 (none) before every scanline
    let mut uncompressed = Vec::with_capacity(height * (1 + stride));
    for row in data.chunks_exact(stride).take(height) {
        uncompressed.push(0);
        uncompressed.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&uncompressed)
        .and_then(|_| encoder.finish())
        .map_err(|e| TopovizError::render(format!("IDAT compression failed: {}", e)))
}
