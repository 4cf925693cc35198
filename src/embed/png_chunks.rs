//! PNG encoding and text chunks
//!
//! Text is stored as `tEXt` when it is plain Latin-1 and as `iTXt` (UTF-8)
//! otherwise. Reading accepts `tEXt`, `zTXt` and `iTXt`; for repeated keys the
//! last chunk wins.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use png::{BitDepth, ColorType, Compression, Transformations};

/// Decoded 8-bit RGB image plus its text chunks
#[derive(Debug, Clone)]
pub struct DecodedPng {
    pub width: u32,
    pub height: u32,
    /// Packed RGB samples, alpha dropped and gray expanded
    pub rgb: Vec<u8>,
    pub text: BTreeMap<String, String>,
}

/// Errors reading a PNG
#[derive(Debug, thiserror::Error)]
pub enum PngReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG decode error: {0}")]
    Decode(#[from] png::DecodingError),
}

/// Errors writing a PNG
#[derive(Debug, thiserror::Error)]
pub enum PngWriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encode error: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("cannot encode {0} channels")]
    UnsupportedChannels(usize),
}

/// Map a 0-9 compression level onto the encoder's presets
pub fn compression_for_level(level: u8) -> Compression {
    match level {
        0..=2 => Compression::Fast,
        3..=6 => Compression::Default,
        _ => Compression::Best,
    }
}

fn color_type_for(channels: usize) -> Option<ColorType> {
    match channels {
        1 => Some(ColorType::Grayscale),
        2 => Some(ColorType::GrayscaleAlpha),
        3 => Some(ColorType::Rgb),
        4 => Some(ColorType::Rgba),
        _ => None,
    }
}

/// PNG keyword rules: 1-79 Latin-1 printable characters, no leading,
/// trailing or doubled spaces.
pub fn is_valid_keyword(keyword: &str) -> bool {
    let len = keyword.chars().count();
    (1..=79).contains(&len)
        && keyword
            .chars()
            .all(|c| matches!(c as u32, 32..=126 | 161..=255))
        && !keyword.starts_with(' ')
        && !keyword.ends_with(' ')
        && !keyword.contains("  ")
}

fn is_plain_latin1(text: &str) -> bool {
    text.chars().all(|c| (c as u32) <= 0xFF && c != '\0')
}

/// Encode 8-bit samples to `path` with the given text chunks.
///
/// Entries with keywords PNG cannot store are skipped with a warning.
pub fn write_png(
    path: &Path,
    width: u32,
    height: u32,
    channels: usize,
    samples: &[u8],
    text: &[(String, String)],
    compress_level: u8,
) -> Result<(), PngWriteError> {
    let color = color_type_for(channels).ok_or(PngWriteError::UnsupportedChannels(channels))?;
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(color);
    encoder.set_depth(BitDepth::Eight);
    encoder.set_compression(compression_for_level(compress_level));

    for (keyword, value) in text {
        if !is_valid_keyword(keyword) {
            tracing::warn!(keyword = %keyword, "skipping text chunk with invalid PNG keyword");
            continue;
        }
        if is_plain_latin1(value) {
            encoder.add_text_chunk(keyword.clone(), value.clone())?;
        } else {
            encoder.add_itxt_chunk(keyword.clone(), value.clone())?;
        }
    }

    let mut writer = encoder.write_header()?;
    writer.write_image_data(samples)?;
    writer.finish()?;
    Ok(())
}

fn collect_text(info: &png::Info<'_>) -> BTreeMap<String, String> {
    let mut text = BTreeMap::new();
    for chunk in &info.uncompressed_latin1_text {
        text.insert(chunk.keyword.clone(), chunk.text.clone());
    }
    for chunk in &info.compressed_latin1_text {
        match chunk.get_text() {
            Ok(value) => {
                text.insert(chunk.keyword.clone(), value);
            }
            Err(e) => tracing::debug!(keyword = %chunk.keyword, "unreadable zTXt chunk: {}", e),
        }
    }
    for chunk in &info.utf8_text {
        match chunk.get_text() {
            Ok(value) => {
                text.insert(chunk.keyword.clone(), value);
            }
            Err(e) => tracing::debug!(keyword = %chunk.keyword, "unreadable iTXt chunk: {}", e),
        }
    }
    text
}

/// Text chunks preceding the image data, without decoding pixels
pub fn read_text(path: &Path) -> Result<BTreeMap<String, String>, PngReadError> {
    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let reader = decoder.read_info()?;
    Ok(collect_text(reader.info()))
}

/// Decode pixels (as 8-bit RGB) and text chunks
pub fn decode_png(path: &Path) -> Result<DecodedPng, PngReadError> {
    let mut decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;

    let mut buffer = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buffer)?;
    let samples = &buffer[..frame.buffer_size()];

    let channels = match frame.color_type {
        ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba => 4,
        // Palette images are expanded by the EXPAND transformation.
        ColorType::Indexed => 3,
    };

    let rgb = samples
        .chunks_exact(channels)
        .flat_map(|px| match channels {
            1 | 2 => [px[0], px[0], px[0]],
            _ => [px[0], px[1], px[2]],
        })
        .collect();

    Ok(DecodedPng {
        width: frame.width,
        height: frame.height,
        rgb,
        text: collect_text(reader.info()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_text_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        let text = entries(&[("prompt", "a red fox"), ("seed", "42")]);
        write_png(&path, 2, 1, 3, &[255, 0, 0, 0, 255, 0], &text, 4).unwrap();

        let read = read_text(&path).unwrap();
        assert_eq!(read["prompt"], "a red fox");
        assert_eq!(read["seed"], "42");
    }

    #[test]
    fn test_unicode_text_uses_itxt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u.png");
        let text = entries(&[("prompt", "黒い猫 in the rain"), ("note", "café")]);
        write_png(&path, 1, 1, 3, &[1, 2, 3], &text, 4).unwrap();

        let read = read_text(&path).unwrap();
        assert_eq!(read["prompt"], "黒い猫 in the rain");
        assert_eq!(read["note"], "café");
    }

    #[test]
    fn test_invalid_keyword_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.png");
        let long = "k".repeat(80);
        let text = entries(&[("", "x"), (long.as_str(), "y"), (" lead", "z"), ("ok", "fine")]);
        write_png(&path, 1, 1, 3, &[0, 0, 0], &text, 4).unwrap();

        let read = read_text(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read["ok"], "fine");
    }

    #[test]
    fn test_decode_expands_gray_and_drops_alpha() {
        let dir = TempDir::new().unwrap();
        let gray = dir.path().join("g.png");
        write_png(&gray, 2, 1, 1, &[10, 200], &[], 1).unwrap();
        let decoded = decode_png(&gray).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.rgb, vec![10, 10, 10, 200, 200, 200]);

        let rgba = dir.path().join("rgba.png");
        write_png(&rgba, 1, 1, 4, &[1, 2, 3, 4], &entries(&[("a", "b")]), 9).unwrap();
        let decoded = decode_png(&rgba).unwrap();
        assert_eq!(decoded.rgb, vec![1, 2, 3]);
        assert_eq!(decoded.text["a"], "b");
    }

    #[test]
    fn test_not_a_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not png").unwrap();
        assert!(matches!(read_text(&path), Err(PngReadError::Decode(_))));
    }

    #[test]
    fn test_keyword_rules() {
        assert!(is_valid_keyword("Custom_Nodes_Versions"));
        assert!(is_valid_keyword("fmj_snapshot"));
        assert!(!is_valid_keyword(""));
        assert!(!is_valid_keyword("two  spaces"));
        assert!(!is_valid_keyword("trailing "));
        assert!(!is_valid_keyword("日本"));
    }

    #[test]
    fn test_unsupported_channels() {
        let dir = TempDir::new().unwrap();
        let err = write_png(&dir.path().join("x.png"), 1, 1, 5, &[0; 5], &[], 4).unwrap_err();
        assert!(matches!(err, PngWriteError::UnsupportedChannels(5)));
    }

    #[test]
    fn test_compression_levels() {
        assert!(matches!(compression_for_level(0), Compression::Fast));
        assert!(matches!(compression_for_level(4), Compression::Default));
        assert!(matches!(compression_for_level(9), Compression::Best));
    }
}
