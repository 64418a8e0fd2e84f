//! Image → frame conversion.
//!
//! Every image that reaches the frame goes through [`render`]: scale so the
//! constrained axis covers the 300×400 box, center-crop, then Floyd–Steinberg
//! dither down to black and white. Files are converted in place into `.bmp`
//! frames by [`transform_file`].

use std::ffi::OsStr;
use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, ImageReader, Luma};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Extension of converted frame files.
pub const FRAME_EXTENSION: &str = "bmp";

/// Size the source is scaled to before cropping.
///
/// Portrait sources are scaled to the frame width, everything else to the
/// frame height.
pub fn scaled_size(src_w: u32, src_h: u32) -> (u32, u32) {
    let w = f64::from(src_w.max(1));
    let h = f64::from(src_h.max(1));
    let scale = if src_w < src_h {
        f64::from(Frame::WIDTH) / w
    } else {
        f64::from(Frame::HEIGHT) / h
    };
    let sw = (w * scale).round().max(1.0);
    let sh = (h * scale).round().max(1.0);
    (sw as u32, sh as u32)
}

/// Top-left corner of the centered crop box inside the scaled image.
///
/// Negative when the scaled image is smaller than the frame along that axis;
/// the uncovered band is filled with black.
pub fn crop_origin(scaled_w: u32, scaled_h: u32) -> (i64, i64) {
    let left = (i64::from(scaled_w) - i64::from(Frame::WIDTH)) / 2;
    let top = (i64::from(scaled_h) - i64::from(Frame::HEIGHT)) / 2;
    (left, top)
}

/// Stretch of one source axis that survives the crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// First source pixel and number of source pixels to keep.
    start: u32,
    len: u32,
    /// Length of the kept pixels once scaled.
    scaled_len: u32,
    /// Where the scaled pixels land on the frame; negative is clipped.
    offset: i64,
}

/// Map the crop window `[origin, origin + window)` of an axis scaled from
/// `src` to `scaled` pixels back onto whole source pixels.
fn visible_span(src: u32, scaled: u32, origin: i64, window: u32) -> Span {
    let src = u64::from(src.max(1));
    let scaled = u64::from(scaled.max(1));
    let first = origin.max(0).unsigned_abs();
    let end = (origin + i64::from(window)).clamp(0, scaled as i64).unsigned_abs();

    let start = (first * src / scaled).min(src - 1);
    let stop = (end * src).div_ceil(scaled).clamp(start + 1, src);
    let scaled_start = (start * scaled + src / 2) / src;
    let scaled_stop = ((stop * scaled + src / 2) / src).max(scaled_start + 1);

    Span {
        start: start as u32,
        len: (stop - start) as u32,
        scaled_len: (scaled_stop - scaled_start) as u32,
        offset: scaled_start as i64 - origin,
    }
}

/// Convert a decoded image into a displayable frame.
///
/// Only the part of the source that ends up inside the crop box is resized,
/// so the cost is bounded by the frame size rather than the source aspect.
pub fn render(img: &DynamicImage) -> Frame {
    let (src_w, src_h) = img.dimensions();
    let (sw, sh) = scaled_size(src_w, src_h);
    let (left, top) = crop_origin(sw, sh);
    let x = visible_span(src_w, sw, left, Frame::WIDTH);
    let y = visible_span(src_h, sh, top, Frame::HEIGHT);

    let region = img.crop_imm(x.start, y.start, x.len, y.len).to_luma8();
    let scaled = if (x.scaled_len, y.scaled_len) == region.dimensions() {
        region
    } else {
        imageops::resize(&region, x.scaled_len, y.scaled_len, FilterType::Lanczos3)
    };

    let mut canvas = GrayImage::from_pixel(Frame::WIDTH, Frame::HEIGHT, Luma([0]));
    imageops::replace(&mut canvas, &scaled, x.offset, y.offset);
    imageops::dither(&mut canvas, &BiLevel);

    // The canvas is frame-sized by construction.
    Frame::from_luma(&canvas).unwrap_or_else(Frame::blank)
}

/// Decode `path` and render it.
pub fn load_frame(path: &Path) -> Result<Frame> {
    Ok(render(&decode(path)?))
}

fn decode(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    reader.decode().map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether `path` names an already converted frame file.
pub fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION))
}

/// Convert `path` into a sibling `.bmp` frame and remove the original.
///
/// The frame is written to a temporary file, synced, and renamed into place
/// before the source is deleted. On decode failure nothing is written and the
/// source is left untouched.
pub fn transform_file(path: &Path) -> Result<PathBuf> {
    let img = decode(path)?;
    let frame = render(&img);

    let target = path.with_extension(FRAME_EXTENSION);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    frame.write_bmp(BufWriter::new(tmp.as_file_mut()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|err| err.error)?;

    if target != path {
        delete_if_exists(path)?;
    }
    debug!(source = %path.display(), target = %target.display(), "image converted");
    Ok(target)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Convert every non-frame file directly inside `folder`.
///
/// Per-file failures are logged and collected; only a failure to list the
/// folder itself is returned as an error. A missing folder converts nothing.
pub fn transform_folder(folder: &Path) -> Result<TransformReport> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(folder = %folder.display(), "transform: folder missing; skipping");
            return Ok(TransformReport::default());
        }
        Err(err) => return Err(err.into()),
    };

    let mut pending: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.starts_with('.'));
        if hidden || is_frame_file(&path) {
            continue;
        }
        pending.push(path);
    }
    pending.sort();

    let mut report = TransformReport::default();
    for path in pending {
        match transform_file(&path) {
            Ok(target) => {
                info!(path = %target.display(), "processed image");
                report.converted.push(target);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to process image; leaving it in place");
                report.failed.push(path);
            }
        }
    }
    Ok(report)
}

fn delete_if_exists(p: &Path) -> Result<()> {
    match fs::remove_file(p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %p.display(), "delete: source vanished during remove; skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_and_square_sources_scale_to_frame_height() {
        assert_eq!(scaled_size(800, 800), (400, 400));
        assert_eq!(scaled_size(1200, 600), (800, 400));
        assert_eq!(crop_origin(400, 400), (50, 0));
        assert_eq!(crop_origin(800, 400), (250, 0));
    }

    #[test]
    fn portrait_sources_scale_to_frame_width() {
        assert_eq!(scaled_size(600, 1200), (300, 600));
        assert_eq!(crop_origin(300, 600), (0, 100));
        assert_eq!(scaled_size(1000, 1333), (300, 400));
    }

    #[test]
    fn scale_rounds_to_nearest_pixel() {
        // 400 / 3 * 1000 = 133333.33 wide
        assert_eq!(scaled_size(1000, 3), (133_333, 400));
        // 300 / 7 * 10 = 428.57 tall
        assert_eq!(scaled_size(7, 10), (300, 429));
    }

    #[test]
    fn visible_span_keeps_only_cropped_source_pixels() {
        // 800 wide scaled to 400, window 50..350 maps to source 100..700.
        let x = visible_span(800, 400, 50, Frame::WIDTH);
        assert_eq!(x, Span { start: 100, len: 600, scaled_len: 300, offset: 0 });

        // Narrower than the frame: everything is kept and centered.
        let y = visible_span(10, 200, -100, Frame::HEIGHT);
        assert_eq!(y, Span { start: 0, len: 10, scaled_len: 200, offset: 100 });
    }

    #[test]
    fn visible_span_of_extreme_strip_is_small() {
        let (sw, _) = scaled_size(20_000, 1);
        let (left, _) = crop_origin(sw, 400);
        let x = visible_span(20_000, sw, left, Frame::WIDTH);
        assert!(x.len <= 3, "kept {} source columns", x.len);
        assert!(x.scaled_len <= Frame::WIDTH + 800);
        assert!(x.offset <= 0 && x.offset + i64::from(x.scaled_len) >= i64::from(Frame::WIDTH));
    }

    #[test]
    fn frame_files_match_case_insensitively() {
        assert!(is_frame_file(Path::new("a/b.bmp")));
        assert!(is_frame_file(Path::new("a/b.BMP")));
        assert!(!is_frame_file(Path::new("a/b.jpg")));
        assert!(!is_frame_file(Path::new("a/bmp")));
    }
}
