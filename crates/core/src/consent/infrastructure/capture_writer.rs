use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::consent::domain::record::{capture_stem, UNKNOWN_NAME};

const JPEG_QUALITY: u8 = 90;

/// Write a consent capture JPEG into the capture directory.
///
/// The stem is `<YYYYMMDDHHMMSS>_<name>` with the timestamp taken at the
/// moment of writing (local time); when that exact path already exists the
/// writer appends `_2`, `_3`, … before the extension. The file is fsynced
/// before this returns so the directory monitor never reads a partial image.
///
/// Returns the path written.
pub fn write_capture(
    capture_dir: &Path,
    name: Option<&str>,
    rgb_data: &[u8],
    width: u32,
    height: u32,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let timestamp: u64 = chrono::Local::now()
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()?;
    write_capture_at(capture_dir, timestamp, name, rgb_data, width, height)
}

/// As [`write_capture`] but with the caller supplying the timestamp.
pub fn write_capture_at(
    capture_dir: &Path,
    timestamp: u64,
    name: Option<&str>,
    rgb_data: &[u8],
    width: u32,
    height: u32,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if rgb_data.len() != (width as usize) * (height as usize) * 3 {
        return Err("capture data length must equal width * height * 3".into());
    }

    fs::create_dir_all(capture_dir)?;

    let stem = capture_stem(timestamp, name.unwrap_or(UNKNOWN_NAME));
    let path = unique_capture_path(capture_dir, &stem);

    let file = fs::File::create(&path)?;
    let mut writer = BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode(
        rgb_data,
        width,
        height,
        image::ExtendedColorType::Rgb8,
    )?;
    let file = writer.into_inner()?;
    file.sync_all()?;

    Ok(path)
}

/// First free path for `stem`: `<stem>.jpg`, then `<stem>_2.jpg`, `<stem>_3.jpg`, …
fn unique_capture_path(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.jpg"));
    if !candidate.exists() {
        return candidate;
    }
    let mut n: u64 = 2;
    loop {
        let candidate = dir.join(format!("{stem}_{n}.jpg"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
