use std::path::Path;

use thiserror::Error;

use crate::recognition::domain::face_embedding::FaceEmbedding;

/// Reserved name for captures whose consent utterance carried no usable name.
pub const UNKNOWN_NAME: &str = "unknown";

#[derive(Error, Debug, PartialEq)]
pub enum CaptureNameError {
    #[error("not a capture file name: {0}")]
    BadShape(String),
    #[error("timestamp must be 14 digits: {0}")]
    BadTimestamp(String),
    #[error("name must be [a-z0-9_]+: {0}")]
    BadName(String),
}

/// One consent capture as known to the registry.
///
/// `id` is the filename stem (`YYYYMMDDHHMMSS_<name>[_<n>]`), which is what
/// the monitor keys deletions on. The embedding is derived from the image at
/// load time and never persisted.
#[derive(Clone, Debug)]
pub struct ConsentRecord {
    pub id: String,
    pub name: String,
    pub timestamp: u64,
    pub embedding: FaceEmbedding,
}

/// Parse a capture file stem under the grammar
/// `YYYYMMDDHHMMSS_<name>[_<n>]` with `<name>` in `[a-z0-9_]+` and `<n> >= 2`.
///
/// Returns `(timestamp, name)`. A trailing `_<n>` with `n >= 2` is read as
/// the writer's collision suffix and stripped from the logical name.
pub fn parse_capture_stem(stem: &str) -> Result<(u64, String), CaptureNameError> {
    let (ts, rest) = stem
        .split_once('_')
        .ok_or_else(|| CaptureNameError::BadShape(stem.to_string()))?;

    if ts.len() != 14 || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CaptureNameError::BadTimestamp(stem.to_string()));
    }
    let timestamp: u64 = ts
        .parse()
        .map_err(|_| CaptureNameError::BadTimestamp(stem.to_string()))?;

    if rest.is_empty() {
        return Err(CaptureNameError::BadShape(stem.to_string()));
    }
    if !rest
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(CaptureNameError::BadName(stem.to_string()));
    }

    // Strip one trailing `_<n>` (n >= 2) collision suffix, if present.
    let name = match rest.rsplit_once('_') {
        Some((base, tail))
            if !base.is_empty()
                && tail.bytes().all(|b| b.is_ascii_digit())
                && tail.parse::<u64>().map(|n| n >= 2).unwrap_or(false) =>
        {
            base.to_string()
        }
        _ => rest.to_string(),
    };

    if name.is_empty() {
        return Err(CaptureNameError::BadShape(stem.to_string()));
    }

    Ok((timestamp, name))
}

/// Parse a capture path: must be a `.jpg` whose stem follows the grammar.
pub fn parse_capture_path(path: &Path) -> Result<(u64, String), CaptureNameError> {
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg"))
        .unwrap_or(false);
    if !ext_ok {
        return Err(CaptureNameError::BadShape(path.display().to_string()));
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CaptureNameError::BadShape(path.display().to_string()))?;
    parse_capture_stem(stem)
}

/// The file stem for a new capture: `<YYYYMMDDHHMMSS>_<name>`.
pub fn capture_stem(timestamp: u64, name: &str) -> String {
    format!("{timestamp:014}_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[test]
    fn test_parse_simple() {
        let (ts, name) = parse_capture_stem("20250301120000_alice").unwrap();
        assert_eq!(ts, 20250301120000);
        assert_eq!(name, "alice");
    }

    #[test]
    fn test_parse_unknown() {
        let (_, name) = parse_capture_stem("20250301120000_unknown").unwrap();
        assert_eq!(name, UNKNOWN_NAME);
    }

    #[test]
    fn test_parse_collision_suffix_stripped() {
        let (_, name) = parse_capture_stem("20250301120000_alice_2").unwrap();
        assert_eq!(name, "alice");
        let (_, name) = parse_capture_stem("20250301120000_alice_17").unwrap();
        assert_eq!(name, "alice");
    }

    #[test]
    fn test_parse_suffix_one_is_part_of_name() {
        // `_1` is not a valid collision suffix (n >= 2), so it stays in the name
        let (_, name) = parse_capture_stem("20250301120000_agent_1").unwrap();
        assert_eq!(name, "agent_1");
    }

    #[test]
    fn test_parse_name_with_underscores() {
        let (_, name) = parse_capture_stem("20250301120000_mary_jane").unwrap();
        assert_eq!(name, "mary_jane");
    }

    #[rstest]
    #[case::no_separator("20250301120000")]
    #[case::short_timestamp("2025_alice")]
    #[case::alpha_timestamp("2025030112000x_alice")]
    #[case::empty_name("20250301120000_")]
    #[case::uppercase_name("20250301120000_Alice")]
    #[case::space_in_name("20250301120000_al ice")]
    fn test_parse_rejects(#[case] stem: &str) {
        assert!(parse_capture_stem(stem).is_err());
    }

    #[test]
    fn test_parse_path_requires_jpg() {
        assert!(parse_capture_path(&PathBuf::from("20250301120000_alice.jpg")).is_ok());
        assert!(parse_capture_path(&PathBuf::from("20250301120000_alice.JPG")).is_ok());
        assert!(parse_capture_path(&PathBuf::from("20250301120000_alice.png")).is_err());
        assert!(parse_capture_path(&PathBuf::from("20250301120000_alice")).is_err());
    }

    #[test]
    fn test_capture_stem_roundtrip() {
        let stem = capture_stem(20250301120000, "bob");
        assert_eq!(stem, "20250301120000_bob");
        let (ts, name) = parse_capture_stem(&stem).unwrap();
        assert_eq!(ts, 20250301120000);
        assert_eq!(name, "bob");
    }

    #[test]
    fn test_capture_stem_pads_timestamp() {
        // Degenerate timestamps still render as 14 digits
        assert_eq!(capture_stem(42, "x"), "00000000000042_x");
    }
}
