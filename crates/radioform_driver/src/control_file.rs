//! Control file parsing.
//!
//! The host lists desired proxy devices in a plain-text file, one
//! `NAME|UID` per line. The reader is liberal: blank lines and lines
//! without a `|` are skipped, and a UID listed twice keeps the last name.

use std::collections::BTreeMap;
use std::path::Path;

pub use radioform_transport::CONTROL_FILE_PATH;

/// Parse control-file content into a UID -> display-name map.
pub fn parse_control_file(content: &str) -> BTreeMap<String, String> {
    let mut devices = BTreeMap::new();
    for line in content.lines() {
        if let Some((name, uid)) = line.split_once('|') {
            devices.insert(uid.to_string(), name.to_string());
        }
    }
    devices
}

/// Read and parse the control file. A missing or unreadable file is an
/// empty device list, not an error.
pub fn read_desired_devices(path: &Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_control_file(&content),
        Err(_) => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_lines() {
        let devices = parse_control_file("Spotify|uid-1\nChrome|uid-2\n");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices["uid-1"], "Spotify");
        assert_eq!(devices["uid-2"], "Chrome");
    }

    #[test]
    fn test_skips_blank_and_malformed_lines() {
        let devices = parse_control_file("\n\nno separator here\nGood|uid-3\n   \n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices["uid-3"], "Good");
    }

    #[test]
    fn test_duplicate_uid_keeps_last_name() {
        let devices = parse_control_file("First|uid-1\nSecond|uid-1\n");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices["uid-1"], "Second");
    }

    #[test]
    fn test_name_may_contain_anything_before_separator() {
        let devices = parse_control_file("My App (Pro) v2|uid-x\n");
        assert_eq!(devices["uid-x"], "My App (Pro) v2");
    }

    #[test]
    fn test_extra_separators_belong_to_uid() {
        // Only the first '|' splits; the rest is part of the UID.
        let devices = parse_control_file("Name|uid|with|pipes\n");
        assert_eq!(devices["uid|with|pipes"], "Name");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let devices = read_desired_devices(Path::new("/tmp/radioform-test-no-such-control-file"));
        assert!(devices.is_empty());
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.txt");
        std::fs::write(&path, "App|uid-9\n").unwrap();
        let devices = read_desired_devices(&path);
        assert_eq!(devices["uid-9"], "App");
    }
}
