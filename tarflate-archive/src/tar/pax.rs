//! POSIX pax extended header records.
//!
//! A pax header's data is a sequence of `"<len> <key>=<value>\n"` records,
//! where `<len>` counts the whole record including its own digits.

use super::header::TarHeader;
use std::collections::BTreeMap;
use tarflate_core::error::{Result, StreamLayer, TarflateError};

/// Largest pax data block accepted by the reader.
pub const MAX_PAX_SIZE: u64 = 1024 * 1024;

/// Key/value overrides from pax extended headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaxExtensions {
    records: BTreeMap<String, String>,
}

impl PaxExtensions {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse pax data found at archive offset `offset`.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        let corrupt = |pos: usize, message: &str| {
            TarflateError::corrupt(StreamLayer::Tar, offset + pos as u64, message.to_string())
        };

        let mut records = BTreeMap::new();
        let mut pos = 0;
        while pos < data.len() {
            let space = data[pos..]
                .iter()
                .position(|&b| b == b' ')
                .map(|p| pos + p)
                .ok_or_else(|| corrupt(pos, "pax record without length"))?;

            let record_len: usize = std::str::from_utf8(&data[pos..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| corrupt(pos, "invalid pax record length"))?;

            let record_end = pos
                .checked_add(record_len)
                .filter(|&end| end > space + 1 && end <= data.len())
                .ok_or_else(|| corrupt(pos, "pax record length out of range"))?;
            if data[record_end - 1] != b'\n' {
                return Err(corrupt(record_end - 1, "pax record not newline-terminated"));
            }

            let record = &data[space + 1..record_end - 1];
            let eq = record
                .iter()
                .position(|&b| b == b'=')
                .ok_or_else(|| corrupt(space + 1, "pax record without '='"))?;
            let key = std::str::from_utf8(&record[..eq])
                .map_err(|_| corrupt(space + 1, "pax key is not UTF-8"))?;
            let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
            records.insert(key.to_string(), value);

            pos = record_end;
        }

        Ok(Self { records })
    }

    /// Serialize as pax data.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.records
            .iter()
            .flat_map(|(k, v)| format_pax_record(k, v).into_bytes())
            .collect()
    }

    /// Set a record.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.records.insert(key.to_string(), value.to_string());
    }

    /// Look up a record.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    /// Add every record of `other`, replacing existing keys. A record with
    /// an empty value deletes the key instead.
    pub fn merge(&mut self, other: &PaxExtensions) {
        for (key, value) in &other.records {
            if value.is_empty() {
                self.records.remove(key);
            } else {
                self.records.insert(key.clone(), value.clone());
            }
        }
    }

    /// Like [`merge`](Self::merge), but empty values are kept so they can
    /// still delete keys when merged onto another set.
    pub(crate) fn overlay(&mut self, other: &PaxExtensions) {
        self.records
            .extend(other.records.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Iterate over records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Override header fields with the recognized keys.
    pub(crate) fn apply_to(&self, header: &mut TarHeader, offset: u64) -> Result<()> {
        let number = |key: &str, value: &str| {
            value.parse::<u64>().map_err(|_| {
                TarflateError::corrupt(
                    StreamLayer::Tar,
                    offset,
                    format!("invalid pax {key} value {value:?}"),
                )
            })
        };

        for (key, value) in self.iter().filter(|(_, v)| !v.is_empty()) {
            match key {
                "path" => header.name = value.to_string(),
                "linkpath" => header.linkname = value.to_string(),
                "uname" => header.uname = value.to_string(),
                "gname" => header.gname = value.to_string(),
                "size" => header.size = number(key, value)?,
                "uid" => header.uid = number(key, value)?,
                "gid" => header.gid = number(key, value)?,
                // Sub-second precision is dropped.
                "mtime" => {
                    let seconds = value.split_once('.').map_or(value, |(s, _)| s);
                    header.mtime = number(key, seconds)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Format a single pax record: `"<len> <key>=<value>\n"`.
pub fn format_pax_record(key: &str, value: &str) -> String {
    // " " + "=" + "\n"
    let base_len = key.len() + value.len() + 3;

    let mut total_len = base_len + 1;
    loop {
        let expected = base_len + total_len.to_string().len();
        if expected == total_len {
            break;
        }
        total_len = expected;
    }

    format!("{total_len} {key}={value}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pax_record_format() {
        assert_eq!(format_pax_record("path", "test.txt"), "17 path=test.txt\n");

        // 98 bytes plus two digits would be 100, which needs three.
        let value = "a".repeat(91);
        let record = format_pax_record("path", &value);
        assert_eq!(record.len(), 101);
        assert!(record.starts_with("101 path="));
    }

    #[test]
    fn test_parse_pax_data() {
        let pax = PaxExtensions::parse(b"17 path=test.txt\n19 size=1234567890\n", 0).unwrap();
        assert_eq!(pax.len(), 2);
        assert_eq!(pax.get("path"), Some("test.txt"));
        assert_eq!(pax.get("size"), Some("1234567890"));
    }

    #[test]
    fn test_parse_keeps_unknown_keys() {
        let data = format_pax_record("SCHILY.xattr.user.tag", "blue");
        let pax = PaxExtensions::parse(data.as_bytes(), 0).unwrap();
        assert_eq!(pax.get("SCHILY.xattr.user.tag"), Some("blue"));
    }

    #[test]
    fn test_parse_malformed() {
        for data in [
            &b"17 path=test.txt"[..],
            b"abc path=x\n",
            b"99 path=short\n",
            b"11 pathxxx\n",
            b"nolength",
        ] {
            let err = PaxExtensions::parse(data, 512).unwrap_err();
            assert_eq!(err.corrupt_layer(), Some(StreamLayer::Tar), "{data:?}");
        }
    }

    #[test]
    fn test_parse_length_overflow() {
        let data = b"5 a=\n18446744073709551615 path=x\n";
        let err = PaxExtensions::parse(data, 1024).unwrap_err();
        assert_eq!(err.corrupt_layer(), Some(StreamLayer::Tar));
        assert!(err.to_string().contains("offset 1029"));
    }

    #[test]
    fn test_parse_record_errors() {
        let cases: [(&[u8], &str); 5] = [
            (b"40 path=x\n", "out of range"),
            (b"2 path=x\n", "out of range"),
            (b"10 pathxx\n", "without '='"),
            (b"10 path=xyz", "newline"),
            (b"-9 path=x\n", "invalid pax record length"),
        ];
        for (data, expected) in cases {
            let err = PaxExtensions::parse(data, 0).unwrap_err();
            assert_eq!(err.corrupt_layer(), Some(StreamLayer::Tar), "{data:?}");
            assert!(err.to_string().contains(expected), "{data:?}: {err}");
        }
    }

    #[test]
    fn test_empty_value_deletes() {
        let mut global = PaxExtensions::parse(b"17 uname=builder\n13 gname=ops\n", 0).unwrap();
        let local = PaxExtensions::parse(b"9 uname=\n", 0).unwrap();
        assert_eq!(local.get("uname"), Some(""));

        global.merge(&local);
        assert_eq!(global.get("uname"), None);
        assert_eq!(global.get("gname"), Some("ops"));

        let mut header = TarHeader::new_file("f", 0, 0o644);
        header.uname = "carol".to_string();
        local.apply_to(&mut header, 0).unwrap();
        assert_eq!(header.uname, "carol");
    }

    #[test]
    fn test_apply_overrides() {
        let mut pax = PaxExtensions::new();
        pax.insert("path", "long/name.txt");
        pax.insert("size", "10000000000");
        pax.insert("mtime", "1700000000.123456");
        pax.insert("uid", "4000000");

        let mut header = TarHeader::new_file("short", 0, 0o644);
        pax.apply_to(&mut header, 0).unwrap();
        assert_eq!(header.name, "long/name.txt");
        assert_eq!(header.size, 10_000_000_000);
        assert_eq!(header.mtime, 1_700_000_000);
        assert_eq!(header.uid, 4_000_000);
    }

    #[test]
    fn test_apply_invalid_number() {
        let mut pax = PaxExtensions::new();
        pax.insert("size", "12x");
        let mut header = TarHeader::new_file("f", 0, 0o644);
        assert!(pax.apply_to(&mut header, 0).is_err());
    }

    #[test]
    fn test_merge_local_over_global() {
        let mut global = PaxExtensions::new();
        global.insert("uname", "builder");
        global.insert("gname", "staff");
        let mut local = PaxExtensions::new();
        local.insert("uname", "alice");

        global.merge(&local);
        assert_eq!(global.get("uname"), Some("alice"));
        assert_eq!(global.get("gname"), Some("staff"));
    }
}
