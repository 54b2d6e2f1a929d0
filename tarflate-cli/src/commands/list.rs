//! List command implementation.

use crate::utils::{MemberFilter, create_progress_bar, open_archive};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tarflate_archive::TarHeader;
use tarflate_core::EntryType;

/// JSON serializable member data for archive listings.
#[derive(Debug, Serialize)]
struct EntryJson {
    name: String,
    #[serde(rename = "type")]
    entry_type: String,
    size: u64,
    mode: u32,
    mtime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    linkname: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    uname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    gname: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pax: BTreeMap<String, String>,
    #[serde(skip)]
    tag: char,
}

impl EntryJson {
    fn new(header: &TarHeader, pax: BTreeMap<String, String>) -> Self {
        let entry_type = header.entry_type();
        let linkname = matches!(entry_type, EntryType::Symlink | EntryType::Hardlink)
            .then(|| header.linkname.clone());
        Self {
            name: header.name.clone(),
            entry_type: entry_type.to_string(),
            size: header.size,
            mode: header.mode,
            mtime: header.mtime,
            linkname,
            uname: header.uname.clone(),
            gname: header.gname.clone(),
            pax,
            tag: entry_type.tag(),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize)]
struct ArchiveListJson {
    archive: String,
    entries: Vec<EntryJson>,
}

/// Options for listing archive contents.
pub struct ListOptions<'a> {
    pub long: bool,
    pub json: bool,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub strip_components: usize,
}

pub fn cmd_list(archive: &Path, options: &ListOptions) -> Result<(), Box<dyn std::error::Error>> {
    let filter = MemberFilter::new(options.include, options.exclude)?;
    let pb = create_progress_bar(false);
    let mut reader = open_archive(archive, &pb)?.with_strip_components(options.strip_components);

    let mut entries = Vec::new();
    while let Some(member) = reader.next_member()? {
        if !filter.matches(member.name()) {
            continue;
        }
        let pax = member
            .pax_extensions()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        entries.push(EntryJson::new(member.header(), pax));
    }

    if options.json {
        let listing = ArchiveListJson {
            archive: archive.display().to_string(),
            entries,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for entry in &entries {
        if options.long {
            println!("{}", format_long(entry));
        } else {
            println!("{}", entry.name);
        }
    }
    if options.long {
        let total: u64 = entries.iter().map(|e| e.size).sum();
        println!("{} members, {} bytes", entries.len(), total);
    }
    Ok(())
}

/// One `tar tv`-style line.
fn format_long(entry: &EntryJson) -> String {
    let owner = match (entry.uname.is_empty(), entry.gname.is_empty()) {
        (true, true) => "-".to_string(),
        _ => format!("{}/{}", entry.uname, entry.gname),
    };
    let mut line = format!(
        "{}{:04o} {:>12} {:>10} {:>12}  {}",
        entry.tag,
        entry.mode & 0o7777,
        owner,
        entry.size,
        entry.mtime,
        entry.name
    );
    if let Some(target) = &entry.linkname {
        line.push_str(" -> ");
        line.push_str(target);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_json_for_symlink() {
        let header = TarHeader::new_symlink("latest", "v1.2").with_mtime(7);
        let entry = EntryJson::new(&header, BTreeMap::new());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "symlink");
        assert_eq!(json["linkname"], "v1.2");
        assert!(json.get("pax").is_none());
        assert!(format_long(&entry).ends_with("latest -> v1.2"));
        assert!(format_long(&entry).starts_with('l'));
    }

    #[test]
    fn test_format_long_file() {
        let mut header = TarHeader::new_file("src/lib.rs", 120, 0o644).with_mtime(1);
        header.uname = "dev".to_string();
        header.gname = "staff".to_string();
        let line = format_long(&EntryJson::new(&header, BTreeMap::new()));
        assert!(line.starts_with("-0644"));
        assert!(line.contains("dev/staff"));
        assert!(line.ends_with("src/lib.rs"));
    }
}
