//! Reader for Firefox's `profiles.ini`.
//!
//! Newer Firefox releases record the profile used by each installation in
//! `[Install<hash>]` sections (`Default=<path>`). Older ones flag a
//! `[Profile<n>]` section with `Default=1`. Install sections win.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "profiles.ini";

#[derive(Debug, Default, Clone, PartialEq)]
struct Section {
    name: String,
    entries: HashMap<String, String>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

fn parse_sections(contents: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push(Section {
                name: name.trim().to_string(),
                ..Default::default()
            });
            continue;
        }

        // keys before the first section header are ignored
        if let (Some(section), Some((key, value))) = (sections.last_mut(), line.split_once('=')) {
            section
                .entries
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

fn resolve(base: &Path, path: &str, relative: bool) -> PathBuf {
    let path = Path::new(path);
    if relative && !path.is_absolute() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Default profile directory according to the manifest contents.
pub fn default_profile(base: &Path, contents: &str) -> Option<PathBuf> {
    let sections = parse_sections(contents);

    let install_default = sections
        .iter()
        .filter(|section| section.name.starts_with("Install"))
        .find_map(|section| section.get("Default"));

    if let Some(path) = install_default {
        // install entries carry the same path string as their profile section
        let relative = sections
            .iter()
            .find(|section| {
                section.name.starts_with("Profile") && section.get("Path") == Some(path)
            })
            .map(|section| section.get("IsRelative") != Some("0"))
            .unwrap_or(true);
        return Some(resolve(base, path, relative));
    }

    sections
        .iter()
        .filter(|section| section.name.starts_with("Profile"))
        .find(|section| section.get("Default") == Some("1"))
        .and_then(|section| {
            let path = section.get("Path")?;
            Some(resolve(base, path, section.get("IsRelative") != Some("0")))
        })
}

/// Read `profiles.ini` under `base`. Missing or unreadable manifest is `None`.
pub fn read_manifest(base: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(base.join(MANIFEST_FILE)).ok()?;
    default_profile(base, &contents)
}
