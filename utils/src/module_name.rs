use std::path::Path;

/// Module file name without directory or extension (`C:\mods\hud.asi` -> `hud`).
///
/// Both separators are accepted regardless of platform because module paths
/// come from the host, not from the filesystem we run on.
#[must_use]
pub fn display_name(path: &str) -> String {
    let file = path.rsplit(['\\', '/']).next().unwrap_or(path);
    let stem = Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file);
    if stem.is_empty() {
        "<unnamed>".to_string()
    } else {
        stem.to_string()
    }
}
