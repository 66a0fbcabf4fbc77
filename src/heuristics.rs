//! Folder-name heuristics: best-effort identity guesses derived purely from
//! the text of an install's staging folder name.
//!
//! Nothing in here is authoritative. Guesses feed the matcher's direct-lookup
//! tier and its search-term builder; they are never trusted on their own.

/// Strip a trailing archive extension (`.zip`, `.7z`, `.rar`).
pub fn strip_archive_ext(name: &str) -> &str {
    for ext in [".zip", ".7z", ".rar"] {
        if name.len() > ext.len() && name.to_ascii_lowercase().ends_with(ext) {
            return &name[..name.len() - ext.len()];
        }
    }
    name
}

/// Strip a trailing version suffix: a run of dot/dash/underscore-delimited
/// numeric groups, optionally led by `v`. `Tyfon-UIFixes-5.3.0` becomes
/// `Tyfon-UIFixes`, `Croupier_2_0_4` becomes `Croupier`.
pub fn strip_trailing_version(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut end = chars.len();

    // Walk backwards over numeric groups and their separators
    let mut i = chars.len();
    loop {
        // consume digits
        let digit_end = i;
        while i > 0 && chars[i - 1].is_ascii_digit() {
            i -= 1;
        }
        if i == digit_end {
            break; // no digits here, suffix walk is done
        }
        // optional leading 'v' directly before the first numeric group
        if i > 0 && (chars[i - 1] == 'v' || chars[i - 1] == 'V') {
            let sep_ok = i < 2 || matches!(chars[i - 2], '.' | '-' | '_');
            if sep_ok {
                i -= 1;
            }
        }
        // a separator must precede the group for it to count as a suffix
        if i > 0 && matches!(chars[i - 1], '.' | '-' | '_') {
            i -= 1;
            end = i + 1; // keep trimming; separator itself goes too
        } else {
            return name.to_string(); // digits are part of the base name
        }
    }

    let base: String = chars[..end.min(chars.len())].iter().collect();
    base.trim_end_matches(['-', '_', '.']).to_string()
}

/// Recover a dotted version token from a folder name, if one is present.
/// `Croupier_2_0_4` yields `2.0.4`; `SomeMod-1.2` yields `1.2`.
pub fn version_from_folder_name(name: &str) -> Option<String> {
    let name = strip_archive_ext(name);
    let base = strip_trailing_version(name);
    if base.len() >= name.len() {
        return None;
    }
    let suffix = &name[base.len()..];
    let groups: Vec<&str> = suffix
        .split(['.', '-', '_'])
        .map(|g| g.strip_prefix('v').or_else(|| g.strip_prefix('V')).unwrap_or(g))
        .filter(|g| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit()))
        .collect();
    if groups.is_empty() {
        None
    } else {
        Some(groups.join("."))
    }
}

/// Kebab-case slug: `GildedKeyStorage` becomes `gilded-key-storage`.
pub fn slugify(s: &str) -> String {
    let mut out = String::new();
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if let Some(p) = prev {
                if p.is_ascii_lowercase() && c.is_ascii_uppercase() {
                    out.push('-');
                }
            }
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
        prev = Some(c);
    }
    out.trim_matches('-').to_string()
}

/// Split camel case into spaced words: `TaskAutomation` -> `Task Automation`.
pub fn split_camel_case(s: &str) -> String {
    let mut out = String::new();
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if let Some(p) = prev {
            if p.is_ascii_lowercase() && c.is_ascii_uppercase() {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Whether a string already looks like a 3+-segment reverse-domain identifier.
pub fn looks_like_guid(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("com.") && lower.split('.').filter(|p| !p.is_empty()).count() >= 3
}

/// Derive candidate reverse-domain identifiers from a folder name.
///
/// `DrakiaXYZ-GildedKeyStorage-2.0.4` yields
/// `com.drakiaxyz.gildedkeystorage` (compacted) and the same from the
/// separator-free slug form. A name already shaped like a guid passes
/// through unchanged. Output is ordered and de-duplicated.
pub fn guess_guids_from_folder_name(folder_name: &str) -> Vec<String> {
    let base = strip_trailing_version(strip_archive_ext(folder_name));
    let mut guesses: Vec<String> = Vec::new();
    let mut push = |g: String| {
        if !g.is_empty() && !guesses.contains(&g) {
            guesses.push(g);
        }
    };

    // AUTHOR<sep>REST shape
    if let Some(sep_idx) = base.find(['-', '_', ' ']) {
        let author: String = base[..sep_idx]
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let rest = &base[sep_idx + 1..];
        let compact: String = rest
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let slug_compact = slugify(rest).replace('-', "");

        if !author.is_empty() && !compact.is_empty() {
            push(format!("com.{}.{}", author, compact));
        }
        if !author.is_empty() && !slug_compact.is_empty() {
            push(format!("com.{}.{}", author, slug_compact));
        }
    }

    if looks_like_guid(&base) {
        push(base.to_ascii_lowercase());
    }

    guesses
}

/// Last segment of a dotted/dashed identifier, used as a search-term seed.
/// `com.turbodestroyer.croupier` -> `croupier`.
pub fn name_from_guid(guid: &str) -> String {
    guid.split(['.', '-', '_'])
        .filter(|p| !p.is_empty())
        .next_back()
        .unwrap_or(guid)
        .to_string()
}

/// Strip one trailing `Server`/`Client` component suffix from a mod name.
pub fn strip_component_suffix(name: &str) -> &str {
    for suffix in ["Server", "Client", "server", "client"] {
        if name.len() > suffix.len() && name.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}
