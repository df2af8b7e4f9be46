// src/settings/regions.rs

//! Region selectors inside the terminal's own `KEY=value` property file.
//!
//! We do not own that file's schema: only `MDDS_REGION` and `FPSS_REGION`
//! are interpreted, every other line is carried through byte-for-byte.

use tracing::warn;

use crate::types::{RegionKey, RegionSettings};

/// Split a line (as produced by `split_inclusive('\n')`) into body and
/// terminator (`"\r\n"`, `"\n"` or `""`).
fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Parse `key=value` / `key: value`, ignoring comments and blank lines.
fn key_value(body: &str) -> Option<(&str, &str)> {
    let trimmed = body.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return None;
    }
    let idx = trimmed.find(['=', ':'])?;
    Some((trimmed[..idx].trim(), trimmed[idx + 1..].trim()))
}

fn region_key(name: &str) -> Option<RegionKey> {
    RegionKey::ALL
        .into_iter()
        .find(|k| k.property_name() == name)
}

/// Extract region settings from property file contents.
///
/// Absent keys and unknown tokens keep the production default. If a key
/// appears more than once, the last valid occurrence wins.
pub fn parse_region_settings(contents: &str) -> RegionSettings {
    let mut settings = RegionSettings::default();

    for line in contents.lines() {
        let Some((name, value)) = key_value(line) else {
            continue;
        };
        let Some(key) = region_key(name) else {
            continue;
        };
        match key.parse_token(value) {
            Some(host) => settings.set(key, host),
            None => warn!(
                key = key.property_name(),
                value = %value,
                "ignoring unknown region token"
            ),
        }
    }

    settings
}

/// Rewrite the region lines of `contents` to `settings`.
///
/// Matching lines keep their indentation and line terminator; all other
/// lines are copied verbatim and in order. A key that does not appear at all
/// is appended at the end.
pub fn rewrite_region_lines(contents: &str, settings: &RegionSettings) -> String {
    let mut out = String::with_capacity(contents.len() + 64);
    let mut seen = [false; RegionKey::ALL.len()];

    for line in contents.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);
        let key = key_value(body).and_then(|(name, _)| region_key(name));

        match key {
            Some(key) => {
                seen[key_index(key)] = true;
                let indent_len = body.len() - body.trim_start().len();
                out.push_str(&body[..indent_len]);
                out.push_str(key.property_name());
                out.push('=');
                out.push_str(&key.token(settings.get(key)));
                out.push_str(ending);
            }
            None => out.push_str(line),
        }
    }

    for key in RegionKey::ALL {
        if seen[key_index(key)] {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(key.property_name());
        out.push('=');
        out.push_str(&key.token(settings.get(key)));
        out.push('\n');
    }

    out
}

fn key_index(key: RegionKey) -> usize {
    match key {
        RegionKey::Mdds => 0,
        RegionKey::Fpss => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegionHost;

    #[test]
    fn parses_known_keys_and_separators() {
        let contents = "# region config\nMDDS_REGION = MDDS_STAGE_HOSTS\n  FPSS_REGION:FPSS_DEV_HOSTS\r\nOTHER=1\n";
        let s = parse_region_settings(contents);
        assert_eq!(s.mdds, RegionHost::Stage);
        assert_eq!(s.fpss, RegionHost::Dev);
    }

    #[test]
    fn unknown_tokens_and_comments_fall_back_to_defaults() {
        let contents = "#MDDS_REGION=MDDS_DEV_HOSTS\nMDDS_REGION=MDDS_MARS_HOSTS\nFPSS_REGION=MDDS_DEV_HOSTS\n";
        assert_eq!(parse_region_settings(contents), RegionSettings::default());
    }

    #[test]
    fn rewrite_touches_only_region_lines() {
        let contents = "HTTP_PORT=25510\n  MDDS_REGION=MDDS_NJ_HOSTS\r\n# keep me\nFPSS_REGION=FPSS_NJ_HOSTS";
        let settings = RegionSettings {
            mdds: RegionHost::Dev,
            fpss: RegionHost::Stage,
        };
        let out = rewrite_region_lines(contents, &settings);
        assert_eq!(
            out,
            "HTTP_PORT=25510\n  MDDS_REGION=MDDS_DEV_HOSTS\r\n# keep me\nFPSS_REGION=FPSS_STAGE_HOSTS"
        );
    }

    #[test]
    fn rewrite_appends_missing_keys() {
        let out = rewrite_region_lines("A=1", &RegionSettings::default());
        assert_eq!(out, "A=1\nMDDS_REGION=MDDS_NJ_HOSTS\nFPSS_REGION=FPSS_NJ_HOSTS\n");
    }
}
