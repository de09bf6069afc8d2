//! Record file codec: a `---` delimited YAML header followed by the body
//! text, kept byte-exact. A file with a missing or unparseable header is
//! not an error — the whole file becomes content and the caller gets a
//! warning, so one corrupted record never aborts a table load.

use serde_yaml::Mapping;

const DELIMITER: &str = "---";

/// Result of decoding one record file.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub fields: Mapping,
    pub content: String,
    /// Set when the header was absent or malformed and the decode degraded
    /// to treating the whole file as content.
    pub warning: Option<String>,
}

fn degraded(raw: &str, message: &str) -> Decoded {
    Decoded {
        fields: Mapping::new(),
        content: raw.to_string(),
        warning: Some(message.to_string()),
    }
}

/// Split off the header block. Returns (yaml_block, content) with content
/// starting right after the closing delimiter's newline, verbatim.
fn split_header(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---\n")?;

    // Empty header: closing delimiter immediately follows the opener.
    if let Some(content) = rest.strip_prefix("---\n") {
        return Some(("", content));
    }
    if rest == DELIMITER {
        return Some(("", ""));
    }

    if let Some(at) = rest.find("\n---\n") {
        return Some((&rest[..at + 1], &rest[at + 5..]));
    }
    // Closing delimiter at end of file without a trailing newline.
    if let Some(block) = rest.strip_suffix("\n---") {
        return Some((block, ""));
    }

    None
}

/// Decode one record file into (header fields, content).
pub fn decode(raw: &str) -> Decoded {
    let (block, content) = match split_header(raw) {
        Some(parts) => parts,
        None => return degraded(raw, "missing or unterminated front matter delimiters"),
    };

    let fields = if block.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<Mapping>(block) {
            Ok(mapping) => mapping,
            Err(e) => return degraded(raw, &format!("front matter is not a YAML mapping: {e}")),
        }
    };

    Decoded {
        fields,
        content: content.to_string(),
        warning: None,
    }
}

/// Encode header fields (already in schema order) and content back into
/// record-file form. Inverse of `decode` for any YAML-representable header.
pub fn encode(fields: &Mapping, content: &str) -> crate::error::Result<String> {
    if fields.is_empty() {
        return Ok(format!("{DELIMITER}\n{DELIMITER}\n{content}"));
    }
    let header = serde_yaml::to_string(fields)?;
    Ok(format!("{DELIMITER}\n{header}{DELIMITER}\n{content}"))
}
