//! Content-based MIME detection.
//!
//! Binary formats are recognised with `infer`. SVG has no magic number, so
//! it is detected by skipping the XML prolog and looking for the root
//! `<svg` element. Anything else falls back to `text/plain` for UTF-8 text
//! and `application/octet-stream` otherwise.

/// Number of leading bytes needed to classify a file.
pub const SNIFF_LEN: usize = 8192;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const EMPTY: &str = "application/x-empty";
pub const SVG: &str = "image/svg+xml";

/// Detect the MIME type of `bytes` from its content alone.
pub fn sniff(bytes: &[u8]) -> &'static str {
    if bytes.is_empty() {
        return EMPTY;
    }
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    // Checked before infer, which reports an XML prolog as text/xml.
    if is_svg(head) {
        return SVG;
    }
    if let Some(kind) = infer::get(head) {
        return kind.mime_type();
    }
    if is_text(head) {
        return "text/plain";
    }
    OCTET_STREAM
}

fn is_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence cut off by the sniff window.
        Err(e) => e.error_len().is_none(),
    }
}

fn is_svg(head: &[u8]) -> bool {
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => {
            // Safe: valid_up_to marks a char boundary.
            match std::str::from_utf8(&head[..e.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };

    let mut rest = text.strip_prefix('\u{feff}').unwrap_or(text);
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("<?") {
            match after.find("?>") {
                Some(end) => rest = &after[end + 2..],
                None => return false,
            }
        } else if let Some(after) = rest.strip_prefix("<!--") {
            match after.find("-->") {
                Some(end) => rest = &after[end + 3..],
                None => return false,
            }
        } else if let Some(after) = rest.strip_prefix("<!") {
            // DOCTYPE, possibly with an internal subset.
            let end = match (after.find('['), after.find('>')) {
                (Some(open), Some(close)) if open < close => {
                    after.find("]>").map(|e| e + 2)
                }
                (_, Some(close)) => Some(close + 1),
                _ => None,
            };
            match end {
                Some(end) => rest = &after[end..],
                None => return false,
            }
        } else {
            break;
        }
    }

    let bytes = rest.as_bytes();
    bytes.len() > 4
        && bytes[..4].eq_ignore_ascii_case(b"<svg")
        && (bytes[4].is_ascii_whitespace() || bytes[4] == b'>' || bytes[4] == b'/')
}
