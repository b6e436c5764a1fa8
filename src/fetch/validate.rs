//! Cheap checks telling a CSV export apart from an HTML error page.

/// Number of leading body bytes inspected.
pub const SNIFF_LEN: usize = 1024;

const HTML_SIGNATURES: [&[u8]; 4] = [b"<html", b"<!doctype html", b"<head", b"<body"];

/// Does the declared content type name a CSV media type?
pub fn is_csv_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("csv"))
        .unwrap_or(false)
}

/// Case insensitive search for the usual HTML markers in the sniff window.
pub fn looks_like_html(sample: &[u8]) -> bool {
    let window = &sample[..sample.len().min(SNIFF_LEN)];
    let lower = window.to_ascii_lowercase();
    HTML_SIGNATURES.iter().any(|sig| contains(&lower, sig))
}

/// At least one comma and one line break.
pub fn has_csv_shape(sample: &[u8]) -> bool {
    let window = &sample[..sample.len().min(SNIFF_LEN)];
    window.contains(&b',') && (window.contains(&b'\n') || window.contains(&b'\r'))
}

/// A CSV content type wins outright.  Otherwise the sample must have the CSV
/// shape and must not look like HTML.
pub fn is_csv_like(content_type: Option<&str>, sample: &[u8]) -> bool {
    if is_csv_content_type(content_type) {
        return true;
    }
    !looks_like_html(sample) && has_csv_shape(sample)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
