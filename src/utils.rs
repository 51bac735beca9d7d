/*!
 * Utility functions for vhdcollect
 */

/// Bytes per mebibyte; diskpart's `maximum=` is expressed in these units
pub const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Format a human-readable file size
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

/// Remove one layer of matching surrounding quotes, as left behind by
/// Explorer's "Copy as path"
pub fn strip_surrounding_quotes(input: &str) -> &str {
    let bytes = input.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &input[1..input.len() - 1];
        }
    }
    input
}
