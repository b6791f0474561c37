use url::Url;

use crate::config::OutputFormat;

/// File name for a capture of `url`, e.g. `example.com_docs_intro.jpg`.
pub fn output_filename(url: &Url, format: OutputFormat) -> String {
    let host = url.host_str().unwrap_or("screenshot");
    let path = url.path().trim_matches('/');

    let stem = if path.is_empty() {
        host.to_string()
    } else {
        format!("{host}_{path}")
    };

    let sanitized: String = stem
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => c,
            _ => '_',
        })
        .collect();

    format!("{}.{}", sanitized, format.extension())
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
