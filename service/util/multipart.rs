/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Raw bytes of every non-empty file part (a part whose headers carry
/// `filename=`), in body order.
pub fn file_parts(body: &[u8], boundary: &str) -> Vec<Vec<u8>> {
    let delimiter = format!("--{}", boundary);
    let sep = b"\r\n\r\n";
    let mut files = Vec::new();

    for part in split_on(body, delimiter.as_bytes()) {
        let Some(sep_pos) = find_subsequence(part, sep) else {
            continue;
        };
        let header_section = &part[..sep_pos];
        if !header_section.windows(9).any(|w| w.eq_ignore_ascii_case(b"filename=")) {
            continue;
        }
        let raw = &part[sep_pos + sep.len()..];
        let data = raw.strip_suffix(b"\r\n").unwrap_or(raw);
        if !data.is_empty() {
            files.push(data.to_vec());
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(boundary: &str, parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (headers, data) in parts {
            out.extend_from_slice(format!("--{boundary}\r\n{headers}\r\n\r\n").as_bytes());
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        out
    }

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(extract_boundary("multipart/form-data; boundary=abc").as_deref(), Some("abc"));
        assert_eq!(extract_boundary("multipart/form-data; boundary=\"q q\"").as_deref(), Some("q q"));
        assert_eq!(extract_boundary("multipart/form-data"), None);
    }

    #[test]
    fn collects_file_parts_and_skips_text_fields() {
        let b = "XyZ";
        let raw = body(
            b,
            &[
                ("Content-Disposition: form-data; name=\"note\"", &b"hello"[..]),
                ("Content-Disposition: form-data; name=\"image\"; filename=\"a.png\"", &b"\x89PNG\r\n\x00a"[..]),
                ("Content-Disposition: form-data; name=\"image\"; filename=\"b.png\"", &b"second"[..]),
            ],
        );
        let files = file_parts(&raw, b);
        assert_eq!(files, vec![b"\x89PNG\r\n\x00a".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn empty_file_parts_are_ignored() {
        let raw = body("k", &[("Content-Disposition: form-data; name=\"image\"; filename=\"\"", &b""[..])]);
        assert!(file_parts(&raw, "k").is_empty());
    }
}
