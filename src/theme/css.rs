use std::collections::HashMap;

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Replaces every `${token}` placeholder whose token is a key of `colors`.
///
/// Tokens are `[A-Za-z0-9_.]+`. Unknown tokens stay in the output as written
/// and substituted text is never scanned again.
pub fn apply_theme_on_css(template: &str, colors: &HashMap<String, String>) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut copied = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let start = i + 2;
            let mut end = start;
            while end < bytes.len() && is_token_byte(bytes[end]) {
                end += 1;
            }
            if end > start && bytes.get(end) == Some(&b'}') {
                if let Some(color) = colors.get(&template[start..end]) {
                    out.push_str(&template[copied..i]);
                    out.push_str(color);
                    copied = end + 1;
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&template[copied..]);
    out
}
