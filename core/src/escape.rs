//! JSON string escaping shared by the canonical serializer and the position
//! mapper. Offsets computed for highlights are only valid while both agree
//! byte-for-byte, so neither side escapes on its own.

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Append the escaped form of `value` (without surrounding quotes) to `out`.
pub fn push_escaped(out: &mut String, value: &str) {
    let mut start = 0;
    for (idx, ch) in value.char_indices() {
        let escape = match ch {
            '"' => "\\\"",
            '\\' => "\\\\",
            '\n' => "\\n",
            '\r' => "\\r",
            '\t' => "\\t",
            '\u{08}' => "\\b",
            '\u{0C}' => "\\f",
            c if (c as u32) < 0x20 => "",
            _ => continue,
        };
        out.push_str(&value[start..idx]);
        if escape.is_empty() {
            let byte = ch as u32 as u8;
            out.push_str("\\u00");
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0xF) as usize] as char);
        } else {
            out.push_str(escape);
        }
        start = idx + ch.len_utf8();
    }
    out.push_str(&value[start..]);
}

/// Escaped form of `value` without quotes.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    push_escaped(&mut out, value);
    out
}

/// Escaped form of `value` wrapped in double quotes, as it appears in a document.
pub fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    push_escaped(&mut out, value);
    out.push('"');
    out
}

/// Byte length `value` occupies once escaped.
pub fn escaped_len(value: &str) -> usize {
    value
        .chars()
        .map(|ch| match ch {
            '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0C}' => 2,
            c if (c as u32) < 0x20 => 6,
            c => c.len_utf8(),
        })
        .sum()
}
