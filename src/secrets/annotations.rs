//! Pod annotations projected by the Downward API.
//!
//! The file holds one `key="value"` pair per line. Values are quoted the way
//! Go's `strconv.Quote` writes them: the JSON escapes plus `\a`, `\v`,
//! `\xHH`, `\UHHHHHHHH` and three-digit octal escapes.

use std::collections::HashMap;
use std::path::Path;
use std::str::Chars;

use crate::errors::{Error, Result};

pub fn parse_annotations_file(path: &Path) -> Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_annotations(&text)
        .map_err(|e| Error::config(format!("annotations file {}: {}", path.display(), e)))
}

pub fn parse_annotations(text: &str) -> Result<HashMap<String, String>> {
    let mut annotations = HashMap::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line_number = index + 1;
        let (key, quoted) = line
            .split_once('=')
            .ok_or_else(|| Error::config(format!("line {}: expected key=\"value\"", line_number)))?;

        let value = unquote(quoted).map_err(|e| {
            Error::config(format!("line {}: value for {:?} is not a quoted string: {}", line_number, key, e))
        })?;
        annotations.insert(key.trim().to_string(), value);
    }

    Ok(annotations)
}

/// Decode a double-quoted, backslash-escaped value.
fn unquote(quoted: &str) -> std::result::Result<String, String> {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| "value must be wrapped in double quotes".to_string())?;

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => unescape(&mut chars, &mut bytes)?,
            '"' => return Err("unescaped double quote".to_string()),
            '\n' => return Err("unescaped newline".to_string()),
            other => push_char(&mut bytes, other),
        }
    }

    String::from_utf8(bytes).map_err(|_| "escaped bytes are not valid UTF-8".to_string())
}

fn unescape(chars: &mut Chars<'_>, bytes: &mut Vec<u8>) -> std::result::Result<(), String> {
    let escape = chars.next().ok_or_else(|| "trailing backslash".to_string())?;
    match escape {
        'a' => bytes.push(0x07),
        'b' => bytes.push(0x08),
        'f' => bytes.push(0x0c),
        'n' => bytes.push(b'\n'),
        'r' => bytes.push(b'\r'),
        't' => bytes.push(b'\t'),
        'v' => bytes.push(0x0b),
        '\\' | '"' | '/' => push_char(bytes, escape),
        'x' => bytes.push(digits(chars, 2, 16)? as u8),
        '0'..='7' => {
            let rest = digits(chars, 2, 8)?;
            let value = (escape as u32 - '0' as u32) * 64 + rest;
            let byte = u8::try_from(value).map_err(|_| format!("octal escape \\{:o} out of range", value))?;
            bytes.push(byte);
        }
        'u' => {
            let unit = digits(chars, 4, 16)?;
            let code = if (0xd800..0xdc00).contains(&unit) {
                // JSON encodes astral characters as surrogate pairs.
                if chars.next() != Some('\\') || chars.next() != Some('u') {
                    return Err(format!("unpaired surrogate \\u{:04x}", unit));
                }
                let low = digits(chars, 4, 16)?;
                if !(0xdc00..0xe000).contains(&low) {
                    return Err(format!("unpaired surrogate \\u{:04x}", unit));
                }
                0x10000 + ((unit - 0xd800) << 10) + (low - 0xdc00)
            } else {
                unit
            };
            push_code_point(bytes, code)?;
        }
        'U' => {
            let code = digits(chars, 8, 16)?;
            push_code_point(bytes, code)?;
        }
        other => return Err(format!("invalid escape \\{}", other)),
    }
    Ok(())
}

fn digits(chars: &mut Chars<'_>, count: usize, radix: u32) -> std::result::Result<u32, String> {
    let mut value = 0;
    for _ in 0..count {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(radix))
            .ok_or_else(|| format!("escape needs {} base-{} digits", count, radix))?;
        value = value * radix + digit;
    }
    Ok(value)
}

fn push_code_point(bytes: &mut Vec<u8>, code: u32) -> std::result::Result<(), String> {
    let c = char::from_u32(code).ok_or_else(|| format!("invalid code point U+{:X}", code))?;
    push_char(bytes, c);
    Ok(())
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}
