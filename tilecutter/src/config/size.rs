//! Byte sizes written as `512MB`, `2 GB` or a bare byte count.

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{input}', expected a value like '512MB', '2GB' or '64KB'")]
pub struct SizeParseError {
    input: String,
}

/// Parses a size with an optional `K`/`KB`, `M`/`MB` or `G`/`GB` suffix.
///
/// Units are powers of 1024; case and inner whitespace are ignored.
///
/// ```
/// use tilecutter::config::parse_size;
///
/// assert_eq!(parse_size("512MB").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("2 g").unwrap(), 2 * 1024 * 1024 * 1024);
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let err = || SizeParseError {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(err());
    }

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        _ => return Err(err()),
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(err)
}

/// Formats a byte count with the largest unit that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    match bytes {
        0 => "0".to_string(),
        b if b % GB == 0 => format!("{}GB", b / GB),
        b if b % MB == 0 => format!("{}MB", b / MB),
        b if b % KB == 0 => format!("{}KB", b / KB),
        b => b.to_string(),
    }
}
