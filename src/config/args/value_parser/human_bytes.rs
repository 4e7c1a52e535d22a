use byte_unit::Byte;
use std::str::FromStr;

fn to_u64(value: &str) -> Result<u64, String> {
    let byte = Byte::from_str(value.trim()).map_err(|e| e.to_string())?;
    u64::try_from(byte.as_u128()).map_err(|e| e.to_string())
}

/// Clap value_parser that validates a human-readable byte string without consuming it.
pub fn check_human_bytes(value: &str) -> Result<String, String> {
    to_u64(value)?;
    Ok(value.to_string())
}

pub fn parse_human_bytes(value: &str) -> Result<u64, String> {
    to_u64(value)
}
