use anyhow::{Context, Result};
use calpresence_core::error::CoreError;
use calpresence_core::models::BusyStatus;

/// Read a recurrence blob argument: inline hex, or `@path` to a file holding
/// the hex text.
pub fn read_blob_arg(arg: &str) -> Result<Vec<u8>> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read blob file '{}'", path))?,
        None => arg.to_string(),
    };
    decode_hex(&text)
}

/// Hex text with whitespace, a `0x` prefix or line breaks removed.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(CoreError::InvalidInput("Recurrence blob is empty".to_string()).into());
    }
    let bytes = hex::decode(&cleaned).map_err(CoreError::from)?;
    Ok(bytes)
}

pub fn parse_busy(value: &str) -> Result<BusyStatus> {
    value
        .parse::<BusyStatus>()
        .map_err(|e| CoreError::InvalidInput(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0a0b", vec![0x0a, 0x0b])]
    #[case("0x0A0B", vec![0x0a, 0x0b])]
    #[case("  0a 0b\n0c ", vec![0x0a, 0x0b, 0x0c])]
    fn test_decode_hex_accepts_loose_formatting(#[case] input: &str, #[case] expected: Vec<u8>) {
        assert_eq!(decode_hex(input).unwrap(), expected);
    }

    #[test]
    fn test_decode_hex_rejects_bad_input() {
        assert!(decode_hex("").is_err());
        assert!(decode_hex("zz").is_err());
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn test_read_blob_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.hex");
        std::fs::write(&path, "0406\n3020\n").unwrap();
        let bytes = read_blob_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(bytes, vec![0x04, 0x06, 0x30, 0x20]);
    }

    #[rstest]
    #[case("busy", BusyStatus::Busy)]
    #[case("OOF", BusyStatus::OutOfOffice)]
    #[case("1", BusyStatus::Tentative)]
    fn test_parse_busy(#[case] input: &str, #[case] expected: BusyStatus) {
        assert_eq!(parse_busy(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_busy_rejects_words() {
        assert!(parse_busy("sometimes").is_err());
    }
}
