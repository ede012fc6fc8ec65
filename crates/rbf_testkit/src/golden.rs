//! Golden test utilities for format verification.
//!
//! Provides hex helpers for comparing encoded bytes against expected
//! vectors with readable failure output.

/// Encodes bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a hex string.
///
/// # Panics
///
/// Panics on odd length or non-hex characters.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "hex string has odd length: {hex}");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex digit"))
        .collect()
}

/// Asserts that `actual` equals the bytes encoded by `expected_hex`.
///
/// On mismatch the panic names the first differing offset.
pub fn assert_hex_eq(name: &str, actual: &[u8], expected_hex: &str) {
    let expected = hex_decode(expected_hex);
    if actual == expected.as_slice() {
        return;
    }
    let first_diff = actual
        .iter()
        .zip(&expected)
        .position(|(a, e)| a != e)
        .unwrap_or_else(|| actual.len().min(expected.len()));
    panic!(
        "Golden bytes '{}' differ at offset {}:\n\
         Expected ({} bytes): {}\n\
         Actual ({} bytes): {}",
        name,
        first_diff,
        expected.len(),
        expected_hex,
        actual.len(),
        hex_encode(actual)
    );
}
