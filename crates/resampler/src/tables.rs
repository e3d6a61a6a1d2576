//! Field code table for output grid headers.
//!
//! Maps known field-name abbreviations to fixed numeric codes so
//! downstream readers can identify a field without parsing its name.

/// Code written for fields with no known abbreviation.
pub const UNKNOWN_FIELD_CODE: i32 = -1;

// ============================================================================
// Known Fields
// ============================================================================

/// (code, accepted abbreviations). The first abbreviation is canonical.
const FIELD_CODES: &[(i32, &[&str])] = &[
    (1, &["DBZ", "DZ", "REF", "REFL", "Z"]),
    (2, &["VEL", "VR", "V", "VEL_F"]),
    (3, &["WIDTH", "SW", "SPW"]),
    (4, &["SNR", "SNRHC"]),
    (5, &["ZDR", "DR"]),
    (6, &["PHIDP", "PHI", "DP"]),
    (7, &["RHOHV", "RHO", "RH"]),
    (8, &["KDP"]),
    (9, &["NCP", "SQI"]),
    (10, &["TIME", "DT"]),
];

/// Code for a field name (case-insensitive), or [`UNKNOWN_FIELD_CODE`].
pub fn field_code(name: &str) -> i32 {
    let name = name.trim();
    FIELD_CODES
        .iter()
        .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
        .map(|(code, _)| *code)
        .unwrap_or(UNKNOWN_FIELD_CODE)
}
