//! Structural and value equality over result tables

use crate::types::ResultTable;

/// Compare two result tables for exact equality.
///
/// Both absent compares equal, exactly one absent compares unequal. Present
/// tables must agree on row count, column count, positional column names and
/// every cell value, where the null marker equals only another null marker
/// at the same position.
pub fn tables_equal(first: Option<&ResultTable>, second: Option<&ResultTable>) -> bool {
    let (first, second) = match (first, second) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };

    if first.rows.len() != second.rows.len() || first.columns.len() != second.columns.len() {
        return false;
    }

    if first
        .columns
        .iter()
        .zip(second.columns.iter())
        .any(|(a, b)| a != b)
    {
        return false;
    }

    for (row_a, row_b) in first.rows.iter().zip(second.rows.iter()) {
        // Row width can differ from the column count only on a protocol
        // violation, but compare defensively by position anyway.
        if row_a.len() != row_b.len() {
            return false;
        }
        if row_a.iter().zip(row_b.iter()).any(|(a, b)| a != b) {
            return false;
        }
    }

    true
}
