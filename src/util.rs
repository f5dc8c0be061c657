//! Small shared helpers

/// Wrap an identifier in brackets, escaping any closing brackets it contains.
pub fn bracket_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Bracket-quote a schema-qualified routine name.
pub fn bracket_qualified(schema: &str, name: &str) -> String {
    format!(
        "{}.{}",
        bracket_identifier(schema),
        bracket_identifier(name)
    )
}
