// quill-syntax - Operator token classification
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Operator token classification shared by the analyser, compiler and VM.

/// `=`, `+=`, `-=`, ... write through a recorded reference.
pub fn is_assignment(op: &str) -> bool {
    matches!(
        op,
        "=" | "+="
            | "-="
            | "*="
            | "/="
            | "%="
            | "/%="
            | "**="
            | "|="
            | "&="
            | "^="
            | "<<="
            | ">>="
    )
}

/// `<`, `<=`, `>`, `>=`.
pub fn is_relational(op: &str) -> bool {
    matches!(op, "<" | "<=" | ">" | ">=")
}

/// `==`, `!=`.
pub fn is_equality(op: &str) -> bool {
    matches!(op, "==" | "!=")
}

/// Operators valid only between integers.
pub fn is_bitwise(op: &str) -> bool {
    matches!(op, "|" | "&" | "^" | "<<" | ">>")
}

/// The non-assigning core of a compound assignment: `+=` gives `+`,
/// `<<=` gives `<<`, `=` gives itself.
pub fn assignment_core(op: &str) -> &str {
    op.strip_suffix('=').filter(|s| !s.is_empty()).unwrap_or(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_classification() {
        assert!(is_assignment("="));
        assert!(is_assignment("+="));
        assert!(is_assignment("/%="));
        assert!(!is_assignment("=="));
        assert!(!is_assignment("<="));
        assert!(!is_assignment("+"));
    }

    #[test]
    fn test_assignment_core() {
        assert_eq!(assignment_core("+="), "+");
        assert_eq!(assignment_core("<<="), "<<");
        assert_eq!(assignment_core("/%="), "/%");
        assert_eq!(assignment_core("="), "=");
        assert_eq!(assignment_core("+"), "+");
    }
}
