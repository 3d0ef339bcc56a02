//! Shell quoting for commands passed to `sh -c`

/// Wrap `value` in single quotes, closing and reopening around embedded quotes
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("WS-001"), "'WS-001'");
    }

    #[test]
    fn test_quote_embedded_single_quote() {
        assert_eq!(quote("it's"), "'it'\"'\"'s'");
    }
}
