//! Placeholder token extraction and substitution for filter templates.
//!
//! Configured query filters embed tokens of the form `${name}`. The query
//! normalizer extracts the token names, resolves each against the request's
//! additional parameters, and substitutes the literal values to produce a
//! concrete filter string.

use std::collections::HashMap;

/// Scan a template for `${name}` markers and return the distinct token
/// names in order of first appearance.
///
/// An unterminated `${` is not a token; it and everything after it are
/// treated as literal text. The first `}` after a marker closes it.
pub fn extract_tokens(template: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.is_empty() && !tokens.iter().any(|t| t == name) {
            tokens.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    tokens
}

/// Replace every occurrence of each mapped token with its literal value.
///
/// Every token in the template is expected to have a mapping entry; the
/// query normalizer checks this before calling. An unmapped token is left
/// in place verbatim.
pub fn replace_tokens(template: &str, values: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated marker, keep the remainder literal
            output.push_str(&rest[start..]);
            return output;
        };
        let name = &after[..end];
        match values.get(name) {
            Some(value) => output.push_str(value),
            None => {
                output.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_token() {
        assert_eq!(extract_tokens("mail eq \"${email}\""), vec!["email"]);
    }

    #[test]
    fn test_extract_distinct_in_order() {
        let tokens = extract_tokens("${b} and ${a} and ${b}");
        assert_eq!(tokens, vec!["b", "a"]);
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_tokens("sn eq \"smith\"").is_empty());
    }

    #[test]
    fn test_extract_unterminated_is_literal() {
        assert_eq!(extract_tokens("sn eq \"${name\""), Vec::<String>::new());
        assert_eq!(extract_tokens("${a} and ${rest"), vec!["a"]);
    }

    #[test]
    fn test_replace_all_occurrences() {
        let mut values = HashMap::new();
        values.insert("v".to_string(), "x".to_string());
        assert_eq!(
            replace_tokens("a eq \"${v}\" or b eq \"${v}\"", &values),
            "a eq \"x\" or b eq \"x\""
        );
    }

    #[test]
    fn test_replace_concrete_scenario() {
        let mut values = HashMap::new();
        values.insert("email".to_string(), "a@b.com".to_string());
        assert_eq!(
            replace_tokens("mail eq \"${email}\"", &values),
            "mail eq \"a@b.com\""
        );
    }

    #[test]
    fn test_replace_unmapped_kept_verbatim() {
        let values = HashMap::new();
        assert_eq!(replace_tokens("mail eq \"${email}\"", &values), "mail eq \"${email}\"");
    }

    #[test]
    fn test_replace_unterminated_kept_literal() {
        let mut values = HashMap::new();
        values.insert("a".to_string(), "1".to_string());
        assert_eq!(replace_tokens("x eq ${a} and ${oops", &values), "x eq 1 and ${oops");
    }
}
