/// Replace `${ENV_VAR}` placeholders in config string values.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => result.push_str(&rest[start..=start + 2 + end]),
                }
                rest = &after[end + 1..];
            },
            // Unclosed or empty placeholder, keep the text as written.
            _ => {
                result.push_str("${");
                rest = after;
            },
        }
    }

    result.push_str(rest);
    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "TOKEN" => Some("abc123".into()),
            _ => None,
        }
    }

    #[test]
    fn test_substitutes_known_var() {
        assert_eq!(
            substitute_env_with("token = \"${TOKEN}\"", lookup),
            "token = \"abc123\""
        );
    }

    #[test]
    fn test_unknown_var_left_intact() {
        assert_eq!(substitute_env_with("${MISSING}", lookup), "${MISSING}");
    }

    #[test]
    fn test_unclosed_brace_left_intact() {
        assert_eq!(substitute_env_with("${TOKEN", lookup), "${TOKEN");
    }

    #[test]
    fn test_empty_placeholder_left_intact() {
        assert_eq!(substitute_env_with("a ${} b", lookup), "a ${} b");
    }

    #[test]
    fn test_multiple_placeholders() {
        assert_eq!(
            substitute_env_with("${TOKEN}:${MISSING}:${TOKEN}", lookup),
            "abc123:${MISSING}:abc123"
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(substitute_env_with("no vars here", lookup), "no vars here");
    }
}
