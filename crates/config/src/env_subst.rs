/// Replace `${ENV_VAR}` placeholders in the raw config text.
///
/// `${ENV_VAR:-fallback}` uses `fallback` when the variable is unset.
/// Unresolvable variables without a fallback are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with a caller-supplied lookup, so tests do not
/// have to touch the process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder, emit the remainder literally.
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => result.push_str(&value),
            (false, None, Some(fallback)) => result.push_str(fallback),
            _ => {
                result.push_str("${");
                result.push_str(body);
                result.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HAL_TEST_TOKEN" => Some("xoxb-123".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("token = \"${HAL_TEST_TOKEN}\"", lookup),
            "token = \"xoxb-123\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${HAL_MISSING_XYZ}", lookup),
            "${HAL_MISSING_XYZ}"
        );
    }

    #[test]
    fn uses_fallback_for_unknown_var() {
        assert_eq!(
            substitute_env_with("prefix = \"${HAL_MISSING_XYZ:-!}\"", lookup),
            "prefix = \"!\""
        );
    }

    #[test]
    fn known_var_wins_over_fallback() {
        assert_eq!(
            substitute_env_with("${HAL_TEST_TOKEN:-unused}", lookup),
            "xoxb-123"
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("a ${HAL_TEST", lookup), "a ${HAL_TEST");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
