use tiny_http::Request;

/// Identity carried by `Authorization: Bearer <token>`. The token itself is
/// the identity; verifying it is left to whatever sits in front of the service.
pub fn bearer_identity(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .and_then(|h| parse_bearer(h.value.as_str()))
}

fn parse_bearer(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::parse_bearer;

    #[test]
    fn accepts_bearer_tokens_only() {
        assert_eq!(parse_bearer("Bearer alice").as_deref(), Some("alice"));
        assert_eq!(parse_bearer("bearer  bob ").as_deref(), Some("bob"));
        assert_eq!(parse_bearer("Basic YWxpY2U="), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Bearer"), None);
    }
}
