/// Validate a client identifier harvested from an encrypted transport.
///
/// Identifiers follow the hostname-label grammar: lower-case ASCII
/// alphanumerics and hyphens, no leading or trailing hyphen, at most 63
/// bytes. An empty identifier is valid and means "no identifier".
pub fn validate_client_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Ok(());
    }
    if id.len() > 63 {
        return Err(format!("client id too long: {} bytes", id.len()));
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(format!("client id has leading or trailing hyphen: {id:?}"));
    }
    for c in id.chars() {
        if !matches!(c, 'a'..='z' | '0'..='9' | '-') {
            return Err(format!("client id has invalid character {c:?}: {id:?}"));
        }
    }
    Ok(())
}
