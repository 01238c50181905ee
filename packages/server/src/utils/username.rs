/// Derive a login name from a person's names.
///
/// Lower-cases, keeps ASCII alphanumerics only and joins the parts with a dot,
/// so identical inputs always produce the same username.
pub fn from_names(first_name: &str, last_name: &str) -> String {
    let parts: Vec<String> = [first_name, last_name]
        .iter()
        .map(|part| {
            part.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect();
    parts.join(".")
}

/// Login name for a parent account: the normalized contact email.
pub fn from_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
