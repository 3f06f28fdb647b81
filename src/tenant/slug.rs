/// Slugify a name: lowercase, replace non-alphanumeric with `-`, collapse dashes, trim.
///
/// Slugs here are identifying keys (content slugs, store names), so they must
/// be stable across runs: same input, same slug, no random suffix. That is
/// what makes the skip/overwrite check a duplicate-prevention mechanism.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    // Collapse multiple dashes and trim leading/trailing dashes
    let mut result = String::new();
    let mut prev_dash = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash && !result.is_empty() {
                result.push('-');
            }
            prev_dash = true;
        } else {
            result.push(c);
            prev_dash = false;
        }
    }
    result.trim_end_matches('-').to_string()
}

/// Store name for a tenant, derived from its domain: `t_<slug>`.
pub fn database_name_for_domain(domain: &str) -> String {
    format!("t_{}", slugify(domain))
}
