//! Topic and topic-filter validation plus wildcard matching
//!
//! Publish topics (including will and availability topics) must be concrete:
//! non-empty and wildcard-free. Filters follow the MQTT placement rules for
//! `+` and `#`. Matching implements the standard semantics: `+` spans one
//! level, a trailing `#` spans the remaining levels including the parent
//! level itself, and topics starting with `$` are not matched by filters
//! that start with a wildcard.

/// Validate a concrete topic used for publishing, wills and availability.
pub fn validate_topic(topic: &str) -> Result<(), String> {
    if topic.is_empty() {
        return Err("topic must not be empty".to_string());
    }
    if topic.contains('\0') {
        return Err("topic must not contain NUL".to_string());
    }
    if let Some(wildcard) = topic.chars().find(|c| *c == '+' || *c == '#') {
        return Err(format!("topic must not contain wildcard '{wildcard}'"));
    }
    Ok(())
}

/// Validate a subscription topic filter.
pub fn validate_filter(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("filter must not be empty".to_string());
    }
    if filter.contains('\0') {
        return Err("filter must not contain NUL".to_string());
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err("'#' must occupy an entire level".to_string());
            }
            if index != levels.len() - 1 {
                return Err("'#' is only allowed as the last level".to_string());
            }
        }
        if level.contains('+') && *level != "+" {
            return Err("'+' must occupy an entire level".to_string());
        }
    }
    Ok(())
}

/// Check whether a validated filter matches a concrete topic.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    // [MQTT-4.7.2-1]: wildcard-led filters never match $-topics
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // "a/b/#" also matches the parent "a/b"
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(actual)) if expected == actual => continue,
            (Some(_), Some(_)) => return false,
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => return true,
        }
    }
}
