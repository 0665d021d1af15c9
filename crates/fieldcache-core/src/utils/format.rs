use serde_json::Value;

/// Case-insensitive substring test. An empty needle matches everything.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Render a scalar JSON value as searchable text.
/// Arrays, objects and nulls have no text form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Human-readable age for a number of elapsed minutes ("5m ago", "2h ago").
pub fn format_age_minutes(minutes: i64) -> String {
    if minutes < 1 {
        // Negative ages come from clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Amina Okafor", "okaf"));
        assert!(contains_ignore_case("Amina", ""));
        assert!(!contains_ignore_case("Amina", "bello"));
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!("Kano")).as_deref(), Some("Kano"));
        assert_eq!(scalar_text(&json!(42)).as_deref(), Some("42"));
        assert_eq!(scalar_text(&json!(true)).as_deref(), Some("true"));
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!(["a"])), None);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Dala", 10), "Dala");
        assert_eq!(truncate_string("Tarauni village", 10), "Tarauni...");
        assert_eq!(truncate_string("Àdìó Bello", 6), "Àdì...");
    }

    #[test]
    fn test_format_age_minutes() {
        assert_eq!(format_age_minutes(-3), "just now");
        assert_eq!(format_age_minutes(0), "just now");
        assert_eq!(format_age_minutes(5), "5m ago");
        assert_eq!(format_age_minutes(90), "2h ago");
        assert_eq!(format_age_minutes(80), "1h ago");
        assert_eq!(format_age_minutes(1440 + 13 * 60), "2d ago");
    }
}
