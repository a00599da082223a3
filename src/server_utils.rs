use crate::constants::{LEADERBOARD_CAPACITY, MAX_PLAYER_NAME_CHARS};

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(MAX_PLAYER_NAME_CHARS).collect()
}

pub fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
}

pub fn normalize_leaderboard_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(LEADERBOARD_CAPACITY)
        .clamp(1, LEADERBOARD_CAPACITY)
}

/// `None` for a missing or blank `name` query value.
pub fn parse_rank_query(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(sanitize_name(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_limit_parsing_is_lenient_for_invalid_values() {
        assert_eq!(parse_leaderboard_limit(Some("8")), Some(8));
        assert_eq!(parse_leaderboard_limit(Some(" 12 ")), Some(12));
        assert_eq!(parse_leaderboard_limit(Some("0")), Some(0));
        assert_eq!(parse_leaderboard_limit(Some("abc")), None);
        assert_eq!(parse_leaderboard_limit(Some("-1")), None);
        assert_eq!(parse_leaderboard_limit(None), None);
    }

    #[test]
    fn leaderboard_limit_is_clamped_to_capacity() {
        assert_eq!(normalize_leaderboard_limit(None), 50);
        assert_eq!(normalize_leaderboard_limit(Some(0)), 1);
        assert_eq!(normalize_leaderboard_limit(Some(7)), 7);
        assert_eq!(normalize_leaderboard_limit(Some(999)), 50);
    }

    #[test]
    fn sanitize_name_applies_trim_empty_and_max_len() {
        assert_eq!(sanitize_name(""), "Player");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(" Alice "), "Alice");
        assert_eq!(sanitize_name("12345678901234567890"), "1234567890123456");
    }

    #[test]
    fn rank_query_requires_a_name() {
        assert_eq!(parse_rank_query(None), None);
        assert_eq!(parse_rank_query(Some("  ")), None);
        assert_eq!(parse_rank_query(Some(" Ada ")), Some("Ada".to_string()));
    }
}
