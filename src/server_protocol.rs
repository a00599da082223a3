use serde_json::Value;

use crate::constants::max_hp_for_level;
use crate::leaderboard::ScoreSubmission;
use crate::server_utils::sanitize_name;

/// Parses a `POST /api/leaderboard` body. Numbers may arrive as floats and
/// are floored; anything negative, non-finite or of the wrong type rejects
/// the whole submission.
pub fn parse_score_submission(raw: &str) -> Option<ScoreSubmission> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    let name = sanitize_name(object.get("name")?.as_str()?);
    let level = parse_optional_i64(object.get("level"))?.unwrap_or(1);
    if !(1..=i32::MAX as i64).contains(&level) {
        return None;
    }
    let level = level as i32;
    let xp = parse_non_negative(object.get("xp"))?.unwrap_or(0);
    let max_hp = match parse_non_negative(object.get("maxHp"))? {
        Some(value) => i32::try_from(value).ok()?,
        None => max_hp_for_level(level),
    };
    let captured = parse_non_negative(object.get("captured"))?.unwrap_or(0) as usize;
    let total = parse_non_negative(object.get("total"))?.unwrap_or(captured as u64) as usize;
    if captured > total {
        return None;
    }
    let accuracy = match object.get("accuracy") {
        None => 0.0,
        Some(value) => {
            let number = value.as_f64()?;
            if !number.is_finite() {
                return None;
            }
            number.clamp(0.0, 100.0)
        }
    };
    let correct = parse_non_negative(object.get("correct"))?.unwrap_or(0);
    let wrong = parse_non_negative(object.get("wrong"))?.unwrap_or(0);

    Some(ScoreSubmission {
        name,
        level,
        xp,
        max_hp,
        captured,
        total,
        accuracy,
        correct,
        wrong,
    })
}

fn parse_non_negative(value: Option<&Value>) -> Option<Option<u64>> {
    match parse_optional_i64(value)? {
        None => Some(None),
        Some(number) if number >= 0 => Some(Some(number as u64)),
        Some(_) => None,
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
