//! Validation helpers for DTOs.

use serde_json::Number;
use validator::ValidationError;

use crate::state::validator::{MAX_GAME_POINTS, ScoreError};

/// Convert a JSON number into a point total, rejecting fractions, negatives and totals above
/// [`MAX_GAME_POINTS`].
///
/// Whole floats such as `11.0` are accepted.
///
/// # Examples
///
/// ```ignore
/// score_value(&Number::from(11))          // Ok(11)
/// score_value(&Number::from_f64(10.5)?)   // Err(NotInteger)
/// score_value(&Number::from(-1))          // Err(Negative)
/// ```
pub fn score_value(number: &Number) -> Result<u32, ScoreError> {
    let too_high = ScoreError::TooHigh {
        max: MAX_GAME_POINTS,
    };
    if let Some(value) = number.as_u64() {
        return u32::try_from(value)
            .ok()
            .filter(|points| *points <= MAX_GAME_POINTS)
            .ok_or(too_high);
    }
    // Integers that are not u64 are negative.
    if number.as_i64().is_some() {
        return Err(ScoreError::Negative);
    }
    match number.as_f64() {
        Some(value) if value.fract() != 0.0 || !value.is_finite() => Err(ScoreError::NotInteger),
        Some(value) if value < 0.0 => Err(ScoreError::Negative),
        Some(value) if value > f64::from(MAX_GAME_POINTS) => Err(too_high),
        Some(value) => Ok(value as u32),
        None => Err(ScoreError::NotInteger),
    }
}

/// `validator` adapter around [`score_value`].
pub fn validate_score_number(number: &Number) -> Result<(), ValidationError> {
    score_value(number).map(|_| ()).map_err(|err| {
        let code = match err {
            ScoreError::Negative => "score_negative",
            ScoreError::TooHigh { .. } => "score_too_high",
            _ => "score_not_integer",
        };
        let mut error = ValidationError::new(code);
        error.message = Some(err.to_string().into());
        error
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_value_whole_numbers() {
        assert_eq!(score_value(&Number::from(11)), Ok(11));
        assert_eq!(score_value(&Number::from(0)), Ok(0));
        assert_eq!(score_value(&Number::from_f64(9.0).unwrap()), Ok(9));
    }

    #[test]
    fn test_score_value_rejects_fractions_and_negatives() {
        assert_eq!(
            score_value(&Number::from_f64(10.5).unwrap()),
            Err(ScoreError::NotInteger)
        );
        assert_eq!(score_value(&Number::from(-3)), Err(ScoreError::Negative));
        assert_eq!(
            score_value(&Number::from_f64(-2.0).unwrap()),
            Err(ScoreError::Negative)
        );
    }

    #[test]
    fn test_score_value_rejects_runaway_totals() {
        let too_high = Err(ScoreError::TooHigh {
            max: MAX_GAME_POINTS,
        });
        assert_eq!(score_value(&Number::from(999)), Ok(999));
        assert_eq!(score_value(&Number::from(1_000)), too_high);
        assert_eq!(score_value(&Number::from(4_000_000_000u64)), too_high);
        assert_eq!(score_value(&Number::from(u64::MAX)), too_high);
        assert_eq!(score_value(&Number::from_f64(1e12).unwrap()), too_high);
        let err = validate_score_number(&Number::from(5_000)).unwrap_err();
        assert_eq!(err.code, "score_too_high");
    }

    #[test]
    fn test_validate_score_number_codes() {
        let err = validate_score_number(&Number::from(-1)).unwrap_err();
        assert_eq!(err.code, "score_negative");
        let err = validate_score_number(&Number::from_f64(1.5).unwrap()).unwrap_err();
        assert_eq!(err.code, "score_not_integer");
        assert!(validate_score_number(&Number::from(21)).is_ok());
    }
}
