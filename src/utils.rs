// Validation and conversion helpers shared by handlers and the database layer

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::{
    constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MAX_TEAM_TOKENS, MIN_TEAM_TOKENS},
    error::{AppError, Result},
};

/// Clamp pagination input and turn it into `(limit, offset)`.
pub fn page_bounds(page: Option<i64>, limit: Option<i64>) -> Result<(i64, i64)> {
    let page = page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::BadRequest("page must be >= 1".to_string()));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::BadRequest("page out of range".to_string()))?;
    Ok((limit, offset))
}

pub fn is_valid_evm_address(value: &str) -> bool {
    let normalized = value.trim();
    normalized.starts_with("0x")
        && normalized.len() == 42
        && normalized[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate an EVM wallet address and return its lowercase form.
pub fn normalize_address(value: &str) -> Result<String> {
    if !is_valid_evm_address(value) {
        return Err(AppError::BadRequest(
            "Invalid wallet address format (expected 0x + 40 hex chars)".to_string(),
        ));
    }
    Ok(value.trim().to_ascii_lowercase())
}

/// Parse an integer amount in the smallest currency unit.
pub fn parse_units(raw: &str) -> Result<u128> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(format!(
            "Invalid amount '{}': expected a non-negative integer",
            raw
        )));
    }
    trimmed.parse::<u128>().map_err(|_| AppError::AmountOverflow)
}

pub fn units_to_decimal(units: u128) -> Result<Decimal> {
    Decimal::from_u128(units).ok_or(AppError::AmountOverflow)
}

pub fn decimal_to_units(value: Decimal) -> Result<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::Internal(format!("negative amount {}", value)));
    }
    if !value.fract().is_zero() {
        return Err(AppError::Internal(format!("fractional amount {}", value)));
    }
    value.trunc().to_u128().ok_or(AppError::AmountOverflow)
}

/// Amounts leave the API as decimal strings so no client rounds them.
pub fn serialize_units<S: serde::Serializer>(
    value: &u128,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Validate a fantasy team: 1-10 distinct token symbols, uppercased.
pub fn normalize_team_tokens(tokens: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let symbol = token.trim().to_ascii_uppercase();
        if symbol.is_empty() || symbol.len() > 16 || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::BadRequest(format!("Invalid token symbol '{}'", token)));
        }
        if normalized.contains(&symbol) {
            return Err(AppError::BadRequest(format!("Duplicate token '{}'", symbol)));
        }
        normalized.push(symbol);
    }

    if !(MIN_TEAM_TOKENS..=MAX_TEAM_TOKENS).contains(&normalized.len()) {
        return Err(AppError::BadRequest(format!(
            "A team must hold between {} and {} tokens",
            MIN_TEAM_TOKENS, MAX_TEAM_TOKENS
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_defaults_and_offsets() {
        assert_eq!(page_bounds(None, None).unwrap(), (DEFAULT_PAGE_LIMIT, 0));
        assert_eq!(page_bounds(Some(3), Some(10)).unwrap(), (10, 20));
        assert!(page_bounds(Some(0), None).is_err());
        assert!(page_bounds(None, Some(MAX_PAGE_LIMIT + 1)).is_err());
        assert!(page_bounds(Some(i64::MAX), Some(50)).is_err());
    }

    #[test]
    fn addresses_are_validated_and_lowercased() {
        let addr = normalize_address(" 0xABCDEF0123456789abcdef0123456789ABCDEF01 ").unwrap();
        assert_eq!(addr, "0xabcdef0123456789abcdef0123456789abcdef01");
        assert!(normalize_address("0x123").is_err());
        assert!(normalize_address("abcdef0123456789abcdef0123456789abcdef0123").is_err());
        assert!(normalize_address("0xZZCDEF0123456789abcdef0123456789ABCDEF01").is_err());
    }

    #[test]
    fn parse_units_accepts_only_integers() {
        assert_eq!(parse_units("1000").unwrap(), 1_000);
        assert_eq!(parse_units(" 42 ").unwrap(), 42);
        assert!(parse_units("-1").is_err());
        assert!(parse_units("1.5").is_err());
        assert!(parse_units("").is_err());
        assert!(matches!(
            parse_units("999999999999999999999999999999999999999999"),
            Err(AppError::AmountOverflow)
        ));
    }

    #[test]
    fn decimal_conversions() {
        let d = units_to_decimal(123_456_789).unwrap();
        assert_eq!(decimal_to_units(d).unwrap(), 123_456_789);
        assert!(units_to_decimal(u128::MAX).is_err());
        assert!(decimal_to_units(Decimal::new(15, 1)).is_err());
        assert!(decimal_to_units(Decimal::new(-5, 0)).is_err());
        assert_eq!(decimal_to_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn team_tokens_are_normalized() {
        let tokens = vec!["btc".to_string(), " eth ".to_string()];
        assert_eq!(normalize_team_tokens(&tokens).unwrap(), vec!["BTC", "ETH"]);

        assert!(normalize_team_tokens(&[]).is_err());
        assert!(normalize_team_tokens(&["BTC".to_string(), "btc".to_string()]).is_err());
        assert!(normalize_team_tokens(&["BT-C".to_string()]).is_err());

        let too_many: Vec<String> = (0..11).map(|i| format!("T{}", i)).collect();
        assert!(normalize_team_tokens(&too_many).is_err());
    }
}
