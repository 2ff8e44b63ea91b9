/// Interprets a price entity's state as whole seconds until the cheapest
/// window. Anything that is not a finite, non-negative number is unknown.
pub fn parse_price_state(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || ["unknown", "unavailable", "none", "null"]
            .iter()
            .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        return None;
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(seconds);
    }

    let value = trimmed.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value >= u64::MAX as f64 {
        return None;
    }
    Some(value.trunc() as u64)
}
