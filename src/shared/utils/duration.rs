use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Parse a duration string such as `"30s"`, `"15m"`, `"2h"`, `"1d"` or a
/// combination like `"1h30m"`.
pub fn parse_duration(duration_str: &str) -> Result<Duration, String> {
    static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
    static COMPONENT_REGEX: OnceLock<Regex> = OnceLock::new();

    let whole = DURATION_REGEX
        .get_or_init(|| Regex::new(r"^(\d+[smhd])+$").expect("Invalid duration regex"));
    let component = COMPONENT_REGEX
        .get_or_init(|| Regex::new(r"(\d+)([smhd])").expect("Invalid duration regex"));

    let trimmed = duration_str.trim();
    if !whole.is_match(trimmed) {
        return Err(format!(
            "Invalid duration format: {}. Expected format: <number><s|m|h|d>",
            duration_str
        ));
    }

    let mut seconds: u64 = 0;
    for caps in component.captures_iter(trimmed) {
        let number: u64 = caps[1]
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", &caps[1]))?;

        let unit_seconds = match &caps[2] {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 60 * 60 * 24,
            unit => return Err(format!("Invalid duration unit: {}", unit)),
        };

        seconds = number
            .checked_mul(unit_seconds)
            .and_then(|s| seconds.checked_add(s))
            .ok_or_else(|| format!("Duration too large: {}", duration_str))?;
    }

    if seconds == 0 {
        return Err("Duration must be greater than 0".to_string());
    }

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("30m"), Ok(Duration::from_secs(1800)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d"), Ok(Duration::from_secs(86400)));
    }

    #[test]
    fn test_combined_units() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration(" 2m10s "), Ok(Duration::from_secs(130)));
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("0m").is_err());
        assert!(parse_duration("h2").is_err());
    }
}
