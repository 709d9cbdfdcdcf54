pub fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

pub fn parse_ts_rfc3339(s: &str) -> Option<f64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}

/// Hours from `now` until `end_ts`; negative once the market has resolved.
pub fn hours_until(end_ts: f64, now: f64) -> f64 {
    (end_ts - now) / 3600.0
}

/// Date key used for daily summaries (UTC).
pub fn today_key(now: f64) -> String {
    chrono::DateTime::from_timestamp(now as i64, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc3339_end_dates() {
        let ts = parse_ts_rfc3339("2026-03-01T12:00:00Z").unwrap();
        assert!(ts > 1_700_000_000.0);
        assert!(parse_ts_rfc3339("not-a-date").is_none());
    }

    #[test]
    fn today_key_is_iso_date() {
        let k = today_key(1_750_000_000.0);
        assert_eq!(k.len(), 10);
        assert_eq!(&k[4..5], "-");
    }
}
