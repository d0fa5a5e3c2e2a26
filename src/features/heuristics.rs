//! Security heuristics over HTTP-layer fields. Each returns a score in [0, 1].

use regex::Regex;
use std::sync::OnceLock;

const SQL_PATTERNS: [&str; 11] = [
    r"union.*select",
    r"drop.*table",
    r"insert.*into",
    r"delete.*from",
    r"update.*set",
    r"exec\(",
    r"sp_executesql",
    r"xp_cmdshell",
    r"\bor\b.*=.*\bor\b",
    r"\band\b.*=.*\band\b",
    r"'.*or.*'.*='.*'",
];

const XSS_PATTERNS: [&str; 13] = [
    r"<script",
    r"javascript:",
    r"onerror=",
    r"onload=",
    r"onclick=",
    r"alert\(",
    r"document\.cookie",
    r"window\.location",
    r"eval\(",
    r"fromcharcode",
    r"<iframe",
    r"<object",
    r"<embed",
];

const BOT_INDICATORS: [&str; 11] = [
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python",
    "java",
    "go-http",
    "okhttp",
    "automated",
];

const HIGH_RISK_COUNTRIES: [&str; 5] = ["XX", "ZZ", "CN", "RU", "KP"];
const MEDIUM_RISK_COUNTRIES: [&str; 3] = ["IR", "PK", "BD"];

static SQL_SET: OnceLock<Vec<Regex>> = OnceLock::new();
static XSS_SET: OnceLock<Vec<Regex>> = OnceLock::new();

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = p, error = %e, "heuristic pattern rejected");
                None
            }
        })
        .collect()
}

/// Fraction of category patterns matching `text`. The denominator is the full
/// category size, so a rejected pattern only lowers the ceiling.
fn match_ratio(set: &[Regex], total: usize, text: &str) -> f64 {
    if text.is_empty() || total == 0 {
        return 0.0;
    }
    let hits = set.iter().filter(|re| re.is_match(text)).count();
    (hits as f64 / total as f64).min(1.0)
}

pub fn sql_injection_score(text: &str) -> f64 {
    let set = SQL_SET.get_or_init(|| compile(&SQL_PATTERNS));
    match_ratio(set, SQL_PATTERNS.len(), text)
}

pub fn xss_score(text: &str) -> f64 {
    let set = XSS_SET.get_or_init(|| compile(&XSS_PATTERNS));
    match_ratio(set, XSS_PATTERNS.len(), text)
}

/// Flood likelihood from packet rate, volume and burst shape.
pub fn ddos_score(packets_per_second: f64, byte_count: u64, duration: f64) -> f64 {
    let mut score = 0.0;
    if packets_per_second > 1000.0 {
        score += 0.4;
    } else if packets_per_second > 500.0 {
        score += 0.2;
    }
    if byte_count > 1_000_000 {
        score += 0.3;
    }
    if duration < 1.0 && packets_per_second > 100.0 {
        score += 0.3;
    }
    f64::min(score, 1.0)
}

/// A missing user agent is itself treated as automated traffic.
pub fn bot_score(user_agent: &str) -> f64 {
    if user_agent.is_empty() {
        return 1.0;
    }
    let ua = user_agent.to_lowercase();
    let hits = BOT_INDICATORS.iter().filter(|i| ua.contains(*i)).count();
    (hits as f64 / BOT_INDICATORS.len() as f64).min(1.0)
}

pub fn geo_anomaly_score(country: &str) -> f64 {
    let country = country.trim().to_uppercase();
    if country.is_empty() {
        0.5
    } else if HIGH_RISK_COUNTRIES.contains(&country.as_str()) {
        0.8
    } else if MEDIUM_RISK_COUNTRIES.contains(&country.as_str()) {
        0.4
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_injection_detects_union_select() {
        let hostile = sql_injection_score("' OR '1'='1' UNION SELECT");
        let benign = sql_injection_score("/api/v1/users/42");
        assert!(hostile > 0.0);
        assert!(hostile > benign);
        assert!(hostile <= 1.0);
    }

    #[test]
    fn xss_is_case_insensitive() {
        assert!(xss_score("/search?q=<SCRIPT>alert(1)</script>") >= 2.0 / 13.0);
        assert_eq!(xss_score(""), 0.0);
    }

    #[test]
    fn bot_score_counts_indicators() {
        assert_eq!(bot_score(""), 1.0);
        assert_eq!(bot_score("Mozilla/5.0 (X11; Linux x86_64)"), 0.0);
        let curl = bot_score("curl/8.0");
        assert!((curl - 1.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn ddos_caps_at_one() {
        assert_eq!(ddos_score(5000.0, 5_000_000, 0.1), 1.0);
        assert_eq!(ddos_score(10.0, 100, 5.0), 0.0);
        assert!((ddos_score(600.0, 0, 2.0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn geo_tiers() {
        assert_eq!(geo_anomaly_score(""), 0.5);
        assert_eq!(geo_anomaly_score("ru"), 0.8);
        assert_eq!(geo_anomaly_score("PK"), 0.4);
        assert_eq!(geo_anomaly_score("DE"), 0.1);
    }
}
