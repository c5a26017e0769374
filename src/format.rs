//! User-facing message and currency helpers shared by handlers.

use crate::config::AppConfig;

/// Confirmation copy shown after a registration is created.
pub fn registration_create_message(status: &str) -> &'static str {
    if status == "WAITLISTED" {
        "You were added to the waitlist."
    } else {
        "Registration confirmed."
    }
}

fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        "CAD" => Some("CA$"),
        "AUD" => Some("A$"),
        _ => None,
    }
}

fn fraction_digits(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" => 0,
        _ => 2,
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// format_cents
///
/// Formats an amount in minor units, en-US style: `format_cents(150000, "USD")` is
/// `$1,500.00`. Unknown currencies fall back to a `CODE ` prefix.
pub fn format_cents(cents: i64, currency: &str) -> String {
    let currency = currency.trim().to_ascii_uppercase();
    let digits = fraction_digits(&currency);
    let magnitude = cents.unsigned_abs();

    // Zero-decimal currencies still store minor units as hundredths.
    let (whole, fraction) = if digits == 0 {
        ((magnitude + 50) / 100, None)
    } else {
        (magnitude / 100, Some(magnitude % 100))
    };

    let mut number = group_thousands(&whole.to_string());
    if let Some(fraction) = fraction {
        number.push_str(&format!(".{:02}", fraction));
    }

    let sign = if cents < 0 { "-" } else { "" };
    match currency_symbol(&currency) {
        Some(symbol) => format!("{}{}{}", sign, symbol, number),
        None => format!("{}{} {}", sign, currency, number),
    }
}

/// Formats with the configured `APP_CURRENCY`.
pub fn format_cents_default(cents: i64, config: &AppConfig) -> String {
    format_cents(cents, &config.currency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waitlisted_registrations_get_waitlist_copy() {
        assert_eq!(
            registration_create_message("WAITLISTED"),
            "You were added to the waitlist."
        );
        for status in ["REGISTERED", "CHECKED_IN", "waitlisted", ""] {
            assert_eq!(registration_create_message(status), "Registration confirmed.");
        }
    }

    #[test]
    fn formats_common_currencies() {
        assert_eq!(format_cents(1500, "USD"), "$15.00");
        assert_eq!(format_cents(1500, "EUR"), "€15.00");
        assert_eq!(format_cents(999, "gbp"), "£9.99");
        assert_eq!(format_cents(0, "USD"), "$0.00");
    }

    #[test]
    fn groups_thousands_and_signs_negatives() {
        assert_eq!(format_cents(123_456_789, "USD"), "$1,234,567.89");
        assert_eq!(format_cents(-1505, "USD"), "-$15.05");
        assert_eq!(format_cents(100_000, "CAD"), "CA$1,000.00");
    }

    #[test]
    fn zero_decimal_and_unknown_currencies() {
        assert_eq!(format_cents(150_000, "JPY"), "¥1,500");
        assert_eq!(format_cents(1500, "CHF"), "CHF 15.00");
    }

    #[test]
    fn default_uses_configured_currency() {
        let mut config = AppConfig::default();
        assert_eq!(format_cents_default(0, &config), "$0.00");
        config.currency = "EUR".to_string();
        let formatted = format_cents_default(1500, &config);
        assert!(formatted.contains('€'));
        assert!(formatted.contains("15.00"));
    }
}
