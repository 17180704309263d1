//! MSISDN normalization.
//!
//! SMSSync devices report numbers however the handset stored them: local
//! trunk form (`082 555 7171`), international access form (`0027...`),
//! or already canonical (`+27...`). Everything entering the bus is
//! rewritten into dialing-code-qualified international form so replies
//! and downstream routing never see a local number.

/// Raw values at or below this length are shortcodes (e.g. `"555"`) and
/// are returned untouched.
const SHORTCODE_MAX_LEN: usize = 5;

/// Normalize a raw MSISDN against an account's dialing code.
///
/// The dialing code is configured in international form (e.g. `"+258"`).
/// Separator characters are stripped, a `00` international access prefix
/// becomes `+`, and a trunk-prefix zero is replaced with the dialing
/// code. Idempotent: normalizing an already-normalized number is a
/// no-op.
pub fn normalize(raw: &str, dialing_code: &str) -> String {
    if raw.chars().count() <= SHORTCODE_MAX_LEN {
        return raw.to_string();
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let code = dialing_code.trim_start_matches('+');

    if let Some(rest) = cleaned.strip_prefix("00") {
        return format!("+{}", rest);
    }
    if let Some(rest) = cleaned.strip_prefix('0') {
        return format!("+{}{}", code, rest);
    }
    if cleaned.starts_with('+') {
        return cleaned;
    }
    if !code.is_empty() && cleaned.starts_with(code) {
        return format!("+{}", cleaned);
    }
    format!("+{}{}", code, cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trunk_prefix_replaced() {
        assert_eq!(normalize("0555-7171", "+27"), "+275557171");
        assert_eq!(normalize("082 555 7171", "+27"), "+27825557171");
    }

    #[test]
    fn test_shortcodes_untouched() {
        assert_eq!(normalize("555", "+27"), "555");
        assert_eq!(normalize("12345", "+27"), "12345");
    }

    #[test]
    fn test_international_access_prefix() {
        assert_eq!(normalize("0027825557171", "+27"), "+27825557171");
    }

    #[test]
    fn test_already_international_untouched() {
        assert_eq!(normalize("+27825557171", "+27"), "+27825557171");
        assert_eq!(normalize("+14155550123", "+27"), "+14155550123");
    }

    #[test]
    fn test_bare_dialing_code_gains_plus() {
        assert_eq!(normalize("27825557171", "+27"), "+27825557171");
    }

    #[test]
    fn test_plain_number_gets_dialing_code() {
        assert_eq!(normalize("825557171", "+27"), "+27825557171");
    }

    #[test]
    fn test_separators_stripped() {
        assert_eq!(normalize("841-234.567", "+258"), "+258841234567");
    }

    #[test]
    fn test_idempotent() {
        for raw in ["0555-7171", "555", "0027825557171", "825557171"] {
            let once = normalize(raw, "+27");
            assert_eq!(normalize(&once, "+27"), once, "raw = {}", raw);
        }
    }
}
