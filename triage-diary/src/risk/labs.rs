//! Lab key normalization and lenient value parsing.
//!
//! Real-world lab data arrives messy: mixed-case keys, unit suffixes,
//! inequality prefixes and scientific notation. Everything is normalized
//! before the hard rules see it.

/// Known synonyms/aliases, mapped to canonical keys after separator
/// stripping and lowercasing.
const SYNONYMS: &[(&str, &str)] = &[
    ("totalbilirubin", "bilirubin"),
    ("serumbilirubin", "bilirubin"),
    ("bili", "bilirubin"),
    ("tbil", "bilirubin"),
    ("alanineaminotransferase", "alt"),
    ("alaninetransaminase", "alt"),
    ("sgpt", "alt"),
    ("aspartateaminotransferase", "ast"),
    ("aspartatetransaminase", "ast"),
    ("sgot", "ast"),
    ("serumalbumin", "albumin"),
    ("alb", "albumin"),
    ("plateletcount", "platelets"),
    ("platelet", "platelets"),
    ("plt", "platelets"),
    ("internationalnormalisedratio", "inr"),
    ("internationalnormalizedratio", "inr"),
    ("serumcreatinine", "creatinine"),
    ("creat", "creatinine"),
    ("serumsodium", "sodium"),
    ("na", "sodium"),
    ("alphafetoprotein", "afp"),
    ("alkalinephosphatase", "alp"),
    ("gammagt", "ggt"),
    ("gammaglutamyltransferase", "ggt"),
    ("haemoglobin", "hemoglobin"),
    ("hb", "hemoglobin"),
    ("estimatedgfr", "egfr"),
    ("gfr", "egfr"),
];

/// Normalize a lab key: lowercase, strip separators, resolve synonyms.
pub fn normalize_lab_key(key: &str) -> String {
    let stripped: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    for (alias, canonical) in SYNONYMS {
        if stripped == *alias {
            return (*canonical).to_string();
        }
    }
    stripped
}

/// Parse a lab value leniently into a float.
///
/// Accepts plain numbers ("28"), unit strings ("28 µmol/L"), inequality
/// prefixes ("<50", ">= 100"), scientific notation ("1.4 × 10^6", "1.4e6")
/// and thousands separators ("1,400").
pub fn parse_lab_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Inequality prefixes carry the bound as the value.
    let trimmed = trimmed
        .trim_start_matches(['<', '>', '=', '~'])
        .trim_start();

    // "1.4 × 10^6" / "1.4 x 10^6" / "1.4 * 10^6"
    if let Some(value) = parse_power_of_ten(trimmed) {
        return Some(value);
    }

    // Leading numeric token, ignoring thousands separators; the rest is
    // treated as a unit suffix.
    let mut number = String::new();
    let mut seen_digit = false;
    for (i, c) in trimmed.char_indices() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                number.push(c);
            }
            '.' => number.push(c),
            '-' | '+' if i == 0 => number.push(c),
            ',' if seen_digit => continue,
            'e' | 'E' if seen_digit => {
                // Scientific notation like "1.4e6"; take the exponent too.
                let rest = &trimmed[i..];
                let exp: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == 'e' || *c == 'E' || *c == '-' || *c == '+')
                    .collect();
                number.push_str(&exp);
                break;
            }
            _ if seen_digit => break,
            _ => return None,
        }
    }

    number.parse::<f64>().ok()
}

/// Parse "<mantissa> [×x*] 10^<exp>" forms.
fn parse_power_of_ten(s: &str) -> Option<f64> {
    let lower = s.to_ascii_lowercase();
    let sep = ['×', 'x', '*'].iter().find_map(|c| lower.find(*c))?;

    let mantissa: f64 = lower[..sep].trim().parse().ok()?;
    let rest = lower[sep..].trim_start_matches(['×', 'x', '*']).trim();

    let rest = rest.strip_prefix("10")?;
    let exp_str = rest.trim_start_matches('^').trim();
    let exp_digits: String = exp_str
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    let exp: i32 = exp_digits.parse().ok()?;

    Some(mantissa * 10f64.powi(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keys() {
        assert_eq!(normalize_lab_key("Total Bilirubin"), "bilirubin");
        assert_eq!(normalize_lab_key("ALT"), "alt");
        assert_eq!(normalize_lab_key("alanine aminotransferase"), "alt");
        assert_eq!(normalize_lab_key("Platelet_Count"), "platelets");
        assert_eq!(normalize_lab_key("INR"), "inr");
        assert_eq!(normalize_lab_key("unknown marker"), "unknownmarker");
    }

    #[test]
    fn test_parse_plain_numbers() {
        assert_eq!(parse_lab_value("28"), Some(28.0));
        assert_eq!(parse_lab_value("  3.5 "), Some(3.5));
        assert_eq!(parse_lab_value("1,400"), Some(1400.0));
    }

    #[test]
    fn test_parse_with_units() {
        assert_eq!(parse_lab_value("28 µmol/L"), Some(28.0));
        assert_eq!(parse_lab_value("35 g/L"), Some(35.0));
        assert_eq!(parse_lab_value("1.2 mg/dL"), Some(1.2));
    }

    #[test]
    fn test_parse_inequalities() {
        assert_eq!(parse_lab_value("<50"), Some(50.0));
        assert_eq!(parse_lab_value(">= 100"), Some(100.0));
        assert_eq!(parse_lab_value("> 1.5"), Some(1.5));
    }

    #[test]
    fn test_parse_scientific() {
        assert_eq!(parse_lab_value("1.4 × 10^6"), Some(1.4e6));
        assert_eq!(parse_lab_value("1.4 x 10^6"), Some(1.4e6));
        assert_eq!(parse_lab_value("1.4e6"), Some(1.4e6));
        assert_eq!(parse_lab_value("2 * 10^3"), Some(2000.0));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_lab_value(""), None);
        assert_eq!(parse_lab_value("pending"), None);
        assert_eq!(parse_lab_value("n/a"), None);
    }
}
