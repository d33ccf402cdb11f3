//! Locale-tolerant numeric parsing for values headed to numeric columns.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Parse a human-formatted number such as `"1.234,50 €"`, `"12,5"` or
/// `"$1,299.00"`.
///
/// Everything but digits, `.`, `,` and a leading minus is dropped. When both
/// separators occur, the one appearing last is the decimal separator. A single
/// separator of one kind is decimal; repeated separators are thousands
/// grouping. Returns `None` when no digits remain.
pub fn parse_locale_decimal(input: &str) -> Option<Decimal> {
    let trimmed = input.trim();
    let first_digit = trimmed.find(|c: char| c.is_ascii_digit())?;
    let prefix = &trimmed[..first_digit];
    let negative = prefix.contains('-');
    // ".5" keeps its separator, "approx. 5" does not
    let leading_fraction = (prefix.ends_with('.') || prefix.ends_with(','))
        && !prefix.chars().any(char::is_alphabetic);

    let mut kept = String::with_capacity(trimmed.len() + 1);
    if leading_fraction {
        kept.push_str("0.");
    }
    kept.extend(
        trimmed[first_digit..]
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ','),
    );
    let kept = kept.trim_end_matches(|c: char| c == '.' || c == ',').to_string();

    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            let (decimal, grouping) = if dot > comma { ('.', ',') } else { (',', '.') };
            kept.replace(grouping, "").replace(decimal, ".")
        }
        (None, Some(_)) => single_kind(&kept, ','),
        (Some(_), None) => single_kind(&kept, '.'),
        (None, None) => kept,
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

fn single_kind(kept: &str, separator: char) -> String {
    if kept.matches(separator).count() == 1 {
        kept.replace(separator, ".")
    } else {
        kept.replace(separator, "")
    }
}
