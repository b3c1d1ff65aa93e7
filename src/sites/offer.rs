use regex::Regex;
use std::sync::OnceLock;

const FALLBACK_OFFER: &str = "a lower price";

fn price_pattern() -> &'static Regex {
    static PRICE: OnceLock<Regex> = OnceLock::new();
    PRICE.get_or_init(|| Regex::new(r"\$([\d,]+)").expect("valid price pattern"))
}

/// First `$N[,NNN]` amount in `text`, in whole dollars.
pub fn parse_price(text: &str) -> Option<u64> {
    let caps = price_pattern().captures(text)?;
    let digits: String = caps[1].chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// `floor(price * ratio)` rendered as `$N`, or a generic phrase without a price.
pub fn offer_amount(price: Option<u64>, ratio: f64) -> String {
    match price {
        Some(p) => format!("${}", (p as f64 * ratio).floor() as u64),
        None => FALLBACK_OFFER.to_string(),
    }
}

pub fn offer_message(price: Option<u64>, ratio: f64) -> String {
    format!(
        "Hey! I'm really interested in this! Would you be willing to accept {}? Let me know, thanks!",
        offer_amount(price, ratio)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_price_with_thousands_separator() {
        assert_eq!(parse_price("Road bike\n$1,250 · Oakland, CA\n$99"), Some(1250));
        assert_eq!(parse_price("Free to good home"), None);
        assert_eq!(parse_price("$ 40"), None);
    }

    #[test]
    fn offer_is_floored_fraction_of_price() {
        assert_eq!(offer_amount(Some(1250), 0.2), "$250");
        assert_eq!(offer_amount(Some(99), 0.2), "$19");
        assert_eq!(offer_amount(Some(3), 0.2), "$0");
        assert_eq!(offer_amount(None, 0.2), "a lower price");
    }

    #[test]
    fn message_template() {
        assert_eq!(
            offer_message(Some(100), 0.2),
            "Hey! I'm really interested in this! Would you be willing to accept $20? Let me know, thanks!"
        );
        assert!(offer_message(None, 0.2).contains("accept a lower price?"));
    }
}
