//! English number expansion used by `english_cleaners`.
//!
//! Digits are spelled out the way the pretrained Tacotron 2 transcripts
//! were: cardinals without "and", comma-separated scale groups, years read
//! in pairs, and currency with singular/plural units.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// ─────────────────────────────────────────────────────────────────────────────
// Words
// ─────────────────────────────────────────────────────────────────────────────

const ONES: &[&str] = &[
    "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen",
    "seventeen", "eighteen", "nineteen",
];
const TENS: &[&str] = &["", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];
const SCALE: &[&str] = &["", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion"];

/// 0 < n < 100.
fn two_digits_to_words(n: u64) -> String {
    if n < 20 {
        return ONES[n as usize].to_string();
    }
    let tens = TENS[(n / 10) as usize];
    match n % 10 {
        0 => tens.to_string(),
        ones => format!("{}-{}", tens, ONES[ones as usize]),
    }
}

/// 0 < n < 1000.
fn three_digits_to_words(n: u64) -> String {
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, r) => two_digits_to_words(r),
        (h, 0) => format!("{} hundred", ONES[h as usize]),
        (h, r) => format!("{} hundred {}", ONES[h as usize], two_digits_to_words(r)),
    }
}

/// Cardinal reading: `3200` → `three thousand, two hundred`.
pub fn cardinal(n: u64) -> String {
    if n == 0 {
        return "zero".to_string();
    }
    let mut groups = Vec::new();
    let mut remaining = n;
    for scale in SCALE {
        let chunk = remaining % 1000;
        if chunk > 0 {
            let words = three_digits_to_words(chunk);
            groups.push(if scale.is_empty() { words } else { format!("{} {}", words, scale) });
        }
        remaining /= 1000;
        if remaining == 0 {
            break;
        }
    }
    groups.reverse();
    groups.join(", ")
}

/// Year-style reading in digit pairs, `oh` for a leading zero:
/// `1984` → `nineteen eighty-four`, `1905` → `nineteen oh five`.
fn paired(n: u64) -> String {
    let hi = n / 100;
    let lo = n % 100;
    let lo_words = match lo {
        0 => "hundred".to_string(),
        1..=9 => format!("oh {}", ONES[lo as usize]),
        _ => two_digits_to_words(lo),
    };
    format!("{} {}", two_digits_to_words(hi), lo_words)
}

/// Spoken form of an integer as it appears in running English text.
///
/// Numbers strictly between 1000 and 3000 are read as years.
pub fn spoken_integer(n: u64) -> String {
    if n > 1000 && n < 3000 {
        if n == 2000 {
            "two thousand".to_string()
        } else if n > 2000 && n < 2010 {
            format!("two thousand {}", cardinal(n % 100))
        } else if n % 100 == 0 {
            format!("{} hundred", cardinal(n / 100))
        } else {
            paired(n)
        }
    } else {
        cardinal(n)
    }
}

/// Ordinal words: `21` → `twenty-first`, `100` → `one hundredth`.
pub fn ordinal(n: u64) -> String {
    let word = cardinal(n);
    let split = word.rfind(['-', ' ']).map(|p| p + 1).unwrap_or(0);
    let (prefix, last) = word.split_at(split);

    let last_ord = match last {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        l if l.ends_with('y') => format!("{}ieth", &l[..l.len() - 1]),
        l => format!("{}th", l),
    };
    format!("{}{}", prefix, last_ord)
}

fn digits_to_words(s: &str) -> String {
    s.chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| if d == 0 { "zero" } else { ONES[d as usize] })
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Text expansion
// ─────────────────────────────────────────────────────────────────────────────

static RE_COMMA_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9][0-9,]+[0-9])").unwrap());
static RE_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+\.[0-9]+)").unwrap());
static RE_POUNDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"£([0-9,]*[0-9]+)").unwrap());
static RE_DOLLARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([0-9.,]*[0-9]+)").unwrap());
static RE_ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)(st|nd|rd|th)").unwrap());
static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

fn expand_dollars(caps: &Captures) -> String {
    let amount = &caps[1];
    let parts: Vec<&str> = amount.split('.').collect();
    if parts.len() > 2 {
        return format!("{} dollars", amount);
    }
    let dollars = match parts[0].replace(',', "") {
        d if d.is_empty() => Ok(0),
        d => d.parse::<u64>(),
    };
    let cents = parts.get(1).map_or(Ok(0), |c| c.parse::<u64>());
    let (Ok(dollars), Ok(cents)) = (dollars, cents) else {
        // wider than u64: leave the digits for the integer pass
        return format!("{} dollars", amount);
    };
    let unit = |n: u64, one: &str, many: &str| if n == 1 { one.to_string() } else { many.to_string() };

    match (dollars, cents) {
        (0, 0) => "zero dollars".to_string(),
        (d, 0) => format!("{} {}", d, unit(d, "dollar", "dollars")),
        (0, c) => format!("{} {}", c, unit(c, "cent", "cents")),
        (d, c) => format!(
            "{} {}, {} {}",
            d,
            unit(d, "dollar", "dollars"),
            c,
            unit(c, "cent", "cents")
        ),
    }
}

/// Replace every number in `text` with its spoken form.
pub fn normalize_numbers(text: &str) -> String {
    let text = RE_COMMA_NUMBER.replace_all(text, |c: &Captures| c[1].replace(',', ""));
    let text = RE_POUNDS.replace_all(&text, "$1 pounds");
    let text = RE_DOLLARS.replace_all(&text, expand_dollars);
    let text = RE_DECIMAL.replace_all(&text, |c: &Captures| c[1].replace('.', " point "));
    let text = RE_ORDINAL.replace_all(&text, |c: &Captures| match c[1].parse::<u64>() {
        Ok(n) => ordinal(n),
        Err(_) => digits_to_words(&c[1]),
    });
    RE_NUMBER
        .replace_all(&text, |c: &Captures| match c[0].parse::<u64>() {
            Ok(n) => spoken_integer(n),
            // wider than u64: read digit by digit
            Err(_) => digits_to_words(&c[0]),
        })
        .into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinal() {
        assert_eq!(cardinal(0), "zero");
        assert_eq!(cardinal(7), "seven");
        assert_eq!(cardinal(42), "forty-two");
        assert_eq!(cardinal(100), "one hundred");
        assert_eq!(cardinal(115), "one hundred fifteen");
        assert_eq!(cardinal(3200), "three thousand, two hundred");
        assert_eq!(cardinal(1_000_000), "one million");
        assert_eq!(cardinal(1_001_000), "one million, one thousand");
    }

    #[test]
    fn test_years() {
        assert_eq!(spoken_integer(1984), "nineteen eighty-four");
        assert_eq!(spoken_integer(1905), "nineteen oh five");
        assert_eq!(spoken_integer(1200), "twelve hundred");
        assert_eq!(spoken_integer(2000), "two thousand");
        assert_eq!(spoken_integer(2007), "two thousand seven");
        assert_eq!(spoken_integer(2019), "twenty nineteen");
        assert_eq!(spoken_integer(1000), "one thousand");
        assert_eq!(spoken_integer(3000), "three thousand");
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal(1), "first");
        assert_eq!(ordinal(2), "second");
        assert_eq!(ordinal(12), "twelfth");
        assert_eq!(ordinal(20), "twentieth");
        assert_eq!(ordinal(21), "twenty-first");
        assert_eq!(ordinal(100), "one hundredth");
        assert_eq!(ordinal(108), "one hundred eighth");
    }

    #[test]
    fn test_dollars() {
        assert_eq!(normalize_numbers("$1"), "one dollar");
        assert_eq!(normalize_numbers("$4.99"), "four dollars, ninety-nine cents");
        assert_eq!(normalize_numbers("$0.01"), "one cent");
        assert_eq!(normalize_numbers("$0.00"), "zero dollars");
        assert_eq!(normalize_numbers("$.50"), "fifty cents");
    }

    #[test]
    fn test_dollars_wider_than_u64() {
        let out = normalize_numbers("$100000000000000000000");
        assert_eq!(out, format!("one {} dollars", ["zero"; 20].join(" ")));

        let out = normalize_numbers("$3.123456789012345678901");
        assert!(out.starts_with("three point one two three"), "got: {}", out);
        assert!(out.ends_with(" dollars"), "got: {}", out);
    }

    #[test]
    fn test_pounds_and_commas() {
        assert_eq!(normalize_numbers("£2,500"), "twenty-five hundred pounds");
        assert_eq!(normalize_numbers("£3,500"), "three thousand, five hundred pounds");
        assert_eq!(normalize_numbers("12,000 people"), "twelve thousand people");
    }

    #[test]
    fn test_decimal_and_ordinal_in_text() {
        assert_eq!(normalize_numbers("3.14"), "three point fourteen");
        assert_eq!(normalize_numbers("the 3rd time"), "the third time");
    }

    #[test]
    fn test_huge_number_reads_digits() {
        let out = normalize_numbers("123456789012345678901234");
        assert!(out.starts_with("one two three"), "got: {}", out);
    }
}
