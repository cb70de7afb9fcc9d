//! Numbering styles for `indexing` blocks.

use std::fmt;

/// How `index` markers inside an `indexing` block are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStyle {
    /// `1`, `2`, ...
    Plain,
    /// `01`, `001`: zero-padded to the pattern width.
    Padded(usize),
    /// `1.`, `2.`, ...
    Dotted,
    RomanUpper,
    RomanLower,
    /// No visible label.
    Blank,
    /// Every label is a literal `?`.
    Unknown,
}

impl IndexStyle {
    pub fn parse(pattern: &str) -> Option<IndexStyle> {
        match pattern {
            "1" => Some(IndexStyle::Plain),
            "1." => Some(IndexStyle::Dotted),
            "I" => Some(IndexStyle::RomanUpper),
            "i" => Some(IndexStyle::RomanLower),
            "" => Some(IndexStyle::Blank),
            "?" => Some(IndexStyle::Unknown),
            p if p.len() >= 2 && p.ends_with('1') && p[..p.len() - 1].bytes().all(|b| b == b'0') => {
                Some(IndexStyle::Padded(p.len()))
            }
            _ => None,
        }
    }

    /// Label for the `n`-th index.
    pub fn format(self, n: i64) -> String {
        match self {
            IndexStyle::Plain => n.to_string(),
            IndexStyle::Padded(width) => {
                if n < 0 {
                    format!("-{:0width$}", n.unsigned_abs(), width = width.saturating_sub(1))
                } else {
                    format!("{n:0width$}")
                }
            }
            IndexStyle::Dotted => format!("{n}."),
            IndexStyle::RomanUpper => roman(n),
            IndexStyle::RomanLower => roman(n).to_lowercase(),
            IndexStyle::Blank => String::new(),
            IndexStyle::Unknown => "?".to_string(),
        }
    }
}

impl fmt::Display for IndexStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStyle::Plain => f.write_str("1"),
            IndexStyle::Padded(width) => write!(f, "{}1", "0".repeat(width.saturating_sub(1))),
            IndexStyle::Dotted => f.write_str("1."),
            IndexStyle::RomanUpper => f.write_str("I"),
            IndexStyle::RomanLower => f.write_str("i"),
            IndexStyle::Blank => Ok(()),
            IndexStyle::Unknown => f.write_str("?"),
        }
    }
}

/// Roman numeral; falls back to decimal outside 1..=3999.
fn roman(n: i64) -> String {
    if !(1..=3999).contains(&n) {
        return n.to_string();
    }
    const TABLE: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut rest = n;
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while rest >= value {
            out.push_str(symbol);
            rest -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_style() {
        assert_eq!(IndexStyle::parse("1"), Some(IndexStyle::Plain));
        assert_eq!(IndexStyle::parse("01"), Some(IndexStyle::Padded(2)));
        assert_eq!(IndexStyle::parse("001"), Some(IndexStyle::Padded(3)));
        assert_eq!(IndexStyle::parse("1."), Some(IndexStyle::Dotted));
        assert_eq!(IndexStyle::parse("I"), Some(IndexStyle::RomanUpper));
        assert_eq!(IndexStyle::parse("i"), Some(IndexStyle::RomanLower));
        assert_eq!(IndexStyle::parse(""), Some(IndexStyle::Blank));
        assert_eq!(IndexStyle::parse("?"), Some(IndexStyle::Unknown));
        assert_eq!(IndexStyle::parse("a"), None);
        assert_eq!(IndexStyle::parse("02"), None);
    }

    #[test]
    fn formats_labels() {
        assert_eq!(IndexStyle::Padded(3).format(7), "007");
        assert_eq!(IndexStyle::Dotted.format(2), "2.");
        assert_eq!(IndexStyle::RomanUpper.format(1994), "MCMXCIV");
        assert_eq!(IndexStyle::RomanLower.format(4), "iv");
        assert_eq!(IndexStyle::RomanUpper.format(0), "0");
        assert_eq!(IndexStyle::Blank.format(5), "");
        assert_eq!(IndexStyle::Unknown.format(5), "?");
    }

    #[test]
    fn display_round_trips_pattern() {
        for pattern in ["1", "01", "0001", "1.", "I", "i", "", "?"] {
            let style = IndexStyle::parse(pattern).unwrap();
            assert_eq!(style.to_string(), pattern);
        }
    }
}
