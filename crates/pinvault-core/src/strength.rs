//! Password strength heuristics and generation.
//!
//! None of this is a security boundary. The score, entropy and crack-time
//! figures are display hints for the credential form; the "breached" flag
//! only checks a handful of notorious passwords.

use std::fmt;

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::StrengthError;

/// Highest score [`assess`] returns.
pub const MAX_SCORE: f64 = 5.0;

/// Default length of a generated password.
pub const DEFAULT_GENERATED_LENGTH: usize = 16;

/// Longest password [`generate`] will produce.
pub const MAX_GENERATED_LENGTH: usize = 128;

const BREACHED: [&str; 6] = ["password", "123456", "qwerty", "admin", "welcome", "password123"];

const SEQUENCES: [&str; 13] = [
    "123", "234", "345", "456", "567", "678", "789", "987", "876", "abc", "bcd", "cde", "def",
];

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Coarse strength bucket derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrengthLabel {
    #[serde(rename = "Very Weak")]
    VeryWeak,
    Weak,
    Moderate,
    Strong,
    #[serde(rename = "Very Strong")]
    VeryStrong,
}

impl StrengthLabel {
    fn from_score(score: f64) -> Self {
        if score < 2.0 {
            Self::VeryWeak
        } else if score < 3.0 {
            Self::Weak
        } else if score < 4.0 {
            Self::Moderate
        } else if score < 5.0 {
            Self::Strong
        } else {
            Self::VeryStrong
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryWeak => "Very Weak",
            Self::Weak => "Weak",
            Self::Moderate => "Moderate",
            Self::Strong => "Strong",
            Self::VeryStrong => "Very Strong",
        }
    }
}

impl fmt::Display for StrengthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rough offline cracking estimate, bucketed by entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrackTime {
    SecondsToMinutes,
    HoursToDays,
    MonthsToYears,
    Centuries,
    Millennia,
}

impl fmt::Display for CrackTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SecondsToMinutes => "Seconds to minutes",
            Self::HoursToDays => "Hours to days",
            Self::MonthsToYears => "Months to years",
            Self::Centuries => "Centuries",
            Self::Millennia => "Millennia",
        })
    }
}

/// Everything the strength meter shows for one password.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrengthReport {
    /// `0.0..=5.0`, in half-point steps for short passwords.
    pub score: f64,
    /// `None` for an empty password.
    pub label: Option<StrengthLabel>,
    /// One of the well-known leaked passwords.
    pub breached: bool,
    pub entropy_bits: f64,
    pub crack_time: CrackTime,
    pub common_pattern: bool,
}

/// Which character classes [`generate`] draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharsetOptions {
    pub uppercase: bool,
    pub lowercase: bool,
    pub numbers: bool,
    pub symbols: bool,
}

impl Default for CharsetOptions {
    fn default() -> Self {
        Self {
            uppercase: true,
            lowercase: true,
            numbers: true,
            symbols: true,
        }
    }
}

impl CharsetOptions {
    fn classes(self) -> Vec<&'static [u8]> {
        [
            (self.lowercase, LOWERCASE),
            (self.uppercase, UPPERCASE),
            (self.numbers, DIGITS),
            (self.symbols, SYMBOLS),
        ]
        .into_iter()
        .filter_map(|(on, set)| on.then_some(set))
        .collect()
    }
}

/// Score `password` the way the credential form's meter does.
///
/// Half a point per character up to two, one point each for uppercase,
/// lowercase and digits, two for anything else, capped at [`MAX_SCORE`].
#[must_use]
pub fn assess(password: &str) -> StrengthReport {
    let entropy_bits = entropy_bits(password);
    let crack_time = crack_time_for(entropy_bits);

    if password.is_empty() {
        return StrengthReport {
            score: 0.0,
            label: None,
            breached: false,
            entropy_bits,
            crack_time,
            common_pattern: false,
        };
    }

    let classes = Classes::of(password);
    let length_score = (f64::from(char_count(password)) / 2.0).min(2.0);
    let complexity = [
        (classes.upper, 1.0),
        (classes.lower, 1.0),
        (classes.digit, 1.0),
        (classes.special, 2.0),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, points)| points)
    .sum::<f64>();
    let score = (length_score + complexity).min(MAX_SCORE);

    StrengthReport {
        score,
        label: Some(StrengthLabel::from_score(score)),
        breached: BREACHED.contains(&password.to_lowercase().as_str()),
        entropy_bits,
        crack_time,
        common_pattern: has_common_pattern(password),
    }
}

/// `length * log2(charset)`, where the charset is the sum of the classes
/// present: 26 lowercase, 26 uppercase, 10 digits, 33 other.
#[must_use]
pub fn entropy_bits(password: &str) -> f64 {
    let classes = Classes::of(password);
    let charset: u32 = [
        (classes.lower, 26),
        (classes.upper, 26),
        (classes.digit, 10),
        (classes.special, 33),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, size)| size)
    .sum();

    if charset == 0 {
        return 0.0;
    }
    f64::from(char_count(password)) * f64::from(charset).log2()
}

/// Whether `password` contains a short keyboard run or a character
/// repeated three or more times in a row.
#[must_use]
pub fn has_common_pattern(password: &str) -> bool {
    let lowered = password.to_lowercase();
    if SEQUENCES.iter().any(|seq| lowered.contains(seq)) {
        return true;
    }
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

/// Bucketed time-to-crack estimate for `password`.
#[must_use]
pub fn estimate_crack_time(password: &str) -> CrackTime {
    crack_time_for(entropy_bits(password))
}

fn crack_time_for(bits: f64) -> CrackTime {
    if bits < 40.0 {
        CrackTime::SecondsToMinutes
    } else if bits < 60.0 {
        CrackTime::HoursToDays
    } else if bits < 80.0 {
        CrackTime::MonthsToYears
    } else if bits < 100.0 {
        CrackTime::Centuries
    } else {
        CrackTime::Millennia
    }
}

/// Partially hide `password` for display.
///
/// Up to four characters are fully masked; longer values keep their first
/// and last two characters.
#[must_use]
pub fn mask(password: &str) -> String {
    const BULLET: char = '•';
    let chars: Vec<char> = password.chars().collect();
    if chars.len() <= 4 {
        return BULLET.to_string().repeat(chars.len());
    }
    let hidden = chars.len() - 4;
    chars[..2]
        .iter()
        .copied()
        .chain(std::iter::repeat(BULLET).take(hidden))
        .chain(chars[chars.len() - 2..].iter().copied())
        .collect()
}

/// Generate a random password from the OS CSPRNG.
///
/// Every selected class contributes at least one character; the rest are
/// drawn from the union of the selected classes and the result is shuffled.
///
/// # Errors
///
/// - [`StrengthError::NoCharacterClass`] if every class is off.
/// - [`StrengthError::InvalidLength`] if `length` cannot fit one character
///   per class or exceeds [`MAX_GENERATED_LENGTH`].
pub fn generate(length: usize, options: CharsetOptions) -> Result<String, StrengthError> {
    let classes = options.classes();
    if classes.is_empty() {
        return Err(StrengthError::NoCharacterClass);
    }
    if length < classes.len() || length > MAX_GENERATED_LENGTH {
        return Err(StrengthError::InvalidLength {
            length,
            min: classes.len(),
            max: MAX_GENERATED_LENGTH,
        });
    }

    let pool: Vec<u8> = classes.concat();
    let mut rng = OsRng;
    let mut out: Vec<u8> = Vec::with_capacity(length);

    for class in &classes {
        out.extend(class.choose(&mut rng));
    }
    while out.len() < length {
        out.extend(pool.choose(&mut rng));
    }
    out.shuffle(&mut rng);

    Ok(out.into_iter().map(char::from).collect())
}

fn char_count(password: &str) -> u32 {
    u32::try_from(password.chars().count()).unwrap_or(u32::MAX)
}

#[derive(Debug, Default, Clone, Copy)]
struct Classes {
    upper: bool,
    lower: bool,
    digit: bool,
    special: bool,
}

impl Classes {
    fn of(password: &str) -> Self {
        let mut c = Self::default();
        for ch in password.chars() {
            match ch {
                'A'..='Z' => c.upper = true,
                'a'..='z' => c.lower = true,
                '0'..='9' => c.digit = true,
                _ => c.special = true,
            }
        }
        c
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_has_no_label() {
        let r = assess("");
        assert!(r.score.abs() < f64::EPSILON);
        assert_eq!(r.label, None);
        assert!(!r.breached);
    }

    #[test]
    fn scores_follow_length_and_classes() {
        // 1 char: 0.5 length + 1 lower.
        let r = assess("a");
        assert!((r.score - 1.5).abs() < f64::EPSILON);
        assert_eq!(r.label, Some(StrengthLabel::VeryWeak));

        // 4+ chars: 2 length + 1 lower + 1 digit.
        let r = assess("abcd12");
        assert!((r.score - 4.0).abs() < f64::EPSILON);
        assert_eq!(r.label, Some(StrengthLabel::Strong));

        let r = assess("Tr0ub4dor&3");
        assert!((r.score - MAX_SCORE).abs() < f64::EPSILON);
        assert_eq!(r.label, Some(StrengthLabel::VeryStrong));

        // 2 length + 1 lower.
        assert_eq!(assess("abcdefgh").label, Some(StrengthLabel::Moderate));
        // 1 length + 1 digit.
        assert_eq!(assess("12").label, Some(StrengthLabel::Weak));
    }

    #[test]
    fn breached_check_ignores_case() {
        assert!(assess("PassWord").breached);
        assert!(assess("password123").breached);
        assert!(!assess("password1234").breached);
    }

    #[test]
    fn entropy_uses_class_sizes() {
        assert!(entropy_bits("").abs() < f64::EPSILON);
        let expected = 8.0 * 26f64.log2();
        assert!((entropy_bits("abcdefgh") - expected).abs() < 1e-9);
        let expected = 4.0 * 95f64.log2();
        assert!((entropy_bits("aB3!") - expected).abs() < 1e-9);
    }

    #[test]
    fn common_patterns() {
        assert!(has_common_pattern("xx123yy"));
        assert!(has_common_pattern("zyxDEFw"));
        assert!(has_common_pattern("a!!!b"));
        assert!(has_common_pattern("98765"));
        assert!(!has_common_pattern("Tr0ub4dor&3"));
        assert!(!has_common_pattern("aa"));
    }

    #[test]
    fn crack_time_buckets() {
        assert_eq!(estimate_crack_time("abc"), CrackTime::SecondsToMinutes);
        // 10 * log2(62) ~ 59.5
        assert_eq!(estimate_crack_time("aB3aB3aB3a"), CrackTime::HoursToDays);
        // 20 * log2(95) ~ 131
        assert_eq!(
            estimate_crack_time("aB3!aB3!aB3!aB3!aB3!"),
            CrackTime::Millennia
        );
        assert_eq!(CrackTime::Centuries.to_string(), "Centuries");
    }

    #[test]
    fn mask_keeps_edges() {
        assert_eq!(mask(""), "");
        assert_eq!(mask("abcd"), "••••");
        assert_eq!(mask("abcde"), "ab•de");
        assert_eq!(mask("hunter22"), "hu••••22");
    }

    #[test]
    fn generate_respects_length_and_classes() {
        for _ in 0..50 {
            let pw = generate(DEFAULT_GENERATED_LENGTH, CharsetOptions::default()).unwrap();
            assert_eq!(pw.len(), DEFAULT_GENERATED_LENGTH);
            let c = Classes::of(&pw);
            assert!(c.upper && c.lower && c.digit && c.special, "{pw}");
        }

        let digits_only = CharsetOptions {
            uppercase: false,
            lowercase: false,
            numbers: true,
            symbols: false,
        };
        let pw = generate(6, digits_only).unwrap();
        assert!(pw.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn generate_short_length_still_covers_every_class() {
        for _ in 0..50 {
            let pw = generate(4, CharsetOptions::default()).unwrap();
            let c = Classes::of(&pw);
            assert!(c.upper && c.lower && c.digit && c.special, "{pw}");
        }
    }

    #[test]
    fn generate_rejects_bad_input() {
        let none = CharsetOptions {
            uppercase: false,
            lowercase: false,
            numbers: false,
            symbols: false,
        };
        assert!(matches!(
            generate(16, none),
            Err(StrengthError::NoCharacterClass)
        ));
        assert!(matches!(
            generate(3, CharsetOptions::default()),
            Err(StrengthError::InvalidLength { min: 4, .. })
        ));
        assert!(matches!(
            generate(MAX_GENERATED_LENGTH + 1, CharsetOptions::default()),
            Err(StrengthError::InvalidLength { .. })
        ));
    }
}
