//! Password policy enforcement and strength scoring.

use rand::seq::SliceRandom;
use rand::Rng;

use orchard_core::config::PolicyConfig;

/// Passwords too common to accept regardless of their composition.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "123456789", "12345678", "12345", "1234567", "1234567890",
    "password123", "admin", "letmein", "welcome", "monkey", "1234", "dragon", "master",
    "qwerty", "abc123", "111111", "iloveyou", "sunshine", "password1", "trustno1",
    "superman", "princess", "football",
];

/// Ascending runs rejected by the pattern check.
const SEQUENCES: &[&str] = &[
    "012", "123", "234", "345", "456", "567", "678", "789", "890",
    "abc", "bcd", "cde", "def",
];

/// Character pools for the password generator; ambiguous glyphs excluded.
const GEN_UPPER: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ";
const GEN_LOWER: &str = "abcdefghjkmnpqrstuvwxyz";
const GEN_DIGITS: &str = "23456789";

/// Result of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub ok: bool,
    /// Human-readable reason; actionable on rejection
    pub reason: String,
}

impl PolicyVerdict {
    fn reject(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }

    fn accept() -> Self {
        Self {
            ok: true,
            reason: "Password meets all requirements".to_string(),
        }
    }
}

/// Configured password policy.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    config: PolicyConfig,
}

impl PasswordPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Validate a candidate password.
    ///
    /// `personal` carries context the password must not contain (username,
    /// family names, and the like). Checks run cheapest-first and the first
    /// failure becomes the verdict.
    pub fn validate(&self, password: &str, personal: &[&str]) -> PolicyVerdict {
        let config = &self.config;
        let length = password.chars().count();

        if length < config.min_length {
            return PolicyVerdict::reject(format!(
                "Password must be at least {} characters",
                config.min_length
            ));
        }
        if length > config.max_length {
            return PolicyVerdict::reject(format!(
                "Password must be at most {} characters",
                config.max_length
            ));
        }

        let uppercase = password.chars().filter(|c| c.is_ascii_uppercase()).count();
        let lowercase = password.chars().filter(|c| c.is_ascii_lowercase()).count();
        let digits = password.chars().filter(|c| c.is_ascii_digit()).count();
        let special = password
            .chars()
            .filter(|c| config.special_chars.contains(*c))
            .count();

        if uppercase < config.min_uppercase {
            return PolicyVerdict::reject(format!(
                "Password must contain at least {} uppercase letter(s)",
                config.min_uppercase
            ));
        }
        if lowercase < config.min_lowercase {
            return PolicyVerdict::reject(format!(
                "Password must contain at least {} lowercase letter(s)",
                config.min_lowercase
            ));
        }
        if digits < config.min_digits {
            return PolicyVerdict::reject(format!(
                "Password must contain at least {} number(s)",
                config.min_digits
            ));
        }
        if special < config.min_special {
            return PolicyVerdict::reject(format!(
                "Password must contain at least {} special character(s)",
                config.min_special
            ));
        }

        let lowered = password.to_lowercase();
        if config.reject_common && COMMON_PASSWORDS.contains(&lowered.as_str()) {
            return PolicyVerdict::reject(
                "Password is too common. Please choose a more unique password",
            );
        }

        if config.reject_personal_info {
            for term in personal {
                let term = term.trim();
                if term.len() >= 3 && lowered.contains(&term.to_lowercase()) {
                    return PolicyVerdict::reject("Password cannot contain personal information");
                }
            }
        }

        let score = strength_score(password);
        if score < config.min_strength_score {
            return PolicyVerdict::reject(format!(
                "Password is not complex enough (score: {score}/{})",
                config.min_strength_score
            ));
        }

        PolicyVerdict::accept()
    }

    /// Generate a random password satisfying this policy.
    ///
    /// Ambiguous characters (0/O, 1/l/I) are excluded so the result can be
    /// read back from paper.
    pub fn generate(&self, length: usize) -> String {
        let length = length.max(self.config.min_length).max(4);
        let mut special: Vec<char> = self.config.special_chars.chars().collect();
        if special.is_empty() {
            special.push('!');
        }
        let mut rng = rand::thread_rng();

        let mut chars: Vec<char> = vec![
            random_from(GEN_UPPER, &mut rng),
            random_from(GEN_LOWER, &mut rng),
            random_from(GEN_DIGITS, &mut rng),
            special[rng.gen_range(0..special.len())],
        ];

        let pool: Vec<char> = GEN_UPPER
            .chars()
            .chain(GEN_LOWER.chars())
            .chain(GEN_DIGITS.chars())
            .chain(special.iter().copied())
            .collect();
        for _ in 4..length {
            chars.push(pool[rng.gen_range(0..pool.len())]);
        }
        chars.shuffle(&mut rng);
        chars.into_iter().collect()
    }
}

fn random_from(pool: &str, rng: &mut impl Rng) -> char {
    let chars: Vec<char> = pool.chars().collect();
    chars[rng.gen_range(0..chars.len())]
}

/// Composite strength score, 0–100.
///
/// Weighted from length (30), character-class diversity (30), absence of
/// short repeating runs and ascending sequences (20), and the
/// character-uniqueness ratio (20).
pub fn strength_score(password: &str) -> u8 {
    let chars: Vec<char> = password.chars().collect();
    let length = chars.len();
    let mut score = 0.0f64;

    score += match length {
        l if l >= 20 => 30.0,
        l if l >= 16 => 25.0,
        l if l >= 12 => 20.0,
        l if l >= 8 => 10.0,
        _ => 5.0,
    };

    let has_upper = chars.iter().any(|c| c.is_ascii_uppercase());
    let has_lower = chars.iter().any(|c| c.is_ascii_lowercase());
    let has_digit = chars.iter().any(|c| c.is_ascii_digit());
    let has_special = chars.iter().any(|c| !c.is_ascii_alphanumeric());
    let diversity = [has_upper, has_lower, has_digit, has_special]
        .iter()
        .filter(|&&b| b)
        .count();
    score += diversity as f64 * 7.5;

    let has_repeat_run = chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2]);
    if !has_repeat_run {
        score += 10.0;
    }
    let lowered = password.to_lowercase();
    if !SEQUENCES.iter().any(|seq| lowered.contains(seq)) {
        score += 10.0;
    }

    let unique = {
        let mut seen: Vec<char> = Vec::with_capacity(length);
        for c in &chars {
            if !seen.contains(c) {
                seen.push(*c);
            }
        }
        seen.len()
    };
    score += if length == 0 {
        0.0
    } else if unique as f64 >= length as f64 * 0.8 {
        20.0
    } else if unique as f64 >= length as f64 * 0.6 {
        15.0
    } else if unique as f64 >= length as f64 * 0.4 {
        10.0
    } else {
        5.0
    };

    (score.min(100.0)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PasswordPolicy {
        PasswordPolicy::new(PolicyConfig::default())
    }

    #[test]
    fn test_accepts_compliant_password() {
        let verdict = policy().validate("Mint-Orchard!9Harvest", &[]);
        assert!(verdict.ok, "rejected: {}", verdict.reason);
    }

    #[test]
    fn test_rejects_short_password() {
        let verdict = policy().validate("Ab1!", &[]);
        assert!(!verdict.ok);
        assert!(verdict.reason.contains("at least 12"));
    }

    #[test]
    fn test_rejects_missing_character_classes() {
        let no_upper = policy().validate("mint-orchard!9harvest", &[]);
        assert!(!no_upper.ok);
        assert!(no_upper.reason.contains("uppercase"));

        let no_special = policy().validate("MintOrchard9Harvest", &[]);
        assert!(!no_special.ok);
        assert!(no_special.reason.contains("special"));
    }

    #[test]
    fn test_rejects_common_password() {
        // Relax the structural rules so the common-password check is what fires
        let config = PolicyConfig {
            min_length: 6,
            min_uppercase: 0,
            min_special: 0,
            min_strength_score: 0,
            ..Default::default()
        };
        let verdict = PasswordPolicy::new(config).validate("password123", &[]);
        assert!(!verdict.ok);
        assert!(verdict.reason.contains("common"));
    }

    #[test]
    fn test_rejects_personal_information() {
        let verdict = policy().validate("Maria!Orchard-2031x", &["maria"]);
        assert!(!verdict.ok);
        assert!(verdict.reason.contains("personal"));

        // Short context terms are ignored to avoid false positives
        let verdict = policy().validate("Maria!Orchard-2031x", &["ia"]);
        assert!(verdict.ok);
    }

    #[test]
    fn test_strength_score_ranges() {
        assert!(strength_score("abc") < 50);
        assert!(strength_score("aaaaaaaaaaaaaaaa") < 70);
        assert!(strength_score("Tk8!mQ2#vX9$wL5%") >= 90);
    }

    #[test]
    fn test_score_penalizes_repeats_and_sequences() {
        let clean = strength_score("Tk8!mQ2#vX9$wL5%");
        let with_repeat = strength_score("Tk8!mQ2#vX9$wLLL");
        let with_sequence = strength_score("Tk8!mQ2#vX9$w123");
        assert!(with_repeat < clean);
        assert!(with_sequence < clean);
    }

    #[test]
    fn test_generated_passwords_satisfy_policy() {
        let policy = policy();
        for _ in 0..16 {
            let password = policy.generate(16);
            assert_eq!(password.chars().count(), 16);
            let verdict = policy.validate(&password, &[]);
            assert!(verdict.ok, "generated password rejected: {}", verdict.reason);
        }
    }

    #[test]
    fn test_generated_passwords_differ() {
        let policy = policy();
        assert_ne!(policy.generate(16), policy.generate(16));
    }
}
