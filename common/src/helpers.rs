use anyhow::anyhow;
use chrono::{Datelike, Utc};
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::distr::Alphanumeric;
use rust_decimal::Decimal;

/// Number of fractional digits every NWT amount is stored with.
pub const NWT_SCALE: u32 = 8;

const MAX_FILE_NAME_LEN: usize = 100;
const KEY_RANDOM_LEN: usize = 8;

/// Largest amount a single purchase or spend may carry (10^9 NWT).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Ceiling for every stored wallet total (10^18 NWT).
pub const MAX_TOTAL: Decimal = Decimal::from_parts(2_808_348_672, 232_830_643, 0, false, 0);

/// Rounds `amount` to [`NWT_SCALE`] places and pads it so the textual form
/// always carries exactly eight fractional digits.
///
/// Padding needs 8 free digits of the 28-digit mantissa, so values above
/// 10^20 keep fewer places. The ledger bounds amounts by [`MAX_AMOUNT`] and
/// totals by [`MAX_TOTAL`], which keeps every stored value in range.
pub fn normalize_amount(amount: Decimal) -> Decimal {
    let mut amount = amount.round_dp(NWT_SCALE);
    amount.rescale(NWT_SCALE);
    amount
}

pub fn format_amount(amount: Decimal) -> String {
    normalize_amount(amount).to_string()
}

pub fn parse_amount(value: &str) -> anyhow::Result<Decimal> {
    let amount: Decimal = value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid decimal amount `{}`: {}", value, e))?;
    Ok(normalize_amount(amount))
}

pub fn validate_wallet_address(address: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> =
        Lazy::new(|| Regex::new(r"^(0x)?[A-Za-z0-9]{20,128}$").ok());
    match &*RE {
        Some(re) => re
            .is_match(address)
            .map_err(|e| anyhow!("Regex error for wallet address: {e}")),
        None => Err(anyhow!(
            "Wallet address regex failed to compile. Rejecting all addresses."
        )),
    }
}

pub fn validate_folder(folder: &str) -> anyhow::Result<bool> {
    static RE: Lazy<Option<Regex>> =
        Lazy::new(|| Regex::new(r"^(?!.*\.\.)[a-z0-9_-]+(/[a-z0-9_-]+)*$").ok());
    match &*RE {
        Some(re) => re
            .is_match(folder)
            .map_err(|e| anyhow!("Regex error for folder: {e}")),
        None => Err(anyhow!("Folder regex failed to compile. Rejecting all folders.")),
    }
}

/// Keeps `[A-Za-z0-9._-]`, replaces everything else with `-` and caps the
/// length while preserving the extension where possible.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '-');
    let cleaned = if cleaned.is_empty() { "file" } else { cleaned };

    if cleaned.len() <= MAX_FILE_NAME_LEN {
        return cleaned.to_string();
    }
    match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot <= 10 => {
            let ext = &cleaned[dot..];
            format!("{}{}", &cleaned[..MAX_FILE_NAME_LEN - ext.len()], ext)
        }
        _ => cleaned[..MAX_FILE_NAME_LEN].to_string(),
    }
}

/// Builds `{folder}/{yyyy}/{mm}/{unix_millis}-{random}-{file name}`.
pub fn generate_storage_key(folder: &str, original_name: &str) -> String {
    let now = Utc::now();
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!(
        "{}/{:04}/{:02}/{}-{}-{}",
        folder.trim_matches('/'),
        now.year(),
        now.month(),
        now.timestamp_millis(),
        random.to_lowercase(),
        sanitize_file_name(original_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_fixed_to_eight_places() {
        assert_eq!(format_amount(Decimal::from(5)), "5.00000000");
        assert_eq!(
            format_amount(parse_amount("0.123456789").unwrap()),
            "0.12345679"
        );
        assert_eq!(parse_amount(" 12.5 ").unwrap().to_string(), "12.50000000");
        assert!(parse_amount("ten").is_err());
    }

    #[test]
    fn limits_keep_eight_places() {
        assert_eq!(MAX_AMOUNT.to_string(), "1000000000");
        assert_eq!(MAX_TOTAL.to_string(), "1000000000000000000");
        assert_eq!(format_amount(MAX_TOTAL), "1000000000000000000.00000000");
    }

    #[test]
    fn wallet_addresses() {
        assert!(validate_wallet_address("0x52908400098527886E0F7030069857D2E4169EE7").unwrap());
        assert!(validate_wallet_address("7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV").unwrap());
        assert!(!validate_wallet_address("short").unwrap());
        assert!(!validate_wallet_address("0x5290 8400").unwrap());
    }

    #[test]
    fn folders_reject_traversal() {
        assert!(validate_folder("uploads").unwrap());
        assert!(validate_folder("comics/covers").unwrap());
        assert!(!validate_folder("../etc").unwrap());
        assert!(!validate_folder("/abs").unwrap());
        assert!(!validate_folder("Upper").unwrap());
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("my cover (1).png"), "my-cover--1-.png");
        assert_eq!(sanitize_file_name("../../secret.txt"), "secret.txt");
        assert_eq!(sanitize_file_name("???"), "file");

        let long = format!("{}.jpeg", "a".repeat(150));
        let sanitized = sanitize_file_name(&long);
        assert_eq!(sanitized.len(), MAX_FILE_NAME_LEN);
        assert!(sanitized.ends_with(".jpeg"));
    }

    #[test]
    fn storage_keys_have_expected_shape() {
        let key = generate_storage_key("comics/covers", "Issue #1.png");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "comics");
        assert_eq!(parts[1], "covers");
        assert_eq!(parts[2].len(), 4);
        assert_eq!(parts[3].len(), 2);
        assert!(parts[4].ends_with("-Issue--1.png"));

        let other = generate_storage_key("comics/covers", "Issue #1.png");
        assert_ne!(key, other);
    }
}
