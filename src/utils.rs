//! Identifier minting and small text helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const ASSET_HRP: &str = "asset_";
pub const CATEGORY_HRP: &str = "cat_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

pub fn new_asset_id() -> anyhow::Result<String> {
    new_uuid_to_bech32(ASSET_HRP)
}

pub fn new_category_id() -> anyhow::Result<String> {
    new_uuid_to_bech32(CATEGORY_HRP)
}

/// Lowercased, whitespace-collapsed form used for name and model comparisons.
pub fn normalise(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_ids_carry_prefix() {
        let id = new_asset_id().unwrap();
        assert!(id.starts_with("asset_1"));
        assert_ne!(id, new_asset_id().unwrap());
    }

    #[test]
    fn normalise_collapses_case_and_spacing() {
        assert_eq!(normalise("  Portland   CEMENT 40kg "), "portland cement 40kg");
    }
}
