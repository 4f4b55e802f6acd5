//! Procurement policy and secrets.
//!
//! Sources, later ones winning: built-in defaults, an optional file, then
//! `GALLEY_*` environment variables with `__` between nested keys
//! (e.g. `GALLEY_SUPPLIER_LINK__SECRET`).

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use galley_suppliers::PaymentTerms;

#[derive(Clone, Deserialize)]
pub struct SupplierLinkSettings {
    /// HMAC key for supplier confirm/reject links.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

impl core::fmt::Debug for SupplierLinkSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupplierLinkSettings")
            .field("secret", &"<redacted>")
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}

impl Default for SupplierLinkSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> i64 {
    72
}

fn default_shortage_tax_rate() -> Decimal {
    Decimal::new(10, 2)
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcurementSettings {
    /// Let sales and waste take stock below zero instead of failing.
    #[serde(default)]
    pub allow_negative_stock: bool,
    /// Accept cumulative received quantities above the ordered quantity.
    #[serde(default)]
    pub allow_over_delivery: bool,
    /// Tax rate applied to purchase orders drafted from shortages.
    #[serde(default = "default_shortage_tax_rate")]
    pub shortage_tax_rate: Decimal,
    /// Terms for bills of orders without a linked supplier.
    #[serde(default)]
    pub default_payment_terms: PaymentTerms,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub supplier_link: SupplierLinkSettings,
}

impl Default for ProcurementSettings {
    fn default() -> Self {
        Self {
            allow_negative_stock: false,
            allow_over_delivery: false,
            shortage_tax_rate: default_shortage_tax_rate(),
            default_payment_terms: PaymentTerms::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
            supplier_link: SupplierLinkSettings::default(),
        }
    }
}

impl ProcurementSettings {
    /// Load from defaults, an optional file and the environment.
    ///
    /// `file` may be any format the `config` crate recognises by extension.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        match file {
            Some(path) => builder = builder.add_source(config::File::from(path).required(true)),
            None => builder = builder.add_source(config::File::with_name("galley").required(false)),
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("GALLEY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.shortage_tax_rate < Decimal::ZERO || self.shortage_tax_rate > Decimal::ONE {
            return Err(config::ConfigError::Message(
                "shortage_tax_rate must be between 0 and 1".to_string(),
            ));
        }
        if self.supplier_link.ttl_hours <= 0 {
            return Err(config::ConfigError::Message(
                "supplier_link.ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn defaults_match_policy() {
        let s = ProcurementSettings::default();
        assert!(!s.allow_negative_stock);
        assert!(!s.allow_over_delivery);
        assert_eq!(s.shortage_tax_rate, dec!(0.10));
        assert_eq!(s.default_payment_terms, PaymentTerms::Net30);
        assert_eq!(s.supplier_link.ttl_hours, 72);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("galley-{}.toml", uuid::Uuid::now_v7()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "allow_over_delivery = true\nshortage_tax_rate = \"0.12\"\ndefault_payment_terms = \"NET_15\"\n\n[supplier_link]\nsecret = \"abc\"\nttl_hours = 24"
        )
        .unwrap();
        drop(f);

        let s = ProcurementSettings::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(s.allow_over_delivery);
        assert!(!s.allow_negative_stock);
        assert_eq!(s.shortage_tax_rate, dec!(0.12));
        assert_eq!(s.default_payment_terms, PaymentTerms::Net15);
        assert_eq!(s.supplier_link.secret, "abc");
        assert_eq!(s.supplier_link.ttl_hours, 24);
        assert!(!format!("{s:?}").contains("abc"));
    }

    #[test]
    fn out_of_range_tax_rate_is_rejected() {
        let path = std::env::temp_dir().join(format!("galley-{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "shortage_tax_rate = \"1.5\"\n").unwrap();
        let result = ProcurementSettings::load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }
}
