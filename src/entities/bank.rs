// 🏦 Bank Entity - reference data for the apps we collect reviews for
//
// The bank code ("CBE", "BOA", ...) is the identity and the foreign key
// every review points at. Banks are created once at setup and never change
// during a run.

use crate::config::BankEntry;
use crate::error::{Result, ReviewError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// BANK ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    /// Short unique code, used as `bank_id` in the store
    pub bank_id: String,

    /// Display name ("Commercial Bank of Ethiopia")
    pub name: String,

    /// Store-facing app name; the source system uses the bank code here
    pub app_name: String,

    /// App store identifier ("com.cbe.mobile")
    pub app_id: String,

    /// Full product name ("CBE Mobile Banking")
    pub full_name: String,
}

impl Bank {
    pub fn new(bank_id: &str, name: &str, app_id: &str, full_name: &str) -> Self {
        Bank {
            bank_id: bank_id.to_string(),
            name: name.to_string(),
            app_name: bank_id.to_string(),
            app_id: app_id.to_string(),
            full_name: full_name.to_string(),
        }
    }

    pub fn from_entry(code: &str, entry: &BankEntry) -> Self {
        Bank::new(code, &entry.name, &entry.app_id, &entry.full_name)
    }

    /// Case-insensitive match on code, name or app id
    pub fn matches(&self, bank_string: &str) -> bool {
        let needle = bank_string.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }

        self.bank_id.to_lowercase() == needle
            || self.name.to_lowercase() == needle
            || self.app_id.to_lowercase() == needle
    }
}

// ============================================================================
// BANK REGISTRY
// ============================================================================

/// Static registry of the banks configured for this deployment
#[derive(Debug, Clone, Default)]
pub struct BankRegistry {
    banks: BTreeMap<String, Bank>,
}

impl BankRegistry {
    pub fn new() -> Self {
        BankRegistry::default()
    }

    /// Build from the `[banks]` configuration table
    pub fn from_config(entries: &BTreeMap<String, BankEntry>) -> Self {
        let mut registry = BankRegistry::new();
        for (code, entry) in entries {
            registry.register(Bank::from_entry(code, entry));
        }
        registry
    }

    /// Register or replace a bank by code
    pub fn register(&mut self, bank: Bank) {
        self.banks.insert(bank.bank_id.clone(), bank);
    }

    pub fn get(&self, bank_id: &str) -> Option<&Bank> {
        self.banks.get(bank_id)
    }

    /// Like `get`, but an unknown code is an error
    pub fn require(&self, bank_id: &str) -> Result<&Bank> {
        self.get(bank_id)
            .ok_or_else(|| ReviewError::UnknownBank(bank_id.to_string()))
    }

    /// Find by code, display name or app id
    pub fn find_by_string(&self, bank_string: &str) -> Option<&Bank> {
        self.banks.values().find(|bank| bank.matches(bank_string))
    }

    /// All banks ordered by code
    pub fn all_banks(&self) -> Vec<&Bank> {
        self.banks.values().collect()
    }

    pub fn codes(&self) -> Vec<String> {
        self.banks.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_bank_creation() {
        let bank = Bank::new(
            "CBE",
            "Commercial Bank of Ethiopia",
            "com.cbe.mobile",
            "CBE Mobile Banking",
        );

        assert_eq!(bank.bank_id, "CBE");
        assert_eq!(bank.app_name, "CBE");
        assert_eq!(bank.app_id, "com.cbe.mobile");
    }

    #[test]
    fn test_bank_matches() {
        let bank = Bank::new("BOA", "Bank of Abyssinia", "com.boa.mobile", "BOA Mobile Banking");

        assert!(bank.matches("boa"));
        assert!(bank.matches("Bank of Abyssinia"));
        assert!(bank.matches("com.boa.mobile"));
        assert!(!bank.matches("Dashen"));
        assert!(!bank.matches("   "));
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry = BankRegistry::from_config(&AppConfig::default().banks);

        assert_eq!(registry.count(), 3);
        assert_eq!(registry.codes(), vec!["BOA", "CBE", "DASHEN"]);
        assert_eq!(registry.get("DASHEN").unwrap().name, "Dashen Bank");
        assert_eq!(
            registry.find_by_string("commercial bank of ethiopia").unwrap().bank_id,
            "CBE"
        );
    }

    #[test]
    fn test_registry_require_unknown() {
        let registry = BankRegistry::from_config(&AppConfig::default().banks);

        assert!(registry.require("CBE").is_ok());
        assert!(matches!(
            registry.require("NIB"),
            Err(ReviewError::UnknownBank(code)) if code == "NIB"
        ));
    }

    #[test]
    fn test_register_replaces_same_code() {
        let mut registry = BankRegistry::new();
        registry.register(Bank::new("CBE", "Old", "com.old", "Old App"));
        registry.register(Bank::new("CBE", "New", "com.new", "New App"));

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get("CBE").unwrap().name, "New");
    }
}
