use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix reserved for client-generated ids. Store push ids never contain `~`.
const PROVISIONAL_PREFIX: &str = "~tmp-";

/// Opaque record identity.
///
/// Either assigned by the store on creation, or provisional: generated locally
/// for an optimistic insert that the store has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneId(String);

impl PhoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds a provisional id from a per-cache namespace and a sequence number.
    pub fn provisional(namespace: &str, sequence: u64) -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{namespace}-{sequence}"))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PhoneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PhoneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Phone attributes without an identity.
///
/// This is also the JSON body for create and merge requests: only these
/// fields are ever sent to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneDraft {
    pub brand: String,
    pub model: String,
    pub price: f64,
}

impl PhoneDraft {
    pub fn new(brand: impl Into<String>, model: impl Into<String>, price: f64) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            price,
        }
    }

    pub fn with_id(self, id: PhoneId) -> Phone {
        Phone {
            id,
            brand: self.brand,
            model: self.model,
            price: self.price,
        }
    }
}

/// A catalog record.
///
/// Identity is `id` only: two phones with the same id are the same logical
/// record whatever their attributes. Use [`Phone::same_fields`] to compare
/// attributes. Values are never mutated in place; edits produce a new value
/// sharing the id via [`Phone::with_fields`].
#[derive(Debug, Clone)]
pub struct Phone {
    pub id: PhoneId,
    pub brand: String,
    pub model: String,
    pub price: f64,
}

impl Phone {
    pub fn new(
        id: impl Into<PhoneId>,
        brand: impl Into<String>,
        model: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            brand: brand.into(),
            model: model.into(),
            price,
        }
    }

    /// Returns a new phone with the same id and the given attributes.
    pub fn with_fields(&self, draft: PhoneDraft) -> Self {
        draft.with_id(self.id.clone())
    }

    pub fn draft(&self) -> PhoneDraft {
        PhoneDraft {
            brand: self.brand.clone(),
            model: self.model.clone(),
            price: self.price,
        }
    }

    /// True when id and every attribute match.
    pub fn same_fields(&self, other: &Phone) -> bool {
        self.id == other.id
            && self.brand == other.brand
            && self.model == other.model
            && self.price.to_bits() == other.price.to_bits()
    }
}

// Identity is `id` only.

impl PartialEq for Phone {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Phone {}

impl std::hash::Hash for Phone {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn equality_ignores_attributes() {
        let a = Phone::new("1", "Acme", "X", 100.0);
        let b = Phone::new("1", "Other", "Y", 5.0);
        assert_eq!(a, b);
        assert!(!a.same_fields(&b));
    }

    #[test]
    fn hash_set_dedups_by_id() {
        let mut set = HashSet::new();
        set.insert(Phone::new("1", "Acme", "X", 100.0));
        set.insert(Phone::new("1", "Acme", "Y", 120.0));
        set.insert(Phone::new("2", "Acme", "X", 100.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn with_fields_keeps_id() {
        let original = Phone::new("7", "Acme", "X", 100.0);
        let edited = original.with_fields(PhoneDraft::new("Acme", "X2", 150.0));
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.model, "X2");
        assert_eq!(original.model, "X");
    }

    #[test]
    fn provisional_ids_are_recognised() {
        let tmp = PhoneId::provisional("abc", 3);
        assert!(tmp.is_provisional());
        assert_eq!(tmp.as_str(), "~tmp-abc-3");
        assert!(!PhoneId::new("-NxA1b2c3").is_provisional());
    }

    #[test]
    fn draft_serializes_without_id() {
        let json = serde_json::to_value(Phone::new("9", "Acme", "Z", 10.5).draft()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "brand": "Acme", "model": "Z", "price": 10.5 })
        );
    }
}
