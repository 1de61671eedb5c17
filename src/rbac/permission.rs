use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::RbacError;

/// Arbitrary-width capability bitmask. Bit `i` set grants capability `i`.
///
/// Binary form is the minimal big-endian encoding (empty for zero). Text
/// form is URL-safe unpadded base64 of the binary form and is what serde uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Permission(BigUint);

impl Permission {
    /// The empty permission.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A permission with exactly one bit set.
    #[must_use]
    pub fn bit(bit: u64) -> Self {
        let mut p = Self::new();
        p.set(bit);
        p
    }

    /// A permission with every listed bit set.
    #[must_use]
    pub fn from_bits(bits: impl IntoIterator<Item = u64>) -> Self {
        let mut p = Self::new();
        for bit in bits {
            p.set(bit);
        }
        p
    }

    pub fn set(&mut self, bit: u64) {
        self.0.set_bit(bit, true);
    }

    pub fn unset(&mut self, bit: u64) {
        self.0.set_bit(bit, false);
    }

    #[must_use]
    pub fn is_set(&self, bit: u64) -> bool {
        self.0.bit(bit)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.bits() == 0
    }

    #[must_use]
    pub fn and(&self, other: &Self) -> Self {
        Self(&self.0 & &other.0)
    }

    #[must_use]
    pub fn or(&self, other: &Self) -> Self {
        Self(&self.0 | &other.0)
    }

    /// Subset test: every bit of `required` is set in `self`.
    #[must_use]
    pub fn has(&self, required: &Self) -> bool {
        (&self.0 & &required.0) == required.0
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.is_empty() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            Self::new()
        } else {
            Self(BigUint::from_bytes_be(bytes))
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_bytes())
    }

    /// # Errors
    ///
    /// Returns [`RbacError::InvalidPermission`] if `text` is not base64url.
    pub fn from_text(text: &str) -> Result<Self, RbacError> {
        URL_SAFE_NO_PAD
            .decode(text)
            .map(|bytes| Self::from_bytes(&bytes))
            .map_err(|e| RbacError::InvalidPermission(e.to_string()))
    }
}

/// Text form of an optional permission. Absence renders as an empty string.
#[must_use]
pub fn marshal_text(permission: Option<&Permission>) -> String {
    permission.map(Permission::to_text).unwrap_or_default()
}

/// Binary form of an optional permission.
///
/// # Errors
///
/// Returns [`RbacError::AbsentPermission`] for `None`.
pub fn marshal_binary(permission: Option<&Permission>) -> Result<Vec<u8>, RbacError> {
    permission
        .map(Permission::to_bytes)
        .ok_or(RbacError::AbsentPermission)
}

impl BitOr for &Permission {
    type Output = Permission;

    fn bitor(self, rhs: Self) -> Permission {
        self.or(rhs)
    }
}

impl BitAnd for &Permission {
    type Output = Permission;

    fn bitand(self, rhs: Self) -> Permission {
        self.and(rhs)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Permission {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

/// Ordered permission list whose effective value is the OR of its members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(Vec<Permission>);

impl Permissions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, permission: Permission) {
        self.0.push(permission);
    }

    #[must_use]
    pub fn flatten(&self) -> Permission {
        self.0.iter().fold(Permission::new(), |acc, p| acc.or(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Permission>> for Permissions {
    fn from(v: Vec<Permission>) -> Self {
        Self(v)
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for Permissions {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Permissions {
    type Item = Permission;
    type IntoIter = std::vec::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Permission> {
        vec![
            Permission::new(),
            Permission::bit(0),
            Permission::from_bits([1, 3, 7]),
            Permission::from_bits([0, 63, 64]),
            Permission::bit(300),
            Permission::from_bits([2, 300, 301]),
        ]
    }

    #[test]
    fn test_set_unset() {
        let mut p = Permission::new();
        p.set(5);
        p.set(300);
        assert!(p.is_set(5) && p.is_set(300));
        assert!(!p.is_set(4));
        p.unset(300);
        assert!(!p.is_set(300));
        assert_eq!(p, Permission::bit(5));
    }

    #[test]
    fn test_or_contains_both_operands() {
        for a in samples() {
            for b in samples() {
                let union = &a | &b;
                assert!(union.has(&a));
                assert!(union.has(&b));
            }
        }
    }

    #[test]
    fn test_and_has_only_when_subset() {
        for a in samples() {
            for b in samples() {
                let meet = &a & &b;
                assert_eq!(meet.has(&a), a == meet);
            }
        }
    }

    #[test]
    fn test_flatten() {
        let [a, b, c] = [
            Permission::bit(1),
            Permission::from_bits([2, 64]),
            Permission::bit(300),
        ];
        let list: Permissions = vec![a.clone(), b.clone(), c.clone(), a.clone()].into();
        assert_eq!(list.flatten(), a.or(&b).or(&c));
        assert_eq!(Permissions::new().flatten(), Permission::new());
    }

    #[test]
    fn test_zero_has_empty_encodings() {
        let zero = Permission::new();
        assert!(zero.to_bytes().is_empty());
        assert_eq!(zero.to_text(), "");
        assert_eq!(Permission::from_text("").unwrap(), zero);
        assert!(Permission::bit(9).has(&zero));
    }

    #[test]
    fn test_text_and_binary_forms_round_trip() {
        for p in samples() {
            assert_eq!(Permission::from_bytes(&p.to_bytes()), p);
            assert_eq!(p.to_text().parse::<Permission>().unwrap(), p);
        }
        assert_eq!(Permission::bit(300).to_bytes().len(), 38);
        assert_eq!(Permission::bit(8).to_bytes(), vec![1, 0]);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let p = Permission::from_bits([0, 300]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, format!("\"{}\"", p.to_text()));
        assert_eq!(serde_json::from_str::<Permission>(&json).unwrap(), p);

        let list: Permissions = vec![Permission::new(), p.clone()].into();
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(serde_json::from_str::<Permissions>(&json).unwrap(), list);
    }

    #[test]
    fn test_invalid_text() {
        assert!(Permission::from_text("!!").is_err());
        assert!(serde_json::from_str::<Permission>("\"**\"").is_err());
        assert!(serde_json::from_str::<Permission>("12").is_err());
    }

    #[test]
    fn test_absent_permission() {
        assert_eq!(marshal_text(None), "");
        assert!(matches!(marshal_binary(None), Err(RbacError::AbsentPermission)));
        assert_eq!(marshal_binary(Some(&Permission::bit(0))).unwrap(), vec![1]);
    }
}
