use serde::{Deserialize, Serialize};
use std::fmt;

/// Whole-coin balance unit. The platform never fractionalizes coins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coins(u64);

impl Coins {
    pub const ZERO: Self = Self(0);

    pub fn new(coins: u64) -> Self {
        Self(coins)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Coin", self.0)
    }
}

/// Identifier of a sponsored task, as configured in the task catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a shortlink network (provider). The set of valid networks
/// is closed at configuration-load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coins_arithmetic() {
        let a = Coins::new(100);
        let b = Coins::new(30);

        assert_eq!(a.checked_add(b), Some(Coins::new(130)));
        assert_eq!(a.checked_sub(b), Some(Coins::new(70)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), Coins::ZERO);
        assert_eq!(Coins::new(u64::MAX).checked_add(Coins::new(1)), None);
    }

    #[test]
    fn coins_display() {
        assert_eq!(Coins::new(1500).to_string(), "1500 Coin");
    }

    #[test]
    fn task_id_as_map_key_serializes_flat() {
        let mut map = std::collections::HashMap::new();
        map.insert(TaskId::from("traffictot"), 3u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"traffictot":3}"#);
    }
}
