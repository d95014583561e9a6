use std::fmt;

use serde::Serialize;

use super::TransactionType;

/// Client-facing correlation id of a transaction.
///
/// A type prefix followed by 128 random bits, hex encoded.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn generate(kind: TransactionType) -> Self {
        let prefix = match kind {
            TransactionType::Deposit => "dep",
            TransactionType::Withdraw => "wdr",
            TransactionType::TransferOut => "buy",
        };
        Self(format!("{prefix}_{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
