use csv::WriterBuilder;
use serde::Serialize;
use thiserror::Error;

use super::{Transaction, TransactionStatus, TransactionType};

/// One CSV row of an account statement.
#[derive(Debug, Serialize)]
struct StatementLine<'a> {
    reference: &'a str,
    #[serde(rename = "type")]
    kind: TransactionType,
    status: TransactionStatus,
    amount: String,
    created_at: String,
}

impl<'a> From<&'a Transaction> for StatementLine<'a> {
    fn from(transaction: &'a Transaction) -> Self {
        Self {
            reference: transaction.reference.as_str(),
            kind: transaction.kind,
            status: transaction.status,
            amount: transaction.amount.to_string(),
            created_at: transaction.created_at.to_rfc3339(),
        }
    }
}

pub struct StatementWriter;

#[derive(Debug, Error)]
pub enum StatementWriterError {
    #[error("Failed to serialise the statement: {0}")]
    SerialisationError(String),
}

impl StatementWriter {
    pub fn write(transactions: &[Transaction]) -> Result<Vec<u8>, StatementWriterError> {
        let mut wtr = WriterBuilder::new().from_writer(vec![]);
        for line in transactions.iter().map(StatementLine::from) {
            wtr.serialize(line)
                .map_err(|e| StatementWriterError::SerialisationError(e.to_string()))?;
        }
        wtr.into_inner()
            .map_err(|e| StatementWriterError::SerialisationError(e.to_string()))
    }
}
