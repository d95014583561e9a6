use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    model::{AssetId, Balance, Catalog, Reference, TransactionStatus, TransactionType, UserId},
    store::{LedgerStore, StoreError},
};

#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseReceipt {
    pub asset_id: AssetId,
    pub reference: Reference,
    pub balance: Balance,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum PurchaserError {
    #[error("No account found for user {0}")]
    AccountNotFound(UserId),
    #[error("Asset not found: {0}")]
    AssetNotFound(String),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Asset already purchased: {0}")]
    AlreadyPurchased(AssetId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PurchaserError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoAccountForUser(user_id) => Self::AccountNotFound(user_id),
            err => Self::Store(err),
        }
    }
}

#[async_trait]
pub trait Purchaser {
    async fn purchase(
        &self,
        user_id: UserId,
        asset_id: &str,
    ) -> Result<PurchaseReceipt, PurchaserError>;
}

/// Pays for a catalog asset out of the balance. The debit, the
/// `TransferOut` transaction and the purchase record share one unit.
pub struct SimplePurchaser {
    store: Arc<LedgerStore>,
    catalog: Arc<Catalog>,
}

impl SimplePurchaser {
    pub fn new(store: Arc<LedgerStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl Purchaser for SimplePurchaser {
    async fn purchase(
        &self,
        user_id: UserId,
        asset_id: &str,
    ) -> Result<PurchaseReceipt, PurchaserError> {
        let asset = self
            .catalog
            .find(asset_id)
            .ok_or_else(|| PurchaserError::AssetNotFound(asset_id.to_string()))?;

        let mut unit = self.store.begin_for_user(user_id).await?;
        if !unit.try_debit(asset.price)? {
            return Err(PurchaserError::InsufficientBalance);
        }
        let transaction = unit.record(
            asset.price,
            TransactionType::TransferOut,
            Reference::generate(TransactionType::TransferOut),
            TransactionStatus::Success,
        )?;
        match unit.record_purchase(asset, transaction.id) {
            Ok(_) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(PurchaserError::AlreadyPurchased(asset.id.clone()))
            }
            Err(err) => return Err(err.into()),
        }
        let balance = unit.balance()?;
        unit.commit();

        tracing::info!(
            reference = %transaction.reference,
            asset_id = %asset.id,
            price = %asset.price,
            %balance,
            "Asset purchased"
        );
        Ok(PurchaseReceipt {
            asset_id: asset.id.clone(),
            reference: transaction.reference,
            balance,
        })
    }
}
