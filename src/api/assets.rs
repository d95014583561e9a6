use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::{balance_string, Amount, Asset, AssetId, Balance, Reference},
    orchestrator::PurchaseReceipt,
    store::StoreError,
};

use super::{auth::AuthenticatedUser, ApiError, AppState};

#[derive(Debug, Serialize)]
pub(super) struct CatalogResponse<'a> {
    assets: &'a [Asset],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BuyRequest {
    #[serde(default)]
    asset_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BuyResponse {
    ok: bool,
    asset_id: AssetId,
    #[serde(serialize_with = "balance_string::serialize")]
    balance: Balance,
    reference: Reference,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct OwnedAsset {
    asset_id: AssetId,
    asset_name: String,
    price: Amount,
    created_at: DateTime<Utc>,
    transaction_ref: Reference,
}

#[derive(Debug, Serialize)]
pub(super) struct OwnedAssetsResponse {
    purchases: Vec<OwnedAsset>,
}

pub(super) async fn catalog(State(state): State<AppState>) -> Response {
    Json(CatalogResponse {
        assets: state.catalog.assets(),
    })
    .into_response()
}

pub(super) async fn owned(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<OwnedAssetsResponse>, ApiError> {
    let purchases = state
        .store
        .purchases_of(user_id)
        .into_iter()
        .map(|purchase| {
            let transaction = state
                .store
                .transaction(purchase.transaction_id)
                .ok_or(StoreError::UnknownTransaction(purchase.transaction_id))?;
            Ok(OwnedAsset {
                asset_id: purchase.asset_id,
                asset_name: purchase.asset_name,
                price: purchase.price,
                created_at: purchase.created_at,
                transaction_ref: transaction.reference,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(Json(OwnedAssetsResponse { purchases }))
}

pub(super) async fn buy(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<BuyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let asset_id = request
        .asset_id
        .filter(|asset_id| !asset_id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("assetId is required"))?;
    let PurchaseReceipt {
        asset_id,
        reference,
        balance,
    } = state.orchestrator.purchase(user_id, &asset_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(BuyResponse {
            ok: true,
            asset_id,
            balance,
            reference,
        }),
    ))
}
