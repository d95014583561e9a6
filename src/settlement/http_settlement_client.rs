use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::model::{Amount, BankToken, Reference, UserId};

use super::{SettlementClient, SettlementError};

/// [`SettlementClient`] speaking JSON over HTTP to the bank simulator.
pub struct HttpSettlementClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    #[serde(rename = "ref")]
    reference: &'a str,
    amount: String,
    #[serde(rename = "returnUrl")]
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    bank_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct WithdrawRequest<'a> {
    #[serde(rename = "ref")]
    reference: &'a str,
    #[serde(rename = "userId")]
    user_id: UserId,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawResponse {
    #[serde(default)]
    accepted: bool,
}

impl HttpSettlementClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SettlementError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, SettlementError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SettlementError::UnexpectedStatus(status.as_u16()));
        }
        response.json::<R>().await.map_err(classify)
    }
}

#[async_trait]
impl SettlementClient for HttpSettlementClient {
    async fn create_deposit_order(
        &self,
        reference: &Reference,
        amount: Amount,
        return_url: &str,
    ) -> Result<BankToken, SettlementError> {
        let request = CreateOrderRequest {
            reference: reference.as_str(),
            amount: amount.to_string(),
            return_url,
        };
        let response: CreateOrderResponse = self.post("/api/bank/create-order", &request).await?;
        match response.bank_token {
            Some(token) if !token.is_empty() => {
                tracing::debug!(%reference, bank_token = %token, "Deposit order created");
                Ok(token)
            }
            _ => Err(SettlementError::MissingToken),
        }
    }

    async fn request_withdrawal(
        &self,
        reference: &Reference,
        user_id: UserId,
        amount: Amount,
    ) -> Result<bool, SettlementError> {
        let request = WithdrawRequest {
            reference: reference.as_str(),
            user_id,
            amount: amount.to_string(),
        };
        let response: WithdrawResponse = self.post("/api/bank/withdraw", &request).await?;
        tracing::debug!(%reference, accepted = response.accepted, "Withdrawal answered");
        Ok(response.accepted)
    }
}

fn classify(err: reqwest::Error) -> SettlementError {
    if err.is_timeout() {
        SettlementError::Timeout
    } else if err.is_decode() {
        SettlementError::InvalidResponse(err.to_string())
    } else {
        SettlementError::Unreachable(err.to_string())
    }
}
