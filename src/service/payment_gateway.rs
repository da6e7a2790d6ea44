// service/payment_gateway.rs
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    service::error::ServiceError,
    utils::currency::{centavos_to_pesos, generate_payment_reference},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayCapture {
    pub capture_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub status: String,
}

/// Thin client over the configured payment gateway. Capture rejections are
/// reported as GatewayDeclined so callers can distinguish a declined card
/// from a transport failure; neither causes a local status mutation here.
pub struct PaymentGatewayService {
    mercadopago_access_token: String,
    paypal_client_id: String,
    paypal_secret: String,
    active_provider: String, // "mercadopago" or "paypal"
    client: reqwest::Client,
}

impl PaymentGatewayService {
    pub fn new(config: &Config) -> Self {
        Self {
            mercadopago_access_token: config.mercadopago_access_token.clone(),
            paypal_client_id: config.paypal_client_id.clone(),
            paypal_secret: config.paypal_secret.clone(),
            active_provider: config.active_payment_provider.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        description: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        match self.active_provider.as_str() {
            "mercadopago" => self.mercadopago_create_order(amount, currency, description).await,
            "paypal" => self.paypal_create_order(amount, currency, description).await,
            other => Err(ServiceError::Gateway(format!(
                "Unknown payment provider: {other}"
            ))),
        }
    }

    pub async fn capture_order(&self, order_id: &str) -> Result<GatewayCapture, ServiceError> {
        match self.active_provider.as_str() {
            "mercadopago" => self.mercadopago_capture_order(order_id).await,
            "paypal" => self.paypal_capture_order(order_id).await,
            other => Err(ServiceError::Gateway(format!(
                "Unknown payment provider: {other}"
            ))),
        }
    }

    pub async fn refund(
        &self,
        capture_id: &str,
        amount: Option<i64>,
    ) -> Result<GatewayRefund, ServiceError> {
        match self.active_provider.as_str() {
            "mercadopago" => self.mercadopago_refund(capture_id, amount).await,
            "paypal" => self.paypal_refund(capture_id, amount).await,
            other => Err(ServiceError::Gateway(format!(
                "Unknown payment provider: {other}"
            ))),
        }
    }

    async fn mercadopago_create_order(
        &self,
        amount: i64,
        currency: &str,
        description: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let payload = serde_json::json!({
            "transaction_amount": centavos_to_pesos(amount),
            "currency_id": currency,
            "description": description,
            "external_reference": generate_payment_reference(),
            "capture": false,
        });

        let response = self
            .client
            .post("https://api.mercadopago.com/v1/payments")
            .bearer_auth(&self.mercadopago_access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        match body["id"].as_i64() {
            Some(id) => Ok(GatewayOrder {
                order_id: id.to_string(),
                status: body["status"].as_str().unwrap_or("pending").to_string(),
            }),
            None => Err(ServiceError::Gateway(
                body["message"]
                    .as_str()
                    .unwrap_or("Order creation failed")
                    .to_string(),
            )),
        }
    }

    async fn mercadopago_capture_order(
        &self,
        order_id: &str,
    ) -> Result<GatewayCapture, ServiceError> {
        let response = self
            .client
            .put(format!("https://api.mercadopago.com/v1/payments/{order_id}"))
            .bearer_auth(&self.mercadopago_access_token)
            .json(&serde_json::json!({ "capture": true }))
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        match body["status"].as_str() {
            Some("approved") => Ok(GatewayCapture {
                capture_id: body["id"].as_i64().unwrap_or_default().to_string(),
                status: "approved".to_string(),
            }),
            Some(status) => Err(ServiceError::GatewayDeclined(format!(
                "Capture not approved: {status}"
            ))),
            None => Err(ServiceError::Gateway(
                body["message"]
                    .as_str()
                    .unwrap_or("Capture failed")
                    .to_string(),
            )),
        }
    }

    async fn mercadopago_refund(
        &self,
        capture_id: &str,
        amount: Option<i64>,
    ) -> Result<GatewayRefund, ServiceError> {
        let payload = match amount {
            Some(centavos) => serde_json::json!({ "amount": centavos_to_pesos(centavos) }),
            None => serde_json::json!({}),
        };

        let response = self
            .client
            .post(format!(
                "https://api.mercadopago.com/v1/payments/{capture_id}/refunds"
            ))
            .bearer_auth(&self.mercadopago_access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        match body["id"].as_i64() {
            Some(id) => Ok(GatewayRefund {
                refund_id: id.to_string(),
                status: body["status"].as_str().unwrap_or("approved").to_string(),
            }),
            None => Err(ServiceError::GatewayDeclined(
                body["message"]
                    .as_str()
                    .unwrap_or("Refund rejected")
                    .to_string(),
            )),
        }
    }

    async fn paypal_access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .client
            .post("https://api-m.paypal.com/v1/oauth2/token")
            .basic_auth(&self.paypal_client_id, Some(&self.paypal_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Gateway("PayPal auth failed".to_string()))
    }

    async fn paypal_create_order(
        &self,
        amount: i64,
        currency: &str,
        description: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let token = self.paypal_access_token().await?;
        let payload = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": generate_payment_reference(),
                "amount": {
                    "currency_code": currency,
                    "value": format!("{:.2}", centavos_to_pesos(amount)),
                },
                "description": description,
            }],
        });

        let response = self
            .client
            .post("https://api-m.paypal.com/v2/checkout/orders")
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        match body["id"].as_str() {
            Some(id) => Ok(GatewayOrder {
                order_id: id.to_string(),
                status: body["status"].as_str().unwrap_or("CREATED").to_string(),
            }),
            None => Err(ServiceError::Gateway("Order creation failed".to_string())),
        }
    }

    async fn paypal_capture_order(&self, order_id: &str) -> Result<GatewayCapture, ServiceError> {
        let token = self.paypal_access_token().await?;
        let response = self
            .client
            .post(format!(
                "https://api-m.paypal.com/v2/checkout/orders/{order_id}/capture"
            ))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        if body["status"].as_str() == Some("COMPLETED") {
            let capture_id = body["purchase_units"][0]["payments"]["captures"][0]["id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(GatewayCapture {
                capture_id,
                status: "COMPLETED".to_string(),
            })
        } else {
            Err(ServiceError::GatewayDeclined(
                body["status"]
                    .as_str()
                    .unwrap_or("Capture not completed")
                    .to_string(),
            ))
        }
    }

    async fn paypal_refund(
        &self,
        capture_id: &str,
        amount: Option<i64>,
    ) -> Result<GatewayRefund, ServiceError> {
        let token = self.paypal_access_token().await?;
        let payload = match amount {
            Some(centavos) => serde_json::json!({
                "amount": { "value": format!("{:.2}", centavos_to_pesos(centavos)), "currency_code": "USD" }
            }),
            None => serde_json::json!({}),
        };

        let response = self
            .client
            .post(format!(
                "https://api-m.paypal.com/v2/payments/captures/{capture_id}/refund"
            ))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(e.to_string()))?;

        match body["id"].as_str() {
            Some(id) => Ok(GatewayRefund {
                refund_id: id.to_string(),
                status: body["status"].as_str().unwrap_or("COMPLETED").to_string(),
            }),
            None => Err(ServiceError::GatewayDeclined("Refund rejected".to_string())),
        }
    }
}
