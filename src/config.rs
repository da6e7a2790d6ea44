// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    // Payment gateway configuration
    pub mercadopago_access_token: String,
    pub paypal_client_id: String,
    pub paypal_secret: String,
    pub active_payment_provider: String,
    pub gateway_webhook_secret: String,
    // Scheduler tunables
    pub auto_confirm_grace_hours: i64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let mercadopago_access_token = std::env::var("MERCADOPAGO_ACCESS_TOKEN")
            .unwrap_or_else(|_| "test_access_token".to_string());
        let paypal_client_id = std::env::var("PAYPAL_CLIENT_ID")
            .unwrap_or_else(|_| "test_client_id".to_string());
        let paypal_secret = std::env::var("PAYPAL_SECRET")
            .unwrap_or_else(|_| "test_secret".to_string());
        let active_payment_provider = std::env::var("ACTIVE_PAYMENT_PROVIDER")
            .unwrap_or_else(|_| "mercadopago".to_string());
        let gateway_webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET")
            .unwrap_or_else(|_| "test_webhook_secret".to_string());

        let auto_confirm_grace_hours = std::env::var("AUTO_CONFIRM_GRACE_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2);

        Config {
            database_url,
            port: 8000,
            mercadopago_access_token,
            paypal_client_id,
            paypal_secret,
            active_payment_provider,
            gateway_webhook_secret,
            auto_confirm_grace_hours,
        }
    }
}
