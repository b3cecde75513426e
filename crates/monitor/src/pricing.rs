//! HTTP price lookup against a Jupiter-style price endpoint
//! (`GET {base}?ids={mint}` returning `{"data": {"<mint>": {"price": ...}}}`).

use async_trait::async_trait;
use serde_json::Value;
use wallet_ledger_domain::services::{PriceSource, PricingError, RequestScheduler};

pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
    scheduler: RequestScheduler,
}

impl HttpPriceSource {
    pub fn new(base_url: impl Into<String>, scheduler: RequestScheduler) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            scheduler,
        }
    }
}

/// Reads the price of `asset_id` out of a price response body. Prices may be
/// encoded as numbers or decimal strings.
pub fn parse_price(body: &Value, asset_id: &str) -> Result<Option<f64>, PricingError> {
    let Some(data) = body.get("data") else {
        return Err(PricingError::Malformed("missing `data` object".to_string()));
    };
    let Some(price) = data.get(asset_id).and_then(|entry| entry.get("price")) else {
        return Ok(None);
    };
    match price {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        Value::String(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|err| PricingError::Malformed(format!("price `{text}`: {err}"))),
        other => Err(PricingError::Malformed(format!("unexpected price {other}"))),
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_price(&self, asset_id: &str) -> Result<Option<f64>, PricingError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("ids", asset_id)]);
        let body = self
            .scheduler
            .enqueue(move || async move {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await
            })
            .await
            .map_err(|err| PricingError::Request(err.to_string()))?
            .map_err(|err| PricingError::Request(err.to_string()))?;

        parse_price(&body, asset_id)
    }
}
