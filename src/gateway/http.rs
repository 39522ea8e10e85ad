use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    config::GatewayConfig,
    gateway::{GatewayCustomer, GatewayError, PaymentGateway, PaymentIntent},
};

const TENANT_HEADER: &str = "X-Tenant-Id";

/// JSON client for the payments service that fronts the payment provider.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct CreateCustomerRequest<'a> {
    email: &'a str,
    name: Option<&'a str>,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build the payment gateway HTTP client")?;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid payment gateway URL {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Payment gateway URL {base_url} cannot carry a path");
        }

        Ok(Self { client, base_url })
    }

    /// Appends `segments` to the base URL, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        if let Some(segment) = segments
            .iter()
            .find(|segment| matches!(segment.trim(), "" | "." | ".."))
        {
            return Err(GatewayError::NotFound((*segment).to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Unreachable(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Unreachable(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(what.to_string())),
            status => Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        response
            .json()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn get_payment_intent(
        &self,
        tenant_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let request = self
            .client
            .get(self.endpoint(&["payment-intents", payment_intent_id])?)
            .header(TENANT_HEADER, tenant_id.to_string());

        let response = self.send(request, payment_intent_id).await?;
        Self::json(response).await
    }

    async fn get_customer_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<GatewayCustomer>, GatewayError> {
        let request = self
            .client
            .get(self.endpoint(&["customers"])?)
            .query(&[("email", email)])
            .header(TENANT_HEADER, tenant_id.to_string());

        let response = self.send(request, email).await?;
        let customers: Vec<GatewayCustomer> = Self::json(response).await?;
        Ok(customers.into_iter().next())
    }

    async fn create_customer(
        &self,
        tenant_id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> Result<GatewayCustomer, GatewayError> {
        let request = self
            .client
            .post(self.endpoint(&["customers"])?)
            .header(TENANT_HEADER, tenant_id.to_string())
            .json(&CreateCustomerRequest { email, name });

        let response = self.send(request, email).await?;
        Self::json(response).await
    }
}
