use std::time::Duration;

use anyhow::{Context as _, anyhow, bail};
use http::{HeaderValue, header::AUTHORIZATION};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::time::timeout;
use tracing::{debug, instrument};
use url::Url;

use super::{Ledger, License, Listing, PurchaseReceipt, TokenAmount, Work};

pub(crate) const LEDGER_TX_TIMEOUT: Duration = Duration::from_secs(20);

/// Ledger client speaking JSON to the marketplace gateway.
#[derive(Debug, Clone)]
pub(crate) struct HttpLedger {
    client: reqwest::Client,
    endpoint: Url,
    api_key_header_value: Option<HeaderValue>,
}

#[derive(Debug, Serialize)]
struct SenderRequest<'a> {
    from: &'a str,
}

#[derive(Debug, Serialize)]
struct ListingRequest<'a> {
    from: &'a str,
    #[serde(flatten)]
    listing: &'a Listing,
}

#[derive(Debug, Serialize)]
struct ApproveRequest<'a> {
    from: &'a str,
    amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: TokenAmount,
}

impl HttpLedger {
    pub(crate) fn new(endpoint: Url, api_key: Option<&str>) -> anyhow::Result<Self> {
        let api_key_header_value = api_key
            .map(|key| {
                let mut value = HeaderValue::from_str(key)
                    .context("Ledger API key is not a valid header value")?;
                value.set_sensitive(true);
                anyhow::Ok(value)
            })
            .transpose()?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key_header_value,
        })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(path);
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> anyhow::Result<(Url, reqwest::Response)> {
        let request = match &self.api_key_header_value {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        };

        let request = request.build().context("Failed to build ledger request")?;
        let url = request.url().clone();
        debug!(method = %request.method(), %url, "Sending request to ledger gateway");

        let response = match timeout(LEDGER_TX_TIMEOUT, self.client.execute(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                return Err(anyhow!(err).context(format!("Failed to reach ledger gateway at {url}")));
            }
            Err(_) => {
                bail!("Ledger request to {url} timed out ({LEDGER_TX_TIMEOUT:?})");
            }
        };

        let status = response.status();

        if !status.is_success() {
            match timeout(Duration::from_secs(5), response.text()).await {
                Ok(Ok(text)) => bail!("Ledger gateway at {url} rejected request: {status}: {text}"),
                Ok(Err(err)) => bail!(
                    "Ledger gateway at {url} rejected request: {status} <Error while receiving response body>: {err:#?}"
                ),
                Err(_) => bail!(
                    "Ledger gateway at {url} rejected request: {status} <Timed out while receiving response body>"
                ),
            }
        }

        Ok((url, response))
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> anyhow::Result<T> {
        let (url, response) = self.send(request).await?;

        match timeout(LEDGER_TX_TIMEOUT, response.json::<T>()).await {
            Ok(result) => {
                result.with_context(|| format!("Invalid response from ledger gateway at {url}"))
            }
            Err(_) => bail!("Reading response from {url} timed out ({LEDGER_TX_TIMEOUT:?})"),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        self.read_json(self.client.get(self.url(path))).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> anyhow::Result<T> {
        self.read_json(self.client.post(self.url(path)).json(body)).await
    }

    /// Sends a write whose response body carries nothing of interest.
    async fn post_transaction<B: Serialize>(&self, path: &str, body: &B) -> anyhow::Result<()> {
        let (url, _) = self.send(self.client.post(self.url(path)).json(body)).await?;
        debug!(%url, "Ledger transaction accepted");
        Ok(())
    }
}

impl Ledger for HttpLedger {
    #[instrument(skip(self))]
    async fn works(&self) -> anyhow::Result<Vec<Work>> {
        self.get("/works").await
    }

    #[instrument(skip(self))]
    async fn licenses(&self) -> anyhow::Result<Vec<License>> {
        self.get("/licenses").await
    }

    #[instrument(skip(self))]
    async fn balance(&self, account: &str) -> anyhow::Result<TokenAmount> {
        let response: BalanceResponse = self.get(&format!("/accounts/{account}/balance")).await?;
        Ok(response.balance)
    }

    #[instrument(skip(self, listing), fields(name = %listing.details.name))]
    async fn create_work(&self, from: &str, listing: &Listing) -> anyhow::Result<()> {
        self.post_transaction("/works", &ListingRequest { from, listing })
            .await
    }

    #[instrument(skip(self, listing))]
    async fn update_work(&self, from: &str, work_index: u64, listing: &Listing) -> anyhow::Result<()> {
        self.post_transaction(
            &format!("/works/{work_index}/update"),
            &ListingRequest { from, listing },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_work(&self, from: &str, work_index: u64) -> anyhow::Result<()> {
        self.post_transaction(&format!("/works/{work_index}/delete"), &SenderRequest { from })
            .await
    }

    #[instrument(skip(self))]
    async fn approve(&self, from: &str, amount: TokenAmount) -> anyhow::Result<()> {
        self.post_transaction("/token/approve", &ApproveRequest { from, amount })
            .await
    }

    #[instrument(skip(self))]
    async fn buy_license(&self, from: &str, work_index: u64) -> anyhow::Result<PurchaseReceipt> {
        self.post(&format!("/works/{work_index}/licenses"), &SenderRequest { from })
            .await
    }
}
