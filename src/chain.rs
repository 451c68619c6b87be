use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::credentials::AccountCredential;
use crate::error::{BotError, ChainError};

/// What a successful stake submission reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StakeReceipt {
    pub tx_hash: String,
    pub points: u64,
    pub rank: u64,
}

/// The only view of the chain the core needs. Submissions are signed with the
/// account's credential; `proxy` selects the egress route for the request.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn balance(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
    ) -> Result<f64, ChainError>;

    async fn pending_rewards(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
    ) -> Result<f64, ChainError>;

    /// Claim all pending rewards; returns the claimed amount.
    async fn claim_rewards(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
    ) -> Result<f64, ChainError>;

    async fn stake(
        &self,
        account: &AccountCredential,
        amount: f64,
        tier_id: u32,
        proxy: Option<&str>,
    ) -> Result<StakeReceipt, ChainError>;
}

/// JSON-RPC chain client over HTTP. One reqwest client per proxy URI, built
/// lazily and cached. `quiet` is a construction-time switch for per-request
/// diagnostics instead of a process-wide env toggle.
pub struct HttpChainClient {
    url: String,
    timeout: Duration,
    quiet: bool,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
    request_id: AtomicU64,
}

impl HttpChainClient {
    pub fn new(url: &str, timeout: Duration, quiet: bool) -> Result<Self, BotError> {
        let direct = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Config(format!("http client build failed: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            timeout,
            quiet,
            direct,
            proxied: Mutex::new(HashMap::new()),
            request_id: AtomicU64::new(1),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, ChainError> {
        let Some(uri) = proxy else {
            return Ok(self.direct.clone());
        };
        let mut cache = self
            .proxied
            .lock()
            .map_err(|_| ChainError::Connect("proxy client cache poisoned".to_string()))?;
        if let Some(client) = cache.get(uri) {
            return Ok(client.clone());
        }
        let proxy = reqwest::Proxy::all(uri)
            .map_err(|e| ChainError::Connect(format!("invalid proxy '{}': {}", uri, e)))?;
        let client = Client::builder()
            .timeout(self.timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| ChainError::Connect(format!("proxy client build failed: {}", e)))?;
        cache.insert(uri.to_string(), client.clone());
        Ok(client)
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        proxy: Option<&str>,
    ) -> Result<Value, ChainError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        if !self.quiet {
            debug!("rpc {} via {}", method, proxy.unwrap_or("direct"));
        }

        let client = self.client_for(proxy)?;
        let response = client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ChainError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ChainError::Connect(format!("server returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChainError::BadResponse(e.to_string()))?;

        if let Some(error) = body.get("error") {
            // some providers signal throttling inside the rpc envelope
            if error.get("code").and_then(Value::as_i64) == Some(-32005) {
                return Err(ChainError::RateLimited);
            }
            let msg = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ChainError::Rejected(msg.to_string()));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

fn classify_reqwest(e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout
    } else {
        ChainError::Connect(e.to_string())
    }
}

fn f64_field(result: &Value, field: &str) -> Result<f64, ChainError> {
    result
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| ChainError::BadResponse(format!("missing numeric '{}' field", field)))
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn balance(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
    ) -> Result<f64, ChainError> {
        let result = self
            .call("getBalance", json!({ "address": account.address }), proxy)
            .await?;
        f64_field(&result, "balance")
    }

    async fn pending_rewards(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
    ) -> Result<f64, ChainError> {
        let result = self
            .call(
                "getPendingRewards",
                json!({ "address": account.address }),
                proxy,
            )
            .await?;
        f64_field(&result, "amount")
    }

    async fn claim_rewards(
        &self,
        account: &AccountCredential,
        proxy: Option<&str>,
    ) -> Result<f64, ChainError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = format!("CLAIM:{}:{}", account.address, timestamp);
        let result = self
            .call(
                "claimRewards",
                json!({
                    "address": account.address,
                    "timestamp": timestamp,
                    "signature": account.sign_hex(payload.as_bytes()),
                }),
                proxy,
            )
            .await?;
        f64_field(&result, "claimed")
    }

    async fn stake(
        &self,
        account: &AccountCredential,
        amount: f64,
        tier_id: u32,
        proxy: Option<&str>,
    ) -> Result<StakeReceipt, ChainError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let payload = format!(
            "STAKE:{}:{}:{}:{}",
            account.address, amount, tier_id, timestamp
        );
        let result = self
            .call(
                "submitStake",
                json!({
                    "address": account.address,
                    "amount": amount,
                    "tier_id": tier_id,
                    "timestamp": timestamp,
                    "signature": account.sign_hex(payload.as_bytes()),
                }),
                proxy,
            )
            .await?;
        Ok(StakeReceipt {
            tx_hash: result
                .get("txHash")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            points: result.get("points").and_then(Value::as_u64).unwrap_or(0),
            rank: result.get("rank").and_then(Value::as_u64).unwrap_or(0),
        })
    }
}


#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::time::Instant;

    /// Programmable in-memory chain for pipeline/orchestrator tests. Scripted
    /// errors are consumed one per stake attempt, so a transient failure
    /// followed by success is easy to express.
    #[derive(Default)]
    pub(crate) struct MockChain {
        pub balances: Mutex<HashMap<String, f64>>,
        pub rewards: Mutex<HashMap<String, f64>>,
        pub stake_errors: Mutex<HashMap<String, Vec<ChainError>>>,
        pub stake_calls: Mutex<Vec<(String, f64)>>,
        pub balance_calls: Mutex<Vec<(String, Instant)>>,
    }

    impl MockChain {
        pub fn with_balance(address: &str, balance: f64) -> Self {
            let chain = Self::default();
            chain.set_balance(address, balance);
            chain
        }

        pub fn set_balance(&self, address: &str, balance: f64) {
            self.balances
                .lock()
                .unwrap()
                .insert(address.to_string(), balance);
        }

        pub fn set_rewards(&self, address: &str, amount: f64) {
            self.rewards
                .lock()
                .unwrap()
                .insert(address.to_string(), amount);
        }

        pub fn script_stake_errors(&self, address: &str, errors: Vec<ChainError>) {
            self.stake_errors
                .lock()
                .unwrap()
                .insert(address.to_string(), errors);
        }

        pub fn stake_count(&self, address: &str) -> usize {
            self.stake_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _)| a == address)
                .count()
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn balance(
            &self,
            account: &AccountCredential,
            _proxy: Option<&str>,
        ) -> Result<f64, ChainError> {
            self.balance_calls
                .lock()
                .unwrap()
                .push((account.address.clone(), Instant::now()));
            Ok(*self
                .balances
                .lock()
                .unwrap()
                .get(&account.address)
                .unwrap_or(&0.0))
        }

        async fn pending_rewards(
            &self,
            account: &AccountCredential,
            _proxy: Option<&str>,
        ) -> Result<f64, ChainError> {
            Ok(*self
                .rewards
                .lock()
                .unwrap()
                .get(&account.address)
                .unwrap_or(&0.0))
        }

        async fn claim_rewards(
            &self,
            account: &AccountCredential,
            _proxy: Option<&str>,
        ) -> Result<f64, ChainError> {
            Ok(self
                .rewards
                .lock()
                .unwrap()
                .insert(account.address.clone(), 0.0)
                .unwrap_or(0.0))
        }

        async fn stake(
            &self,
            account: &AccountCredential,
            amount: f64,
            _tier_id: u32,
            _proxy: Option<&str>,
        ) -> Result<StakeReceipt, ChainError> {
            let scripted = {
                let mut errors = self.stake_errors.lock().unwrap();
                errors
                    .get_mut(&account.address)
                    .and_then(|queue| if queue.is_empty() { None } else { Some(queue.remove(0)) })
            };
            if let Some(err) = scripted {
                return Err(err);
            }
            self.stake_calls
                .lock()
                .unwrap()
                .push((account.address.clone(), amount));
            if let Some(balance) = self.balances.lock().unwrap().get_mut(&account.address) {
                *balance -= amount;
            }
            Ok(StakeReceipt {
                tx_hash: format!("0xmock{}", self.stake_calls.lock().unwrap().len()),
                points: 10,
                rank: 1,
            })
        }
    }
}
