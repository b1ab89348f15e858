//! Transaction engine
//!
//! Builds, signs, submits and tracks native-asset transfers. Each transfer
//! walks Building -> Estimating -> Signing -> Submitted -> Confirmed/Failed;
//! the session keeps an append-only record list and broadcasts every status
//! change for the UI to observe.
//!
//! Failure policy: an RPC failure before a hash exists marks the record
//! failed and is safe to retry manually; once a hash exists, transport
//! errors while fetching the receipt leave the record pending, because the
//! transaction may still be mined. Nothing is retried automatically.

pub mod client;
pub mod signer;

pub use client::{ChainClient, ReceiptInfo, RpcChainClient};
pub use signer::{ExternalSigner, TransferSigner};

use crate::storage::{keys as storage_keys, StoragePort};
use crate::{Error, Result};
use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, TxKind, B256, U256};
use alloy::rpc::types::TransactionRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use uuid::Uuid;

/// Flat gas for a simple transfer, used when estimation fails
pub const FALLBACK_TRANSFER_GAS: u64 = 21_000;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Lifecycle state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

/// Engine-tracked transaction record; append-only within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    /// Chain-assigned hash; absent when submission failed before broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<B256>,
    pub from: Address,
    pub to: Address,
    /// Amount in smallest units (wei)
    pub amount: U256,
    pub status: TxStatus,
    pub submitted_at: DateTime<Utc>,
    pub gas_limit: u64,
    /// True when the gas limit is the flat fallback, not an RPC estimate
    pub fallback_gas_estimate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_gas_price: Option<u128>,
}

/// A native-asset transfer as requested by the UI
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Recipient address string, validated during Building
    pub to: String,
    /// Amount in smallest units
    pub amount: U256,
    /// Last balance known to the caller; checked before any network call.
    /// When absent the engine fetches one best-effort.
    pub known_balance: Option<U256>,
}

/// Outcome of observing a transaction until confirmation or abandonment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Confirmed,
    Failed,
    /// Confirmation window elapsed; the transaction may still be mined
    StillPending,
    /// Observation was abandoned; chain state is unaffected
    Cancelled,
}

/// Abandon signal for confirmation tracking
pub struct CancelToken {
    tx: watch::Sender<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Stop local observation; the in-flight transaction is unaffected.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn observer(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted transfer history, one JSON array under one storage key.
///
/// The engine's record list lives for the session; the journal carries
/// finished (and still-pending) transfers across restarts so `history`
/// has something to show.
pub struct TransferJournal {
    storage: Arc<dyn StoragePort>,
}

impl TransferJournal {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self { storage }
    }

    /// All journaled records, oldest first.
    pub async fn load(&self) -> Result<Vec<TransactionRecord>> {
        match self.storage.get(storage_keys::TX_HISTORY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("transaction history corrupt: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Append one record; a later write for the same id replaces the
    /// earlier entry, so re-journaling after confirmation updates in place.
    pub async fn record(&self, record: &TransactionRecord) -> Result<()> {
        let mut all = self.load().await?;
        all.retain(|r| r.id != record.id);
        all.push(record.clone());
        self.storage
            .set(storage_keys::TX_HISTORY, &serde_json::to_string(&all)?)
            .await
    }
}

/// Builds, signs, submits and tracks transfers against one chain client
pub struct TransactionEngine {
    client: Arc<dyn ChainClient>,
    records: Mutex<Vec<TransactionRecord>>,
    updates: broadcast::Sender<TransactionRecord>,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl TransactionEngine {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            client,
            records: Mutex::new(Vec::new()),
            updates,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    /// Override polling cadence and confirmation window.
    pub fn with_timing(mut self, poll_interval: Duration, confirmation_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.confirmation_timeout = confirmation_timeout;
        self
    }

    /// Session transaction history, oldest first.
    pub async fn history(&self) -> Vec<TransactionRecord> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<TransactionRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }

    /// Status-change stream; every record mutation is broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionRecord> {
        self.updates.subscribe()
    }

    /// Build, sign and broadcast a transfer. Returns the record id; the
    /// record starts `Pending` and is updated by [`Self::track`].
    pub async fn submit_transfer(
        &self,
        signer: &TransferSigner,
        request: &TransferRequest,
    ) -> Result<Uuid> {
        // Building: validation happens before any record or network call
        let to = Address::from_str(request.to.trim())
            .map_err(|e| Error::InvalidRecipient(format!("{}: {e}", request.to)))?;
        if request.amount.is_zero() {
            return Err(Error::InvalidAmount("amount must be positive".to_string()));
        }
        let from = signer.address();

        if let Some(known) = request.known_balance {
            if request.amount > known {
                return Err(Error::InvalidAmount(format!(
                    "amount {} exceeds balance {known}",
                    request.amount
                )));
            }
        } else {
            // Advisory only: a failed fetch must not block submission
            match self.client.get_balance(from).await {
                Ok(balance) if request.amount > balance => {
                    return Err(Error::InvalidAmount(format!(
                        "amount {} exceeds balance {balance}",
                        request.amount
                    )));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Balance check skipped"),
            }
        }

        // From here on a record exists; pre-broadcast failures mark it failed
        let id = Uuid::new_v4();
        self.records.lock().await.push(TransactionRecord {
            id,
            hash: None,
            from,
            to,
            amount: request.amount,
            status: TxStatus::Pending,
            submitted_at: Utc::now(),
            gas_limit: 0,
            fallback_gas_estimate: false,
            gas_used: None,
            effective_gas_price: None,
        });

        let nonce = match self.client.get_nonce(from).await {
            Ok(nonce) => nonce,
            Err(e) => return self.fail(id, e).await,
        };
        let gas_price = match self.client.gas_price().await {
            Ok(price) => price,
            Err(e) => return self.fail(id, e).await,
        };

        // Estimating, with a conservative fallback instead of blocking
        let estimate_request = TransactionRequest::default()
            .from(from)
            .to(to)
            .value(request.amount);
        let (gas_limit, fallback) = match self.client.estimate_gas(&estimate_request).await {
            Ok(gas) => (gas, false),
            Err(e) => {
                tracing::warn!(error = %e, "Gas estimation failed, using flat transfer gas");
                (FALLBACK_TRANSFER_GAS, true)
            }
        };
        self.update(id, |r| {
            r.gas_limit = gas_limit;
            r.fallback_gas_estimate = fallback;
        })
        .await;

        // Signing: for local keys the decrypted signer was handed to us and
        // is dropped by the caller as soon as this returns
        let tx = TxLegacy {
            chain_id: Some(self.client.chain_id()),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: request.amount,
            input: Default::default(),
        };
        let raw = match signer.sign(tx).await {
            Ok(raw) => raw,
            Err(e) => return self.fail(id, e).await,
        };

        // Submission: no automatic retry, ever
        match self.client.send_raw_transaction(&raw).await {
            Ok(hash) => {
                self.update(id, |r| r.hash = Some(hash)).await;
                tracing::info!(%hash, from = %from, to = %to, amount = %request.amount, "Transaction submitted");
                Ok(id)
            }
            Err(e) => self.fail(id, e).await,
        }
    }

    /// Observe a submitted transaction until a receipt arrives, the
    /// confirmation window elapses, or `cancel` fires. Transport errors
    /// leave the record pending and polling continues.
    pub async fn track(
        &self,
        id: Uuid,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<TrackOutcome> {
        let record = self
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("transaction {id}")))?;
        let hash = match (record.status, record.hash) {
            (TxStatus::Success, _) => return Ok(TrackOutcome::Confirmed),
            (TxStatus::Failed, _) | (TxStatus::Pending, None) => return Ok(TrackOutcome::Failed),
            (TxStatus::Pending, Some(hash)) => hash,
        };

        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;
        let mut cancel_open = true;
        loop {
            tokio::select! {
                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            tracing::debug!(%hash, "Confirmation tracking abandoned");
                            return Ok(TrackOutcome::Cancelled);
                        }
                        Ok(()) => {}
                        // Token dropped: cancellation is no longer possible
                        Err(_) => cancel_open = false,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(%hash, "Confirmation window elapsed, transaction still pending");
                    return Ok(TrackOutcome::StillPending);
                }
                receipt = self.poll_once(hash) => {
                    match receipt {
                        Ok(Some(info)) => {
                            let status = if info.success { TxStatus::Success } else { TxStatus::Failed };
                            self.update(id, |r| {
                                r.status = status;
                                r.gas_used = Some(info.gas_used);
                                r.effective_gas_price = Some(info.effective_gas_price);
                            })
                            .await;
                            tracing::info!(%hash, success = info.success, gas_used = info.gas_used, "Receipt received");
                            return Ok(if info.success { TrackOutcome::Confirmed } else { TrackOutcome::Failed });
                        }
                        Ok(None) => {}
                        // A transport failure is not a verdict: the
                        // transaction may still be mined
                        Err(e) => tracing::warn!(%hash, error = %e, "Receipt fetch failed, retrying"),
                    }
                }
            }
        }
    }

    async fn poll_once(&self, hash: B256) -> Result<Option<ReceiptInfo>> {
        tokio::time::sleep(self.poll_interval).await;
        self.client.get_receipt(hash).await
    }

    async fn fail(&self, id: Uuid, err: Error) -> Result<Uuid> {
        self.update(id, |r| r.status = TxStatus::Failed).await;
        Err(match err {
            Error::Rpc(msg) => Error::SubmissionFailed(msg),
            other => other,
        })
    }

    async fn update<F: FnOnce(&mut TransactionRecord)>(&self, id: Uuid, f: F) {
        let snapshot = {
            let mut records = self.records.lock().await;
            let Some(record) = records.iter_mut().find(|r| r.id == id) else {
                return;
            };
            f(record);
            record.clone()
        };
        let _ = self.updates.send(snapshot);
    }
}
