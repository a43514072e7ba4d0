//! Scripted in-memory wallet for executor tests

use super::{
    BlockHeader, PreparedTransaction, SubmissionStatus, SubmissionTracker, WalletError,
    WalletProvider,
};
use crate::chain::ChainDescriptor;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeWallet {
    network: Mutex<u64>,
    address: Mutex<Option<Address>>,
    switch_error: Mutex<Option<WalletError>>,
    estimate: Mutex<Result<U256, WalletError>>,
    base_fee: Mutex<Option<U256>>,
    gas_price: U256,
    submit_script: Mutex<VecDeque<Result<H256, WalletError>>>,
    submit_delay: Mutex<Option<Duration>>,
    submitted: Mutex<Vec<PreparedTransaction>>,
    switches: Mutex<Vec<u64>>,
    submit_calls: AtomicUsize,
    tracker: SubmissionTracker,
}

impl FakeWallet {
    /// Connected wallet on `network` with a dynamic-fee chain behind it
    pub fn new(network: u64) -> Self {
        Self {
            network: Mutex::new(network),
            address: Mutex::new(Some(Address::repeat_byte(0xaa))),
            switch_error: Mutex::new(None),
            estimate: Mutex::new(Ok(U256::from(100_000))),
            base_fee: Mutex::new(Some(U256::from(1_000_000_000u64))),
            gas_price: U256::from(100),
            submit_script: Mutex::new(VecDeque::new()),
            submit_delay: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            switches: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            tracker: SubmissionTracker::new(),
        }
    }

    pub fn disconnect(&self) {
        *self.address.lock().unwrap() = None;
    }

    pub fn connect(&self) {
        *self.address.lock().unwrap() = Some(Address::repeat_byte(0xaa));
    }

    pub fn reject_switch(&self, error: WalletError) {
        *self.switch_error.lock().unwrap() = Some(error);
    }

    pub fn fail_estimates(&self, error: WalletError) {
        *self.estimate.lock().unwrap() = Err(error);
    }

    pub fn set_base_fee(&self, base_fee: Option<U256>) {
        *self.base_fee.lock().unwrap() = base_fee;
    }

    /// Queue the outcome of the next `submit`; unscripted submissions succeed
    pub fn push_submit(&self, result: Result<H256, WalletError>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    pub fn delay_submissions(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<PreparedTransaction> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn switches(&self) -> Vec<u64> {
        self.switches.lock().unwrap().clone()
    }

    /// Put a result into provider tracking as if an unrelated transaction
    /// had been sent earlier
    pub async fn leave_stale_status(&self, result: Result<H256, WalletError>) {
        let ticket = self.tracker.begin().await;
        self.tracker.finish(ticket, &result).await;
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn current_network(&self) -> u64 {
        *self.network.lock().unwrap()
    }

    async fn connected_address(&self) -> Option<Address> {
        *self.address.lock().unwrap()
    }

    async fn switch_network(&self, chain: &ChainDescriptor) -> Result<(), WalletError> {
        self.switches.lock().unwrap().push(chain.chain_id);
        if let Some(error) = self.switch_error.lock().unwrap().clone() {
            return Err(error);
        }
        *self.network.lock().unwrap() = chain.chain_id;
        Ok(())
    }

    async fn estimate_gas(&self, _tx: &PreparedTransaction) -> Result<U256, WalletError> {
        self.estimate.lock().unwrap().clone()
    }

    async fn latest_block_header(&self, _chain_id: u64) -> Result<BlockHeader, WalletError> {
        Ok(BlockHeader {
            number: Some(1),
            base_fee_per_gas: *self.base_fee.lock().unwrap(),
        })
    }

    async fn current_gas_price(&self, _chain_id: u64) -> Result<U256, WalletError> {
        Ok(self.gas_price)
    }

    async fn submit(&self, tx: &PreparedTransaction) -> Result<H256, WalletError> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted.lock().unwrap().push(tx.clone());
        let ticket = self.tracker.begin().await;

        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self
            .submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(H256::from_low_u64_be(call as u64)));
        self.tracker.finish(ticket, &result).await;
        result
    }

    async fn submission_status(&self) -> SubmissionStatus {
        self.tracker.status().await
    }

    async fn reset_submission(&self) {
        self.tracker.reset().await;
    }
}
