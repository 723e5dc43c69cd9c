//! Shared retry context and canned message templates used by the RPC client
//! to keep instrumentation consistent across operations.

use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(block) = $ctx.block {
            tracing::$level!(method = $ctx.messages.method, block, $($rest)*);
        } else {
            tracing::$level!(method = $ctx.messages.method, $($rest)*);
        }
    }};
}

/// Logging labels describing how one RPC operation reports retries and
/// exhaustion.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) method: &'static str,
    pub(crate) timeout: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
    pub(crate) rejected: &'static str,
}

/// Passed into `retry_request` so callers can attach the block a request is
/// pinned to.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    block: Option<u64>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages) -> Self {
        Self {
            block: None,
            messages,
        }
    }

    pub(crate) fn at_block(messages: &'a RetryMessages, block: Option<u64>) -> Self {
        Self { block, messages }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.messages.method
    }

    pub(crate) fn log_timeout(&self, attempt: usize, backoff: Duration) {
        let backoff_ms = duration_to_millis(backoff);
        log_with_retry_ctx!(warn, self, attempt, backoff_ms, "{}", self.messages.timeout);
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        let backoff_ms = duration_to_millis(backoff);
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms,
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    pub(crate) fn log_rejected(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(debug, self, attempt, error = %err, "{}", self.messages.rejected);
    }
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) const CHAIN_ID_RETRY: RetryMessages = RetryMessages {
    method: "eth_chainId",
    timeout: "eth_chainId timed out; retrying",
    retry: "eth_chainId failed; retrying",
    exhausted: "eth_chainId exhausted retries",
    rejected: "eth_chainId rejected by node",
};

pub(crate) const LATEST_HEAD_RETRY: RetryMessages = RetryMessages {
    method: "eth_getBlockByNumber",
    timeout: "latest block request timed out; retrying",
    retry: "latest block request failed; retrying",
    exhausted: "latest block request exhausted retries",
    rejected: "latest block request rejected by node",
};

pub(crate) const ETH_CALL_RETRY: RetryMessages = RetryMessages {
    method: "eth_call",
    timeout: "eth_call timed out; retrying",
    retry: "eth_call failed; retrying",
    exhausted: "eth_call exhausted retries",
    rejected: "eth_call rejected by node",
};
