//! Retry policy and the attempt loop.
//!
//! # Design
//! `RetryOptions` is what the caller asks for; `RetryPolicy` is the
//! validated, clamped result stored on the request. Validation happens when
//! the options are applied, so a bad policy never reaches an execution.
//!
//! Each execution gets its own [`RetryBudget`]. The controller walks
//! `Idle -> Attempting -> {Succeeded | Retrying | Failed}` as a plain loop:
//! a retryable failure with budget left logs, sleeps for the interval,
//! spends one unit and attempts again; anything else ends the execution
//! with the original error.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::dispatch::Dispatch;
use crate::error::RequestError;
use crate::http::Response;
use crate::pipeline::ResponsePipeline;

pub const MAX_RETRY_ATTEMPTS: u32 = 15;
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Retry settings as requested by the caller.
///
/// `attempts` counts retries after the first attempt. `interval` is in
/// seconds; when `None` the request keeps its current interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    pub attempts: i64,
    pub interval: Option<f64>,
    pub log_on_retry: Option<bool>,
}

impl RetryOptions {
    pub fn new(attempts: i64) -> Self {
        Self {
            attempts,
            interval: None,
            log_on_retry: None,
        }
    }

    pub fn interval(mut self, seconds: f64) -> Self {
        self.interval = Some(seconds);
        self
    }

    pub fn log_on_retry(mut self, log: bool) -> Self {
        self.log_on_retry = Some(log);
        self
    }
}

/// A validated retry policy. Always within the clamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    interval: Duration,
    log_on_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            interval: DEFAULT_RETRY_INTERVAL,
            log_on_retry: true,
        }
    }
}

impl RetryPolicy {
    /// Apply `options` on top of `self`.
    pub fn apply(&self, options: &RetryOptions) -> Result<Self, RequestError> {
        if options.attempts < 0 {
            return Err(RequestError::InvalidRetryAttempts);
        }
        let attempts = options.attempts.min(i64::from(MAX_RETRY_ATTEMPTS)) as u32;

        let interval = match options.interval {
            None => self.interval,
            // NaN fails the comparison as well.
            Some(seconds) if !(seconds >= 0.0) => return Err(RequestError::InvalidRetryInterval),
            Some(seconds) => Duration::from_secs_f64(seconds.min(MAX_RETRY_INTERVAL.as_secs_f64())),
        };

        Ok(Self {
            attempts,
            interval,
            log_on_retry: options.log_on_retry.unwrap_or(true),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn log_on_retry(&self) -> bool {
        self.log_on_retry
    }
}

/// Retries left for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    /// Streaming executions get no retries: a partial body may already have
    /// reached the sink.
    pub fn new(policy: &RetryPolicy, streaming: bool) -> Self {
        let remaining = if streaming { 0 } else { policy.attempts };
        Self { remaining }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Spend one retry. Returns `false` if none were left.
    pub fn consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }

    pub fn exhaust(&mut self) {
        self.remaining = 0;
    }
}

/// Receives a diagnostic before every retry.
pub trait RetryLogger: Send + Sync {
    fn warn(&self, message: &str, error: &RequestError);
}

/// Logs retries through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RetryLogger for TracingLogger {
    fn warn(&self, message: &str, error: &RequestError) {
        tracing::warn!(error = %error, "{message}");
    }
}

pub type DelayFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Waits between attempts.
pub trait Timer: Send + Sync {
    fn delay(&self, duration: Duration) -> DelayFuture;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn delay(&self, duration: Duration) -> DelayFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Drives the attempts of one execution.
pub(crate) struct RetryController<'a> {
    policy: RetryPolicy,
    budget: RetryBudget,
    logger: &'a dyn RetryLogger,
    timer: &'a dyn Timer,
}

impl<'a> RetryController<'a> {
    pub(crate) fn new(
        policy: RetryPolicy,
        streaming: bool,
        logger: &'a dyn RetryLogger,
        timer: &'a dyn Timer,
    ) -> Self {
        Self {
            policy,
            budget: RetryBudget::new(&policy, streaming),
            logger,
            timer,
        }
    }

    pub(crate) async fn run(
        mut self,
        dispatch: &Dispatch,
        pipeline: &ResponsePipeline<'_>,
    ) -> Result<Response, RequestError> {
        let mut attempt = 1u32;
        loop {
            debug!(attempt, remaining = self.budget.remaining(), "sending request");
            let error = match self.attempt(dispatch, pipeline).await {
                Ok(response) => {
                    debug!(attempt, status = response.status, "request succeeded");
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || !self.budget.consume() {
                debug!(attempt, error = %error, "request failed");
                return Err(error);
            }

            if self.policy.log_on_retry() {
                let message = format!(
                    "Request has failed, retry in {} sec.",
                    self.policy.interval().as_secs_f64()
                );
                self.logger.warn(&message, &error);
            }
            self.timer.delay(self.policy.interval()).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &mut self,
        dispatch: &Dispatch,
        pipeline: &ResponsePipeline<'_>,
    ) -> Result<Response, RequestError> {
        let response = dispatch.transport.send(dispatch.request.clone()).await?;
        pipeline.collect(response, &mut self.budget).await
    }
}
