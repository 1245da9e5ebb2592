//! Warmup coordinator.
//!
//! Computes how many historical candles each chart subscription needs and
//! feeds them through chart history and the indicator host only. Strategy
//! callbacks and the position state machines are never reached from here.

use tracing::{debug, info, warn};

use crate::domain::context::StrategyContext;
use crate::domain::error::TickloomError;
use crate::domain::market::Candle;
use crate::domain::replay::CandleHistory;
use crate::domain::subscription::Subscription;
use crate::ports::history_port::HistoricalDataProvider;

#[derive(Debug, Clone, PartialEq)]
pub struct WarmupRequest {
    pub subscription: Subscription,
    /// Longest `warmup_periods()` among indicators on the subscription.
    pub indicator_periods: usize,
    pub margin: usize,
    pub required: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarmupPlan {
    pub strategy: String,
    pub requests: Vec<WarmupRequest>,
}

impl WarmupPlan {
    /// One request per chart subscription; `required = max(warmup) + margin`.
    pub fn for_context(
        ctx: &StrategyContext,
        margin: usize,
        max_warmup_candles: usize,
    ) -> Result<Self, TickloomError> {
        let mut requests = Vec::new();
        for subscription in ctx.registry().charts() {
            let indicator_periods = ctx.indicators().max_warmup(subscription);
            let required = indicator_periods + margin;
            if required > max_warmup_candles {
                return Err(TickloomError::configuration(format!(
                    "strategy '{}' needs {required} warmup candles on {subscription}, above the limit of {max_warmup_candles}",
                    ctx.name()
                )));
            }
            requests.push(WarmupRequest {
                subscription: subscription.clone(),
                indicator_periods,
                margin,
                required,
            });
        }
        Ok(Self {
            strategy: ctx.name().to_string(),
            requests,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionWarmup {
    pub subscription: Subscription,
    pub required: usize,
    pub received: usize,
    pub ready: bool,
    /// Why the subscription is not ready, when known.
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WarmupResult {
    pub subscriptions: Vec<SubscriptionWarmup>,
}

impl WarmupResult {
    pub fn all_ready(&self) -> bool {
        self.subscriptions.iter().all(|s| s.ready)
    }

    pub fn not_ready(&self) -> impl Iterator<Item = &SubscriptionWarmup> {
        self.subscriptions.iter().filter(|s| !s.ready)
    }
}

/// Warm up from in-memory history (backtest).
pub fn warmup_from_history(
    ctx: &mut StrategyContext,
    plan: &WarmupPlan,
    history: &CandleHistory,
) -> WarmupResult {
    let mut result = WarmupResult::default();
    for request in &plan.requests {
        let fetched = match request.subscription.timeframe() {
            Some(tf) if request.required > 0 => Ok(history.last(
                &request.subscription.instrument,
                tf,
                request.required,
            )),
            _ => Ok(Vec::new()),
        };
        result
            .subscriptions
            .push(apply(ctx, request, fetched));
    }
    log_result(&plan.strategy, &result);
    result
}

/// Warm up through a historical data provider (live).
pub async fn warmup_from_provider(
    ctx: &mut StrategyContext,
    plan: &WarmupPlan,
    provider: &dyn HistoricalDataProvider,
) -> WarmupResult {
    let mut result = WarmupResult::default();
    for request in &plan.requests {
        let fetched = match request.subscription.timeframe() {
            Some(tf) if request.required > 0 => {
                provider
                    .get_candles(&request.subscription.instrument, tf, request.required)
                    .await
            }
            _ => Ok(Vec::new()),
        };
        result
            .subscriptions
            .push(apply(ctx, request, fetched));
    }
    log_result(&plan.strategy, &result);
    result
}

fn apply(
    ctx: &mut StrategyContext,
    request: &WarmupRequest,
    fetched: Result<Vec<Candle>, TickloomError>,
) -> SubscriptionWarmup {
    let subscription = &request.subscription;
    let candles = match fetched {
        Ok(candles) => candles,
        Err(e) => {
            warn!(
                strategy = ctx.name(),
                %subscription,
                error = %e,
                "warmup fetch failed, subscription not ready"
            );
            return SubscriptionWarmup {
                subscription: subscription.clone(),
                required: request.required,
                received: 0,
                ready: request.required == 0,
                note: Some(e.to_string()),
            };
        }
    };

    if let Some(pair) = candles
        .windows(2)
        .find(|w| w[1].timestamp <= w[0].timestamp)
    {
        warn!(
            strategy = ctx.name(),
            %subscription,
            at = %pair[1].timestamp,
            "warmup candles out of order, discarded"
        );
        return SubscriptionWarmup {
            subscription: subscription.clone(),
            required: request.required,
            received: 0,
            ready: request.required == 0,
            note: Some("history not in chronological order".to_string()),
        };
    }

    // A provider may return more than asked for.
    let skip = candles.len().saturating_sub(request.required);
    let candles = &candles[skip..];
    for candle in candles {
        ctx.prime(subscription, candle);
    }

    let received = candles.len();
    let ready = received >= request.required && ctx.indicators().all_ready(subscription);
    let note = (!ready).then(|| format!("received {received} of {} candles", request.required));
    debug!(strategy = ctx.name(), %subscription, received, required = request.required, ready, "warmup applied");
    SubscriptionWarmup {
        subscription: subscription.clone(),
        required: request.required,
        received,
        ready,
        note,
    }
}

fn log_result(strategy: &str, result: &WarmupResult) {
    let not_ready: Vec<String> = result.not_ready().map(|s| s.subscription.to_string()).collect();
    if not_ready.is_empty() {
        info!(strategy, subscriptions = result.subscriptions.len(), "warmup complete");
    } else {
        warn!(strategy, not_ready = ?not_ready, "warmup incomplete, entries stay gated until indicators are ready");
    }
}
