//! Synchronous replay driver.

use tracing::info;

use crate::domain::market::MarketEvent;
use crate::domain::replay::ReplayData;
use crate::domain::runner::report::{RunMode, RunReport};
use crate::domain::runner::slot::{OrderIntent, StrategySlot};
use crate::domain::runner::StrategyRunner;
use crate::ports::execution_port::SyncExecutionGateway;

impl StrategyRunner {
    /// Warm every strategy from the data before `evaluation_start`, then
    /// replay the rest one event at a time. Strategies see each event in
    /// the order they were added.
    pub fn run_backtest(mut self, data: &ReplayData, gateway: &dyn SyncExecutionGateway) -> RunReport {
        let (history, mut source) = data.split(self.settings.evaluation_start);
        info!(strategies = self.slots.len(), events = source.remaining(), "backtest starting");

        for slot in &mut self.slots {
            slot.warm_from_history(&history);
        }

        let mut dispatched = 0u64;
        for event in source.by_ref() {
            dispatched += 1;
            for slot in &mut self.slots {
                dispatch(slot, &event, gateway);
            }
        }

        for slot in &mut self.slots {
            slot.stop();
        }
        info!(events = dispatched, "backtest finished");
        let mut report = self.into_report(RunMode::Backtest, dispatched);
        report.replay = Some(source.properties().clone());
        report
    }
}

fn dispatch(slot: &mut StrategySlot, event: &MarketEvent, gateway: &dyn SyncExecutionGateway) {
    let forced = slot.begin(event);
    execute(slot, forced, gateway);
    let decided = slot.decide(event);
    execute(slot, decided, gateway);
}

fn execute(slot: &mut StrategySlot, intents: Vec<OrderIntent>, gateway: &dyn SyncExecutionGateway) {
    for intent in intents {
        if !slot.admit(&intent) {
            continue;
        }
        let outcome = gateway.execute(&intent.request);
        slot.settle(intent, outcome);
    }
}
