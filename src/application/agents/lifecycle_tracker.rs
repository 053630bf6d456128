use crate::application::ml::ProbabilityEngine;
use crate::domain::clock::Clock;
use crate::domain::ports::BrokerGateway;
use crate::domain::repositories::TradeLedger;
use crate::domain::trading::trade_record::TradeRecord;
use crate::domain::trading::types::{Deal, DealEntry};
use anyhow::Result;
use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEAL_WINDOW_DAYS: i64 = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Records matched to an exit deal and closed by this pass.
    pub closed: usize,
    /// Experiences appended.
    pub learned: usize,
    /// Records without a broker ticket, closed with a zero result.
    pub force_closed: usize,
}

/// Reconciles OPEN ledger records against the broker's exit deals and feeds outcomes to learning.
pub struct LifecycleTracker {
    broker: Arc<dyn BrokerGateway>,
    ledger: Arc<dyn TradeLedger>,
    engine: Arc<ProbabilityEngine>,
    clock: Arc<dyn Clock>,
}

fn exit_deal<'a>(record: &TradeRecord, ticket: i64, deals: &'a [Deal]) -> Option<&'a Deal> {
    deals.iter().find(|d| {
        d.symbol == record.symbol && d.entry == DealEntry::Out && d.position_id == ticket
    })
}

impl LifecycleTracker {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        ledger: Arc<dyn TradeLedger>,
        engine: Arc<ProbabilityEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broker,
            ledger,
            engine,
            clock,
        }
    }

    pub async fn track(&self) -> Result<LifecycleReport> {
        let mut report = LifecycleReport::default();

        let open = self.ledger.open_records().await?;
        if open.is_empty() {
            return Ok(report);
        }

        let now = self.clock.now();
        let deals = self
            .broker
            .get_deal_history(now - Duration::days(DEAL_WINDOW_DAYS), now)
            .await?;

        for record in &open {
            let Some(ticket) = record.ticket else {
                // Unmatchable forever; closing keeps the OPEN set from growing.
                match self.ledger.close(record.id, Decimal::ZERO).await {
                    Ok(true) => {
                        warn!(
                            "LifecycleTracker [{}]: Record {} has no ticket, closed without learning",
                            record.symbol, record.id
                        );
                        report.force_closed += 1;
                    }
                    Ok(false) => {}
                    Err(e) => error!(
                        "LifecycleTracker [{}]: Failed to close record {}: {:#}",
                        record.symbol, record.id, e
                    ),
                }
                continue;
            };

            let Some(deal) = exit_deal(record, ticket, &deals) else {
                continue;
            };
            let result = deal.realized_profit();

            let transitioned = match self.ledger.close(record.id, result).await {
                Ok(t) => t,
                Err(e) => {
                    error!(
                        "LifecycleTracker [{}]: Failed to close record {}: {:#}",
                        record.symbol, record.id, e
                    );
                    continue;
                }
            };
            // Someone else closed it first; learning already happened there.
            if !transitioned {
                continue;
            }
            report.closed += 1;

            let label = u8::from(result > Decimal::ZERO);
            info!(
                "LifecycleTracker [{}]: Ticket {} closed ({}) result {} -> label {}",
                record.symbol, ticket, record.setup, result, label
            );

            let Some(snapshot) = record.feature_snapshot() else {
                warn!(
                    "LifecycleTracker [{}]: Record {} has no usable feature snapshot, not learned",
                    record.symbol, record.id
                );
                continue;
            };

            match self
                .engine
                .record_experience(&record.symbol, snapshot, label, now)
                .await
            {
                Ok(()) => report.learned += 1,
                Err(e) => error!("LifecycleTracker [{}]: {:#}", record.symbol, e),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::ModelRegistry;
    use crate::config::MlEnvConfig;
    use crate::domain::clock::ManualClock;
    use crate::domain::ml::feature_registry::FeatureSnapshot;
    use crate::domain::repositories::ExperienceStore;
    use crate::domain::trading::trade_record::NewTradeRecord;
    use crate::domain::trading::types::{AccountInfo, Side};
    use crate::infrastructure::mock::MockBroker;
    use crate::infrastructure::repositories::{
        InMemoryExperienceStore, InMemoryModelStore, InMemoryTradeLedger,
    };
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    struct Harness {
        broker: Arc<MockBroker>,
        ledger: Arc<InMemoryTradeLedger>,
        experiences: Arc<InMemoryExperienceStore>,
        tracker: LifecycleTracker,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());
        let broker = Arc::new(MockBroker::new(AccountInfo {
            balance: dec!(10000),
            equity: dec!(10000),
            margin_level: Decimal::ZERO,
            margin_free: dec!(10000),
            leverage: 30,
        }));
        let ledger = Arc::new(InMemoryTradeLedger::new());
        let experiences = Arc::new(InMemoryExperienceStore::new());
        let engine = Arc::new(ProbabilityEngine::new(
            Arc::new(ModelRegistry::new()),
            Arc::new(InMemoryModelStore::new()),
            experiences.clone(),
            MlEnvConfig::default(),
        ));
        let tracker = LifecycleTracker::new(
            broker.clone(),
            ledger.clone(),
            engine,
            Arc::new(clock.clone()),
        );
        Harness {
            broker,
            ledger,
            experiences,
            tracker,
            clock,
        }
    }

    fn record(ticket: Option<i64>, snapshot: String) -> NewTradeRecord {
        NewTradeRecord {
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            quantity: dec!(0.5),
            entry: 1.1,
            setup: "VAL_Rej".to_string(),
            snapshot,
            ticket,
            opened_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
        }
    }

    fn exit(ticket: i64, profit: Decimal, timestamp: i64) -> Deal {
        Deal {
            symbol: "EURUSD".to_string(),
            entry: DealEntry::Out,
            position_id: ticket,
            profit,
            swap: dec!(-0.5),
            commission: dec!(-1),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_win_closes_and_learns_positive_label() {
        let h = harness();
        let snapshot = FeatureSnapshot::new(1).to_json().unwrap();
        let id = h.ledger.insert(record(Some(42), snapshot)).await.unwrap();
        h.broker
            .push_deal(exit(42, dec!(25), h.clock.now().timestamp() - 600))
            .await;

        let report = h.tracker.track().await.unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(report.learned, 1);

        let stored = h.ledger.all().await;
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].result, Some(dec!(23.5)));
        let samples = h.experiences.load("EURUSD").await.unwrap();
        assert_eq!(samples[0].label, 1);
    }

    #[tokio::test]
    async fn test_net_loss_after_costs_is_label_zero() {
        let h = harness();
        h.ledger
            .insert(record(Some(7), FeatureSnapshot::new(1).to_json().unwrap()))
            .await
            .unwrap();
        h.broker
            .push_deal(exit(7, dec!(1.2), h.clock.now().timestamp() - 60))
            .await;

        h.tracker.track().await.unwrap();
        assert_eq!(h.experiences.load("EURUSD").await.unwrap()[0].label, 0);
    }

    #[tokio::test]
    async fn test_unmatched_record_stays_open() {
        let h = harness();
        h.ledger
            .insert(record(Some(9), FeatureSnapshot::new(1).to_json().unwrap()))
            .await
            .unwrap();
        // Exit deal older than the two-day window.
        h.broker
            .push_deal(exit(9, dec!(10), h.clock.now().timestamp() - 3 * 86_400))
            .await;

        let report = h.tracker.track().await.unwrap();
        assert_eq!(report, LifecycleReport::default());
        assert_eq!(h.ledger.open_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_ticket_force_closed_without_learning() {
        let h = harness();
        h.ledger
            .insert(record(None, FeatureSnapshot::new(1).to_json().unwrap()))
            .await
            .unwrap();

        let report = h.tracker.track().await.unwrap();
        assert_eq!(report.force_closed, 1);
        assert_eq!(h.ledger.all().await[0].result, Some(Decimal::ZERO));
        assert_eq!(h.experiences.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_snapshot_closes_but_does_not_learn() {
        let h = harness();
        h.ledger.insert(record(Some(5), String::new())).await.unwrap();
        h.broker
            .push_deal(exit(5, dec!(30), h.clock.now().timestamp() - 60))
            .await;

        let report = h.tracker.track().await.unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(report.learned, 0);
        assert!(h.ledger.open_records().await.unwrap().is_empty());
    }
}
