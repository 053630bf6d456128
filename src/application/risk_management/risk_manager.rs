use crate::config::RiskEnvConfig;
use crate::domain::errors::DecisionError;
use crate::domain::ports::BrokerGateway;
use crate::domain::trading::types::{AccountInfo, Quote};
use rust_decimal::Decimal;
use std::future::Future;
use tracing::{debug, info, warn};

/// Account-level guards applied before any new risk is taken.
pub struct RiskManager {
    config: RiskEnvConfig,
}

impl RiskManager {
    pub fn new(config: RiskEnvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskEnvConfig {
        &self.config
    }

    /// Margin guard. A margin level of zero means no positions are open and is not a breach.
    pub fn can_trade(&self, account: Option<&AccountInfo>) -> bool {
        let Some(account) = account else {
            warn!("RiskManager: No account information, blocking new trades");
            return false;
        };

        if account.margin_level > Decimal::ZERO && account.margin_level < self.config.min_margin_level {
            warn!(
                "RiskManager: Margin level {}% below {}%, blocking new trades",
                account.margin_level.round_dp(1),
                self.config.min_margin_level
            );
            return false;
        }
        true
    }

    /// Spread in points must not exceed the configured maximum.
    pub fn spread_ok(&self, symbol: &str, quote: &Quote, point: f64) -> bool {
        if point <= 0.0 {
            return true;
        }
        let spread_points = quote.spread() / point;
        if spread_points > self.config.max_spread_points {
            info!(
                "RiskManager [{}]: Spread {:.1} points exceeds {:.1}",
                symbol, spread_points, self.config.max_spread_points
            );
            return false;
        }
        true
    }

    /// `true` when no trade happened on the symbol within the cooldown window.
    pub fn cooldown_elapsed(&self, symbol: &str, minutes_since_last: Option<f64>) -> bool {
        match minutes_since_last {
            Some(minutes) if minutes < self.config.trade_cooldown_minutes => {
                debug!(
                    "RiskManager [{}]: Last trade {:.1} min ago, cooling down",
                    symbol, minutes
                );
                false
            }
            _ => true,
        }
    }
}

/// Runs a broker query, reconnecting and retrying exactly once on a transport error or an
/// empty answer. A second failure is reported as `ConnectivityLoss`.
pub async fn with_single_reconnect<T, F, Fut>(
    broker: &dyn BrokerGateway,
    what: &str,
    mut op: F,
) -> Result<T, DecisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    match op().await {
        Ok(Some(value)) => return Ok(value),
        Ok(None) => warn!("Broker: {} returned nothing, reconnecting", what),
        Err(e) => warn!("Broker: {} failed ({}), reconnecting", what, e),
    }

    if let Err(e) = broker.reconnect().await {
        return Err(DecisionError::ConnectivityLoss {
            reason: format!("reconnect failed during {}: {}", what, e),
        });
    }

    match op().await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(DecisionError::ConnectivityLoss {
            reason: format!("{} unavailable after reconnect", what),
        }),
        Err(e) => Err(DecisionError::ConnectivityLoss {
            reason: format!("{} failed after reconnect: {}", what, e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockBroker;
    use rust_decimal_macros::dec;

    fn account(margin_level: Decimal) -> AccountInfo {
        AccountInfo {
            balance: dec!(10000),
            equity: dec!(10000),
            margin_level,
            margin_free: dec!(9000),
            leverage: 30,
        }
    }

    fn manager() -> RiskManager {
        RiskManager::new(RiskEnvConfig::default())
    }

    #[test]
    fn test_margin_guard() {
        let rm = manager();
        assert!(!rm.can_trade(None));
        assert!(rm.can_trade(Some(&account(Decimal::ZERO))));
        assert!(!rm.can_trade(Some(&account(dec!(120)))));
        assert!(rm.can_trade(Some(&account(dec!(150)))));
        assert!(rm.can_trade(Some(&account(dec!(900)))));
    }

    #[test]
    fn test_spread_guard() {
        let rm = manager();
        let tight = Quote { bid: 1.10000, ask: 1.10010 };
        let wide = Quote { bid: 1.10000, ask: 1.10040 };
        assert!(rm.spread_ok("EURUSD", &tight, 0.00001));
        assert!(!rm.spread_ok("EURUSD", &wide, 0.00001));
    }

    #[test]
    fn test_cooldown() {
        let rm = manager();
        assert!(rm.cooldown_elapsed("EURUSD", None));
        assert!(!rm.cooldown_elapsed("EURUSD", Some(3.0)));
        assert!(rm.cooldown_elapsed("EURUSD", Some(15.0)));
    }

    #[tokio::test]
    async fn test_reconnect_recovers_single_failure() {
        let broker = MockBroker::new(account(Decimal::ZERO));
        broker.fail_next(1).await;

        let acct = with_single_reconnect(&broker, "account", || broker.get_account())
            .await
            .unwrap();
        assert_eq!(acct.balance, dec!(10000));
        assert_eq!(broker.reconnect_count().await, 1);
    }

    #[tokio::test]
    async fn test_second_failure_is_connectivity_loss() {
        let broker = MockBroker::new(account(Decimal::ZERO));
        broker.fail_next(2).await;

        let err = with_single_reconnect(&broker, "account", || broker.get_account())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connectivity_loss");
        assert_eq!(broker.reconnect_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_answer_retried_once() {
        let broker = MockBroker::new(account(Decimal::ZERO));
        let err = with_single_reconnect(&broker, "quote", || broker.get_quote("NOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::ConnectivityLoss { .. }));
        assert_eq!(broker.reconnect_count().await, 1);
    }
}
