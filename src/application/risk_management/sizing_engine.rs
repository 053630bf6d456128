use crate::config::RiskEnvConfig;
use crate::domain::ports::BrokerGateway;
use crate::domain::trading::types::{AccountInfo, InstrumentSpec, Side};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::{info, warn};

/// Price-derived quantities are rounded before entering lot arithmetic so binary
/// float noise (50 points becoming 49.999...) cannot cost a volume step.
/// `None` for NaN, infinities and magnitudes `Decimal` cannot hold.
fn to_decimal(value: f64, dp: u32) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(dp))
}

pub fn floor_to_step(lots: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return lots;
    }
    ((lots / step).floor() * step).normalize()
}

/// Risk-based position sizing in broker lots.
pub struct SizingEngine {
    config: RiskEnvConfig,
}

impl SizingEngine {
    pub fn new(config: RiskEnvConfig) -> Self {
        Self { config }
    }

    /// Lots that lose `risk_per_trade` of the balance when `stop` is hit, floored to the volume step.
    pub fn risk_lots(
        &self,
        account: &AccountInfo,
        spec: &InstrumentSpec,
        entry: f64,
        stop: f64,
    ) -> Decimal {
        let distance = (entry - stop).abs();
        if distance == 0.0 || !distance.is_finite() {
            return Decimal::ZERO;
        }

        let risk_amount = account.balance * self.config.risk_per_trade;
        let contract_size = if spec.contract_size.is_zero() {
            Decimal::ONE
        } else {
            spec.contract_size
        };

        let raw = if spec.tick_value.is_zero() || spec.point <= 0.0 {
            let Some(distance) = to_decimal(distance, 10).filter(|d| !d.is_zero()) else {
                return Decimal::ZERO;
            };
            risk_amount / distance / contract_size
        } else {
            let Some(stop_points) =
                to_decimal(distance / spec.point, 6).filter(|p| !p.is_zero())
            else {
                return Decimal::ZERO;
            };
            risk_amount / (stop_points * spec.tick_value)
        };

        info!(
            "SizingEngine [{}]: Risk ${} over {:.5} -> raw {} lots",
            spec.symbol,
            risk_amount.round_dp(2),
            distance,
            raw.round_dp(4)
        );

        floor_to_step(raw, spec.volume_step)
    }

    /// Margin estimate when the broker cannot compute one. `None` when `price` is not a usable number.
    pub fn fallback_margin(
        &self,
        lots: Decimal,
        spec: &InstrumentSpec,
        price: f64,
        leverage: u32,
    ) -> Option<Decimal> {
        let leverage = if leverage == 0 {
            self.config.default_leverage.max(1)
        } else {
            leverage
        };
        let contract_size = if spec.contract_size.is_zero() {
            Decimal::ONE
        } else {
            spec.contract_size
        };
        let price = to_decimal(price, 8)?;
        Some(lots * contract_size * price / Decimal::from(leverage))
    }

    /// Shrinks `lots` so the order uses at most `max_margin_usage` of free margin.
    pub fn cap_to_margin(
        &self,
        symbol: &str,
        lots: Decimal,
        required: Decimal,
        free_margin: Decimal,
        step: Decimal,
    ) -> Decimal {
        let allowed = free_margin * self.config.max_margin_usage;
        if required <= allowed || required <= Decimal::ZERO {
            return lots;
        }
        if allowed <= Decimal::ZERO {
            warn!(
                "SizingEngine [{}]: No free margin (need {}, free {})",
                symbol,
                required.round_dp(2),
                free_margin.round_dp(2)
            );
            return Decimal::ZERO;
        }

        let scaled = floor_to_step(lots * allowed / required, step);
        warn!(
            "SizingEngine [{}]: Margin for {} lots is {} but only {} usable, shrinking to {}",
            symbol,
            lots,
            required.round_dp(2),
            allowed.round_dp(2),
            scaled
        );
        scaled
    }

    /// Zero below the broker minimum; clamped to the maximum.
    pub fn apply_volume_limits(lots: Decimal, spec: &InstrumentSpec) -> Decimal {
        if lots < spec.volume_min || lots <= Decimal::ZERO {
            info!(
                "SizingEngine [{}]: {} lots is below minimum {}, skipping",
                spec.symbol, lots, spec.volume_min
            );
            return Decimal::ZERO;
        }
        if spec.volume_max > Decimal::ZERO && lots > spec.volume_max {
            return spec.volume_max;
        }
        lots
    }

    /// Full sizing pipeline: risk lots, margin check, volume limits.
    ///
    /// The broker is only consulted for its margin calculation; a failed call falls back
    /// to the leverage estimate.
    pub async fn size_position(
        &self,
        broker: &dyn BrokerGateway,
        account: &AccountInfo,
        spec: &InstrumentSpec,
        side: Side,
        entry: f64,
        stop: f64,
    ) -> Decimal {
        if !entry.is_finite() || !stop.is_finite() {
            warn!(
                "SizingEngine [{}]: Non-finite entry {} or stop {}, sizing 0 lots",
                spec.symbol, entry, stop
            );
            return Decimal::ZERO;
        }

        let lots = self.risk_lots(account, spec, entry, stop);
        if lots.is_zero() {
            return Decimal::ZERO;
        }

        let required = match broker.calc_margin(&spec.symbol, side, lots, entry).await {
            Ok(Some(margin)) => Some(margin),
            Ok(None) => self.fallback_margin(lots, spec, entry, account.leverage),
            Err(e) => {
                warn!(
                    "SizingEngine [{}]: Margin calculation failed ({}), using leverage estimate",
                    spec.symbol, e
                );
                self.fallback_margin(lots, spec, entry, account.leverage)
            }
        };
        let Some(required) = required else {
            warn!(
                "SizingEngine [{}]: No margin estimate at price {}, sizing 0 lots",
                spec.symbol, entry
            );
            return Decimal::ZERO;
        };

        let lots = self.cap_to_margin(
            &spec.symbol,
            lots,
            required,
            account.margin_free,
            spec.volume_step,
        );
        Self::apply_volume_limits(lots, spec)
    }
}
