//! Trade signal emitted by the rule engine.

use serde::{Deserialize, Serialize};

/// Discrete action chosen for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Short,
    Hold,
    OptionSellStraddle,
    OptionBuyAtm,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Short => "SHORT",
            TradeAction::Hold => "HOLD",
            TradeAction::OptionSellStraddle => "OPTION_SELL_STRADDLE",
            TradeAction::OptionBuyAtm => "OPTION_BUY_ATM",
        }
    }

    /// True for plain directional trades in the underlying.
    pub fn is_directional(&self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Short)
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one decision. Built fresh per call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: TradeAction,

    /// Larger of the two directional probabilities
    pub probability: f64,

    /// Forecast move echoed from the inputs
    pub predicted_move_pct: f64,

    /// Integer percent, 0 to 100
    pub confidence: u8,

    /// Fraction of capital to commit, capped by the Kelly cap
    pub size_fraction: f64,

    /// Stop distance in percent (non-positive)
    pub stop_loss_pct: f64,

    /// Target distance in percent (non-negative)
    pub target_pct: f64,

    /// Which rules fired, `; `-joined
    pub rationale: String,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^60}", " SIGNAL ")?;
        writeln!(f, "Action:       {}", self.action)?;
        writeln!(f, "Probability:  {:.3}", self.probability)?;
        writeln!(f, "Confidence:   {}%", self.confidence)?;
        writeln!(f, "Pred. Move:   {:.3}%", self.predicted_move_pct)?;
        writeln!(f, "Size:         {:.2}% of capital", self.size_fraction * 100.0)?;
        writeln!(f, "Stop Loss:    {:.3}%", self.stop_loss_pct)?;
        writeln!(f, "Target:       {:.3}%", self.target_pct)?;
        writeln!(f, "Rationale:    {}", self.rationale)?;
        write!(f, "{:=^60}", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serializes_as_wire_name() {
        let json = serde_json::to_string(&TradeAction::OptionSellStraddle).unwrap();
        assert_eq!(json, "\"OPTION_SELL_STRADDLE\"");

        let parsed: TradeAction = serde_json::from_str("\"OPTION_BUY_ATM\"").unwrap();
        assert_eq!(parsed, TradeAction::OptionBuyAtm);
        assert_eq!(parsed.as_str(), "OPTION_BUY_ATM");
    }

    #[test]
    fn test_signal_is_flat_mapping() {
        let signal = Signal {
            action: TradeAction::Hold,
            probability: 0.5,
            predicted_move_pct: 0.0,
            confidence: 50,
            size_fraction: 0.0,
            stop_loss_pct: 0.0,
            target_pct: 0.0,
            rationale: "No edge".to_string(),
        };

        let value = serde_json::to_value(&signal).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        assert_eq!(obj["action"], "HOLD");
        assert_eq!(obj["confidence"], 50);
        assert_eq!(obj["rationale"], "No edge");
    }
}
