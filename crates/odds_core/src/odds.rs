use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decimal odds as number or string. Anything outside (1.0, 1000] is not a price.
pub fn parse_odds(v: &Value) -> Option<f64> {
    let val = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if val > 1.0 && val <= 1000.0 {
        Some(val)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLabel {
    Home,
    Draw,
    Away,
}

impl OutcomeLabel {
    /// `1`/`X`/`2`, `Home`/`Draw`/`Away` and the `W1`/`W2` variants.
    pub fn classify(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "1" | "home" | "w1" | "1x2_1" => Some(Self::Home),
            "x" | "draw" | "1x2_x" => Some(Self::Draw),
            "2" | "away" | "w2" | "1x2_2" => Some(Self::Away),
            _ => None,
        }
    }
}

/// The three prices of a 1X2 market; `None` = missing or zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeWay {
    pub home: Option<f64>,
    pub draw: Option<f64>,
    pub away: Option<f64>,
}

impl ThreeWay {
    /// First price per label wins.
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut tw = Self::default();
        for (label, price) in outcomes {
            let slot = match OutcomeLabel::classify(label) {
                Some(OutcomeLabel::Home) => &mut tw.home,
                Some(OutcomeLabel::Draw) => &mut tw.draw,
                Some(OutcomeLabel::Away) => &mut tw.away,
                None => continue,
            };
            if slot.is_none() {
                *slot = parse_odds(price);
            }
        }
        tw
    }

    pub fn is_complete(&self) -> bool {
        self.home.is_some() && self.draw.is_some() && self.away.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.home.is_none() && self.draw.is_none() && self.away.is_none()
    }

    /// Bookmaker margin in percent (sum of implied probabilities - 100).
    pub fn margin_pct(&self) -> Option<f64> {
        let (h, d, a) = (self.home?, self.draw?, self.away?);
        Some((1.0 / h + 1.0 / d + 1.0 / a - 1.0) * 100.0)
    }
}
