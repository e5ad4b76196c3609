//! Bound-breach evaluation and return computation for a single forecast.

use chrono::{DateTime, Utc};

use crate::domain::forecast::{
    Direction, Forecast, MAX_CONFIDENCE, Outcome, Resolution, ResolutionMode,
};
use crate::domain::price::PriceReading;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub current_price: f64,
    pub resolution: Option<Resolution>,
}

/// Decide whether `forecast` leaves the open state given `reading`.
///
/// The ceiling is checked before the floor, so a reading that breaches both
/// settles at the ceiling. Forecasts that are already resolved only get their
/// current price refreshed.
pub fn evaluate(forecast: &Forecast, reading: &PriceReading, now: DateTime<Utc>) -> Evaluation {
    let current_price = reading.current;
    if !forecast.status.is_open() {
        return Evaluation {
            current_price,
            resolution: None,
        };
    }

    let breach = if reading.daily_high >= forecast.ceiling || reading.current >= forecast.ceiling {
        let outcome = match forecast.direction {
            Direction::Up => Outcome::Success,
            Direction::Down => Outcome::Fail,
        };
        Some((outcome, forecast.ceiling))
    } else if reading.daily_low <= forecast.floor || reading.current <= forecast.floor {
        let outcome = match forecast.direction {
            Direction::Up => Outcome::Fail,
            Direction::Down => Outcome::Success,
        };
        Some((outcome, forecast.floor))
    } else {
        None
    };

    Evaluation {
        current_price,
        resolution: breach.map(|(outcome, end_price)| settle(forecast, outcome, end_price, now)),
    }
}

/// Build the settlement for `forecast` at `end_price` from its own start
/// price, direction and confidence.
pub fn settle(
    forecast: &Forecast,
    outcome: Outcome,
    end_price: f64,
    at: DateTime<Utc>,
) -> Resolution {
    let (profit_rate, profit_rate_adjusted) = profit_rates(
        forecast.direction,
        forecast.start_price,
        end_price,
        forecast.confidence,
    );
    Resolution {
        outcome,
        mode: ResolutionMode::Auto,
        end_price,
        profit_rate,
        profit_rate_adjusted,
        resolved_at: at,
    }
}

/// Percentage return and its confidence-scaled variant.
pub fn profit_rates(
    direction: Direction,
    start_price: f64,
    end_price: f64,
    confidence: u8,
) -> (f64, f64) {
    let profit_rate = match direction {
        Direction::Up => (end_price - start_price) / start_price * 100.0,
        Direction::Down => (start_price - end_price) / start_price * 100.0,
    };
    let adjusted = profit_rate * confidence as f64 / MAX_CONFIDENCE as f64;
    (profit_rate, adjusted)
}
