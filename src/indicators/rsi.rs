//! Wilder's RSI: first value defined at index `period` (the
//! `period + 1`-th bar), since it needs `period` consecutive price changes.

use crate::series::{Point, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bands {
    Classic,
    None,
}

pub struct Rsi {
    pub rsi: Series,
    pub overbought: Option<Series>,
    pub oversold: Option<Series>,
}

pub fn rsi(points: &[Point], period: usize, bands: Bands) -> Rsi {
    let mut values = vec![None; points.len()];
    if period > 0 {
        let mut sum_gain = 0.0;
        let mut sum_loss = 0.0;
        let mut avg_gain = 0.0;
        let mut avg_loss = 0.0;
        let mut count = 0_usize;
        let mut warmed_up = false;

        for i in 1..points.len() {
            let (Some(prev), Some(curr)) = (points[i - 1].v, points[i].v) else {
                sum_gain = 0.0;
                sum_loss = 0.0;
                count = 0;
                warmed_up = false;
                continue;
            };
            let change = curr - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);

            if !warmed_up {
                sum_gain += gain;
                sum_loss += loss;
                count += 1;
                if count < period {
                    continue;
                }
                avg_gain = sum_gain / period as f64;
                avg_loss = sum_loss / period as f64;
                warmed_up = true;
            } else {
                avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
                avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
            }

            values[i] = Some(if avg_loss == 0.0 {
                100.0
            } else {
                let rs = avg_gain / avg_loss;
                100.0 - 100.0 / (1.0 + rs)
            });
        }
    }

    let rsi_points: Vec<Point> = points.iter().zip(values).map(|(p, v)| Point { t: p.t, v }).collect();
    let rsi_series = Series { label: "rsi".into(), points: rsi_points };

    let (overbought, oversold) = match bands {
        Bands::Classic => (
            Some(Series::constant("overbought", &rsi_series, 70.0)),
            Some(Series::constant("oversold", &rsi_series, 30.0)),
        ),
        Bands::None => (None, None),
    };

    Rsi {
        rsi: rsi_series,
        overbought,
        oversold,
    }
}
