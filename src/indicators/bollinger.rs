//! Bollinger bands: `mid = SMA(N)`, `upper/lower = mid ± sigma *
//! sample-stdev` over the same window.

use crate::series::{Point, Series};

use super::moving_average::sma;

pub struct Bollinger {
    pub mid: Series,
    pub upper: Series,
    pub lower: Series,
}

pub fn bollinger(points: &[Point], window: usize, sigma: f64) -> Bollinger {
    let mid = sma(points, window);
    let mut upper = Vec::with_capacity(points.len());
    let mut lower = Vec::with_capacity(points.len());

    for i in 0..points.len() {
        let band = if i + 1 < window {
            None
        } else {
            let slice = &points[i + 1 - window..=i];
            match mid[i].v {
                Some(mean) if slice.iter().all(|p| p.v.is_some()) => {
                    let variance = slice
                        .iter()
                        .map(|p| {
                            let d = p.v.unwrap() - mean;
                            d * d
                        })
                        .sum::<f64>()
                        / (window as f64 - 1.0).max(1.0);
                    Some(variance.sqrt())
                }
                _ => None,
            }
        };
        let t = points[i].t;
        match (mid[i].v, band) {
            (Some(m), Some(sd)) => {
                upper.push(Point { t, v: Some(m + sigma * sd) });
                lower.push(Point { t, v: Some(m - sigma * sd) });
            }
            _ => {
                upper.push(Point { t, v: None });
                lower.push(Point { t, v: None });
            }
        }
    }

    Bollinger {
        mid: Series { label: "mid".into(), points: mid },
        upper: Series { label: "upper".into(), points: upper },
        lower: Series { label: "lower".into(), points: lower },
    }
}
