//! Evaluation pipeline: resolve and fetch every leaf in
//! parallel, align onto a common grid, evaluate the AST pointwise, drop or
//! keep gaps, and normalize.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::align::{self, GridMode, Leg, DEFAULT_MAX_FILL_GAP};
use crate::bars::{Bar, BarSize, Range};
use crate::currency::{pair_token, Currency};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::series::{EngineResult, Point, ResultKind, Series};
use crate::symbol::Symbol;

use super::parser::{self, Expr, Op};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Norm {
    /// `norm=0`: percent change from the first defined value.
    Percent,
    /// `norm=K`: indexed to `K` at the first defined value (`K=100` for
    /// `norm=100`).
    IndexTo(f64),
}

pub struct EvalRequest {
    pub expr: String,
    pub range: Range,
    pub bar_size: BarSize,
    pub use_rth: bool,
    pub grid_mode: GridMode,
    pub include_gaps: bool,
    pub norm: Option<Norm>,
    pub ccy: Option<Currency>,
}

struct FetchedLeaf {
    symbol: Symbol,
    bars: Vec<Bar>,
    /// Present only when this leaf needed conversion to `req.ccy`.
    fx_bars: Option<Vec<Bar>>,
    back_adjusted: bool,
    rolled: bool,
}

/// Resolve and fetch every leaf, evaluate the AST pointwise, and return a
/// chart-shaped [`EngineResult`] for the expression's composite series.
pub async fn evaluate(engine: &Engine, req: &EvalRequest) -> Result<EngineResult> {
    let ast = parser::parse(&req.expr)?;
    let leaves = ast.collect_leaves();
    if leaves.is_empty() {
        return Err(Error::EmptyResult);
    }

    let fetched = fetch_leaves(engine, &leaves, req).await?;

    let step_secs = req.bar_size.seconds();
    let leg_timestamps: Vec<Vec<DateTime<Utc>>> =
        fetched.iter().map(|f| f.bars.iter().map(|b| b.t).collect()).collect();
    let grid = align::build_grid(&leg_timestamps, req.grid_mode);
    if grid.is_empty() {
        return Err(Error::EmptyResult);
    }

    let legs: Vec<Leg<'_>> = fetched.iter().map(|f| Leg { bars: &f.bars }).collect();
    let fx_legs: Vec<Option<Leg<'_>>> = fetched
        .iter()
        .map(|f| f.fx_bars.as_deref().map(|bars| Leg { bars }))
        .collect();

    let mut points = Vec::with_capacity(grid.len());
    for t in grid {
        let mut values: HashMap<String, Option<f64>> = HashMap::with_capacity(fetched.len());
        for (i, leaf) in fetched.iter().enumerate() {
            let raw = legs[i].value_at(t, step_secs, DEFAULT_MAX_FILL_GAP);
            let converted = match (raw, &fx_legs[i]) {
                (Some(v), Some(fx)) => fx
                    .value_at(t, step_secs, DEFAULT_MAX_FILL_GAP)
                    .map(|rate| v * rate),
                (Some(v), None) => Some(v),
                (None, _) => None,
            };
            values.insert(leaf.symbol.to_string(), converted);
        }
        let v = eval_ast(&ast, &values);
        if v.is_some() || req.include_gaps {
            points.push(Point { t, v });
        }
    }

    if let Some(norm) = req.norm {
        apply_norm(&mut points, norm);
    }

    let back_adjusted = fetched.iter().any(|f| f.back_adjusted);
    let rolled = fetched.iter().any(|f| f.rolled);

    Ok(EngineResult {
        kind: ResultKind::Chart,
        label: req.expr.clone(),
        series: vec![Series {
            label: req.expr.clone(),
            points,
        }],
        tables: None,
        warning: None,
        back_adjusted,
        rolled,
    })
}

async fn fetch_leaves(engine: &Engine, leaves: &[Symbol], req: &EvalRequest) -> Result<Vec<FetchedLeaf>> {
    let fetches = leaves
        .iter()
        .map(|sym| engine.fetch_leaf(sym, req.range, req.bar_size, req.use_rth));
    let resolved = futures::future::try_join_all(fetches).await?;

    let mut out = Vec::with_capacity(leaves.len());
    for (symbol, (chain, bars)) in leaves.iter().zip(resolved.into_iter()) {
        let fx_bars = match req.ccy {
            Some(target) => {
                let leaf_ccy = chain
                    .segments
                    .first()
                    .map(|s| s.contract.currency)
                    .unwrap_or(Currency::USDollar);
                if leaf_ccy == target {
                    None
                } else {
                    let fx_symbol: Symbol = pair_token(leaf_ccy, target)
                        .parse()
                        .map_err(|_| Error::Invariant("could not build fx pair token".into()))?;
                    let (_, fx) = engine.fetch_leaf(&fx_symbol, req.range, req.bar_size, false).await?;
                    Some(fx)
                }
            }
            None => None,
        };
        out.push(FetchedLeaf {
            symbol: symbol.clone(),
            bars,
            fx_bars,
            back_adjusted: chain.back_adjust,
            rolled: chain.rolled,
        });
    }
    Ok(out)
}

fn eval_ast(expr: &Expr, values: &HashMap<String, Option<f64>>) -> Option<f64> {
    match expr {
        Expr::Number(n) => Some(*n),
        Expr::Leaf(s) => values.get(&s.to_string()).copied().flatten(),
        Expr::Bin(lhs, op, rhs) => {
            let l = eval_ast(lhs, values)?;
            let r = eval_ast(rhs, values)?;
            match op {
                Op::Add => Some(l + r),
                Op::Sub => Some(l - r),
                Op::Mul => Some(l * r),
                Op::Div => {
                    if r == 0.0 {
                        None
                    } else {
                        Some(l / r)
                    }
                }
            }
        }
    }
}

fn apply_norm(points: &mut [Point], norm: Norm) {
    let Some(base) = points.iter().find_map(|p| p.v) else {
        return;
    };
    if base == 0.0 {
        return;
    }
    for p in points.iter_mut() {
        p.v = p.v.map(|v| match norm {
            Norm::Percent => (v - base) / base * 100.0,
            Norm::IndexTo(k) => v / base * k,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FakeUpstream;
    use chrono::TimeZone;

    fn range() -> Range {
        Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn request(expr: &str) -> EvalRequest {
        EvalRequest {
            expr: expr.to_owned(),
            range: range(),
            bar_size: BarSize::OneDay,
            use_rth: false,
            grid_mode: GridMode::Union,
            include_gaps: false,
            norm: None,
            ccy: None,
        }
    }

    #[tokio::test]
    async fn single_leaf_matches_raw_closes() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let result = evaluate(&engine, &request("EQ:AAPL")).await.unwrap();
        assert_eq!(result.series.len(), 1);
        assert!(!result.series[0].points.is_empty());
        assert!(result.series[0].points.windows(2).all(|w| w[0].t < w[1].t));
    }

    #[tokio::test]
    async fn sum_of_two_legs_matches_pointwise_addition() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let a = evaluate(&engine, &request("EQ:AAPL")).await.unwrap();
        let b = evaluate(&engine, &request("EQ:MSFT")).await.unwrap();
        let sum = evaluate(&engine, &request("EQ:AAPL+EQ:MSFT")).await.unwrap();

        let a_map: HashMap<_, _> = a.series[0].points.iter().map(|p| (p.t, p.v)).collect();
        let b_map: HashMap<_, _> = b.series[0].points.iter().map(|p| (p.t, p.v)).collect();
        for p in &sum.series[0].points {
            let expected = a_map.get(&p.t).copied().flatten().zip(b_map.get(&p.t).copied().flatten()).map(|(x, y)| x + y);
            assert_eq!(p.v, expected);
        }
    }

    #[tokio::test]
    async fn division_by_zero_is_dropped_by_default() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let result = evaluate(&engine, &request("EQ:AAPL/0")).await.unwrap();
        assert!(result.series[0].points.is_empty());
    }

    #[tokio::test]
    async fn include_gaps_keeps_null_points() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let mut req = request("EQ:AAPL/0");
        req.include_gaps = true;
        let result = evaluate(&engine, &req).await.unwrap();
        assert!(!result.series[0].points.is_empty());
        assert!(result.series[0].points.iter().all(|p| p.v.is_none()));
    }

    #[tokio::test]
    async fn percent_norm_starts_at_zero() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let mut req = request("EQ:AAPL");
        req.norm = Some(Norm::Percent);
        let result = evaluate(&engine, &req).await.unwrap();
        assert_eq!(result.series[0].points[0].v, Some(0.0));
    }

    #[tokio::test]
    async fn empty_expression_without_leaves_errors() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        assert!(matches!(evaluate(&engine, &request("2+3")).await, Err(Error::EmptyResult)));
    }
}
