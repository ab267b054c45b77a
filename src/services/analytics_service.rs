//! Analytics Service
//!
//! Portfolio valuation and risk metrics computed from daily closes.

use crate::db::cache::models::DailyBar;
use crate::db::sqlite::models::Portfolio;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trading days per year, used to annualise
const TRADING_DAYS: f64 = 252.0;
/// Bars back used as cost basis, and the length of the value history
pub const LOOKBACK_DAYS: usize = 30;

/// Valuation of one holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    pub ticker: String,
    pub shares: u32,
    pub current_price: f64,
    /// Percent change from the previous close
    pub day_change: f64,
    pub position_value: f64,
    pub cost_basis: f64,
}

/// Risk metrics over the value history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub sharpe: f64,
    /// Annualised, percent
    pub volatility: f64,
    pub beta: f64,
    /// Worst peak-to-trough decline, percent (zero or negative)
    pub max_drawdown: f64,
}

/// Everything the report document shows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub report_id: i64,
    pub batch_no: i64,
    pub generated_at: String,
    pub positions: Vec<PositionMetrics>,
    pub total_value: f64,
    pub total_cost: f64,
    pub daily_pnl: f64,
    /// Percent
    pub overall_return: f64,
    /// Daily portfolio values, oldest first
    pub history: Vec<f64>,
    pub metrics: RiskMetrics,
}

/// Analytics service
pub struct AnalyticsService;

impl AnalyticsService {
    /// Value every non-benchmark holding that has data
    pub fn position_metrics(
        portfolio: &Portfolio,
        data: &HashMap<String, Vec<DailyBar>>,
        benchmark: &str,
    ) -> Vec<PositionMetrics> {
        portfolio
            .iter()
            .filter(|(ticker, _)| *ticker != benchmark)
            .filter_map(|(ticker, shares)| {
                let bars = data.get(ticker).filter(|bars| !bars.is_empty())?;
                let len = bars.len();

                let current_price = bars[len - 1].close;
                let day_change = if len >= 2 && bars[len - 2].close != 0.0 {
                    let prev_close = bars[len - 2].close;
                    (current_price - prev_close) / prev_close * 100.0
                } else {
                    0.0
                };

                let cost_basis_price = if len >= LOOKBACK_DAYS {
                    bars[len - LOOKBACK_DAYS].close
                } else {
                    bars[0].close
                };

                Some(PositionMetrics {
                    ticker: ticker.to_string(),
                    shares,
                    current_price,
                    day_change,
                    position_value: current_price * shares as f64,
                    cost_basis: cost_basis_price * shares as f64,
                })
            })
            .collect()
    }

    /// Summed daily value of the non-benchmark holdings over the last
    /// `min(days, shortest series)` bars, oldest first
    pub fn portfolio_history(
        portfolio: &Portfolio,
        data: &HashMap<String, Vec<DailyBar>>,
        benchmark: &str,
        days: usize,
    ) -> Vec<f64> {
        let series: Vec<(&[DailyBar], f64)> = portfolio
            .iter()
            .filter(|(ticker, _)| *ticker != benchmark)
            .filter_map(|(ticker, shares)| {
                data.get(ticker)
                    .map(|bars| (bars.as_slice(), shares as f64))
            })
            .collect();

        let Some(shortest) = series.iter().map(|(bars, _)| bars.len()).min() else {
            return Vec::new();
        };
        let days = days.min(shortest);

        (0..days)
            .map(|i| {
                let back = days - i;
                series
                    .iter()
                    .map(|(bars, shares)| bars[bars.len() - back].close * shares)
                    .sum()
            })
            .collect()
    }

    /// Period-over-period returns; steps from a zero value are skipped
    pub fn returns(values: &[f64]) -> Vec<f64> {
        values
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect()
    }

    /// Sharpe, volatility, beta and max drawdown of a value history.
    ///
    /// `benchmark` is the benchmark's bars, if it was part of the portfolio.
    pub fn risk_metrics(history: &[f64], benchmark: Option<&[DailyBar]>) -> RiskMetrics {
        let returns = Self::returns(history);

        let (sharpe, volatility) = match std_dev(&returns) {
            Some(std) if std != 0.0 => (
                mean(&returns) / std * TRADING_DAYS.sqrt(),
                std * TRADING_DAYS.sqrt() * 100.0,
            ),
            _ => (0.0, 0.0),
        };

        let beta = benchmark
            .map(|bars| {
                let start = bars.len().saturating_sub(history.len());
                let closes: Vec<f64> = bars[start..].iter().map(|b| b.close).collect();
                Self::beta(&returns, &Self::returns(&closes))
            })
            .unwrap_or(1.0);

        RiskMetrics {
            sharpe,
            volatility,
            beta,
            max_drawdown: Self::max_drawdown(&returns),
        }
    }

    /// Sample covariance over sample variance of the tail-aligned series;
    /// 1.0 when undefined
    pub fn beta(returns: &[f64], benchmark_returns: &[f64]) -> f64 {
        let n = returns.len().min(benchmark_returns.len());
        if n < 2 {
            return 1.0;
        }

        let r = &returns[returns.len() - n..];
        let b = &benchmark_returns[benchmark_returns.len() - n..];

        let (mean_r, mean_b) = (mean(r), mean(b));
        let covariance = r
            .iter()
            .zip(b)
            .map(|(x, y)| (x - mean_r) * (y - mean_b))
            .sum::<f64>()
            / (n - 1) as f64;
        let variance = b.iter().map(|y| (y - mean_b).powi(2)).sum::<f64>() / (n - 1) as f64;

        if variance == 0.0 {
            1.0
        } else {
            covariance / variance
        }
    }

    /// Minimum drawdown of the compounded return curve, percent
    pub fn max_drawdown(returns: &[f64]) -> f64 {
        let mut cumulative: f64 = 1.0;
        let mut running_max = f64::MIN;
        let mut worst: f64 = 0.0;

        for r in returns {
            cumulative *= 1.0 + r;
            running_max = running_max.max(cumulative);
            worst = worst.min((cumulative - running_max) / running_max);
        }

        worst * 100.0
    }

    fn previous_close(data: &HashMap<String, Vec<DailyBar>>, ticker: &str) -> f64 {
        data.get(ticker)
            .and_then(|bars| bars.len().checked_sub(2).map(|i| bars[i].close))
            .unwrap_or(0.0)
    }

    /// Assemble the full report from fetched data
    pub fn build_report(
        report_id: i64,
        batch_no: i64,
        portfolio: &Portfolio,
        data: &HashMap<String, Vec<DailyBar>>,
        benchmark: &str,
    ) -> PortfolioReport {
        let positions = Self::position_metrics(portfolio, data, benchmark);
        let total_value: f64 = positions.iter().map(|p| p.position_value).sum();
        let total_cost: f64 = positions.iter().map(|p| p.cost_basis).sum();

        // Value at the previous close
        let previous_value: f64 = positions
            .iter()
            .map(|p| {
                let factor = 1.0 + p.day_change / 100.0;
                if factor > 0.0 {
                    p.position_value / factor
                } else {
                    // Close fell to zero; the percent change cannot be inverted
                    Self::previous_close(data, &p.ticker) * p.shares as f64
                }
            })
            .sum();
        let overall_return = if total_cost > 0.0 {
            (total_value - total_cost) / total_cost * 100.0
        } else {
            0.0
        };

        let history = Self::portfolio_history(portfolio, data, benchmark, LOOKBACK_DAYS);
        let metrics = Self::risk_metrics(
            &history,
            data.get(benchmark).map(|bars| bars.as_slice()),
        );

        PortfolioReport {
            report_id,
            batch_no,
            generated_at: crate::db::timestamp_now(),
            positions,
            total_value,
            total_cost,
            daily_pnl: total_value - previous_value,
            overall_return,
            history,
            metrics,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; None below two points
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn bars(closes: &[f64]) -> Vec<DailyBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| DailyBar {
                date: format!("2024-01-{:02}", i + 1),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: 100,
            })
            .collect()
    }

    fn portfolio(pairs: &[(&str, i64)]) -> Portfolio {
        let raw: BTreeMap<String, i64> = pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect();
        Portfolio::try_from(raw).unwrap()
    }

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_position_value_and_cost_basis() {
        let aapl: Vec<f64> = (1..=35).map(|i| i as f64).collect();
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), bars(&aapl));
        data.insert("SPY".to_string(), bars(&[400.0, 401.0]));

        let positions =
            AnalyticsService::position_metrics(&portfolio(&[("AAPL", 9), ("SPY", 20)]), &data, "SPY");

        // Benchmark is not valued
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert_eq!(p.current_price, 35.0);
        assert_eq!(p.position_value, 35.0 * 9.0);
        // 30 bars back from the end of 35 bars is index 5, close 6.0
        assert_eq!(p.cost_basis, 6.0 * 9.0);
        assert!(close_to(p.day_change, (35.0 - 34.0) / 34.0 * 100.0));
    }

    #[test]
    fn test_cost_basis_short_series_uses_first_bar() {
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), bars(&[10.0, 11.0, 12.0]));

        let positions =
            AnalyticsService::position_metrics(&portfolio(&[("AAPL", 9)]), &data, "SPY");
        assert_eq!(positions[0].cost_basis, 90.0);
    }

    #[test]
    fn test_single_bar_has_no_day_change() {
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), bars(&[10.0]));

        let positions =
            AnalyticsService::position_metrics(&portfolio(&[("AAPL", 1)]), &data, "SPY");
        assert_eq!(positions[0].day_change, 0.0);
    }

    #[test]
    fn test_history_bounded_by_shortest_series() {
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), bars(&[1.0, 2.0, 3.0, 4.0]));
        data.insert("MSFT".to_string(), bars(&[10.0, 20.0]));
        data.insert("SPY".to_string(), bars(&[1.0; 40]));

        let history = AnalyticsService::portfolio_history(
            &portfolio(&[("AAPL", 1), ("MSFT", 2), ("SPY", 5)]),
            &data,
            "SPY",
            30,
        );
        assert_eq!(history, vec![3.0 + 20.0, 4.0 + 40.0]);
    }

    #[test]
    fn test_sharpe_zero_variance_is_zero() {
        let flat = vec![100.0; 10];
        let metrics = AnalyticsService::risk_metrics(&flat, None);
        assert_eq!(metrics.sharpe, 0.0);
        assert_eq!(metrics.volatility, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn test_sharpe_and_volatility() {
        let history = vec![100.0, 110.0, 99.0];
        let metrics = AnalyticsService::risk_metrics(&history, None);

        // Returns 0.1 and -0.1: mean 0, sample std sqrt(0.02)
        let std = 0.02f64.sqrt();
        assert!(close_to(metrics.sharpe, 0.0));
        assert!(close_to(metrics.volatility, std * 252f64.sqrt() * 100.0));
    }

    #[test]
    fn test_beta_fallbacks() {
        assert_eq!(AnalyticsService::beta(&[0.01], &[0.02]), 1.0);
        assert_eq!(AnalyticsService::beta(&[], &[]), 1.0);
        // Zero benchmark variance
        assert_eq!(AnalyticsService::beta(&[0.01, 0.02, 0.03], &[0.01, 0.01, 0.01]), 1.0);

        // No benchmark in the data
        let metrics = AnalyticsService::risk_metrics(&[1.0, 2.0, 3.0], None);
        assert_eq!(metrics.beta, 1.0);
    }

    #[test]
    fn test_beta_of_scaled_series() {
        let benchmark = [0.01, -0.02, 0.03, 0.005];
        let doubled: Vec<f64> = benchmark.iter().map(|r| r * 2.0).collect();
        assert!(close_to(AnalyticsService::beta(&doubled, &benchmark), 2.0));

        // Tail alignment: extra leading benchmark returns are ignored
        let longer = [0.5, 0.01, -0.02, 0.03, 0.005];
        assert!(close_to(AnalyticsService::beta(&doubled, &longer), 2.0));
    }

    #[test]
    fn test_max_drawdown() {
        // 100 -> 120 -> 90 -> 130: worst is 90 from a peak of 120
        let returns = AnalyticsService::returns(&[100.0, 120.0, 90.0, 130.0]);
        assert!(close_to(AnalyticsService::max_drawdown(&returns), -25.0));
        assert_eq!(AnalyticsService::max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_returns_skip_zero_values() {
        assert_eq!(AnalyticsService::returns(&[0.0, 10.0, 20.0]), vec![1.0]);
        assert!(AnalyticsService::returns(&[5.0]).is_empty());
    }

    #[test]
    fn test_build_report_summary() {
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), bars(&[100.0, 110.0]));
        data.insert("SPY".to_string(), bars(&[400.0, 404.0]));

        let report = AnalyticsService::build_report(
            1,
            2,
            &portfolio(&[("AAPL", 9), ("SPY", 20)]),
            &data,
            "SPY",
        );

        assert_eq!(report.total_value, 990.0);
        assert_eq!(report.total_cost, 900.0);
        assert!(close_to(report.daily_pnl, 90.0));
        assert!(close_to(report.overall_return, 10.0));
        assert_eq!(report.history, vec![900.0, 990.0]);
        // One aligned return point: beta falls back
        assert_eq!(report.metrics.beta, 1.0);
    }

    #[test]
    fn test_daily_pnl_when_close_drops_to_zero() {
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), bars(&[50.0, 0.0]));
        data.insert("MSFT".to_string(), bars(&[10.0, 12.0]));

        let report = AnalyticsService::build_report(
            1,
            2,
            &portfolio(&[("AAPL", 4), ("MSFT", 5)]),
            &data,
            "SPY",
        );

        assert_eq!(report.positions[0].day_change, -100.0);
        assert!(report.daily_pnl.is_finite());
        // AAPL lost 4 x 50, MSFT gained 5 x 2
        assert!(close_to(report.daily_pnl, -190.0));
    }
}
