//! Black-Scholes Pricing
//!
//! European call/put valuation, vega, and a Newton-Raphson implied-volatility
//! solver. All entry points validate their inputs and return
//! [`SignalError::Domain`] instead of producing NaN from `ln`/`sqrt` of
//! non-positive values.
//!
//! ```text
//! d1 = [ln(S/K) + (r + σ²/2)T] / (σ√T)      d2 = d1 - σ√T
//! C  = S·N(d1) - K·e^(-rT)·N(d2)
//! P  = K·e^(-rT)·N(-d2) - S·N(-d1)
//! ν  = S·φ(d1)·√T
//! ```

use crate::engine::config::PricingConfig;
use crate::engine::error::SignalError;
use crate::engine::events::OptionType;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Initial volatility guess for the Newton-Raphson solver.
pub const IV_INITIAL_GUESS: f64 = 0.20;

/// Vega below which a Newton step is refused.
pub const VEGA_FLOOR: f64 = 1e-8;

fn standard_normal() -> Result<Normal, SignalError> {
    Normal::new(0.0, 1.0).map_err(|e| SignalError::numeric(format!("standard normal: {}", e)))
}

fn check_inputs(spot: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> Result<(), SignalError> {
    if !(spot.is_finite() && spot > 0.0) {
        return Err(SignalError::domain(format!("spot must be positive, got {}", spot)));
    }
    if !(strike.is_finite() && strike > 0.0) {
        return Err(SignalError::domain(format!("strike must be positive, got {}", strike)));
    }
    if !(time.is_finite() && time > 0.0) {
        return Err(SignalError::domain(format!(
            "time to expiry must be positive, got {}",
            time
        )));
    }
    if !rate.is_finite() {
        return Err(SignalError::domain(format!("rate must be finite, got {}", rate)));
    }
    if !(volatility.is_finite() && volatility > 0.0) {
        return Err(SignalError::domain(format!(
            "volatility must be positive, got {}",
            volatility
        )));
    }
    Ok(())
}

#[inline]
fn d1_d2(spot: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> (f64, f64) {
    let vol_sqrt_t = volatility * time.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * volatility * volatility) * time) / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

/// European call price.
pub fn call_price(spot: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> Result<f64, SignalError> {
    check_inputs(spot, strike, time, rate, volatility)?;
    let n = standard_normal()?;
    let (d1, d2) = d1_d2(spot, strike, time, rate, volatility);
    Ok(spot * n.cdf(d1) - strike * (-rate * time).exp() * n.cdf(d2))
}

/// European put price (direct closed form).
pub fn put_price(spot: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> Result<f64, SignalError> {
    check_inputs(spot, strike, time, rate, volatility)?;
    let n = standard_normal()?;
    let (d1, d2) = d1_d2(spot, strike, time, rate, volatility);
    Ok(strike * (-rate * time).exp() * n.cdf(-d2) - spot * n.cdf(-d1))
}

/// Price for either right.
pub fn option_price(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    volatility: f64,
) -> Result<f64, SignalError> {
    match option_type {
        OptionType::Call => call_price(spot, strike, time, rate, volatility),
        OptionType::Put => put_price(spot, strike, time, rate, volatility),
    }
}

/// ∂price/∂σ, identical for calls and puts.
pub fn vega(spot: f64, strike: f64, time: f64, rate: f64, volatility: f64) -> Result<f64, SignalError> {
    check_inputs(spot, strike, time, rate, volatility)?;
    let n = standard_normal()?;
    let (d1, _) = d1_d2(spot, strike, time, rate, volatility);
    Ok(spot * n.pdf(d1) * time.sqrt())
}

/// Solver result. `converged == false` means the iteration limit was hit and
/// `volatility` is the last iterate, which callers must not treat as exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpliedVol {
    pub volatility: f64,
    pub converged: bool,
    pub iterations: u32,
}

/// Invert the model for volatility with Newton-Raphson from
/// [`IV_INITIAL_GUESS`].
///
/// # Errors
/// - `Domain` for invalid market inputs or a negative observed price.
/// - `Numeric` when vega falls below [`VEGA_FLOOR`] or an iterate leaves
///   `(0, ∞)`.
#[allow(clippy::too_many_arguments)]
pub fn implied_volatility(
    observed_price: f64,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    option_type: OptionType,
    tolerance: f64,
    max_iterations: u32,
) -> Result<ImpliedVol, SignalError> {
    if !(observed_price.is_finite() && observed_price >= 0.0) {
        return Err(SignalError::domain(format!(
            "observed price must be non-negative, got {}",
            observed_price
        )));
    }
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(SignalError::domain(format!(
            "tolerance must be positive, got {}",
            tolerance
        )));
    }
    check_inputs(spot, strike, time, rate, IV_INITIAL_GUESS)?;

    let mut sigma = IV_INITIAL_GUESS;
    for i in 0..max_iterations {
        let model = option_price(option_type, spot, strike, time, rate, sigma)?;
        let diff = model - observed_price;
        if diff.abs() < tolerance {
            return Ok(ImpliedVol {
                volatility: sigma,
                converged: true,
                iterations: i,
            });
        }

        let v = vega(spot, strike, time, rate, sigma)?;
        if v.abs() < VEGA_FLOOR {
            return Err(SignalError::numeric(format!(
                "vega {:.3e} below floor at sigma={:.6} after {} iterations",
                v, sigma, i
            )));
        }

        sigma -= diff / v;
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(SignalError::numeric(format!(
                "newton step left the positive domain (sigma={}) after {} iterations",
                sigma,
                i + 1
            )));
        }
    }

    Ok(ImpliedVol {
        volatility: sigma,
        converged: false,
        iterations: max_iterations,
    })
}

/// Model bound to one run's rate/volatility assumptions.
#[derive(Debug, Clone)]
pub struct PricingModel {
    config: PricingConfig,
}

impl PricingModel {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Fair value with the configured rate and volatility.
    pub fn theoretical_price(
        &self,
        option_type: OptionType,
        spot: f64,
        strike: f64,
        time: f64,
    ) -> Result<f64, SignalError> {
        option_price(
            option_type,
            spot,
            strike,
            time,
            self.config.risk_free_rate,
            self.config.volatility,
        )
    }

    /// Implied volatility with the configured solver settings.
    pub fn implied_volatility(
        &self,
        observed_price: f64,
        option_type: OptionType,
        spot: f64,
        strike: f64,
        time: f64,
    ) -> Result<ImpliedVol, SignalError> {
        implied_volatility(
            observed_price,
            spot,
            strike,
            time,
            self.config.risk_free_rate,
            option_type,
            self.config.iv_tolerance,
            self.config.iv_max_iterations,
        )
    }
}

impl Default for PricingModel {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_call_price() {
        // S=100, K=100, T=1, r=3%, σ=15%
        let c = call_price(100.0, 100.0, 1.0, 0.03, 0.15).unwrap();
        assert!((c - 7.49).abs() < 0.05, "call price {}", c);
    }

    #[test]
    fn test_put_call_parity() {
        let cases = [
            (100.0, 100.0, 1.0, 0.03, 0.15),
            (4700.0, 4500.0, 0.25, 0.05, 0.12),
            (50.0, 80.0, 2.0, 0.01, 0.6),
            (100.0, 60.0, 0.05, 0.0, 0.3),
            (250.0, 255.0, 30.0 / 365.25, -0.005, 0.9),
        ];
        for (s, k, t, r, v) in cases {
            let c = call_price(s, k, t, r, v).unwrap();
            let p = put_price(s, k, t, r, v).unwrap();
            let forward_gap = s - k * (-r * t).exp();
            let tol = 1e-6 * forward_gap.abs().max(1.0);
            assert!(
                ((c - p) - forward_gap).abs() < tol,
                "parity failed for {:?}: c={} p={}",
                (s, k, t, r, v),
                c,
                p
            );
        }
    }

    #[test]
    fn test_domain_errors() {
        assert!(matches!(call_price(0.0, 100.0, 1.0, 0.03, 0.15), Err(SignalError::Domain { .. })));
        assert!(matches!(call_price(100.0, 0.0, 1.0, 0.03, 0.15), Err(SignalError::Domain { .. })));
        assert!(matches!(put_price(100.0, 100.0, 0.0, 0.03, 0.15), Err(SignalError::Domain { .. })));
        assert!(matches!(put_price(100.0, 100.0, -1.0, 0.03, 0.15), Err(SignalError::Domain { .. })));
        assert!(matches!(vega(100.0, 100.0, 1.0, 0.03, 0.0), Err(SignalError::Domain { .. })));
        assert!(matches!(call_price(100.0, 100.0, 1.0, f64::NAN, 0.15), Err(SignalError::Domain { .. })));
    }

    #[test]
    fn test_vega_matches_finite_difference() {
        let (s, k, t, r, v) = (100.0, 105.0, 0.5, 0.02, 0.25);
        let h = 1e-5;
        let bumped = (call_price(s, k, t, r, v + h).unwrap() - call_price(s, k, t, r, v - h).unwrap()) / (2.0 * h);
        let analytic = vega(s, k, t, r, v).unwrap();
        assert!((bumped - analytic).abs() < 1e-4, "fd={} analytic={}", bumped, analytic);
    }

    #[test]
    fn test_implied_vol_round_trip() {
        let (s, k, t, r) = (100.0, 100.0, 1.0, 0.03);
        let mut sigma = 0.05;
        while sigma <= 1.0 + 1e-12 {
            for option_type in [OptionType::Call, OptionType::Put] {
                let price = option_price(option_type, s, k, t, r, sigma).unwrap();
                let iv = implied_volatility(price, s, k, t, r, option_type, 1e-8, 100).unwrap();
                assert!(iv.converged, "no convergence at sigma={}", sigma);
                assert!(
                    (iv.volatility - sigma).abs() < 1e-4,
                    "{:?} sigma={} recovered={}",
                    option_type,
                    sigma,
                    iv.volatility
                );
            }
            sigma += 0.05;
        }
    }

    #[test]
    fn test_implied_vol_off_the_money() {
        for (k, sigma) in [(90.0, 0.2), (110.0, 0.3), (95.0, 0.5), (105.0, 0.8)] {
            let price = call_price(100.0, k, 0.5, 0.03, sigma).unwrap();
            let iv = implied_volatility(price, 100.0, k, 0.5, 0.03, OptionType::Call, 1e-8, 100).unwrap();
            assert!(iv.converged);
            assert!((iv.volatility - sigma).abs() < 1e-4, "k={} recovered={}", k, iv.volatility);
        }
    }

    #[test]
    fn test_implied_vol_reports_non_convergence() {
        let target = call_price(100.0, 100.0, 1.0, 0.03, 0.6).unwrap();
        let iv = implied_volatility(target, 100.0, 100.0, 1.0, 0.03, OptionType::Call, 1e-10, 1).unwrap();
        assert!(!iv.converged);
        assert_eq!(iv.iterations, 1);
        assert!(iv.volatility > IV_INITIAL_GUESS);
    }

    #[test]
    fn test_implied_vol_vega_underflow_is_numeric_error() {
        // Deep out of the money with almost no time left: vega ≈ 0
        let err = implied_volatility(1.0, 100.0, 1000.0, 0.001, 0.03, OptionType::Call, 1e-8, 100)
            .unwrap_err();
        assert!(matches!(err, SignalError::Numeric { .. }), "got {:?}", err);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_implied_vol_domain_errors() {
        assert!(matches!(
            implied_volatility(-1.0, 100.0, 100.0, 1.0, 0.03, OptionType::Call, 1e-8, 100),
            Err(SignalError::Domain { .. })
        ));
        assert!(matches!(
            implied_volatility(5.0, 100.0, 100.0, 0.0, 0.03, OptionType::Put, 1e-8, 100),
            Err(SignalError::Domain { .. })
        ));
    }

    #[test]
    fn test_model_uses_configured_parameters() {
        let model = PricingModel::default();
        let direct = call_price(100.0, 100.0, 1.0, 0.03, 0.15).unwrap();
        let via_model = model.theoretical_price(OptionType::Call, 100.0, 100.0, 1.0).unwrap();
        assert_eq!(direct, via_model);

        let iv = model.implied_volatility(direct, OptionType::Call, 100.0, 100.0, 1.0).unwrap();
        assert!((iv.volatility - 0.15).abs() < 1e-6);
    }
}
