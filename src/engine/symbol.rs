//! Contract Identifier Codec
//!
//! Decodes exchange-style option identifiers of the form
//! `<ROOT> <YYMMDD><TYPE><STRIKE>` (e.g. `SPX   240119C04700000`) into
//! [`ContractTerms`], and re-encodes terms into the canonical padded form.
//!
//! The tail is fixed-width and read from the right end of the identifier, so
//! any amount of root padding is accepted. Widths, type letters and the strike
//! divisor come from [`SymbolConfig`]; feeds disagree on the strike scale
//! (thousandths vs ten-thousandths), so it is never hard-coded here.

use crate::engine::config::SymbolConfig;
use crate::engine::error::SignalError;
use crate::engine::events::OptionType;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Parsed contract terms. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractTerms {
    pub underlying: String,
    pub option_type: OptionType,
    pub expiry: NaiveDate,
    /// Strike digits as they appear in the identifier.
    pub strike_raw: u64,
    /// Divisor turning `strike_raw` into currency units.
    pub strike_scale: u32,
}

impl ContractTerms {
    /// Strike in currency units.
    #[inline]
    pub fn strike(&self) -> f64 {
        self.strike_raw as f64 / self.strike_scale as f64
    }

    #[inline]
    pub fn is_call(&self) -> bool {
        self.option_type == OptionType::Call
    }
}

/// Stateless codec bound to one identifier layout.
#[derive(Debug, Clone)]
pub struct SymbolCodec {
    layout: SymbolConfig,
}

impl SymbolCodec {
    pub fn new(layout: SymbolConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &SymbolConfig {
        &self.layout
    }

    /// Characters in the fixed-width tail: expiry + type + strike.
    #[inline]
    fn tail_width(&self) -> usize {
        self.layout.expiry_width + 1 + self.layout.strike_width
    }

    /// Decode an identifier into contract terms.
    pub fn decode(&self, symbol: &str) -> Result<ContractTerms, SignalError> {
        let trimmed = symbol.trim_end();
        if !trimmed.is_ascii() {
            return Err(SignalError::parse(symbol, "identifier is not ASCII"));
        }

        let tail_width = self.tail_width();
        if trimmed.len() <= tail_width {
            return Err(SignalError::parse(
                symbol,
                format!("expected a root plus {} tail characters", tail_width),
            ));
        }

        let split = trimmed.len() - tail_width;
        let root = trimmed[..split].trim();
        if root.is_empty() {
            return Err(SignalError::parse(symbol, "missing root symbol"));
        }
        if root.contains(char::is_whitespace) {
            return Err(SignalError::parse(symbol, "root symbol contains whitespace"));
        }

        let tail = &trimmed[split..];
        let (expiry_str, rest) = tail.split_at(self.layout.expiry_width);
        let (type_str, strike_str) = rest.split_at(1);

        let expiry = self.decode_expiry(symbol, expiry_str)?;
        let option_type = self.decode_type(symbol, type_str)?;

        if !strike_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SignalError::parse(
                symbol,
                format!("strike '{}' is not a non-negative integer", strike_str),
            ));
        }
        let strike_raw = strike_str
            .parse::<u64>()
            .map_err(|e| SignalError::parse(symbol, format!("strike '{}': {}", strike_str, e)))?;

        Ok(ContractTerms {
            underlying: root.to_string(),
            option_type,
            expiry,
            strike_raw,
            strike_scale: self.layout.strike_scale,
        })
    }

    fn decode_expiry(&self, symbol: &str, digits: &str) -> Result<NaiveDate, SignalError> {
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SignalError::parse(
                symbol,
                format!("expiry '{}' is not {} digits", digits, self.layout.expiry_width),
            ));
        }

        let (year, month_day) = match self.layout.expiry_width {
            6 => (2000 + digits[..2].parse::<i32>().unwrap_or(0), &digits[2..]),
            8 => (digits[..4].parse::<i32>().unwrap_or(0), &digits[4..]),
            width => return Err(unsupported_expiry_width(width)),
        };
        let month = month_day[..2].parse::<u32>().unwrap_or(0);
        let day = month_day[2..].parse::<u32>().unwrap_or(0);

        NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| SignalError::parse(symbol, format!("expiry '{}' is not a date", digits)))
    }

    fn decode_type(&self, symbol: &str, code: &str) -> Result<OptionType, SignalError> {
        let c = code.chars().next().unwrap_or(' ');
        if c == self.layout.call_code {
            Ok(OptionType::Call)
        } else if c == self.layout.put_code {
            Ok(OptionType::Put)
        } else {
            Err(SignalError::parse(
                symbol,
                format!(
                    "type '{}' is neither '{}' nor '{}'",
                    c, self.layout.call_code, self.layout.put_code
                ),
            ))
        }
    }

    /// Canonical identifier for a set of terms.
    ///
    /// The root is left-justified and space-padded to `root_width`; with a
    /// zero width (or a longer root) a single space separates it from the tail.
    pub fn encode(&self, terms: &ContractTerms) -> Result<String, SignalError> {
        let underlying = terms.underlying.trim();
        if underlying.is_empty() {
            return Err(SignalError::parse(underlying, "missing root symbol"));
        }

        let expiry = match self.layout.expiry_width {
            6 => {
                let year = terms.expiry.year();
                if !(2000..2100).contains(&year) {
                    return Err(SignalError::parse(
                        underlying,
                        format!("year {} not representable as YY", year),
                    ));
                }
                format!("{:02}{:02}{:02}", year - 2000, terms.expiry.month(), terms.expiry.day())
            }
            8 => terms.expiry.format("%Y%m%d").to_string(),
            width => return Err(unsupported_expiry_width(width)),
        };

        let type_code = match terms.option_type {
            OptionType::Call => self.layout.call_code,
            OptionType::Put => self.layout.put_code,
        };

        let strike = format!("{:0width$}", terms.strike_raw, width = self.layout.strike_width);
        if strike.len() > self.layout.strike_width {
            return Err(SignalError::parse(
                underlying,
                format!("strike {} exceeds {} digits", terms.strike_raw, self.layout.strike_width),
            ));
        }

        let root = if underlying.len() < self.layout.root_width {
            format!("{:<width$}", underlying, width = self.layout.root_width)
        } else {
            format!("{} ", underlying)
        };

        Ok(format!("{}{}{}{}", root, expiry, type_code, strike))
    }
}

impl Default for SymbolCodec {
    fn default() -> Self {
        Self::new(SymbolConfig::default())
    }
}

fn unsupported_expiry_width(width: usize) -> SignalError {
    SignalError::config("symbol.expiry_width", format!("must be 6 or 8, got {}", width))
}

/// Collapse runs of whitespace so identifiers compare independent of padding.
pub fn normalize_identifier(symbol: &str) -> String {
    symbol.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_occ_padded() {
        let codec = SymbolCodec::default();
        let terms = codec.decode("SPX   240119C04700000").unwrap();
        assert_eq!(terms.underlying, "SPX");
        assert_eq!(terms.option_type, OptionType::Call);
        assert_eq!(terms.expiry, NaiveDate::from_ymd_opt(2024, 1, 19).unwrap());
        assert_eq!(terms.strike_raw, 4_700_000);
        assert_eq!(terms.strike(), 4700.0);
    }

    #[test]
    fn test_decode_single_space_and_put() {
        let codec = SymbolCodec::default();
        let terms = codec.decode("SPXW 240315P04512500").unwrap();
        assert_eq!(terms.underlying, "SPXW");
        assert_eq!(terms.option_type, OptionType::Put);
        assert!((terms.strike() - 4512.5).abs() < 1e-12);
    }

    #[test]
    fn test_decode_with_ten_thousandths_scale() {
        let codec = SymbolCodec::new(SymbolConfig {
            strike_scale: 10_000,
            ..SymbolConfig::default()
        });
        let terms = codec.decode("SPX   240119C04700000").unwrap();
        assert_eq!(terms.strike(), 470.0);
    }

    #[test]
    fn test_decode_eight_digit_expiry_layout() {
        let codec = SymbolCodec::new(SymbolConfig {
            expiry_width: 8,
            strike_width: 7,
            root_width: 0,
            ..SymbolConfig::default()
        });
        let terms = codec.decode("SPX 20230120P2800000").unwrap();
        assert_eq!(terms.expiry, NaiveDate::from_ymd_opt(2023, 1, 20).unwrap());
        assert_eq!(terms.option_type, OptionType::Put);
        assert_eq!(terms.strike(), 2800.0);
        assert_eq!(codec.encode(&terms).unwrap(), "SPX 20230120P2800000");
    }

    #[test]
    fn test_unsupported_expiry_width_is_an_error() {
        let codec = SymbolCodec::new(SymbolConfig {
            expiry_width: 4,
            ..SymbolConfig::default()
        });
        let err = codec.decode("SPX 2401C04700000").unwrap_err();
        assert!(matches!(err, SignalError::Config { .. }));

        let terms = SymbolCodec::default().decode("SPX   240119C04700000").unwrap();
        assert!(matches!(codec.encode(&terms), Err(SignalError::Config { .. })));
    }

    #[test]
    fn test_decode_rejects_bad_type() {
        let codec = SymbolCodec::default();
        let err = codec.decode("SPX   240119X04700000").unwrap_err();
        assert!(matches!(err, SignalError::Parse { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_expiry() {
        let codec = SymbolCodec::default();
        assert!(codec.decode("SPX   24A119C04700000").is_err());
        // Feb 30 is not a date
        assert!(codec.decode("SPX   240230C04700000").is_err());
    }

    #[test]
    fn test_decode_rejects_bad_strike() {
        let codec = SymbolCodec::default();
        assert!(codec.decode("SPX   240119C0470000-").is_err());
        assert!(codec.decode("SPX   240119C04 00000").is_err());
    }

    #[test]
    fn test_decode_rejects_short_or_rootless() {
        let codec = SymbolCodec::default();
        assert!(codec.decode("240119C04700000").is_err());
        assert!(codec.decode("      240119C04700000").is_err());
        assert!(codec.decode("").is_err());
    }

    #[test]
    fn test_round_trip_up_to_whitespace() {
        let codec = SymbolCodec::default();
        for symbol in [
            "SPX   240119C04700000",
            "SPXW  240315P04512500",
            "AAPL 250620C00195000",
            "BRKB  261218P00000500",
        ] {
            let terms = codec.decode(symbol).unwrap();
            let encoded = codec.encode(&terms).unwrap();
            assert_eq!(
                normalize_identifier(&encoded),
                normalize_identifier(symbol),
                "round trip of {}",
                symbol
            );
        }
    }

    #[test]
    fn test_encode_pads_root_to_width() {
        let codec = SymbolCodec::default();
        let terms = codec.decode("SPX 240119C04700000").unwrap();
        assert_eq!(codec.encode(&terms).unwrap(), "SPX   240119C04700000");
    }

    #[test]
    fn test_encode_rejects_overflowing_strike() {
        let codec = SymbolCodec::default();
        let mut terms = codec.decode("SPX   240119C04700000").unwrap();
        terms.strike_raw = 123_456_789;
        assert!(codec.encode(&terms).is_err());
    }
}
