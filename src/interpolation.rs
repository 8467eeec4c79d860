// Interpolation policies for 1-D tables and 2-D (primary x secondary) tables
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Offset added to `1 - mu` by the nudged cosine scale.
pub const COSINE_NUDGE: f64 = 1e-10;

/// Processing applied to one axis before interpolating linearly.
///
/// `LogCos` and `NudgedLogCos` work on cosines: the processed value is
/// `ln(1 - mu)` (plus a small nudge), which resolves forward peaks.
/// They are decreasing in `mu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scale {
    Lin,
    Log,
    LogCos,
    NudgedLogCos,
}

impl Scale {
    const TOKENS: [(&'static str, Scale); 4] = [
        ("NudgedLogCos", Scale::NudgedLogCos),
        ("LogCos", Scale::LogCos),
        ("Log", Scale::Log),
        ("Lin", Scale::Lin),
    ];

    #[inline]
    pub fn process(self, value: f64) -> f64 {
        match self {
            Scale::Lin => value,
            Scale::Log => value.ln(),
            Scale::LogCos => (1.0 - value).ln(),
            Scale::NudgedLogCos => (1.0 - value + COSINE_NUDGE).ln(),
        }
    }

    #[inline]
    pub fn recover(self, processed: f64) -> f64 {
        match self {
            Scale::Lin => processed,
            Scale::Log => processed.exp(),
            Scale::LogCos => 1.0 - processed.exp(),
            Scale::NudgedLogCos => 1.0 + COSINE_NUDGE - processed.exp(),
        }
    }

    /// Magnitude of `d process(v) / dv`, the density conversion factor.
    #[inline]
    pub fn jacobian(self, value: f64) -> f64 {
        match self {
            Scale::Lin => 1.0,
            Scale::Log => 1.0 / value,
            Scale::LogCos => 1.0 / (1.0 - value),
            Scale::NudgedLogCos => 1.0 / (1.0 - value + COSINE_NUDGE),
        }
    }

    /// Whether `value` can be processed without producing a non-finite number.
    #[inline]
    pub fn accepts(self, value: f64) -> bool {
        match self {
            Scale::Lin => value.is_finite(),
            Scale::Log => value > 0.0 && value.is_finite(),
            Scale::LogCos => (-1.0..1.0).contains(&value),
            Scale::NudgedLogCos => (-1.0..=1.0).contains(&value),
        }
    }

    pub fn is_logarithmic(self) -> bool {
        self != Scale::Lin
    }

    fn token(self) -> &'static str {
        match self {
            Scale::Lin => "Lin",
            Scale::Log => "Log",
            Scale::LogCos => "LogCos",
            Scale::NudgedLogCos => "NudgedLogCos",
        }
    }

    /// Split a leading scale token off `text`, longest match first.
    fn split_token(text: &str) -> Option<(Scale, &str)> {
        Self::TOKENS.iter().find_map(|&(token, scale)| {
            text.strip_prefix(token).map(|rest| (scale, rest))
        })
    }
}

/// Interpolation inside one bin of a 1-D table, named dependent-then-independent.
///
/// `LinLog` means the dependent value is linear in `ln(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OneDInterp {
    #[default]
    LinLin,
    LinLog,
    LogLin,
    LogLog,
}

impl OneDInterp {
    pub fn dependent_scale(self) -> Scale {
        match self {
            OneDInterp::LinLin | OneDInterp::LinLog => Scale::Lin,
            OneDInterp::LogLin | OneDInterp::LogLog => Scale::Log,
        }
    }

    pub fn independent_scale(self) -> Scale {
        match self {
            OneDInterp::LinLin | OneDInterp::LogLin => Scale::Lin,
            OneDInterp::LinLog | OneDInterp::LogLog => Scale::Log,
        }
    }

    /// The form actually usable on a bin: log axes with non-positive
    /// end points fall back to linear.
    pub fn effective(self, x0: f64, x1: f64, y0: f64, y1: f64) -> OneDInterp {
        let log_x = self.independent_scale() == Scale::Log && x0 > 0.0 && x1 > 0.0;
        let log_y = self.dependent_scale() == Scale::Log && y0 > 0.0 && y1 > 0.0;
        match (log_y, log_x) {
            (false, false) => OneDInterp::LinLin,
            (false, true) => OneDInterp::LinLog,
            (true, false) => OneDInterp::LogLin,
            (true, true) => OneDInterp::LogLog,
        }
    }

    /// Interpolate between `(x0, y0)` and `(x1, y1)` at `x`.
    #[inline]
    pub fn interpolate(self, x0: f64, x1: f64, y0: f64, y1: f64, x: f64) -> f64 {
        if x == x0 {
            return y0;
        }
        if x == x1 {
            return y1;
        }
        let form = self.effective(x0, x1, y0, y1);
        let xs = form.independent_scale();
        let ys = form.dependent_scale();
        let t = (xs.process(x) - xs.process(x0)) / (xs.process(x1) - xs.process(x0));
        match ys {
            Scale::Log => y0 * (y1 / y0).powf(t),
            _ => y0 + t * (y1 - y0),
        }
    }
}

impl FromStr for OneDInterp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "LinLin" | "Lin-Lin" => Ok(OneDInterp::LinLin),
            "LinLog" | "Lin-Log" => Ok(OneDInterp::LinLog),
            "LogLin" | "Log-Lin" => Ok(OneDInterp::LogLin),
            "LogLog" | "Log-Log" => Ok(OneDInterp::LogLog),
            other => Err(Error::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for OneDInterp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.dependent_scale().token(),
            self.independent_scale().token()
        )
    }
}

/// Axis processing for a bivariate table: `z` is the density, `y` the
/// secondary variable, `x` the primary (incoming energy) variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TwoDInterpPolicy {
    pub z: Scale,
    pub y: Scale,
    pub x: Scale,
}

impl TwoDInterpPolicy {
    pub const LIN_LIN_LIN: TwoDInterpPolicy = TwoDInterpPolicy {
        z: Scale::Lin,
        y: Scale::Lin,
        x: Scale::Lin,
    };
    pub const LIN_LIN_LOG: TwoDInterpPolicy = TwoDInterpPolicy {
        z: Scale::Lin,
        y: Scale::Lin,
        x: Scale::Log,
    };
    pub const LOG_LOG_LOG: TwoDInterpPolicy = TwoDInterpPolicy {
        z: Scale::Log,
        y: Scale::Log,
        x: Scale::Log,
    };

    /// Fraction of the way from `x0` to `x1` in processed primary space.
    #[inline]
    pub fn primary_fraction(&self, x0: f64, x1: f64, x: f64) -> f64 {
        let p0 = self.x.process(x0);
        (self.x.process(x) - p0) / (self.x.process(x1) - p0)
    }

    /// Interpolate two densities with the `z` scale, falling back to linear
    /// when either is not positive.
    #[inline]
    pub fn interpolate_density(&self, beta: f64, z0: f64, z1: f64) -> f64 {
        if self.z == Scale::Log && z0 > 0.0 && z1 > 0.0 {
            z0 * (z1 / z0).powf(beta)
        } else {
            z0 + beta * (z1 - z0)
        }
    }

    /// Interpolate two secondary values in processed `y` space.
    #[inline]
    pub fn interpolate_secondary(&self, beta: f64, y0: f64, y1: f64) -> f64 {
        if y0 == y1 {
            return y0;
        }
        let (p0, p1) = (self.y.process(y0), self.y.process(y1));
        self.y.recover(p0 + beta * (p1 - p0))
    }
}

impl FromStr for TwoDInterpPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || Error::UnknownPolicy(s.to_string());
        let text = s.trim();
        let (z, rest) = Scale::split_token(text).ok_or_else(unknown)?;
        let (y, rest) = Scale::split_token(rest).ok_or_else(unknown)?;
        let (x, rest) = Scale::split_token(rest).ok_or_else(unknown)?;
        let cosine = |scale: Scale| matches!(scale, Scale::LogCos | Scale::NudgedLogCos);
        if !rest.is_empty() || cosine(z) || cosine(x) {
            return Err(unknown());
        }
        Ok(TwoDInterpPolicy { z, y, x })
    }
}

impl fmt::Display for TwoDInterpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.z.token(), self.y.token(), self.x.token())
    }
}

/// Find the largest `i` with `x[i] <= x_new`, capped at `x.len() - 2`.
pub(crate) fn lower_bin(x: &[f64], x_new: f64) -> usize {
    let count = x.partition_point(|&v| v <= x_new);
    count.saturating_sub(1).min(x.len().saturating_sub(2))
}

/// Interpolate a table on a linear scale; values outside the table are
/// held at the end points.
pub fn interpolate_linear(x: &[f64], y: &[f64], x_new: f64) -> f64 {
    interpolate_table(OneDInterp::LinLin, x, y, x_new)
}

/// Interpolate a table on a log-log scale; values outside the table are
/// held at the end points.
pub fn interpolate_log_log(x: &[f64], y: &[f64], x_new: f64) -> f64 {
    interpolate_table(OneDInterp::LogLog, x, y, x_new)
}

fn interpolate_table(interp: OneDInterp, x: &[f64], y: &[f64], x_new: f64) -> f64 {
    if x.is_empty() || y.len() != x.len() {
        return f64::NAN;
    }
    if x.len() == 1 || x_new <= x[0] {
        return y[0];
    }
    if x_new >= x[x.len() - 1] {
        return y[y.len() - 1];
    }
    let i = lower_bin(x, x_new);
    interp.interpolate(x[i], x[i + 1], y[i], y[i + 1], x_new)
}
