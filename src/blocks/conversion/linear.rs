//! Parametric conversion functions.
//!
//! Each function returns `None` when the parameter set is malformed or the
//! value falls outside the function's domain; the caller then keeps the raw
//! value.

/// `physical = P1 + P2 * raw`
pub(super) fn apply_linear(params: &[f64], raw: f64) -> Option<f64> {
    if params.len() < 2 {
        return None;
    }
    Some(params[0] + params[1] * raw)
}

/// `physical = (P2 - P4*(raw - P5 - P6)) / (P3*(raw - P5 - P6) - P1)`
pub(super) fn apply_polynomial(params: &[f64], raw: f64) -> Option<f64> {
    if params.len() < 6 {
        return None;
    }
    let x = raw - params[4] - params[5];
    let den = params[2] * x - params[0];
    if den.abs() < f64::EPSILON {
        return None;
    }
    Some((params[1] - params[3] * x) / den)
}

// Exponential and logarithmic conversions share one 7-parameter shape with
// either P4 or P1 zero selecting which variant applies.
fn exp_log(params: &[f64], raw: f64, f: fn(f64) -> f64) -> Option<f64> {
    if params.len() < 7 {
        return None;
    }
    let (p1, p2, p3, p4, p5, p6, p7) = (
        params[0], params[1], params[2], params[3], params[4], params[5], params[6],
    );
    let phys = if p4 == 0.0 {
        if p1 == 0.0 || p2 == 0.0 {
            return None;
        }
        f(((raw - p7) * p6 - p3) / p1) / p2
    } else if p1 == 0.0 {
        if p4 == 0.0 || p5 == 0.0 || raw == p7 {
            return None;
        }
        f((p3 / (raw - p7) - p6) / p4) / p5
    } else {
        return None;
    };
    phys.is_finite().then_some(phys)
}

pub(super) fn apply_exponential(params: &[f64], raw: f64) -> Option<f64> {
    exp_log(params, raw, f64::ln)
}

pub(super) fn apply_logarithmic(params: &[f64], raw: f64) -> Option<f64> {
    exp_log(params, raw, f64::exp)
}

/// `physical = (P1*raw² + P2*raw + P3) / (P4*raw² + P5*raw + P6)`
pub(super) fn apply_rational(params: &[f64], raw: f64) -> Option<f64> {
    if params.len() < 6 {
        return None;
    }
    let num = params[0] * raw * raw + params[1] * raw + params[2];
    let den = params[3] * raw * raw + params[4] * raw + params[5];
    if den.abs() < f64::EPSILON {
        return None;
    }
    Some(num / den)
}
