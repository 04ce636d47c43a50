//! Fixed-width field formatting and lenient numeric token parsing.
//!
//! Written rows use right-justified columns: 20 characters for names and
//! flags, 50 for prior-information equations, 15 for floating values in
//! scientific notation with six decimals, and 10 for integers.

/// Width of string columns.
pub const STRING_WIDTH: usize = 20;
/// Width of the prior-information equation column.
pub const EQUATION_WIDTH: usize = 50;
/// Width of floating-point columns.
pub const FLOAT_WIDTH: usize = 15;
/// Width of integer columns.
pub const INT_WIDTH: usize = 10;

/// Right-justified 20-character string field.
pub fn sfmt(s: &str) -> String {
    format!("{:>width$}", s, width = STRING_WIDTH)
}

/// Right-justified 50-character string field.
pub fn sfmt_long(s: &str) -> String {
    format!("{:>width$}", s, width = EQUATION_WIDTH)
}

/// Right-justified 10-character integer field.
pub fn ifmt(i: i64) -> String {
    format!("{:>width$}", i, width = INT_WIDTH)
}

/// Right-justified 15-character scientific field, e.g. `   1.234560E+02`.
pub fn ffmt(x: f64) -> String {
    format!("{:>width$}", sci(x, 6), width = FLOAT_WIDTH)
}

/// Scientific notation with a signed, at-least-two-digit exponent.
///
/// Rust's `{:E}` writes `1.5E-7`; the control-file convention is `1.5E-07`.
pub fn sci(x: f64, decimals: usize) -> String {
    if !x.is_finite() {
        return format!("{}", x);
    }
    let raw = format!("{:.*E}", decimals, x);
    match raw.split_once('E') {
        Some((mantissa, exp)) => match exp.parse::<i32>() {
            Ok(e) => {
                let sign = if e < 0 { '-' } else { '+' };
                format!("{}E{}{:02}", mantissa, sign, e.abs())
            }
            Err(_) => raw,
        },
        None => raw,
    }
}

/// Compact float for control-data and regularisation lines.
pub fn short_float(x: f64) -> String {
    let a = x.abs();
    if x == 0.0 || (1e-4..1e6).contains(&a) {
        format!("{}", x)
    } else {
        format!("{:E}", x)
    }
}

/// Parse a floating token, accepting Fortran `D` exponents (`1.0D-3`).
pub fn parse_float(token: &str) -> Option<f64> {
    let token = token.trim();
    token
        .parse::<f64>()
        .ok()
        .or_else(|| token.replace(['d', 'D'], "E").parse::<f64>().ok())
}

/// Parse an integer token.
pub fn parse_int(token: &str) -> Option<i64> {
    token.trim().parse::<i64>().ok()
}
