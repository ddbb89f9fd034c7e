//! Number formatting for report cells and KPI tiles.

const MISSING: &str = "n/a";

/// Compact number: `1.23M`, `4.56k`, `7.80`, `0.0123`. Missing and NaN render as `n/a`.
pub fn fmt_compact(n: Option<f64>) -> String {
    let Some(n) = n.filter(|v| !v.is_nan()) else {
        return MISSING.to_string();
    };
    let a = n.abs();
    if a >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else if a >= 1e3 {
        format!("{:.2}k", n / 1e3)
    } else if a == 0.0 || a >= 1.0 {
        format!("{:.2}", n)
    } else if a < 1e-6 {
        format!("{:.2e}", n)
    } else {
        // three significant digits
        let decimals = (2 - a.log10().floor() as i32).max(0) as usize;
        format!("{:.*}", decimals, n)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn with_separators(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    let negative = n < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// KPI value with thousands separators. Without explicit `decimals`, values of 1000 and up are
/// rounded to integers, 100 and up get one decimal, smaller values two.
pub fn kpi_fmt(n: Option<f64>, decimals: Option<usize>) -> String {
    let Some(n) = n.filter(|v| v.is_finite()) else {
        return MISSING.to_string();
    };
    let decimals = decimals.unwrap_or_else(|| {
        let a = n.abs();
        if a >= 1000.0 {
            0
        } else if a >= 100.0 {
            1
        } else {
            2
        }
    });
    with_separators(n, decimals)
}
