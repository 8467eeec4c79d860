// Legendre polynomials

/// Evaluate `P_n(x)` with the Bonnet recurrence.
pub fn legendre_p(n: usize, x: f64) -> f64 {
    match n {
        0 => 1.0,
        1 => x,
        _ => {
            let (mut p_prev, mut p) = (1.0, x);
            for k in 1..n {
                let kf = k as f64;
                let next = ((2.0 * kf + 1.0) * x * p - kf * p_prev) / (kf + 1.0);
                p_prev = p;
                p = next;
            }
            p
        }
    }
}

/// Evaluate `P_0(x) ..= P_n(x)`.
pub fn legendre_all(n: usize, x: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(n + 1);
    values.push(1.0);
    if n >= 1 {
        values.push(x);
    }
    for k in 1..n {
        let kf = k as f64;
        values.push(((2.0 * kf + 1.0) * x * values[k] - kf * values[k - 1]) / (kf + 1.0));
    }
    values
}

/// Power-series coefficients of `P_n(1 - x)` in `x`.
///
/// Row `n` holds `c_{n,0} ..= c_{n,n}` with `P_n(1 - x) = sum_k c_{n,k} x^k`.
/// Rows are produced by the three-term recurrence seeded with `P_0 = 1` and
/// `P_1 = 1 - x`; expanding around the forward direction keeps the large
/// cancellations of `P_n(mu)` near `mu = 1` out of floating point.
#[derive(Debug, Clone)]
pub struct ShiftedLegendreCoefficients {
    rows: Vec<Vec<f64>>,
}

impl ShiftedLegendreCoefficients {
    pub fn new(max_order: usize) -> Self {
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(max_order + 1);
        rows.push(vec![1.0]);
        if max_order >= 1 {
            rows.push(vec![1.0, -1.0]);
        }
        for n in 1..max_order {
            let nf = n as f64;
            let (current, previous) = (&rows[n], &rows[n - 1]);
            let next: Vec<f64> = (0..=n + 1)
                .map(|k| {
                    let c_nk = current.get(k).copied().unwrap_or(0.0);
                    let c_nk_minus = if k > 0 { current[k - 1] } else { 0.0 };
                    let c_prev = previous.get(k).copied().unwrap_or(0.0);
                    ((2.0 * nf + 1.0) * (c_nk - c_nk_minus) - nf * c_prev) / (nf + 1.0)
                })
                .collect();
            rows.push(next);
        }
        ShiftedLegendreCoefficients { rows }
    }

    pub fn max_order(&self) -> usize {
        self.rows.len() - 1
    }

    pub fn coefficients(&self, order: usize) -> Option<&[f64]> {
        self.rows.get(order).map(Vec::as_slice)
    }
}
