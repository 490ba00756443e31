//! Interpolating B-splines of low degree.
//!
//! Knot placement follows the usual interpolation conventions:
//! - degree 2: clamped ends, interior knots at the midpoints between
//!   consecutive sites except the first and last midpoint
//! - odd degree: clamped ends, interior knots at the sites with the
//!   `(k - 1) / 2 + 1` sites nearest each end removed (not-a-knot)
//!
//! The collocation matrix is banded with half-width `k` and totally
//! positive, so it is factored by banded Gaussian elimination without
//! pivoting.

/// A fitted spline `s(x) = Σ c_j B_{j,k}(x)`.
#[derive(Debug, Clone)]
pub struct BSpline {
    knots: Vec<f64>,
    coeffs: Vec<f64>,
    degree: usize,
}

/// Knots plus the factored collocation matrix for a set of sites.
///
/// Factor once, then [`fit`](SplineBasis::fit) any number of value series
/// sampled at the same sites.
#[derive(Debug, Clone)]
pub struct SplineBasis {
    knots: Vec<f64>,
    degree: usize,
    lu: BandLu,
}

impl SplineBasis {
    /// Build the basis for strictly increasing `sites`.
    ///
    /// Returns `None` for degrees other than 2 and odd degrees, when fewer
    /// than `degree + 1` sites are given, when the sites are not strictly
    /// increasing, or when the collocation matrix is singular.
    pub fn new(sites: &[f64], degree: usize) -> Option<Self> {
        let n = sites.len();
        if degree == 0 || n < degree + 1 || sites.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        let knots = interpolation_knots(sites, degree)?;
        debug_assert_eq!(knots.len(), n + degree + 1);

        let mut band = Band::zeros(n, degree);
        for (row, &x) in sites.iter().enumerate() {
            let span = find_span(&knots, n, degree, x);
            let basis = basis_functions(&knots, span, degree, x);
            for (r, value) in basis.into_iter().enumerate() {
                let col = span - degree + r;
                if value != 0.0 && !band.set(row, col, value) {
                    return None;
                }
            }
        }

        Some(Self {
            knots,
            degree,
            lu: BandLu::factor(band)?,
        })
    }

    /// Solve for the coefficients interpolating `values` at the sites.
    pub fn fit(&self, values: &[f64]) -> Option<BSpline> {
        if values.len() != self.lu.n {
            return None;
        }
        Some(BSpline {
            knots: self.knots.clone(),
            coeffs: self.lu.solve(values),
            degree: self.degree,
        })
    }
}

impl BSpline {
    /// Interpolate `values` at `sites` with a spline of the given degree.
    pub fn interpolate(sites: &[f64], values: &[f64], degree: usize) -> Option<Self> {
        SplineBasis::new(sites, degree)?.fit(values)
    }

    /// Evaluate the spline. Arguments outside the site range are clamped.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.coeffs.len();
        let k = self.degree;
        let x = x.clamp(self.knots[k], self.knots[n]);
        let span = find_span(&self.knots, n, k, x);
        basis_functions(&self.knots, span, k, x)
            .into_iter()
            .enumerate()
            .map(|(r, b)| b * self.coeffs[span - k + r])
            .sum()
    }
}

fn interpolation_knots(sites: &[f64], k: usize) -> Option<Vec<f64>> {
    let n = sites.len();
    let first = sites[0];
    let last = sites[n - 1];

    let interior: Vec<f64> = if k == 2 {
        // Midpoints between consecutive sites, dropping the first and last.
        (1..n.saturating_sub(2))
            .map(|i| (sites[i] + sites[i + 1]) / 2.0)
            .collect()
    } else if k % 2 == 1 {
        let drop = (k - 1) / 2 + 1;
        sites[drop..n - drop].to_vec()
    } else {
        return None;
    };

    let mut knots = Vec::with_capacity(n + k + 1);
    knots.extend(std::iter::repeat(first).take(k + 1));
    knots.extend(interior);
    knots.extend(std::iter::repeat(last).take(k + 1));
    Some(knots)
}

/// Index `μ` in `[k, n - 1]` with `t[μ] <= x < t[μ + 1]`; the last span
/// also takes `x == t[n]`.
fn find_span(knots: &[f64], n: usize, k: usize, x: f64) -> usize {
    if x >= knots[n] {
        return n - 1;
    }
    // Last index in [k, n) whose knot is <= x.
    let upper = knots[k..n].partition_point(|&t| t <= x);
    (k + upper.saturating_sub(1)).clamp(k, n - 1)
}

/// Non-zero basis functions `B_{μ-k..=μ, k}(x)` (Cox–de Boor).
fn basis_functions(knots: &[f64], span: usize, k: usize, x: f64) -> Vec<f64> {
    let mut values = vec![0.0; k + 1];
    let mut left = vec![0.0; k + 1];
    let mut right = vec![0.0; k + 1];
    values[0] = 1.0;

    for j in 1..=k {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { values[r] / denom };
            values[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        values[j] = saved;
    }
    values
}

/// Square banded matrix with equal lower and upper half-width.
#[derive(Debug, Clone)]
struct Band {
    n: usize,
    half: usize,
    data: Vec<f64>,
}

impl Band {
    fn zeros(n: usize, half: usize) -> Self {
        Self {
            n,
            half,
            data: vec![0.0; n * (2 * half + 1)],
        }
    }

    fn width(&self) -> usize {
        2 * self.half + 1
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        let offset = col + self.half;
        if col >= self.n || offset < row || offset - row >= self.width() {
            return None;
        }
        Some(row * self.width() + (offset - row))
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        self.index(row, col).map(|i| self.data[i]).unwrap_or(0.0)
    }

    /// Returns `false` when `(row, col)` lies outside the band.
    fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        match self.index(row, col) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }
}

/// In-place LU factors of a [`Band`]; `L` has a unit diagonal.
#[derive(Debug, Clone)]
struct BandLu {
    n: usize,
    band: Band,
}

impl BandLu {
    fn factor(mut band: Band) -> Option<Self> {
        let n = band.n;
        let h = band.half;
        for p in 0..n {
            let pivot = band.get(p, p);
            if pivot.abs() < f64::MIN_POSITIVE {
                return None;
            }
            for r in (p + 1)..(p + h + 1).min(n) {
                let factor = band.get(r, p) / pivot;
                if factor == 0.0 {
                    continue;
                }
                band.set(r, p, factor);
                for c in (p + 1)..(p + h + 1).min(n) {
                    let updated = band.get(r, c) - factor * band.get(p, c);
                    band.set(r, c, updated);
                }
            }
        }
        Some(Self { n, band })
    }

    fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let n = self.n;
        let h = self.band.half;
        let mut x = rhs.to_vec();

        for r in 0..n {
            let start = r.saturating_sub(h);
            let sum: f64 = (start..r).map(|c| self.band.get(r, c) * x[c]).sum();
            x[r] -= sum;
        }
        for r in (0..n).rev() {
            let end = (r + h + 1).min(n);
            let sum: f64 = ((r + 1)..end).map(|c| self.band.get(r, c) * x[c]).sum();
            x[r] = (x[r] - sum) / self.band.get(r, r);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sites(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_cubic_reproduces_cubic_polynomial() {
        let f = |x: f64| 0.5 * x.powi(3) - 2.0 * x * x + x + 3.0;
        let xs = vec![0.0, 1.0, 2.0, 5.0, 6.0, 7.0, 9.0];
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
        let spline = BSpline::interpolate(&xs, &ys, 3).unwrap();

        for x in [0.0, 0.5, 3.0, 3.5, 4.0, 8.0, 9.0] {
            assert!((spline.evaluate(x) - f(x)).abs() < 1e-8, "x={x}");
        }
    }

    #[test]
    fn test_quadratic_reproduces_quadratic_polynomial() {
        let f = |x: f64| 2.0 * x * x - 3.0 * x + 1.0;
        let xs = vec![0.0, 1.0, 3.0, 4.0, 7.0, 8.0];
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
        let spline = BSpline::interpolate(&xs, &ys, 2).unwrap();

        for x in [0.0, 2.0, 5.0, 6.0, 7.5, 8.0] {
            assert!((spline.evaluate(x) - f(x)).abs() < 1e-8, "x={x}");
        }
    }

    #[test]
    fn test_passes_through_sites() {
        let xs = sites(12);
        let ys: Vec<f64> = xs.iter().map(|x| (x * 0.7).sin() * 10.0).collect();
        for degree in [2, 3] {
            let spline = BSpline::interpolate(&xs, &ys, degree).unwrap();
            for (x, y) in xs.iter().zip(&ys) {
                assert!((spline.evaluate(*x) - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_minimum_site_counts() {
        assert!(BSpline::interpolate(&sites(3), &[1.0, 2.0, 4.0], 2).is_some());
        assert!(BSpline::interpolate(&sites(2), &[1.0, 2.0], 2).is_none());
        assert!(BSpline::interpolate(&sites(4), &[1.0, 0.0, 2.0, 5.0], 3).is_some());
        assert!(BSpline::interpolate(&sites(3), &[1.0, 0.0, 2.0], 3).is_none());
    }

    #[test]
    fn test_rejects_unsorted_sites_and_even_degree_above_two() {
        assert!(SplineBasis::new(&[0.0, 2.0, 1.0, 3.0], 3).is_none());
        assert!(SplineBasis::new(&sites(8), 4).is_none());
    }

    #[test]
    fn test_basis_reused_for_several_series() {
        let xs = sites(6);
        let basis = SplineBasis::new(&xs, 3).unwrap();
        let a = basis.fit(&[0.0, 1.0, 8.0, 27.0, 64.0, 125.0]).unwrap();
        let b = basis.fit(&[5.0; 6]).unwrap();
        assert!((a.evaluate(2.5) - 15.625).abs() < 1e-9);
        assert!((b.evaluate(2.5) - 5.0).abs() < 1e-12);
        assert!(basis.fit(&[1.0]).is_none());
    }
}
