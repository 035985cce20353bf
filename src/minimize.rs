//! One-dimensional minimization: downhill bracketing and Brent's method.
//!
//! Both searches are bounded and return [`GuideError::Convergence`] instead
//! of looping forever.

use crate::error::{GuideError, Result};

const GOLD: f64 = 1.618034;
const VERY_SMALL: f64 = 1.0e-21;
const BRACKET_MAX_ITER: usize = 1000;
const MIN_TOL: f64 = 1.0e-11;
const CGOLD: f64 = 0.381_966_0;

/// Default maximum factor by which a bracketing step may grow.
pub const DEF_GROW_LIMIT: f64 = 110.0;

/// Three points with `f(xb) <= f(xa)` and `f(xb) < f(xc)`; `xb` lies between
/// `xa` and `xc` but the triple may be in either order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub xa: f64,
    pub xb: f64,
    pub xc: f64,
    pub fa: f64,
    pub fb: f64,
    pub fc: f64,
    /// Function evaluations used.
    pub n_calls: usize,
}

/// Brent's method settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrentOptions {
    /// Relative tolerance on x.
    /// Default: 1.48e-8
    pub tol: f64,
    /// Maximum iterations.
    /// Default: 500
    pub max_iter: usize,
}

impl Default for BrentOptions {
    fn default() -> Self {
        Self {
            tol: 1.48e-8,
            max_iter: 500,
        }
    }
}

/// A located minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: f64,
    pub f: f64,
    pub n_iter: usize,
    pub n_calls: usize,
}

/// Search downhill from `xa`, `xb` for three points that bracket a minimum.
pub fn bracket<F: FnMut(f64) -> f64>(
    mut f: F,
    mut xa: f64,
    mut xb: f64,
    grow_limit: f64,
) -> Result<Bracket> {
    let mut fa = f(xa);
    let mut fb = f(xb);
    if fa < fb {
        std::mem::swap(&mut xa, &mut xb);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut xc = xb + GOLD * (xb - xa);
    let mut fc = f(xc);
    let mut n_calls = 3;
    let mut iter = 0;

    while fc < fb {
        let tmp1 = (xb - xa) * (fb - fc);
        let tmp2 = (xb - xc) * (fb - fa);
        let val = tmp2 - tmp1;
        let denom = if val.abs() < VERY_SMALL {
            2.0 * VERY_SMALL
        } else {
            2.0 * val
        };
        let mut w = xb - ((xb - xc) * tmp2 - (xb - xa) * tmp1) / denom;
        let wlim = xb + grow_limit * (xc - xb);
        if iter > BRACKET_MAX_ITER {
            return Err(GuideError::Convergence(format!(
                "bracket: no minimum found in {} iterations",
                BRACKET_MAX_ITER
            )));
        }
        iter += 1;

        let fw;
        if (w - xc) * (xb - w) > 0.0 {
            // Parabolic w lies between xb and xc
            let fw_try = f(w);
            n_calls += 1;
            if fw_try < fc {
                return Ok(Bracket {
                    xa: xb,
                    xb: w,
                    xc,
                    fa: fb,
                    fb: fw_try,
                    fc,
                    n_calls,
                });
            } else if fw_try > fb {
                return Ok(Bracket {
                    xa,
                    xb,
                    xc: w,
                    fa,
                    fb,
                    fc: fw_try,
                    n_calls,
                });
            }
            w = xc + GOLD * (xc - xb);
            fw = f(w);
            n_calls += 1;
        } else if (w - wlim) * (wlim - xc) >= 0.0 {
            w = wlim;
            fw = f(w);
            n_calls += 1;
        } else if (w - wlim) * (xc - w) > 0.0 {
            let fw_try = f(w);
            n_calls += 1;
            if fw_try < fc {
                xb = xc;
                xc = w;
                w = xc + GOLD * (xc - xb);
                fb = fc;
                fc = fw_try;
                fw = f(w);
                n_calls += 1;
            } else {
                fw = fw_try;
            }
        } else {
            w = xc + GOLD * (xc - xb);
            fw = f(w);
            n_calls += 1;
        }
        xa = xb;
        xb = xc;
        xc = w;
        fa = fb;
        fb = fc;
        fc = fw;

        if !xc.is_finite() || !fc.is_finite() {
            return Err(GuideError::Convergence(
                "bracket: search diverged without finding a minimum".into(),
            ));
        }
    }

    Ok(Bracket {
        xa,
        xb,
        xc,
        fa,
        fb,
        fc,
        n_calls,
    })
}

/// Minimize `f` with Brent's method inside the bracket `xa < xb < xc`
/// (or `xa > xb > xc`), which must satisfy `f(xb) < f(xa)` and
/// `f(xb) < f(xc)`.
pub fn brent<F: FnMut(f64) -> f64>(
    mut f: F,
    xa: f64,
    xb: f64,
    xc: f64,
    options: &BrentOptions,
) -> Result<Minimum> {
    let (xa, xc) = if xa > xc { (xc, xa) } else { (xa, xc) };
    if !(xa < xb && xb < xc) {
        return Err(GuideError::Convergence(format!(
            "not a bracketing interval: ({}, {}, {})",
            xa, xb, xc
        )));
    }
    let fa = f(xa);
    let fb = f(xb);
    let fc = f(xc);
    if !(fb < fa && fb < fc) {
        return Err(GuideError::Convergence(format!(
            "not a bracketing interval: f=({}, {}, {})",
            fa, fb, fc
        )));
    }
    brent_search(f, xa, xc, xb, fb, 3, options)
}

/// Bracket a minimum starting from `xa`, `xb`, then refine it with Brent's method.
pub fn minimize<F: FnMut(f64) -> f64>(
    mut f: F,
    xa: f64,
    xb: f64,
    options: &BrentOptions,
) -> Result<Minimum> {
    let br = bracket(&mut f, xa, xb, DEF_GROW_LIMIT)?;
    let (a, b) = if br.xa < br.xc {
        (br.xa, br.xc)
    } else {
        (br.xc, br.xa)
    };
    brent_search(f, a, b, br.xb, br.fb, br.n_calls, options)
}

/// Brent iterations on the interval `[a, b]` starting from `x`.
fn brent_search<F: FnMut(f64) -> f64>(
    mut f: F,
    mut a: f64,
    mut b: f64,
    x0: f64,
    fx0: f64,
    mut n_calls: usize,
    options: &BrentOptions,
) -> Result<Minimum> {
    let (mut x, mut w, mut v) = (x0, x0, x0);
    let (mut fx, mut fw, mut fv) = (fx0, fx0, fx0);
    let mut deltax: f64 = 0.0;
    let mut rat: f64 = 0.0;

    for n_iter in 0..options.max_iter {
        let tol1 = options.tol * x.abs() + MIN_TOL;
        let tol2 = 2.0 * tol1;
        let xmid = 0.5 * (a + b);
        if (x - xmid).abs() < tol2 - 0.5 * (b - a) {
            return Ok(Minimum {
                x,
                f: fx,
                n_iter,
                n_calls,
            });
        }

        if deltax.abs() <= tol1 {
            // Golden section step
            deltax = if x >= xmid { a - x } else { b - x };
            rat = CGOLD * deltax;
        } else {
            // Parabolic step
            let tmp1 = (x - w) * (fx - fv);
            let mut tmp2 = (x - v) * (fx - fw);
            let mut p = (x - v) * tmp2 - (x - w) * tmp1;
            tmp2 = 2.0 * (tmp2 - tmp1);
            if tmp2 > 0.0 {
                p = -p;
            }
            tmp2 = tmp2.abs();
            let dx_temp = deltax;
            deltax = rat;
            if p > tmp2 * (a - x) && p < tmp2 * (b - x) && p.abs() < (0.5 * tmp2 * dx_temp).abs() {
                rat = p / tmp2;
                let u = x + rat;
                if (u - a) < tol2 || (b - u) < tol2 {
                    rat = if xmid - x >= 0.0 { tol1 } else { -tol1 };
                }
            } else {
                deltax = if x >= xmid { a - x } else { b - x };
                rat = CGOLD * deltax;
            }
        }

        // Move by at least tol1
        let u = if rat.abs() < tol1 {
            if rat >= 0.0 {
                x + tol1
            } else {
                x - tol1
            }
        } else {
            x + rat
        };
        let fu = f(u);
        n_calls += 1;

        if fu > fx {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        } else {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        }
    }

    Err(GuideError::Convergence(format!(
        "brent: no convergence in {} iterations (x={})",
        options.max_iter, x
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_quadratic() {
        let br = bracket(|x| (x - 5.0).powi(2), 0.0, 1.0, DEF_GROW_LIMIT).unwrap();
        let (lo, hi) = if br.xa < br.xc {
            (br.xa, br.xc)
        } else {
            (br.xc, br.xa)
        };
        assert!(lo < br.xb && br.xb < hi, "{br:?}");
        assert!(lo <= 5.0 && 5.0 <= hi, "{br:?}");
        assert!(br.fb <= br.fa && br.fb < br.fc);
    }

    #[test]
    fn test_minimize_quadratic() {
        let m = minimize(|x| (x - 2.0).powi(2) + 1.0, 0.0, 1.0, &BrentOptions::default()).unwrap();
        assert!((m.x - 2.0).abs() < 1e-6, "x={}", m.x);
        assert!((m.f - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_brent_cosine() {
        let m = brent(f64::cos, 2.0, 3.0, 4.5, &BrentOptions::default()).unwrap();
        assert!((m.x - std::f64::consts::PI).abs() < 1e-6, "x={}", m.x);
        // Reversed triple is accepted too
        let r = brent(f64::cos, 4.5, 3.0, 2.0, &BrentOptions::default()).unwrap();
        assert!((r.x - m.x).abs() < 1e-9);
    }

    #[test]
    fn test_brent_rejects_bad_bracket() {
        let opts = BrentOptions::default();
        assert!(matches!(
            brent(|x| x * x, 1.0, 2.0, 3.0, &opts),
            Err(GuideError::Convergence(_))
        ));
        assert!(matches!(
            brent(|x| x * x, -1.0, 2.0, 1.0, &opts),
            Err(GuideError::Convergence(_))
        ));
    }

    #[test]
    fn test_bracket_diverges() {
        assert!(matches!(
            bracket(|x| -x, 0.0, 1.0, DEF_GROW_LIMIT),
            Err(GuideError::Convergence(_))
        ));
    }

    #[test]
    fn test_brent_iteration_limit() {
        let opts = BrentOptions {
            tol: 1.48e-8,
            max_iter: 2,
        };
        assert!(matches!(
            brent(|x| (x - 0.3).powi(2), 0.0, 0.5, 1.0, &opts),
            Err(GuideError::Convergence(_))
        ));
    }
}
