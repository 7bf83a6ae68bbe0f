//! Exact integer helpers for the converters.

/// Extended Euclidean algorithm.
///
/// Returns `(g, x, y)` such that `a * x + b * y == g`, where `g` is the nonnegative greatest
/// common divisor of `a` and `b`.
pub(crate) fn extended_gcd(a: i128, b: i128) -> (i128, i128, i128) {
    let (mut old_r, mut r) = (a, b);
    let (mut old_s, mut s) = (1, 0);
    let (mut old_t, mut t) = (0, 1);
    while r != 0 {
        let q = old_r / r;
        let next_r = old_r - q * r;
        old_r = r;
        r = next_r;
        let next_s = old_s - q * s;
        old_s = s;
        s = next_s;
        let next_t = old_t - q * t;
        old_t = t;
        t = next_t;
    }
    if old_r < 0 {
        (-old_r, -old_s, -old_t)
    } else {
        (old_r, old_s, old_t)
    }
}

/// Smallest nontrivial solution of `a * x + b * y == 0`.
///
/// Every other solution is an integer multiple of the returned one. Returns `(0, 1)` when `a`
/// is zero, which makes `x / y` a valid fraction.
pub(crate) fn solve_homogeneous(a: i128, b: i128) -> (i128, i128) {
    let (g, _, _) = extended_gcd(a, b);
    if g == 0 {
        return (0, 1);
    }
    let (x, y) = (b / g, -a / g);
    //Keep `y` positive so that `x / y` keeps the sign of the solution
    if y < 0 {
        (-x, -y)
    } else {
        (x, y)
    }
}

/// Reduce a fraction to lowest terms. The denominator must be nonzero.
pub(crate) fn reduce(num: u128, den: u128) -> (u128, u128) {
    let (mut a, mut b) = (num, den);
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    match a {
        0 => (0, 1),
        g => (num / g, den / g),
    }
}

/// `n / d` rounded to the nearest integer, halves rounding up.
#[inline]
pub(crate) fn round_div(n: u128, d: u128) -> u128 {
    (n + d / 2) / d
}
