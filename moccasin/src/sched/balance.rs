//! Balance equations.

use std::ops::Mul;

/// A non-negative rational number in lowest terms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    const ONE: Self = Self { num: 1, den: 1 };

    fn new(num: u128, den: u128) -> Self {
        let g = gcd(num, den).max(1);

        Self {
            num: num / g,
            den: den / g,
        }
    }
}

impl Mul<(u128, u128)> for Ratio {
    type Output = Self;

    /// Multiplies by the fraction `num / den`.
    fn mul(self, (num, den): (u128, u128)) -> Self {
        Self::new(self.num.saturating_mul(num), self.den.saturating_mul(den))
    }
}

pub(crate) fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }

    a
}

pub(crate) fn lcm(a: u128, b: u128) -> u128 {
    if a == 0 || b == 0 {
        return 0;
    }

    (a / gcd(a, b)).saturating_mul(b)
}

/// A rate constraint: each firing of `source` produces `production` tokens
/// which are consumed `consumption` at a time by `sink`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct RateEdge {
    pub(crate) source: usize,
    pub(crate) production: usize,
    pub(crate) sink: usize,
    pub(crate) consumption: usize,
}

/// Computes the smallest positive integer repetition vector of `nodes`
/// actors, solved independently for each connected component.
///
/// Rates must be non-zero. On failure, returns the index of an edge whose
/// constraint contradicts the others.
pub(crate) fn solve(nodes: usize, edges: &[RateEdge]) -> Result<Vec<usize>, usize> {
    let mut adjacency = vec![Vec::new(); nodes];
    for (k, edge) in edges.iter().enumerate() {
        adjacency[edge.source].push(k);
        if edge.sink != edge.source {
            adjacency[edge.sink].push(k);
        }
    }

    let mut ratios: Vec<Option<Ratio>> = vec![None; nodes];
    let mut repetitions = vec![0; nodes];

    for start in 0..nodes {
        if ratios[start].is_some() {
            continue;
        }
        ratios[start] = Some(Ratio::ONE);
        let mut component = vec![start];
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            let ratio = ratios[node].unwrap_or(Ratio::ONE);
            for &k in &adjacency[node] {
                let edge = edges[k];
                let (p, c) = (edge.production as u128, edge.consumption as u128);
                // r(source) * p == r(sink) * c
                let (other, expected) = if node == edge.source {
                    (edge.sink, ratio * (p, c))
                } else {
                    (edge.source, ratio * (c, p))
                };
                match ratios[other] {
                    None => {
                        ratios[other] = Some(expected);
                        component.push(other);
                        stack.push(other);
                    }
                    Some(r) if r != expected => return Err(k),
                    Some(_) => {}
                }
            }
        }

        let denominator = component
            .iter()
            .filter_map(|&n| ratios[n])
            .fold(1, |l, r| lcm(l, r.den));
        let scaled: Vec<u128> = component
            .iter()
            .map(|&n| {
                let r = ratios[n].unwrap_or(Ratio::ONE);
                r.num.saturating_mul(denominator / r.den)
            })
            .collect();
        let divisor = scaled.iter().fold(0, |g, &v| gcd(g, v)).max(1);
        for (&n, v) in component.iter().zip(scaled) {
            repetitions[n] = usize::try_from(v / divisor).unwrap_or(usize::MAX);
        }
    }

    Ok(repetitions)
}
