//! Kubernetes resource quantity parsing.
//!
//! Only the arithmetic the job IR needs: the integral value of a quantity
//! (rounded up, matching apimachinery's `Quantity.Value()`) and the MiB
//! conversion Slurm expects for memory.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const MIB: i64 = 1_048_576;

/// Integral value of a quantity string, rounding up. `100m` is 1, `2` is 2,
/// `1Gi` is 1073741824. Unparseable quantities yield None.
pub fn value(q: &Quantity) -> Option<i64> {
    parse(&q.0)
}

/// Memory quantity in MiB, rounded down, matching what the placeholder job
/// submission carries for memory-per-node.
pub fn mebibytes(q: &Quantity) -> Option<i64> {
    value(q).map(|v| v / MIB)
}

fn parse(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-' && c != '+')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let base: f64 = number.parse().ok()?;

    let scale: f64 = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => MIB as f64,
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => {
            // Scientific notation, e.g. 1e3.
            if let Some(exp) = suffix.strip_prefix(['e', 'E']) {
                let exp: i32 = exp.parse().ok()?;
                10f64.powi(exp)
            } else {
                return None;
            }
        }
    };

    Some((base * scale).ceil() as i64)
}
