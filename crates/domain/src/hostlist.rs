//! Slurm host-list expression expansion.
//!
//! Slurm reports allocated nodes as a compact expression such as
//! `node[01-03,07],gpu1`. Ranges preserve zero padding.

use crate::errors::{BridgeError, Result};

/// Expand a host-list expression into individual node names, in the order
/// they appear in the expression.
pub fn expand(expr: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for part in split_top_level(expr) {
        if part.is_empty() {
            continue;
        }
        expand_part(&part, &mut names)?;
    }
    Ok(names)
}

// Split on commas not enclosed in brackets.
fn split_top_level(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in expr.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn expand_part(part: &str, out: &mut Vec<String>) -> Result<()> {
    let Some(open) = part.find('[') else {
        out.push(part.to_string());
        return Ok(());
    };
    let close = part
        .rfind(']')
        .ok_or_else(|| invalid(part, "unbalanced bracket"))?;
    if close < open {
        return Err(invalid(part, "unbalanced bracket"));
    }
    let prefix = &part[..open];
    let ranges = &part[open + 1..close];
    let suffix = &part[close + 1..];

    for range in ranges.split(',') {
        match range.split_once('-') {
            None => out.push(format!("{prefix}{range}{suffix}")),
            Some((lo, hi)) => {
                let width = lo.len();
                let lo_n: u64 = lo
                    .parse()
                    .map_err(|_| invalid(part, "non-numeric range bound"))?;
                let hi_n: u64 = hi
                    .parse()
                    .map_err(|_| invalid(part, "non-numeric range bound"))?;
                if hi_n < lo_n {
                    return Err(invalid(part, "descending range"));
                }
                for n in lo_n..=hi_n {
                    out.push(format!("{prefix}{n:0width$}{suffix}"));
                }
            }
        }
    }
    Ok(())
}

fn invalid(part: &str, what: &str) -> BridgeError {
    BridgeError::InvalidConfig(format!("host list {part:?}: {what}"))
}
