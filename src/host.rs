//! Naive host matrix multiply.
//!
//! This is the textbook triple loop and is kept that way on purpose: it is
//! the baseline the device path is timed against. No blocking, no SIMD and
//! no threads.

use tracing::debug;

use crate::error::Result;
use crate::matrix::{at, SquareMatrix};

/// Computes `out = left × right` on the host.
///
/// `out[i][j] = Σ_k left[i][k] * right[k][j]`, accumulated in `f32` in `k`
/// order. All three matrices must share one dimension; a mismatch fails
/// before any element of `out` is written.
pub fn host_matmul(left: &SquareMatrix, right: &SquareMatrix, out: &mut SquareMatrix) -> Result<()> {
    left.check_same_dimension(right, "right operand")?;
    left.check_same_dimension(out, "output matrix")?;

    let n = left.dimension();
    debug!(dimension = n, "host multiply");

    let l = left.as_slice();
    let r = right.as_slice();
    let o = out.as_mut_slice();

    for i in 0..n {
        for j in 0..n {
            let mut temp = 0.0f32;
            for k in 0..n {
                temp += l[at(i, k, n)] * r[at(k, j, n)];
            }
            o[at(i, j, n)] = temp;
        }
    }

    Ok(())
}
