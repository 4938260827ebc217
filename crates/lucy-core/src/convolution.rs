//! 2-D spatial convolution and correlation with a selectable boundary policy.
//!
//! [`apply`] is the reference implementation used by the CPU backend.
//! GPU `convolve.wgsl` mirrors it exactly: same anchor, same kernel
//! orientation, same boundary mapping.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image::Plane;
use crate::psf::Psf;

/// Kernel orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvolutionMode {
    /// True convolution with the kernel. Re-blurs an estimate.
    Forward,
    /// Convolution with the 180°-rotated kernel, the adjoint of `Forward`.
    /// Back-projects a correction signal.
    Correlate,
}

impl ConvolutionMode {
    /// GPU-compatible integer for the shader uniform.
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Forward => 0,
            Self::Correlate => 1,
        }
    }
}

/// How samples outside the plane are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Mirror about the edge sample without repeating it (`dcb|abcd|cba`).
    #[default]
    Reflect,
    /// Outside samples are 0.
    Zero,
}

impl Boundary {
    /// GPU-compatible integer for the shader uniform.
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Reflect => 0,
            Self::Zero => 1,
        }
    }

    /// Map a possibly out-of-range index onto `0..len`, or `None` for a zero sample.
    pub fn resolve(self, index: i64, len: u32) -> Option<usize> {
        let n = len as i64;
        if (0..n).contains(&index) {
            return Some(index as usize);
        }
        match self {
            Self::Zero => None,
            Self::Reflect => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * (n - 1);
                let m = index.rem_euclid(period);
                Some(if m < n { m } else { period - m } as usize)
            }
        }
    }
}

/// Convolve `input` with `kernel`, returning a plane of the same shape.
///
/// The kernel anchor is `(width / 2, height / 2)`. For `Forward`:
///
/// ```text
/// out(x, y) = Σ k(i, j) · in(x + ax − i, y + ay − j)
/// ```
///
/// and for `Correlate`:
///
/// ```text
/// out(x, y) = Σ k(i, j) · in(x − ax + i, y − ay + j)
/// ```
pub fn apply(input: &Plane, kernel: &Psf, mode: ConvolutionMode, boundary: Boundary) -> Plane {
    let (width, height) = input.dimensions();
    let (kw, kh) = kernel.dimensions();
    let (ax, ay) = ((kw / 2) as i64, (kh / 2) as i64);
    let sign: i64 = match mode {
        ConvolutionMode::Forward => -1,
        ConvolutionMode::Correlate => 1,
    };

    // Resolved column indices are the same for every row; precompute them.
    let columns: Vec<Vec<Option<usize>>> = (0..width as i64)
        .map(|x| {
            (0..kw as i64)
                .map(|i| boundary.resolve(x + sign * (i - ax), width))
                .collect()
        })
        .collect();

    let mut data = vec![0.0_f32; input.len()];
    if width == 0 {
        return Plane {
            width,
            height,
            data,
        };
    }

    data.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i64;
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0_f32;
                for j in 0..kh {
                    let Some(sy) = boundary.resolve(y + sign * (j as i64 - ay), height) else {
                        continue;
                    };
                    let src_row = &input.data[sy * width as usize..(sy + 1) * width as usize];
                    for (i, sx) in columns[x].iter().enumerate() {
                        if let Some(sx) = sx {
                            acc += kernel.weight(i as u32, j) * src_row[*sx];
                        }
                    }
                }
                *out = acc;
            }
        });

    Plane {
        width,
        height,
        data,
    }
}
