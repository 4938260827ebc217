//! Image and plane tensors for the deconvolution pipeline.

use crate::error::{DeconvError, Result};

/// Single-channel 2-D tensor, row-major `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Plane width in pixels.
    pub width: u32,
    /// Plane height in pixels.
    pub height: u32,
    /// Samples, `width * height` long, row-major.
    pub data: Vec<f32>,
}

impl Plane {
    /// Wrap existing samples. Fails if the length does not match the shape.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(DeconvError::invalid(format!(
                "plane data has {} samples, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Plane filled with a constant value.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Sample count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when every sample is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Multi-channel image of shape (height, width, channels), stored interleaved.
///
/// Values are conventionally normalized to `[0, 1]`. The channel count and
/// shape never change during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Number of interleaved channels per pixel.
    pub channels: usize,
    /// Samples, `width * height * channels` long.
    pub data: Vec<f32>,
}

impl Image {
    /// Wrap interleaved samples. Fails if the length does not match the shape.
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels == 0 {
            return Err(DeconvError::invalid("image must have at least one channel"));
        }
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(DeconvError::invalid(format!(
                "image data has {} samples, expected {expected} for {width}x{height}x{channels}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Single-channel image from a plane.
    pub fn from_plane(plane: Plane) -> Self {
        Self {
            width: plane.width,
            height: plane.height,
            channels: 1,
            data: plane.data,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Split along the channel axis into one plane per channel.
    pub fn split_channels(&self) -> Vec<Plane> {
        (0..self.channels)
            .map(|c| Plane {
                width: self.width,
                height: self.height,
                data: self
                    .data
                    .iter()
                    .skip(c)
                    .step_by(self.channels)
                    .copied()
                    .collect(),
            })
            .collect()
    }

    /// Interleave planes back into an image, in the given channel order.
    pub fn merge_channels(planes: &[Plane]) -> Result<Self> {
        let first = planes
            .first()
            .ok_or_else(|| DeconvError::invalid("cannot merge zero planes"))?;
        let (width, height) = first.dimensions();
        if let Some(bad) = planes.iter().find(|p| p.dimensions() != (width, height)) {
            return Err(DeconvError::invalid(format!(
                "plane {}x{} does not match {width}x{height}",
                bad.width, bad.height
            )));
        }

        let channels = planes.len();
        let mut data = vec![0.0_f32; first.len() * channels];
        for (c, plane) in planes.iter().enumerate() {
            for (i, &v) in plane.data.iter().enumerate() {
                data[i * channels + c] = v;
            }
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }
}
