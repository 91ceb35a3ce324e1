//! Spatial-softmax feature pooling.

use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Reduce a feature map to expected 2-D keypoint coordinates per channel.
///
/// Each channel's activations are normalized with a softmax over its `H * W`
/// locations and used as a probability mass to take the expectation of a
/// coordinate grid spanning `[-1, 1]` on both axes. The result is
/// `[batch, 2 * channels]`: all x coordinates first, then all y coordinates.
pub fn spatial_softmax<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = features.dims();
    let device = features.device();

    let flat = features.reshape([batch * channels, height * width]);
    let attention = softmax(flat, 1);

    let x_grid = coordinate_grid::<B>(height, width, Axis::X, &device);
    let y_grid = coordinate_grid::<B>(height, width, Axis::Y, &device);

    // Expected coordinate per (batch, channel) row; sum_dim keeps the dim.
    let expected_x = (attention.clone() * x_grid.unsqueeze::<2>()).sum_dim(1);
    let expected_y = (attention * y_grid.unsqueeze::<2>()).sum_dim(1);

    let coords = Tensor::cat(vec![expected_x, expected_y], 1);
    coords
        .reshape([batch, channels, 2])
        .swap_dims(1, 2)
        .reshape([batch, 2 * channels])
}

enum Axis {
    X,
    Y,
}

fn coordinate_grid<B: Backend>(
    height: usize,
    width: usize,
    axis: Axis,
    device: &B::Device,
) -> Tensor<B, 1> {
    let coord = |i: usize, n: usize| -> f32 {
        if n <= 1 {
            0.0
        } else {
            -1.0 + 2.0 * i as f32 / (n - 1) as f32
        }
    };
    let mut values = Vec::with_capacity(height * width);
    for row in 0..height {
        for col in 0..width {
            values.push(match axis {
                Axis::X => coord(col, width),
                Axis::Y => coord(row, height),
            });
        }
    }
    Tensor::from_data(TensorData::new(values, [height * width]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 4>::zeros([2, 8, 4, 4], &device);
        let coords = spatial_softmax(features);
        assert_eq!(coords.dims(), [2, 16]);
    }

    #[test]
    fn test_uniform_map_gives_center() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 4>::zeros([1, 1, 5, 5], &device);
        let coords: Vec<f32> = spatial_softmax(features).to_data().to_vec().unwrap();
        assert!(coords[0].abs() < 1e-5);
        assert!(coords[1].abs() < 1e-5);
    }

    #[test]
    fn test_sharp_peak_recovers_location() {
        let device = Default::default();
        // A strong activation in the top-right corner dominates the softmax.
        let mut values = vec![0.0f32; 25];
        values[4] = 100.0; // row 0, col 4
        let features = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(values, [1, 1, 5, 5]),
            &device,
        );

        let coords: Vec<f32> = spatial_softmax(features).to_data().to_vec().unwrap();
        assert!((coords[0] - 1.0).abs() < 1e-3, "x = {}", coords[0]);
        assert!((coords[1] + 1.0).abs() < 1e-3, "y = {}", coords[1]);
    }
}
