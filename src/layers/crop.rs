use crate::error::{Error, Result};
use crate::math::tensor::{Shape, Tensor};

/// Top-left corner of a centred `target_h × target_w` window inside `input`.
///
/// When the margin is odd the extra row/column is trimmed from the bottom or
/// right edge. A target larger than the input is a shape mismatch.
pub fn crop_offsets(input: Shape, target_h: usize, target_w: usize) -> Result<(usize, usize)> {
    if input.height < target_h || input.width < target_w {
        return Err(Error::shape(format!(
            "cannot centre-crop a {}x{} map to {}x{}",
            input.height, input.width, target_h, target_w
        )));
    }
    Ok(((input.height - target_h) / 2, (input.width - target_w) / 2))
}

pub fn center_crop_shape(input: Shape, target_h: usize, target_w: usize) -> Result<Shape> {
    crop_offsets(input, target_h, target_w)?;
    Ok(Shape::new(target_h, target_w, input.channels))
}

pub fn center_crop(input: &Tensor, target_h: usize, target_w: usize) -> Result<Tensor> {
    let (top, left) = crop_offsets(input.shape(), target_h, target_w)?;
    let row = target_w * input.channels;
    let mut out = Tensor::zeros(Shape::new(target_h, target_w, input.channels));
    for y in 0..target_h {
        let src = input.offset(top + y, left, 0);
        out.data[y * row..(y + 1) * row].copy_from_slice(&input.data[src..src + row]);
    }
    Ok(out)
}

/// Scatters the gradient of the cropped window back into a zero map of the
/// original size.
pub fn center_crop_backward(input_shape: Shape, grad_output: &Tensor) -> Result<Tensor> {
    let (top, left) = crop_offsets(input_shape, grad_output.height, grad_output.width)?;
    let row = grad_output.width * grad_output.channels;
    let mut grad_input = Tensor::zeros(input_shape);
    for y in 0..grad_output.height {
        let dst = grad_input.offset(top + y, left, 0);
        grad_input.data[dst..dst + row].copy_from_slice(&grad_output.data[y * row..(y + 1) * row]);
    }
    Ok(grad_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: Shape) -> Tensor {
        Tensor::from_data(shape, (0..shape.len()).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn keeps_the_centre() {
        let input = ramp(Shape::new(4, 4, 1));
        let out = center_crop(&input, 2, 2).unwrap();
        assert_eq!(out.data, vec![5.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    fn odd_margin_trims_bottom_right() {
        assert_eq!(crop_offsets(Shape::new(5, 5, 1), 2, 2).unwrap(), (1, 1));
        assert_eq!(crop_offsets(Shape::new(96, 96, 64), 64, 64).unwrap(), (16, 16));
    }

    #[test]
    fn smaller_source_is_a_shape_mismatch() {
        let input = ramp(Shape::new(3, 3, 1));
        assert!(matches!(center_crop(&input, 4, 2), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn backward_pads_with_zeros() {
        let grad = Tensor::from_data(Shape::new(1, 1, 2), vec![1.0, 2.0]).unwrap();
        let back = center_crop_backward(Shape::new(3, 3, 2), &grad).unwrap();
        assert_eq!(back.get(1, 1, 0), 1.0);
        assert_eq!(back.get(1, 1, 1), 2.0);
        assert_eq!(back.data.iter().sum::<f64>(), 3.0);
    }
}
