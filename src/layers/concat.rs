use crate::error::{Error, Result};
use crate::math::tensor::{Shape, Tensor};

pub fn concat_shape(first: Shape, second: Shape) -> Result<Shape> {
    if first.height != second.height || first.width != second.width {
        return Err(Error::shape(format!(
            "cannot concatenate {} with {}: spatial dims differ",
            first, second
        )));
    }
    Ok(Shape::new(first.height, first.width, first.channels + second.channels))
}

/// Stacks `first` and `second` along the channel axis, `first` occupying the
/// low channel indices.
pub fn concat_channels(first: &Tensor, second: &Tensor) -> Result<Tensor> {
    let shape = concat_shape(first.shape(), second.shape())?;
    let mut data = Vec::with_capacity(shape.len());
    for (a, b) in first
        .data
        .chunks(first.channels)
        .zip(second.data.chunks(second.channels))
    {
        data.extend_from_slice(a);
        data.extend_from_slice(b);
    }
    Tensor::from_data(shape, data)
}

/// Splits a channel-stacked gradient back into its two sources.
pub fn concat_backward(grad_output: &Tensor, first_channels: usize) -> (Tensor, Tensor) {
    let second_channels = grad_output.channels - first_channels;
    let (h, w) = (grad_output.height, grad_output.width);
    let mut first = Vec::with_capacity(h * w * first_channels);
    let mut second = Vec::with_capacity(h * w * second_channels);
    for px in grad_output.data.chunks(grad_output.channels) {
        first.extend_from_slice(&px[..first_channels]);
        second.extend_from_slice(&px[first_channels..]);
    }
    (
        Tensor { height: h, width: w, channels: first_channels, data: first },
        Tensor { height: h, width: w, channels: second_channels, data: second },
    )
}
