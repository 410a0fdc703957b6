pub mod concat;
pub mod conv;
pub mod conv_transpose;
pub mod crop;
pub mod param;
pub mod pool;

pub use concat::{concat_backward, concat_channels};
pub use conv::Conv2d;
pub use conv_transpose::ConvTranspose2d;
pub use crop::{center_crop, center_crop_backward};
pub use param::Param;
pub use pool::MaxPool2d;
