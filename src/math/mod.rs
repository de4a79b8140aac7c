pub mod tensor;

pub use tensor::{argmax, softmax_in_place, Tensor, TensorError};
