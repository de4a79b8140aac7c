pub mod conv;
pub mod dense;
pub mod dropout;
pub mod layer;
pub mod norm;
pub mod param;
pub mod pool;

pub use layer::Layer;
pub use param::Param;

/// Whether a forward pass is part of a training step or an evaluation.
///
/// Dropout and batch normalisation behave differently between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}
