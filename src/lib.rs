//! A small convolutional MNIST digit classifier built on [burn], trained and
//! served in-process.

pub mod backend;
pub mod cli;
pub mod data;
pub mod inference;
pub mod model;
pub mod training;

pub mod prelude {
    pub use crate::backend::*;
    pub use crate::data::*;
    pub use crate::inference::*;
    pub use crate::model::*;
    pub use crate::training::*;
}

#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<crate::backend::Element, i32>;
#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
