use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

pub type Element = f32;

#[cfg(feature = "wgpu")]
pub type MainBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
pub type MainBackend = burn::backend::NdArray<Element, i32>;

pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

#[cfg(any(feature = "ndarray", feature = "wgpu"))]
impl MainDevice for MainBackend {}

#[cfg(any(feature = "ndarray", feature = "wgpu"))]
pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;
#[cfg(any(feature = "ndarray", feature = "wgpu"))]
impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
std::compile_error!("No backend selected. Enable the `ndarray` (default) or the `wgpu` feature.");
