//! Reporting metrics between a reference image and a candidate.

mod image;
pub mod lpips;
mod metric;
mod pcc;
mod psnr;

pub use image::Image;
pub use lpips::Lpips;
pub use metric::Metric;
pub use pcc::Pcc;
pub use psnr::Psnr;
