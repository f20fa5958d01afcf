mod bce_with_logits;
mod charbonnier;
mod l1;
mod loss_fn;
mod mse;

pub use bce_with_logits::BceWithLogits;
pub use charbonnier::Charbonnier;
pub use l1::L1;
pub use loss_fn::LossFn;
pub use mse::Mse;
