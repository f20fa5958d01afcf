mod activation;
mod batch_norm;
mod dense;
mod dropout;
mod layer;
mod sync_batch_norm;

pub use activation::Activation;
pub use batch_norm::BatchNorm;
pub use dense::Dense;
pub use dropout::Dropout;
pub use layer::Layer;
pub use sync_batch_norm::SyncBatchNorm;
