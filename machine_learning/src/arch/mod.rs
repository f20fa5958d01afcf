pub mod activations;
pub mod init;
pub mod layers;
pub mod loss;
mod module;
mod sequential;

pub use module::Module;
pub use sequential::Sequential;
