pub mod forest;
pub mod gaussian_process;
pub mod gbdt;
pub mod linear;

pub mod factory;
pub mod regressor_trait;
