pub mod batch;
pub mod cancel;
pub mod extraction;
pub mod model;
