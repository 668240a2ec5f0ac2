pub mod health;
pub mod speech;
pub mod translate;
pub mod video;
