pub mod apply;
pub mod kinds;
pub mod show;
