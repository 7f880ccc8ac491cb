//! Math primitives shared by the simulation

pub mod vec2;

pub use vec2::Vec2;
