//! Key-to-pointer translation

pub mod mapper;

pub use mapper::{key_to_point, pointer_events, surface_size, MouseButton, Point, PointerEvent};
