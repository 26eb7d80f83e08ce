//! Camera components.
//!
//! Each component is a stateless set of operations over a borrowed
//! [`CameraDevice`](capture_core::CameraDevice); the device itself is owned by
//! [`connection::CameraHandle`].

pub mod commit;
pub mod connection;
pub mod constraints;
pub mod release;
pub mod roi;
pub mod sequencer;
pub mod temperature;
