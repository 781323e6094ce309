pub mod camera;
pub mod frame_worker;
pub mod microphone;
