pub mod audio_backend;
pub mod delegate;
pub mod session;
pub mod video_backend;
