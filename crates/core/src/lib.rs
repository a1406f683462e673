pub mod audio;
pub mod blurring;
pub mod consent;
pub mod detection;
pub mod pipeline;
pub mod recognition;
pub mod shared;
pub mod video;
