pub mod audio_worker;
pub mod demux_worker;
pub mod health_monitor;
pub mod heartbeat;
pub mod messages;
pub mod mux_worker;
pub mod speech_worker;
pub mod supervisor;
pub mod vad_worker;
pub mod video_worker;
