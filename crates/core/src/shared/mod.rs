pub mod audio_frame;
pub mod constants;
pub mod encoded_packet;
pub mod frame;
pub mod model_resolver;
pub mod settings;
pub mod time_base;
