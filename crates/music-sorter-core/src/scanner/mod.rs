mod walk;

pub use walk::{batch, estimate_count, is_audio_file, Batches, LocalityWalker, AUDIO_EXTENSIONS};
