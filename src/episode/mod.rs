mod audio;
mod discover;
mod record;

pub use audio::{content_type_for, get_audio_extension, is_audio_file, parse_publish_date};
pub use discover::{AudioFile, list_audio_files};
pub use record::{Episode, Status};
