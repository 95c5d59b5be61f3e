pub mod models;
pub mod ytdlp;

pub use models::{Format, VideoInfo};
pub use ytdlp::{YtDlpExtractor, PROBE_TIMEOUT};
