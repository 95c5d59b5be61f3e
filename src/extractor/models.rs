//! Data structures for video information

use serde::{Deserialize, Serialize};

/// Video information returned by a metadata probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<Format>,
}

/// Video format information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    pub format_id: String,
    pub ext: String,
    pub quality: Option<f64>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
    pub resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub tbr: Option<f64>, // Total bitrate
    pub vbr: Option<f64>, // Video bitrate
    pub abr: Option<f64>, // Audio bitrate
}

impl Format {
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }

    /// Exact size if known, otherwise yt-dlp's estimate
    pub fn best_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

impl VideoInfo {
    /// Formats carrying both audio and video, highest resolution first.
    pub fn combined_formats(&self) -> Vec<&Format> {
        let mut formats: Vec<&Format> = self
            .formats
            .iter()
            .filter(|f| f.has_video() && f.has_audio())
            .collect();
        formats.sort_by_key(|f| std::cmp::Reverse(f.width.unwrap_or(0) * f.height.unwrap_or(0)));
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dump_json_subset() {
        let json = r#"{
            "id": "abc",
            "title": "Sample",
            "duration": 212.5,
            "uploader": "Someone",
            "extractor": "youtube",
            "formats": [
                {"format_id": "140", "ext": "m4a", "acodec": "mp4a.40.2", "vcodec": "none", "filesize": 3400000},
                {"format_id": "18", "ext": "mp4", "acodec": "mp4a", "vcodec": "avc1", "width": 640, "height": 360, "quality": 6, "filesize_approx": 9000000},
                {"format_id": "22", "ext": "mp4", "acodec": "mp4a", "vcodec": "avc1", "width": 1280, "height": 720, "resolution": "1280x720"}
            ]
        }"#;

        let info: VideoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.title, "Sample");
        assert_eq!(info.duration, Some(212.5));
        assert_eq!(info.formats.len(), 3);
        assert!(!info.formats[0].has_video());
        assert_eq!(info.formats[1].best_size(), Some(9_000_000));
        assert_eq!(info.formats[1].quality, Some(6.0));

        let combined = info.combined_formats();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].format_id, "22");
    }

    #[test]
    fn test_missing_formats_defaults_to_empty() {
        let info: VideoInfo = serde_json::from_str(r#"{"title": "Only title"}"#).unwrap();
        assert!(info.formats.is_empty());
        assert!(info.uploader.is_none());
    }
}
