use image::imageops::FilterType;
use log::warn;
use serde::{Deserialize, Serialize};

/// Resampling filter used when shrinking pages into previews.
///
/// The accepted names cover the common filter vocabulary; names without a
/// dedicated kernel map onto the closest one available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThumbnailFilter {
    #[default]
    NearestNeighbor,
    Linear,
    CatmullRom,
    Gaussian,
    Lanczos,
}

impl ThumbnailFilter {
    /// Unknown names fall back to nearest-neighbor with a warning.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "NearestNeighbor" | "Nearest" | "Box" => ThumbnailFilter::NearestNeighbor,
            "Linear" | "Triangle" | "Bartlett" => ThumbnailFilter::Linear,
            "CatmullRom" | "MitchellNetravali" | "Hermite" | "BSpline" => {
                ThumbnailFilter::CatmullRom
            }
            "Gaussian" => ThumbnailFilter::Gaussian,
            "Lanczos" | "Lanczos3" | "Hann" | "Hamming" | "Blackman" | "Welch" | "Cosine" => {
                ThumbnailFilter::Lanczos
            }
            other => {
                warn!("Using default filter NearestNeighbor instead of unknown {:?}", other);
                ThumbnailFilter::NearestNeighbor
            }
        }
    }

    pub fn filter_type(self) -> FilterType {
        match self {
            ThumbnailFilter::NearestNeighbor => FilterType::Nearest,
            ThumbnailFilter::Linear => FilterType::Triangle,
            ThumbnailFilter::CatmullRom => FilterType::CatmullRom,
            ThumbnailFilter::Gaussian => FilterType::Gaussian,
            ThumbnailFilter::Lanczos => FilterType::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_to_kernels() {
        assert_eq!(ThumbnailFilter::from_name("Lanczos"), ThumbnailFilter::Lanczos);
        assert_eq!(ThumbnailFilter::from_name("Hamming"), ThumbnailFilter::Lanczos);
        assert_eq!(ThumbnailFilter::from_name("Box"), ThumbnailFilter::NearestNeighbor);
        assert_eq!(ThumbnailFilter::from_name("Linear").filter_type(), FilterType::Triangle);
    }

    #[test]
    fn unknown_name_falls_back_to_nearest() {
        assert_eq!(ThumbnailFilter::from_name("Sinc"), ThumbnailFilter::NearestNeighbor);
        assert_eq!(ThumbnailFilter::from_name(""), ThumbnailFilter::NearestNeighbor);
        assert_eq!(ThumbnailFilter::default().filter_type(), FilterType::Nearest);
    }
}
