//! FFmpeg filter graph construction from transformation options.

use vidshift_models::{Transformation, TransformOptions};

/// Slowest factor a single `atempo` instance accepts.
const ATEMPO_MIN: f64 = 0.5;
/// Fastest factor a single `atempo` instance accepts.
const ATEMPO_MAX: f64 = 2.0;

/// Filter for a geometric or color transformation.
pub fn transformation_filter(transformation: Transformation) -> Option<&'static str> {
    match transformation {
        Transformation::None => None,
        Transformation::Grayscale => Some("format=gray"),
        Transformation::Invert => Some("negate"),
        Transformation::Hflip => Some("hflip"),
        Transformation::Vflip => Some("vflip"),
        Transformation::Rotate90 => Some("rotate=PI/2"),
        Transformation::Rotate180 => Some("rotate=PI"),
        Transformation::Rotate270 => Some("rotate=3*PI/2"),
    }
}

/// `eq` filter covering only the adjustments that differ from neutral.
pub fn eq_filter(options: &TransformOptions) -> Option<String> {
    let mut parts = Vec::new();
    if options.brightness_changed() {
        parts.push(format!("brightness={}", format_number(options.brightness - 1.0)));
    }
    if options.contrast_changed() {
        parts.push(format!("contrast={}", format_number(options.contrast)));
    }

    if parts.is_empty() {
        None
    } else {
        Some(format!("eq={}", parts.join(":")))
    }
}

/// Presentation timestamp rescale for a playback speed.
pub fn setpts_filter(speed: f64) -> String {
    format!("setpts={}*PTS", format_number(1.0 / speed))
}

/// Chain of `atempo` filters whose product equals `speed`.
pub fn atempo_chain(speed: f64) -> String {
    let mut remaining = speed;
    let mut factors = Vec::new();

    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    factors.push(remaining);

    factors
        .into_iter()
        .map(|f| format!("atempo={}", format_number(f)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the video filter graph for the engine stage.
///
/// Order: transformation, color adjustment, then speed (only when no frame
/// filter runs; otherwise speed is applied after frame processing).
pub fn build_filter_graph(options: &TransformOptions) -> Option<String> {
    let mut filters: Vec<String> = Vec::new();

    if let Some(f) = transformation_filter(options.transformation) {
        filters.push(f.to_string());
    }
    if let Some(eq) = eq_filter(options) {
        filters.push(eq);
    }
    if options.filter.is_none() && options.speed_changed() {
        filters.push(setpts_filter(options.speed));
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

fn format_number(value: f64) -> String {
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    if rounded == 0.0 {
        // avoid "-0"
        return "0".to_string();
    }
    format!("{}", rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidshift_models::FrameFilter;

    fn options(transformation: Transformation, filter: FrameFilter, speed: f64, brightness: f64, contrast: f64) -> TransformOptions {
        TransformOptions {
            transformation,
            filter,
            speed,
            brightness,
            contrast,
        }
    }

    #[test]
    fn test_neutral_options_have_no_graph() {
        assert_eq!(build_filter_graph(&TransformOptions::default()), None);
    }

    #[test]
    fn test_graph_order() {
        let graph = build_filter_graph(&options(Transformation::Rotate90, FrameFilter::None, 2.0, 1.2, 0.8)).unwrap();
        assert_eq!(graph, "rotate=PI/2,eq=brightness=0.2:contrast=0.8,setpts=0.5*PTS");
    }

    #[test]
    fn test_speed_deferred_when_frame_filter_present() {
        let graph = build_filter_graph(&options(Transformation::Grayscale, FrameFilter::Blur, 2.0, 1.0, 1.0)).unwrap();
        assert_eq!(graph, "format=gray");

        assert_eq!(build_filter_graph(&options(Transformation::None, FrameFilter::Blur, 2.0, 1.0, 1.0)), None);
    }

    #[test]
    fn test_eq_only_changed_components() {
        let contrast_only = options(Transformation::None, FrameFilter::None, 1.0, 1.0, 1.5);
        assert_eq!(eq_filter(&contrast_only).unwrap(), "eq=contrast=1.5");

        let brightness_only = options(Transformation::None, FrameFilter::None, 1.0, 0.7, 1.0);
        assert_eq!(eq_filter(&brightness_only).unwrap(), "eq=brightness=-0.3");
    }

    #[test]
    fn test_atempo_chain_stays_in_range() {
        assert_eq!(atempo_chain(1.5), "atempo=1.5");
        assert_eq!(atempo_chain(4.0), "atempo=2,atempo=2");
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.5");
        assert_eq!(atempo_chain(3.0), "atempo=2,atempo=1.5");
    }
}
